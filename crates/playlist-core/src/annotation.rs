//! Annotation data model
//!
//! Marks captured against a rendered page. All geometry here is in screen
//! space (origin top-left, Y down) at render scale 1.0; the flip into PDF
//! space happens once, in the compositor.

use crate::error::PlaylistError;
use serde::{Deserialize, Deserializer, Serialize};

/// Fill opacity used for every highlight, regardless of the color supplied.
pub const HIGHLIGHT_OPACITY: f32 = 0.3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle spanned by two drag corners, in any order.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    /// Flip negative width/height so the rectangle is anchored at its
    /// top-left corner.
    pub fn normalized(self) -> Self {
        let (x, width) = if self.width < 0.0 {
            (self.x + self.width, -self.width)
        } else {
            (self.x, self.width)
        };
        let (y, height) = if self.height < 0.0 {
            (self.y + self.height, -self.height)
        } else {
            (self.y, self.height)
        };
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn has_area(&self) -> bool {
        self.width != 0.0 && self.height != 0.0
    }

    pub fn expanded(&self, by: f64) -> Self {
        Self {
            x: self.x - by,
            y: self.y - by,
            width: self.width + 2.0 * by,
            height: self.height + 2.0 * by,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }
}

/// RGB color, serialized as a `#RRGGBB` string.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const RED: Color = Color::rgb(0xFF, 0, 0);
    pub const YELLOW: Color = Color::rgb(0xFF, 0xFF, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse "#FF0000" or "FF0000". Anything unparseable is black.
    pub fn from_hex(color: &str) -> Self {
        let hex = color.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Color::BLACK;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16);
        match (channel(0..2), channel(2..4), channel(4..6)) {
            (Ok(r), Ok(g), Ok(b)) => Color::rgb(r, g, b),
            _ => Color::BLACK,
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Components in the 0-1 range used by PDF color operators.
    pub fn components(&self) -> [f32; 3] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        ]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

impl From<String> for Color {
    fn from(value: String) -> Self {
        Color::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_hex()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AnnotationKind {
    Stroke,
    Highlight,
    Text,
    Crop,
}

/// A mark bound to one zero-based page of one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Annotation {
    Stroke {
        page: usize,
        points: Vec<Point>,
        color: Color,
        width: f64,
    },
    Highlight {
        page: usize,
        #[serde(deserialize_with = "normalized_rect")]
        rect: ScreenRect,
        color: Color,
    },
    Text {
        page: usize,
        anchor: Point,
        text: String,
        font_size: f64,
        color: Color,
    },
    Crop {
        page: usize,
        #[serde(deserialize_with = "normalized_rect")]
        rect: ScreenRect,
    },
}

/// Highlight and crop rects are stored top-left anchored however they arrive.
fn normalized_rect<'de, D>(deserializer: D) -> Result<ScreenRect, D::Error>
where
    D: Deserializer<'de>,
{
    ScreenRect::deserialize(deserializer).map(ScreenRect::normalized)
}

impl Annotation {
    pub fn highlight(page: usize, rect: ScreenRect, color: Color) -> Self {
        Annotation::Highlight {
            page,
            rect: rect.normalized(),
            color,
        }
    }

    pub fn crop(page: usize, rect: ScreenRect) -> Self {
        Annotation::Crop {
            page,
            rect: rect.normalized(),
        }
    }

    pub fn page(&self) -> usize {
        match self {
            Annotation::Stroke { page, .. }
            | Annotation::Highlight { page, .. }
            | Annotation::Text { page, .. }
            | Annotation::Crop { page, .. } => *page,
        }
    }

    pub fn kind(&self) -> AnnotationKind {
        match self {
            Annotation::Stroke { .. } => AnnotationKind::Stroke,
            Annotation::Highlight { .. } => AnnotationKind::Highlight,
            Annotation::Text { .. } => AnnotationKind::Text,
            Annotation::Crop { .. } => AnnotationKind::Crop,
        }
    }

    /// Approximate screen-space footprint, used for eraser hit-testing.
    ///
    /// Strokes use the bounding box of their points grown by half the line
    /// width. Text is estimated at `0.6 * font_size` per character; the box
    /// runs from the anchor up to the top of the glyphs as composed (the
    /// baseline sits one font size above the anchor, see
    /// [`crate::coords::text_anchor_to_document_space`]).
    pub fn bounds(&self) -> Option<ScreenRect> {
        match self {
            Annotation::Stroke { points, width, .. } => {
                let first = points.first()?;
                let (mut min, mut max) = (*first, *first);
                for p in &points[1..] {
                    min.x = min.x.min(p.x);
                    min.y = min.y.min(p.y);
                    max.x = max.x.max(p.x);
                    max.y = max.y.max(p.y);
                }
                Some(ScreenRect::from_corners(min, max).expanded(width / 2.0))
            }
            Annotation::Highlight { rect, .. } | Annotation::Crop { rect, .. } => {
                Some(rect.normalized())
            }
            Annotation::Text {
                anchor,
                text,
                font_size,
                ..
            } => {
                let width = 0.6 * font_size * text.chars().count() as f64;
                Some(ScreenRect::new(
                    anchor.x,
                    anchor.y - 2.0 * font_size,
                    width,
                    2.0 * font_size,
                ))
            }
        }
    }
}

/// Parse a JSON array of annotations.
pub fn annotations_from_json(json: &str) -> Result<Vec<Annotation>, PlaylistError> {
    serde_json::from_str(json)
        .map_err(|e| PlaylistError::ParseError(format!("Invalid annotations: {}", e)))
}

pub fn annotations_to_json(annotations: &[Annotation]) -> Result<String, PlaylistError> {
    serde_json::to_string_pretty(annotations)
        .map_err(|e| PlaylistError::OperationError(e.to_string()))
}
