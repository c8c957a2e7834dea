//! Coordinate transformation between screen and PDF coordinate systems
//!
//! Screen space: origin top-left, Y grows downward, pixels at render scale.
//! Document space: origin bottom-left, Y grows upward, PDF points.

use crate::annotation::{Point, ScreenRect};
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in document space, anchored at its lower-left corner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DocRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Flip a screen point into document space.
pub fn to_document_space(screen: Point, page_height: f64) -> Point {
    Point {
        x: screen.x,
        y: page_height - screen.y,
    }
}

/// Inverse of [`to_document_space`].
pub fn to_screen_space(document: Point, page_height: f64) -> Point {
    Point {
        x: document.x,
        y: page_height - document.y,
    }
}

/// The document-space origin of a rectangle is the screen rectangle's
/// bottom edge.
pub fn rect_to_document_space(rect: ScreenRect, page_height: f64) -> DocRect {
    let rect = rect.normalized();
    DocRect {
        x: rect.x,
        y: page_height - rect.y - rect.height,
        width: rect.width,
        height: rect.height,
    }
}

pub fn rect_to_screen_space(rect: DocRect, page_height: f64) -> ScreenRect {
    ScreenRect {
        x: rect.x,
        y: page_height - rect.y - rect.height,
        width: rect.width,
        height: rect.height,
    }
}

/// Text anchors have the font size subtracted from their screen Y before the
/// flip.
pub fn text_anchor_to_document_space(anchor: Point, font_size: f64, page_height: f64) -> Point {
    to_document_space(
        Point {
            x: anchor.x,
            y: anchor.y - font_size,
        },
        page_height,
    )
}

/// Zoom factor of the page viewer at capture time.
///
/// Pointer positions are divided by the scale on the way in, so captured
/// annotations are always expressed at scale 1.0 (one pixel per PDF point)
/// and replay identically at any zoom.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RenderScale(f64);

impl RenderScale {
    pub const IDENTITY: RenderScale = RenderScale(1.0);

    /// Non-positive or non-finite scales fall back to 1.0.
    pub fn new(scale: f64) -> Self {
        if scale.is_finite() && scale > 0.0 {
            RenderScale(scale)
        } else {
            RenderScale::IDENTITY
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn unscale(&self, rendered: Point) -> Point {
        Point {
            x: rendered.x / self.0,
            y: rendered.y / self.0,
        }
    }

    pub fn scale(&self, point: Point) -> Point {
        Point {
            x: point.x * self.0,
            y: point.y * self.0,
        }
    }
}

impl Default for RenderScale {
    fn default() -> Self {
        RenderScale::IDENTITY
    }
}
