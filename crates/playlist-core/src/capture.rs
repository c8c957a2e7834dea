//! Annotation capture engine
//!
//! Turns pointer gestures into committed annotations for one document and
//! keeps the undo/redo history for that editing session. Gestures that carry
//! no mark (a click with the pen, a zero-area drag, blank text, an eraser
//! click on empty space) are absorbed here and never reach history.

use crate::annotation::{Annotation, AnnotationKind, Point, ScreenRect};
use crate::config::CaptureConfig;
use crate::coords::RenderScale;
use crate::history::{AnnotationHistory, Snapshot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tool {
    Pen,
    Highlighter,
    Text,
    Crop,
    Eraser,
}

/// Identifies the gesture started by [`CaptureEngine::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrokeHandle(u64);

/// Why a gesture produced no annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyGesture {
    /// Freehand stroke with fewer than two points
    TooFewPoints,
    /// Highlight or crop without a second corner, or with zero width/height
    ZeroArea,
    /// Text label that is empty after trimming, or cancelled
    BlankText,
    /// Eraser pick that hit nothing
    NothingErased,
    /// Handle does not belong to the gesture in progress
    StaleHandle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Committed(Annotation),
    Erased(Annotation),
    Discarded(EmptyGesture),
}

impl CommitOutcome {
    pub fn is_history_step(&self) -> bool {
        !matches!(self, CommitOutcome::Discarded(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    Idle,
    Drawing(Tool),
    TextPending,
}

#[derive(Debug, Clone)]
enum Gesture {
    Freehand { points: Vec<Point> },
    Region { start: Point, end: Option<Point> },
    Text { anchor: Point },
    Erase { at: Point },
}

#[derive(Debug, Clone)]
struct ActiveGesture {
    handle: StrokeHandle,
    tool: Tool,
    page: usize,
    gesture: Gesture,
}

/// Live annotation set and history for the document being edited.
#[derive(Debug, Clone)]
pub struct CaptureEngine {
    style: CaptureConfig,
    scale: RenderScale,
    history: AnnotationHistory,
    active: Option<ActiveGesture>,
    next_handle: u64,
}

impl Default for CaptureEngine {
    fn default() -> Self {
        Self::new(CaptureConfig::default())
    }
}

impl CaptureEngine {
    pub fn new(style: CaptureConfig) -> Self {
        Self {
            style,
            scale: RenderScale::IDENTITY,
            history: AnnotationHistory::new(),
            active: None,
            next_handle: 0,
        }
    }

    pub fn style(&self) -> &CaptureConfig {
        &self.style
    }

    /// Colors, widths and font size used for the next commit.
    pub fn style_mut(&mut self) -> &mut CaptureConfig {
        &mut self.style
    }

    /// Zoom of the viewer delivering pointer positions.
    pub fn set_render_scale(&mut self, scale: RenderScale) {
        self.scale = scale;
    }

    pub fn state(&self) -> EditorState {
        match &self.active {
            None => EditorState::Idle,
            Some(ActiveGesture {
                gesture: Gesture::Text { .. },
                ..
            }) => EditorState::TextPending,
            Some(active) => EditorState::Drawing(active.tool),
        }
    }

    /// Start a gesture. Any gesture still in progress is abandoned.
    pub fn begin(&mut self, tool: Tool, page: usize, origin: Point) -> StrokeHandle {
        if let Some(abandoned) = self.active.take() {
            tracing::debug!(tool = ?abandoned.tool, page = abandoned.page, "abandoning gesture");
        }

        let origin = self.scale.unscale(origin);
        let gesture = match tool {
            Tool::Pen => Gesture::Freehand {
                points: vec![origin],
            },
            Tool::Highlighter | Tool::Crop => Gesture::Region {
                start: origin,
                end: None,
            },
            Tool::Text => Gesture::Text { anchor: origin },
            Tool::Eraser => Gesture::Erase { at: origin },
        };

        let handle = StrokeHandle(self.next_handle);
        self.next_handle += 1;
        self.active = Some(ActiveGesture {
            handle,
            tool,
            page,
            gesture,
        });
        handle
    }

    /// Feed a pointer move. Appends to a freehand stroke, moves the live
    /// corner of a highlight/crop, or moves the eraser pick point.
    ///
    /// Returns false when the handle is stale or the gesture is a text label.
    pub fn extend(&mut self, handle: StrokeHandle, point: Point) -> bool {
        let point = self.scale.unscale(point);
        let Some(active) = self.active.as_mut().filter(|a| a.handle == handle) else {
            return false;
        };
        match &mut active.gesture {
            Gesture::Freehand { points } => points.push(point),
            Gesture::Region { end, .. } => *end = Some(point),
            Gesture::Erase { at } => *at = point,
            Gesture::Text { .. } => return false,
        }
        true
    }

    /// What the in-progress gesture would commit as, for rendering a preview.
    pub fn preview(&self) -> Option<Annotation> {
        let active = self.active.as_ref()?;
        self.build(active).ok()
    }

    /// Finish a pointer gesture (pointer release).
    ///
    /// Text labels are finished with [`CaptureEngine::submit_text`]; calling
    /// `commit` on one cancels it.
    pub fn commit(&mut self, handle: StrokeHandle) -> CommitOutcome {
        let Some(active) = self.take_active(handle) else {
            return CommitOutcome::Discarded(EmptyGesture::StaleHandle);
        };

        if let Gesture::Erase { at } = active.gesture {
            return self.erase_at(active.page, at);
        }

        match self.build(&active) {
            Ok(annotation) => self.push(annotation),
            Err(reason) => {
                tracing::debug!(?reason, tool = ?active.tool, "gesture discarded");
                CommitOutcome::Discarded(reason)
            }
        }
    }

    /// Submit the label for a pending text gesture.
    pub fn submit_text(&mut self, handle: StrokeHandle, text: &str) -> CommitOutcome {
        let is_text = matches!(
            self.active.as_ref(),
            Some(ActiveGesture { handle: h, gesture: Gesture::Text { .. }, .. }) if *h == handle
        );
        if !is_text {
            return CommitOutcome::Discarded(EmptyGesture::StaleHandle);
        }
        let Some(ActiveGesture {
            page,
            gesture: Gesture::Text { anchor },
            ..
        }) = self.active.take()
        else {
            return CommitOutcome::Discarded(EmptyGesture::StaleHandle);
        };

        if text.trim().is_empty() {
            return CommitOutcome::Discarded(EmptyGesture::BlankText);
        }
        self.push(Annotation::Text {
            page,
            anchor,
            text: text.to_string(),
            font_size: self.style.font_size,
            color: self.style.text_color,
        })
    }

    /// Drop the gesture in progress, if any.
    pub fn cancel(&mut self) {
        self.active = None;
    }

    pub fn undo(&mut self) -> bool {
        self.history.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.history.redo()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history(&self) -> &AnnotationHistory {
        &self.history
    }

    /// The annotation set at the history cursor, in draw order.
    pub fn current_snapshot(&self) -> Snapshot {
        self.history.current().clone()
    }

    pub fn annotations_on_page(&self, page: usize) -> impl Iterator<Item = &Annotation> + '_ {
        self.history
            .current()
            .iter()
            .filter(move |a| a.page() == page)
    }

    /// Delete every annotation on `page`. One history step if anything went.
    pub fn clear_page(&mut self, page: usize) -> bool {
        self.retain_and_push(|a| a.page() != page)
    }

    /// Delete every annotation of one kind on `page`.
    pub fn clear_page_kind(&mut self, page: usize, kind: AnnotationKind) -> bool {
        self.retain_and_push(|a| a.page() != page || a.kind() != kind)
    }

    /// Finish editing: the current snapshot, detached from this session.
    pub fn freeze(self) -> Snapshot {
        self.history.current().clone()
    }

    fn take_active(&mut self, handle: StrokeHandle) -> Option<ActiveGesture> {
        if self.active.as_ref().is_some_and(|a| a.handle == handle) {
            self.active.take()
        } else {
            None
        }
    }

    fn build(&self, active: &ActiveGesture) -> Result<Annotation, EmptyGesture> {
        let page = active.page;
        match (&active.gesture, active.tool) {
            (Gesture::Freehand { points }, _) => {
                if points.len() < 2 {
                    return Err(EmptyGesture::TooFewPoints);
                }
                Ok(Annotation::Stroke {
                    page,
                    points: points.clone(),
                    color: self.style.stroke_color,
                    width: self.style.stroke_width,
                })
            }
            (Gesture::Region { start, end }, tool) => {
                let end = end.ok_or(EmptyGesture::ZeroArea)?;
                let rect = ScreenRect::from_corners(*start, end);
                if !rect.has_area() {
                    return Err(EmptyGesture::ZeroArea);
                }
                if tool == Tool::Crop {
                    Ok(Annotation::crop(page, rect))
                } else {
                    Ok(Annotation::highlight(page, rect, self.style.highlight_color))
                }
            }
            (Gesture::Text { .. }, _) => Err(EmptyGesture::BlankText),
            (Gesture::Erase { .. }, _) => Err(EmptyGesture::NothingErased),
        }
    }

    fn push(&mut self, annotation: Annotation) -> CommitOutcome {
        let mut next = self.history.current().to_vec();
        next.push(annotation.clone());
        self.history.push(next);
        CommitOutcome::Committed(annotation)
    }

    /// Remove the topmost annotation on `page` whose bounds, grown by the
    /// eraser tolerance, contain `at`.
    fn erase_at(&mut self, page: usize, at: Point) -> CommitOutcome {
        let tolerance = self.style.eraser_tolerance;
        let current = self.history.current();
        let hit = current.iter().rposition(|a| {
            a.page() == page
                && a.bounds()
                    .is_some_and(|bounds| bounds.expanded(tolerance).contains(at))
        });

        let Some(index) = hit else {
            return CommitOutcome::Discarded(EmptyGesture::NothingErased);
        };
        let mut next = current.to_vec();
        let removed = next.remove(index);
        self.history.push(next);
        CommitOutcome::Erased(removed)
    }

    fn retain_and_push(&mut self, keep: impl Fn(&Annotation) -> bool) -> bool {
        let current = self.history.current();
        let next: Vec<Annotation> = current.iter().filter(|&a| keep(a)).cloned().collect();
        if next.len() == current.len() {
            return false;
        }
        self.history.push(next);
        true
    }
}
