//! Recorded gesture scripts
//!
//! A script is a JSON array of steps fed through [`CaptureEngine`] exactly as
//! pointer input would be: the first point begins the gesture, the rest
//! extend it, and the gesture is committed at the end.

use anyhow::{Context, Result};
use playlist_core::{CaptureEngine, Point, RenderScale, Tool};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Draw {
        tool: Tool,
        page: usize,
        points: Vec<Point>,
        /// Label for the text tool
        #[serde(default)]
        text: Option<String>,
    },
    Undo,
    Redo,
    ClearPage {
        page: usize,
    },
    /// Render scale of the points that follow
    Scale {
        value: f64,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub committed: usize,
    pub discarded: usize,
}

pub fn parse_script(json: &str) -> Result<Vec<Step>> {
    serde_json::from_str(json).context("Invalid gesture script")
}

pub fn replay(engine: &mut CaptureEngine, steps: &[Step]) -> ReplaySummary {
    let mut summary = ReplaySummary::default();

    for step in steps {
        match step {
            Step::Draw {
                tool,
                page,
                points,
                text,
            } => {
                let Some((first, rest)) = points.split_first() else {
                    summary.discarded += 1;
                    continue;
                };
                let handle = engine.begin(*tool, *page, *first);
                for point in rest {
                    engine.extend(handle, *point);
                }
                let outcome = match (tool, text) {
                    (Tool::Text, Some(text)) => engine.submit_text(handle, text),
                    _ => engine.commit(handle),
                };
                tracing::debug!(?outcome, "replayed gesture");
                if outcome.is_history_step() {
                    summary.committed += 1;
                } else {
                    summary.discarded += 1;
                }
            }
            Step::Undo => {
                engine.undo();
            }
            Step::Redo => {
                engine.redo();
            }
            Step::ClearPage { page } => {
                engine.clear_page(*page);
            }
            Step::Scale { value } => engine.set_render_scale(RenderScale::new(*value)),
        }
    }

    summary
}
