use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{ForgeError, ForgeResult};
use crate::media::probe;
use crate::timeline::model::{ItemKind, TimelineItem};

/// Declarative description of one output: canvas, frame rate, total duration
/// and the timeline item set.
///
/// Storage is external; this type is the opaque structured value exchanged
/// with it (JSON).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Project {
    pub canvas: Canvas,
    pub fps: Fps,
    pub duration_ms: u64,
    pub items: Vec<TimelineItem>,
}

impl Project {
    /// Parse a project from a JSON string.
    pub fn from_json_str(json: &str) -> ForgeResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ForgeError::config(format!("project json parse failed: {e}")))
    }

    /// Load and parse a project JSON file.
    pub fn from_path(path: &Path) -> ForgeResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ForgeError::config(format!("failed to read project '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Structural validation: canvas/fps/duration sanity, unique item ids and
    /// per-item checks. Needs no source file access.
    pub fn validate(&self) -> ForgeResult<()> {
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(ForgeError::config("canvas must be non-zero"));
        }
        Fps::new(self.fps.num, self.fps.den)?;
        if self.duration_ms == 0 {
            return Err(ForgeError::config("duration_ms must be > 0"));
        }

        let mut seen = HashSet::new();
        for item in &self.items {
            if !seen.insert(item.id) {
                return Err(ForgeError::config(format!(
                    "duplicate item id {}",
                    item.id.0
                )));
            }
            item.validate()?;
        }
        Ok(())
    }

    /// Source-dependent validation: for every media-backed item whose source
    /// is reachable and reports a duration, enforce `crop_offset + display
    /// duration <= source natural length`.
    ///
    /// A source that cannot be probed at all is logged and passed through;
    /// the renderer or mixer surfaces that failure per item. Only a
    /// reachable source that violates the crop invariant is a hard
    /// configuration error.
    pub fn validate_sources(&self) -> ForgeResult<()> {
        for item in &self.items {
            let source = match &item.kind {
                ItemKind::Video(v) => &v.source,
                ItemKind::Audio(a) => &a.source,
                _ => continue,
            };
            let info = match probe::probe_media(source) {
                Ok(info) => info,
                Err(e) => {
                    tracing::warn!(item = item.id.0, source = %source.display(), error = %e, "source probe failed, deferring to per-item handling");
                    continue;
                }
            };
            let Some(source_ms) = info.duration_ms else {
                continue;
            };
            let needed = item.crop_offset_ms() + item.display.duration_ms();
            if needed > source_ms {
                return Err(ForgeError::config(format!(
                    "item {}: crop offset {}ms + display duration {}ms exceeds source length {}ms of '{}'",
                    item.id.0,
                    item.crop_offset_ms(),
                    item.display.duration_ms(),
                    source_ms,
                    source.display(),
                )));
            }
        }
        Ok(())
    }

    /// Items that draw pixels, in input order.
    pub fn canvas_items(&self) -> Vec<TimelineItem> {
        self.items
            .iter()
            .filter(|i| i.has_canvas_output())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::{DisplayTime, Rgba8};
    use crate::timeline::model::{ItemId, ShapeItem, ShapeKind};

    fn project_with(items: Vec<TimelineItem>) -> Project {
        Project {
            canvas: Canvas {
                width: 64,
                height: 64,
            },
            fps: Fps { num: 30, den: 1 },
            duration_ms: 1000,
            items,
        }
    }

    fn shape(id: u64) -> TimelineItem {
        TimelineItem {
            id: ItemId(id),
            display: DisplayTime {
                start_ms: 0,
                stop_ms: 500,
            },
            layer: 0,
            kind: ItemKind::Shape(ShapeItem {
                shape: ShapeKind::Rect,
                x: 0,
                y: 0,
                width: 8,
                height: 8,
                color: Rgba8::opaque(0, 255, 0),
            }),
        }
    }

    #[test]
    fn validate_accepts_simple_project() {
        assert!(project_with(vec![shape(1), shape(2)]).validate().is_ok());
    }

    #[test]
    fn validate_rejects_duplicate_ids() {
        let err = project_with(vec![shape(1), shape(1)]).validate();
        assert!(err.is_err());
    }

    #[test]
    fn validate_rejects_zero_duration() {
        let mut p = project_with(vec![]);
        p.duration_ms = 0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn unreachable_source_does_not_fail_source_validation() {
        use crate::timeline::model::AudioItem;

        let mut p = project_with(vec![]);
        p.items.push(TimelineItem {
            id: ItemId(1),
            display: DisplayTime {
                start_ms: 0,
                stop_ms: 500,
            },
            layer: 0,
            kind: ItemKind::Audio(AudioItem {
                source: "/nonexistent/missing.wav".into(),
                crop_offset_ms: 0,
                volume: 1.0,
            }),
        });
        assert!(p.validate_sources().is_ok());
    }

    #[test]
    fn json_round_trip() {
        let p = project_with(vec![shape(1)]);
        let json = serde_json::to_string_pretty(&p).unwrap();
        let back = Project::from_json_str(&json).unwrap();
        assert_eq!(back.items, p.items);
        assert_eq!(back.duration_ms, p.duration_ms);
    }
}
