use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::foundation::core::{DisplayTime, Rgba8, TimeMs};
use crate::foundation::error::{ForgeError, ForgeResult};

/// Unique, creation-time identifier for a timeline item.
///
/// Stable for the item's life; renderer reuse is keyed on it.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ItemId(pub u64);

/// One renderable or audible element with a fixed time window.
///
/// Items are immutable values: equality of every field is the only signal the
/// scheduler uses to decide renderer reuse. Edits produce a new value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineItem {
    pub id: ItemId,
    /// Global-timeline activity window, half-open `[start, stop)`.
    pub display: DisplayTime,
    /// Canvas composite order, ascending (higher draws on top). Informational
    /// for audio items.
    #[serde(default)]
    pub layer: i32,
    #[serde(flatten)]
    pub kind: ItemKind,
}

/// Variant payloads, dispatched by pattern match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemKind {
    Text(TextItem),
    Image(ImageItem),
    Video(VideoItem),
    Shape(ShapeItem),
    Effect(EffectItem),
    Audio(AudioItem),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextItem {
    pub content: String,
    pub x: i64,
    pub y: i64,
    pub size_px: f32,
    pub color: Rgba8,
    /// Explicit font file. When absent, a small list of common system fonts
    /// is probed at enter time.
    #[serde(default)]
    pub font_path: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageItem {
    pub source: PathBuf,
    pub x: i64,
    pub y: i64,
    /// Optional target size; the decoded bitmap is nearest-neighbor scaled.
    #[serde(default)]
    pub size: Option<SizePx>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoItem {
    pub source: PathBuf,
    pub x: i64,
    pub y: i64,
    #[serde(default)]
    pub size: Option<SizePx>,
    /// Point within the source's own timeline mapped to the display start.
    #[serde(default)]
    pub crop_offset_ms: u64,
    #[serde(default)]
    pub chroma_key: Option<ChromaKey>,
    /// Gain for the clip's own audio track, 0 disables it.
    #[serde(default = "default_volume")]
    pub volume: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizePx {
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChromaKey {
    pub color: Rgba8,
    /// Per-channel distance (0..=1) under which a pixel keys out.
    pub tolerance: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShapeItem {
    pub shape: ShapeKind,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
    pub color: Rgba8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Rect,
    Ellipse,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectItem {
    /// Effect program, e.g. `grayscale`, `invert`, `vignette(0.6)`,
    /// `brightness(1.3)`. Compiled when the item enters the timeline.
    pub source: String,
    /// Region the effect applies to; full canvas when absent.
    #[serde(default)]
    pub region: Option<RegionPx>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionPx {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioItem {
    pub source: PathBuf,
    #[serde(default)]
    pub crop_offset_ms: u64,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

fn default_volume() -> f32 {
    1.0
}

impl TimelineItem {
    /// Return `true` when the item is active at `t` (half-open window).
    pub fn is_active(&self, t: TimeMs) -> bool {
        self.display.contains(t)
    }

    /// Canvas items produce pixels; audio items do not.
    pub fn has_canvas_output(&self) -> bool {
        !matches!(self.kind, ItemKind::Audio(_))
    }

    /// Items contributing PCM to the mix.
    pub fn has_audio_output(&self) -> bool {
        match &self.kind {
            ItemKind::Audio(a) => a.volume > 0.0,
            ItemKind::Video(v) => v.volume > 0.0,
            _ => false,
        }
    }

    /// Source crop offset for media-backed items, 0 otherwise.
    pub fn crop_offset_ms(&self) -> u64 {
        match &self.kind {
            ItemKind::Video(v) => v.crop_offset_ms,
            ItemKind::Audio(a) => a.crop_offset_ms,
            _ => 0,
        }
    }

    /// Structural validation that needs no access to source files.
    ///
    /// Source-dependent checks (crop offset vs. natural length) live in
    /// [`Project::validate_sources`](crate::Project::validate_sources).
    pub fn validate(&self) -> ForgeResult<()> {
        // Serde can hand us windows the typed constructor would reject.
        DisplayTime::new(self.display.start_ms, self.display.stop_ms)
            .map_err(|_| self.config_err("display stop_ms must be >= start_ms"))?;

        match &self.kind {
            ItemKind::Text(t) => {
                if t.content.is_empty() {
                    return Err(self.config_err("text content must be non-empty"));
                }
                if !(t.size_px.is_finite() && t.size_px > 0.0) {
                    return Err(self.config_err("text size_px must be > 0"));
                }
            }
            ItemKind::Image(i) => {
                if let Some(s) = i.size
                    && (s.width == 0 || s.height == 0)
                {
                    return Err(self.config_err("image size must be non-zero"));
                }
            }
            ItemKind::Video(v) => {
                if let Some(s) = v.size
                    && (s.width == 0 || s.height == 0)
                {
                    return Err(self.config_err("video size must be non-zero"));
                }
                validate_volume(v.volume).map_err(|m| self.config_err(m))?;
                if let Some(key) = &v.chroma_key
                    && !(0.0..=1.0).contains(&key.tolerance)
                {
                    return Err(self.config_err("chroma key tolerance must be in 0..=1"));
                }
            }
            ItemKind::Shape(s) => {
                if s.width == 0 || s.height == 0 {
                    return Err(self.config_err("shape size must be non-zero"));
                }
            }
            ItemKind::Effect(e) => {
                crate::render::effect::parse_effect(&e.source)
                    .map_err(|err| self.config_err(err.to_string()))?;
                if let Some(r) = e.region
                    && (r.width == 0 || r.height == 0)
                {
                    return Err(self.config_err("effect region must be non-zero"));
                }
            }
            ItemKind::Audio(a) => {
                validate_volume(a.volume).map_err(|m| self.config_err(m))?;
            }
        }
        Ok(())
    }

    fn config_err(&self, msg: impl std::fmt::Display) -> ForgeError {
        ForgeError::config(format!("item {}: {msg}", self.id.0))
    }
}

fn validate_volume(volume: f32) -> Result<(), String> {
    if !(0.0..=1.0).contains(&volume) {
        return Err(format!("volume must be in 0..=1, got {volume}"));
    }
    Ok(())
}
