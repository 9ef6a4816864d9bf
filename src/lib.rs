//! Reelforge is a timeline-based video compositor and exporter.
//!
//! A [`Project`] places typed items (text, images, video, shapes, effects,
//! audio) on a shared timeline; each item is visible over a half-open
//! millisecond window and stacked by layer. The engine turns that timeline
//! into pixels and sound, and streams both into a progressive MP4.
//!
//! # Pipeline overview
//!
//! 1. **Schedule**: [`RenderScheduler`] diffs the item set, owns renderer
//!    lifecycles, and composites every active item for one timestamp.
//! 2. **Mix**: [`AudioMixer`] sums every audible item into one 48 kHz
//!    stereo stream, positioned from absolute timeline time.
//! 3. **Encode**: frames and samples stream through the system `ffmpeg`
//!    binary (VP9 + AAC elementary streams with parsed per-chunk timing).
//! 4. **Mux**: both tracks join in an MP4 which then gets its `moov` box
//!    relocated up front for progressive playback.
//!
//! Key constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Premultiplied RGBA8** end-to-end on the compositing surface.
//! - **No decode IO in `draw`**: renderers front-load IO in
//!   `enter_timeline` and `pre_draw`.
#![forbid(unsafe_code)]

mod audio;
mod encode;
mod foundation;
mod media;
mod pipeline;
mod render;
mod timeline;

pub use audio::mixer::{AudioMixer, MixTrack};
pub use audio::source::{AudioSource, MIX_CHANNELS, MIX_SAMPLE_RATE, ms_to_sample_frames};
pub use encode::encoder::{
    AudioEncoder, EncodedChunk, EncoderState, TrackFormat, TrackKind, TrackProgress, VideoEncoder,
};
pub use encode::faststart::relocate_moov;
pub use encode::ffmpeg::{FfmpegAudioEncoder, FfmpegVideoEncoder};
pub use encode::mux::{ContainerSink, MemoryMuxer, Mp4Muxer, TrackId};
pub use foundation::core::{Canvas, DisplayTime, Fps, Rgba8, TimeMs};
pub use foundation::error::{ForgeError, ForgeResult};
pub use media::decode::{decode_audio_f32_stereo, decode_video_frame_rgba8};
pub use media::probe::{MediaInfo, is_ffmpeg_on_path, is_ffprobe_on_path, probe_media};
pub use pipeline::export::{
    CancelToken, ExportOpts, ExportStats, Exporter, render_preview_frame,
};
pub use render::effect::{EffectKind, parse_effect};
pub use render::renderer::{ItemRenderer, RendererState, build_renderer};
pub use render::scheduler::{FrameStats, RenderScheduler, SlotSnapshot};
pub use render::surface::Surface;
pub use timeline::model::{
    AudioItem, ChromaKey, EffectItem, ImageItem, ItemId, ItemKind, RegionPx, ShapeItem, ShapeKind,
    SizePx, TextItem, TimelineItem, VideoItem,
};
pub use timeline::project::Project;
