use std::path::Path;

use crate::audio::source::{AudioSource, MIX_CHANNELS, ms_to_sample_frames};
use crate::foundation::core::{DisplayTime, TimeMs};
use crate::foundation::error::ForgeResult;
use crate::timeline::model::{ItemKind, TimelineItem};

/// One audible item, flattened to what the mixer needs.
#[derive(Clone, Debug)]
pub struct MixTrack {
    pub display: DisplayTime,
    pub crop_offset_ms: TimeMs,
    pub volume: f32,
    pub source: AudioSource,
}

/// Sums every audible item into one interleaved stereo f32 stream.
///
/// Each window is positioned from absolute timeline milliseconds, never
/// from an advancing cursor, so consecutive windows tile the timeline
/// exactly and the mix cannot drift against the video track.
pub struct AudioMixer {
    tracks: Vec<MixTrack>,
}

impl AudioMixer {
    pub fn new(tracks: Vec<MixTrack>) -> Self {
        Self { tracks }
    }

    /// Build a mixer from timeline items, decoding every audible source.
    /// Items with `volume == 0` contribute nothing and are not decoded.
    ///
    /// An item whose source fails to decode (missing file, no decoder) is
    /// logged and mixed as silence; it never fails the whole mix.
    pub fn from_items(items: &[TimelineItem]) -> ForgeResult<Self> {
        let mut tracks = Vec::new();
        for item in items.iter().filter(|i| i.has_audio_output()) {
            let (source_path, volume) = match &item.kind {
                ItemKind::Audio(a) => (&a.source, a.volume),
                ItemKind::Video(v) => (&v.source, v.volume),
                _ => continue,
            };
            let source = match AudioSource::load(Path::new(source_path)) {
                Ok(source) => source,
                Err(e) => {
                    tracing::warn!(item = item.id.0, source = %source_path.display(), error = %e, "skipping item audio: decode failed");
                    continue;
                }
            };
            if source.frames() == 0 {
                tracing::debug!(item = item.id.0, source = %source_path.display(), "source has no audio, mixing silence");
                continue;
            }
            tracks.push(MixTrack {
                display: item.display,
                crop_offset_ms: item.crop_offset_ms(),
                volume,
                source,
            });
        }
        Ok(Self { tracks })
    }

    pub fn is_silent(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Mix `frame_count` sample frames starting at timeline `start_ms`.
    ///
    /// Returns `frame_count * 2` interleaved f32 samples. Overlapping
    /// tracks sum in f32 and the result is clamped to `[-1, 1]` at the
    /// end, so two half-volume tracks sum cleanly and hot sums saturate
    /// instead of wrapping.
    pub fn mix_window(&self, start_ms: TimeMs, frame_count: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; frame_count * usize::from(MIX_CHANNELS)];
        let window_start = ms_to_sample_frames(start_ms);
        let window_end = window_start + frame_count as u64;

        for track in &self.tracks {
            let track_start = ms_to_sample_frames(track.display.start_ms);
            let track_end = ms_to_sample_frames(track.display.stop_ms);
            let src_offset = ms_to_sample_frames(track.crop_offset_ms);

            let begin = window_start.max(track_start);
            let end = window_end.min(track_end);
            if begin >= end {
                continue;
            }

            for abs in begin..end {
                let src_frame = (abs - track_start) + src_offset;
                let Some((l, r)) = track.source.frame_at(src_frame) else {
                    break;
                };
                let dst = (abs - window_start) as usize * usize::from(MIX_CHANNELS);
                out[dst] += l * track.volume;
                out[dst + 1] += r * track.volume;
            }
        }

        for s in &mut out {
            *s = s.clamp(-1.0, 1.0);
        }
        out
    }
}
