use std::path::Path;
use std::sync::Arc;

use crate::foundation::error::ForgeResult;
use crate::media::decode::decode_audio_f32_stereo;

/// Mix output sample rate. Every source is resampled to this rate at
/// decode time, so the mixer only ever deals with one clock.
pub const MIX_SAMPLE_RATE: u32 = 48_000;

/// Mix output channel count (interleaved stereo).
pub const MIX_CHANNELS: u16 = 2;

/// Fully decoded audio for one source file: interleaved stereo f32 at
/// [`MIX_SAMPLE_RATE`]. Cheap to clone, the PCM is shared.
#[derive(Clone, Debug)]
pub struct AudioSource {
    samples: Arc<Vec<f32>>,
}

impl AudioSource {
    /// Decode `path` to mix-format PCM. A file with no audio stream decodes
    /// to an empty (silent) source rather than an error.
    pub fn load(path: &Path) -> ForgeResult<Self> {
        let samples = decode_audio_f32_stereo(path, MIX_SAMPLE_RATE)?;
        Ok(Self {
            samples: Arc::new(samples),
        })
    }

    pub fn from_interleaved(samples: Vec<f32>) -> Self {
        Self {
            samples: Arc::new(samples),
        }
    }

    /// Number of sample frames (stereo pairs).
    pub fn frames(&self) -> u64 {
        (self.samples.len() / usize::from(MIX_CHANNELS)) as u64
    }

    /// Left/right pair at `frame`, or `None` past the end of the source.
    pub fn frame_at(&self, frame: u64) -> Option<(f32, f32)> {
        let idx = usize::try_from(frame).ok()? * usize::from(MIX_CHANNELS);
        let l = *self.samples.get(idx)?;
        let r = *self.samples.get(idx + 1)?;
        Some((l, r))
    }
}

/// Milliseconds to sample frames at the mix rate, rounded.
pub fn ms_to_sample_frames(ms: u64) -> u64 {
    let num = u128::from(ms) * u128::from(MIX_SAMPLE_RATE);
    ((num + 500) / 1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ms_to_frames_is_exact_at_48k() {
        assert_eq!(ms_to_sample_frames(0), 0);
        assert_eq!(ms_to_sample_frames(1), 48);
        assert_eq!(ms_to_sample_frames(1000), 48_000);
        assert_eq!(ms_to_sample_frames(5000), 240_000);
    }

    #[test]
    fn frame_at_bounds() {
        let src = AudioSource::from_interleaved(vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(src.frames(), 2);
        assert_eq!(src.frame_at(0), Some((0.1, 0.2)));
        assert_eq!(src.frame_at(1), Some((0.3, 0.4)));
        assert_eq!(src.frame_at(2), None);
    }
}
