use crate::foundation::core::{Fps, TimeMs};
use crate::foundation::error::{ForgeError, ForgeResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// Negotiated per-track parameters, produced by an encoder and consumed by
/// the container sink when the track is added.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackFormat {
    Video {
        codec: String,
        width: u32,
        height: u32,
        fps: Fps,
    },
    Audio {
        codec: String,
        sample_rate: u32,
        channels: u16,
    },
}

impl TrackFormat {
    pub fn kind(&self) -> TrackKind {
        match self {
            TrackFormat::Video { .. } => TrackKind::Video,
            TrackFormat::Audio { .. } => TrackKind::Audio,
        }
    }
}

/// One compressed access unit with container-level timing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedChunk {
    pub pts_ms: TimeMs,
    /// Sync sample: decodable without reference to earlier chunks.
    pub key: bool,
    pub data: Vec<u8>,
}

/// Compresses raw premultiplied RGBA8 frames into timed chunks.
///
/// Chunks become available asynchronously; callers interleave `push_frame`
/// with `poll_chunks` and collect the tail from `finish`.
pub trait VideoEncoder: Send {
    fn format(&self) -> TrackFormat;
    fn push_frame(&mut self, rgba_premul: &[u8], pts_ms: TimeMs) -> ForgeResult<()>;
    fn poll_chunks(&mut self) -> Vec<EncodedChunk>;
    fn finish(&mut self) -> ForgeResult<Vec<EncodedChunk>>;
}

/// Compresses interleaved stereo f32 PCM into timed chunks.
pub trait AudioEncoder: Send {
    fn format(&self) -> TrackFormat;
    fn push_samples(&mut self, interleaved_f32: &[f32]) -> ForgeResult<()>;
    fn poll_chunks(&mut self) -> Vec<EncodedChunk>;
    fn finish(&mut self) -> ForgeResult<Vec<EncodedChunk>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncoderState {
    Idle,
    Running,
    Draining,
    Stopped,
}

/// Enforces the `Idle → Running → Draining → Stopped` track lifecycle and
/// chunk timestamp monotonicity. Each encode task drives one of these; an
/// out-of-order call is a programming error surfaced as a pipeline error
/// rather than silent corruption of the output.
#[derive(Debug)]
pub struct TrackProgress {
    kind: TrackKind,
    state: EncoderState,
    chunks: u64,
    last_pts_ms: Option<TimeMs>,
}

impl TrackProgress {
    pub fn new(kind: TrackKind) -> Self {
        Self {
            kind,
            state: EncoderState::Idle,
            chunks: 0,
            last_pts_ms: None,
        }
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    pub fn last_pts_ms(&self) -> Option<TimeMs> {
        self.last_pts_ms
    }

    pub fn start(&mut self) -> ForgeResult<()> {
        self.transition(EncoderState::Idle, EncoderState::Running)
    }

    pub fn begin_drain(&mut self) -> ForgeResult<()> {
        self.transition(EncoderState::Running, EncoderState::Draining)
    }

    pub fn stop(&mut self) -> ForgeResult<()> {
        self.transition(EncoderState::Draining, EncoderState::Stopped)
    }

    /// Accepted while Running or Draining. Timestamps must be
    /// non-decreasing within a track.
    pub fn record_chunk(&mut self, chunk: &EncodedChunk) -> ForgeResult<()> {
        match self.state {
            EncoderState::Running | EncoderState::Draining => {}
            other => {
                return Err(ForgeError::pipeline(format!(
                    "{:?} track cannot accept chunks in state {other:?}",
                    self.kind
                )));
            }
        }
        if let Some(last) = self.last_pts_ms
            && chunk.pts_ms < last
        {
            return Err(ForgeError::pipeline(format!(
                "{:?} track pts went backwards: {} after {}",
                self.kind, chunk.pts_ms, last
            )));
        }
        self.last_pts_ms = Some(chunk.pts_ms);
        self.chunks += 1;
        Ok(())
    }

    fn transition(&mut self, from: EncoderState, to: EncoderState) -> ForgeResult<()> {
        if self.state != from {
            return Err(ForgeError::pipeline(format!(
                "{:?} track: invalid transition to {to:?} from {:?} (expected {from:?})",
                self.kind, self.state
            )));
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(pts_ms: TimeMs) -> EncodedChunk {
        EncodedChunk {
            pts_ms,
            key: true,
            data: vec![0u8; 4],
        }
    }

    #[test]
    fn full_lifecycle_in_order() {
        let mut p = TrackProgress::new(TrackKind::Video);
        assert_eq!(p.state(), EncoderState::Idle);
        p.start().unwrap();
        p.record_chunk(&chunk(0)).unwrap();
        p.record_chunk(&chunk(33)).unwrap();
        p.begin_drain().unwrap();
        p.record_chunk(&chunk(66)).unwrap();
        p.stop().unwrap();
        assert_eq!(p.state(), EncoderState::Stopped);
        assert_eq!(p.chunks(), 3);
        assert_eq!(p.last_pts_ms(), Some(66));
    }

    #[test]
    fn chunk_before_start_is_rejected() {
        let mut p = TrackProgress::new(TrackKind::Audio);
        assert!(p.record_chunk(&chunk(0)).is_err());
    }

    #[test]
    fn chunk_after_stop_is_rejected() {
        let mut p = TrackProgress::new(TrackKind::Audio);
        p.start().unwrap();
        p.begin_drain().unwrap();
        p.stop().unwrap();
        assert!(p.record_chunk(&chunk(0)).is_err());
    }

    #[test]
    fn skipping_drain_is_rejected() {
        let mut p = TrackProgress::new(TrackKind::Video);
        p.start().unwrap();
        assert!(p.stop().is_err());
        assert_eq!(p.state(), EncoderState::Running);
    }

    #[test]
    fn double_start_is_rejected() {
        let mut p = TrackProgress::new(TrackKind::Video);
        p.start().unwrap();
        assert!(p.start().is_err());
    }

    #[test]
    fn backwards_pts_is_rejected() {
        let mut p = TrackProgress::new(TrackKind::Video);
        p.start().unwrap();
        p.record_chunk(&chunk(100)).unwrap();
        assert!(p.record_chunk(&chunk(99)).is_err());
        // Equal timestamps are fine.
        p.record_chunk(&chunk(100)).unwrap();
    }
}
