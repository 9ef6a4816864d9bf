use crate::foundation::core::TimeMs;
use crate::foundation::error::{ForgeError, ForgeResult};
use crate::media::{decode, probe};
use crate::render::renderer::ItemRenderer;
use crate::render::surface::Surface;
use crate::timeline::model::{ItemKind, TimelineItem, VideoItem};

/// Video clip renderer.
///
/// `enter_timeline` probes the source (the decoder handle in this capability
/// model); `pre_draw` decodes the source frame nearest to the query time,
/// mapped through the crop offset, so `draw` never touches I/O.
pub struct VideoRenderer {
    item: TimelineItem,
    video: VideoItem,
    source_size: Option<(u32, u32)>,
    frame: Option<DecodedFrame>,
}

struct DecodedFrame {
    source_ms: u64,
    /// Straight-alpha RGBA8 at source dimensions.
    rgba: Vec<u8>,
}

impl VideoRenderer {
    pub fn new(item: TimelineItem) -> ForgeResult<Self> {
        let ItemKind::Video(video) = item.kind.clone() else {
            return Err(ForgeError::config("VideoRenderer requires a video item"));
        };
        Ok(Self {
            item,
            video,
            source_size: None,
            frame: None,
        })
    }

    /// Source-timeline instant corresponding to global time `t`.
    fn source_ms_for(&self, t: TimeMs) -> u64 {
        self.item.display.source_time_ms(t, self.video.crop_offset_ms)
    }

    fn apply_chroma_key(&self, rgba: &mut [u8]) {
        let Some(key) = &self.video.chroma_key else {
            return;
        };
        let tol = (key.tolerance * 255.0).round() as i16;
        for px in rgba.chunks_exact_mut(4) {
            let dr = (i16::from(px[0]) - i16::from(key.color.r)).abs();
            let dg = (i16::from(px[1]) - i16::from(key.color.g)).abs();
            let db = (i16::from(px[2]) - i16::from(key.color.b)).abs();
            if dr <= tol && dg <= tol && db <= tol {
                px[3] = 0;
            }
        }
    }
}

impl ItemRenderer for VideoRenderer {
    fn item(&self) -> &TimelineItem {
        &self.item
    }

    fn enter_timeline(&mut self) -> ForgeResult<()> {
        if self.source_size.is_some() {
            return Ok(());
        }
        let info = probe::probe_media(&self.video.source)?;
        let size = info.video_size.ok_or_else(|| {
            ForgeError::resource(format!(
                "'{}' has no video stream",
                self.video.source.display()
            ))
        })?;
        self.source_size = Some(size);
        Ok(())
    }

    fn pre_draw(&mut self, t: TimeMs) -> ForgeResult<()> {
        let (w, h) = self
            .source_size
            .ok_or_else(|| ForgeError::resource("video renderer used before enter_timeline"))?;
        let source_ms = self.source_ms_for(t);
        if let Some(frame) = &self.frame
            && frame.source_ms == source_ms
        {
            return Ok(());
        }

        let mut rgba =
            decode::decode_video_frame_rgba8(&self.video.source, w, h, source_ms as f64 / 1000.0)?;
        self.apply_chroma_key(&mut rgba);
        self.frame = Some(DecodedFrame { source_ms, rgba });
        Ok(())
    }

    fn draw(&mut self, target: &mut Surface, _t: TimeMs) -> ForgeResult<()> {
        let (w, h) = self
            .source_size
            .ok_or_else(|| ForgeError::resource("video renderer drawn before enter_timeline"))?;
        let frame = self
            .frame
            .as_ref()
            .ok_or_else(|| ForgeError::resource("video renderer drawn before pre_draw"))?;
        let size = self.video.size.map(|s| (s.width, s.height));
        target.blit_straight_rgba(&frame.rgba, w, h, self.video.x, self.video.y, size)
    }

    fn leave_timeline(&mut self) {
        self.source_size = None;
        self.frame = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::DisplayTime;
    use crate::timeline::model::ItemId;

    fn video_item(start: u64, stop: u64, crop_offset_ms: u64) -> TimelineItem {
        TimelineItem {
            id: ItemId(1),
            display: DisplayTime {
                start_ms: start,
                stop_ms: stop,
            },
            layer: 0,
            kind: ItemKind::Video(VideoItem {
                source: "clip.mp4".into(),
                x: 0,
                y: 0,
                size: None,
                crop_offset_ms,
                chroma_key: None,
                volume: 1.0,
            }),
        }
    }

    #[test]
    fn crop_offset_shifts_source_time() {
        // Display [0, 5000) with crop offset 2000ms: t=1000 reads source 3000.
        let r = VideoRenderer::new(video_item(0, 5000, 2000)).unwrap();
        assert_eq!(r.source_ms_for(1000), 3000);
        assert_eq!(r.source_ms_for(0), 2000);
    }

    #[test]
    fn source_time_is_relative_to_display_start() {
        let r = VideoRenderer::new(video_item(4000, 9000, 500)).unwrap();
        assert_eq!(r.source_ms_for(4000), 500);
        assert_eq!(r.source_ms_for(6500), 3000);
    }
}
