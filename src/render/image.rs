use crate::foundation::core::TimeMs;
use crate::foundation::error::{ForgeError, ForgeResult};
use crate::render::renderer::ItemRenderer;
use crate::render::surface::Surface;
use crate::timeline::model::{ImageItem, ItemKind, TimelineItem};

/// Still image composited at a fixed position, optionally scaled.
///
/// The decoded bitmap is the expensive resource.
pub struct ImageRenderer {
    item: TimelineItem,
    image: ImageItem,
    bitmap: Option<DecodedBitmap>,
}

struct DecodedBitmap {
    width: u32,
    height: u32,
    /// Straight-alpha RGBA8.
    rgba: Vec<u8>,
}

impl ImageRenderer {
    pub fn new(item: TimelineItem) -> ForgeResult<Self> {
        let ItemKind::Image(image) = item.kind.clone() else {
            return Err(ForgeError::config("ImageRenderer requires an image item"));
        };
        Ok(Self {
            item,
            image,
            bitmap: None,
        })
    }
}

impl ItemRenderer for ImageRenderer {
    fn item(&self) -> &TimelineItem {
        &self.item
    }

    fn enter_timeline(&mut self) -> ForgeResult<()> {
        if self.bitmap.is_some() {
            return Ok(());
        }
        let decoded = image::open(&self.image.source).map_err(|e| {
            ForgeError::resource(format!(
                "failed to decode image '{}': {e}",
                self.image.source.display()
            ))
        })?;
        let rgba = decoded.to_rgba8();
        self.bitmap = Some(DecodedBitmap {
            width: rgba.width(),
            height: rgba.height(),
            rgba: rgba.into_raw(),
        });
        Ok(())
    }

    fn draw(&mut self, target: &mut Surface, _t: TimeMs) -> ForgeResult<()> {
        let bitmap = self
            .bitmap
            .as_ref()
            .ok_or_else(|| ForgeError::resource("image renderer drawn before enter_timeline"))?;
        let size = self.image.size.map(|s| (s.width, s.height));
        target.blit_straight_rgba(
            &bitmap.rgba,
            bitmap.width,
            bitmap.height,
            self.image.x,
            self.image.y,
            size,
        )
    }

    fn leave_timeline(&mut self) {
        self.bitmap = None;
    }
}
