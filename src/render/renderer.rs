use crate::foundation::core::TimeMs;
use crate::foundation::error::{ForgeError, ForgeResult};
use crate::render::surface::Surface;
use crate::timeline::model::{ItemKind, TimelineItem};

/// Lifecycle of a renderer slot, owned by the scheduler. Destroyed is
/// represented by slot removal, not a state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RendererState {
    /// No expensive resources held.
    Uninitialized,
    /// `enter_timeline` completed; ready to draw.
    Prepared,
}

/// The live, resource-holding unit behind one canvas timeline item.
///
/// Contract:
/// - `enter_timeline` acquires expensive resources (decoder, bitmap, font,
///   compiled effect) and is idempotent when already entered.
/// - `pre_draw` does any per-frame I/O (e.g. decoding the source frame
///   nearest to `t`); `draw` must not block on I/O.
/// - `leave_timeline` releases everything and is safe to call at any time,
///   including before `enter_timeline` and twice in a row.
///
/// Renderers may cycle Prepared -> Uninitialized -> Prepared across a scan as
/// long as the underlying item value is unchanged; a changed value always
/// gets a fresh renderer.
pub trait ItemRenderer: Send {
    /// The item this renderer was built from.
    fn item(&self) -> &TimelineItem;

    /// Return `true` iff this renderer was built from a value-equal item.
    /// This is the only reuse signal the scheduler consults.
    fn is_equals(&self, candidate: &TimelineItem) -> bool {
        self.item() == candidate
    }

    /// Return `true` when `t` falls inside the item's display window.
    fn is_display_position(&self, t: TimeMs) -> bool {
        self.item().display.contains(t)
    }

    fn enter_timeline(&mut self) -> ForgeResult<()>;

    /// Per-frame preparation; default is a no-op.
    fn pre_draw(&mut self, _t: TimeMs) -> ForgeResult<()> {
        Ok(())
    }

    fn draw(&mut self, target: &mut Surface, t: TimeMs) -> ForgeResult<()>;

    fn leave_timeline(&mut self);
}

/// Build the renderer for a canvas item. Audio items have no renderer; their
/// PCM goes through the mixer.
pub fn build_renderer(item: &TimelineItem) -> ForgeResult<Box<dyn ItemRenderer>> {
    match &item.kind {
        ItemKind::Text(_) => Ok(Box::new(crate::render::text::TextRenderer::new(
            item.clone(),
        )?)),
        ItemKind::Image(_) => Ok(Box::new(crate::render::image::ImageRenderer::new(
            item.clone(),
        )?)),
        ItemKind::Video(_) => Ok(Box::new(crate::render::video::VideoRenderer::new(
            item.clone(),
        )?)),
        ItemKind::Shape(_) => Ok(Box::new(crate::render::shape::ShapeRenderer::new(
            item.clone(),
        )?)),
        ItemKind::Effect(_) => Ok(Box::new(crate::render::effect::EffectRenderer::new(
            item.clone(),
        )?)),
        ItemKind::Audio(_) => Err(ForgeError::config(format!(
            "item {} is audio-only and has no canvas renderer",
            item.id.0
        ))),
    }
}
