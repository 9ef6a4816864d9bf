use crate::foundation::core::TimeMs;
use crate::foundation::error::{ForgeError, ForgeResult};
use crate::render::renderer::ItemRenderer;
use crate::render::surface::Surface;
use crate::timeline::model::{ItemKind, ShapeItem, ShapeKind, TimelineItem};

/// Solid rect/ellipse fill. Holds no expensive resources; enter/leave exist
/// only to satisfy the shared lifecycle.
pub struct ShapeRenderer {
    item: TimelineItem,
    shape: ShapeItem,
}

impl ShapeRenderer {
    pub fn new(item: TimelineItem) -> ForgeResult<Self> {
        let ItemKind::Shape(shape) = item.kind.clone() else {
            return Err(ForgeError::config("ShapeRenderer requires a shape item"));
        };
        Ok(Self { item, shape })
    }
}

impl ItemRenderer for ShapeRenderer {
    fn item(&self) -> &TimelineItem {
        &self.item
    }

    fn enter_timeline(&mut self) -> ForgeResult<()> {
        Ok(())
    }

    fn draw(&mut self, target: &mut Surface, _t: TimeMs) -> ForgeResult<()> {
        let s = &self.shape;
        let src = s.color.to_premul();
        match s.shape {
            ShapeKind::Rect => target.fill_rect(s.x, s.y, s.width, s.height, src),
            ShapeKind::Ellipse => {
                // Pixel-center inside test against the bounding-box ellipse.
                let a = f64::from(s.width) / 2.0;
                let b = f64::from(s.height) / 2.0;
                for py in 0..i64::from(s.height) {
                    for px in 0..i64::from(s.width) {
                        let dx = (px as f64 + 0.5 - a) / a;
                        let dy = (py as f64 + 0.5 - b) / b;
                        if dx * dx + dy * dy <= 1.0 {
                            target.over_pixel(s.x + px, s.y + py, src);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn leave_timeline(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::{DisplayTime, Rgba8};
    use crate::timeline::model::ItemId;

    fn rect_item(x: i64, y: i64, w: u32, h: u32) -> TimelineItem {
        TimelineItem {
            id: ItemId(1),
            display: DisplayTime {
                start_ms: 0,
                stop_ms: 100,
            },
            layer: 0,
            kind: ItemKind::Shape(ShapeItem {
                shape: ShapeKind::Rect,
                x,
                y,
                width: w,
                height: h,
                color: Rgba8::opaque(255, 0, 0),
            }),
        }
    }

    #[test]
    fn rect_fills_exact_region() {
        let mut r = ShapeRenderer::new(rect_item(1, 1, 2, 2)).unwrap();
        let mut target = Surface::new(4, 4).unwrap();
        r.enter_timeline().unwrap();
        r.draw(&mut target, 0).unwrap();
        assert_eq!(target.pixel(1, 1), [255, 0, 0, 255]);
        assert_eq!(target.pixel(2, 2), [255, 0, 0, 255]);
        assert_eq!(target.pixel(0, 0), [0, 0, 0, 0]);
        assert_eq!(target.pixel(3, 3), [0, 0, 0, 0]);
    }

    #[test]
    fn ellipse_misses_bounding_corners() {
        let mut item = rect_item(0, 0, 8, 8);
        if let ItemKind::Shape(ref mut s) = item.kind {
            s.shape = ShapeKind::Ellipse;
        }
        let mut r = ShapeRenderer::new(item).unwrap();
        let mut target = Surface::new(8, 8).unwrap();
        r.draw(&mut target, 0).unwrap();
        assert_eq!(target.pixel(0, 0), [0, 0, 0, 0]);
        assert_eq!(target.pixel(4, 4), [255, 0, 0, 255]);
    }
}
