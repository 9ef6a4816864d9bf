use std::path::PathBuf;

use fontdue::{Font, FontSettings};

use crate::foundation::core::TimeMs;
use crate::foundation::error::{ForgeError, ForgeResult};
use crate::foundation::math::mul_div255_u8;
use crate::render::renderer::ItemRenderer;
use crate::render::surface::Surface;
use crate::timeline::model::{ItemKind, TextItem, TimelineItem};

/// Fallback fonts probed when the item carries no explicit font path.
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Helvetica.ttc",
];

/// Single-line text drawn with `fontdue` glyph rasterization.
///
/// The font file is the expensive resource: loaded and parsed in
/// `enter_timeline`, dropped in `leave_timeline`.
pub struct TextRenderer {
    item: TimelineItem,
    text: TextItem,
    font: Option<Font>,
}

impl TextRenderer {
    pub fn new(item: TimelineItem) -> ForgeResult<Self> {
        let ItemKind::Text(text) = item.kind.clone() else {
            return Err(ForgeError::config("TextRenderer requires a text item"));
        };
        Ok(Self {
            item,
            text,
            font: None,
        })
    }

    fn resolve_font_path(&self) -> ForgeResult<PathBuf> {
        if let Some(path) = &self.text.font_path {
            return Ok(path.clone());
        }
        SYSTEM_FONT_CANDIDATES
            .iter()
            .map(PathBuf::from)
            .find(|p| p.is_file())
            .ok_or_else(|| {
                ForgeError::resource(format!(
                    "item {}: no font_path set and no known system font found",
                    self.item.id.0
                ))
            })
    }
}

impl ItemRenderer for TextRenderer {
    fn item(&self) -> &TimelineItem {
        &self.item
    }

    fn enter_timeline(&mut self) -> ForgeResult<()> {
        if self.font.is_some() {
            return Ok(());
        }
        let path = self.resolve_font_path()?;
        let bytes = std::fs::read(&path).map_err(|e| {
            ForgeError::resource(format!("failed to read font '{}': {e}", path.display()))
        })?;
        let font = Font::from_bytes(bytes, FontSettings::default()).map_err(|e| {
            ForgeError::resource(format!("failed to parse font '{}': {e}", path.display()))
        })?;
        self.font = Some(font);
        Ok(())
    }

    fn draw(&mut self, target: &mut Surface, _t: TimeMs) -> ForgeResult<()> {
        let font = self
            .font
            .as_ref()
            .ok_or_else(|| ForgeError::resource("text renderer drawn before enter_timeline"))?;
        let size = self.text.size_px;
        let color = self.text.color;

        // Measure pass: common baseline across the line.
        let mut max_ascent: i32 = 0;
        for ch in self.text.content.chars() {
            let metrics = font.metrics(ch, size);
            max_ascent = max_ascent.max(metrics.height as i32 + metrics.ymin);
        }

        let mut cursor_x: i64 = self.text.x;
        for ch in self.text.content.chars() {
            let (metrics, bitmap) = font.rasterize(ch, size);
            let glyph_x = cursor_x + i64::from(metrics.xmin);
            let glyph_y =
                self.text.y + i64::from(max_ascent - (metrics.height as i32 + metrics.ymin));

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let coverage = bitmap[gy * metrics.width + gx];
                    if coverage == 0 {
                        continue;
                    }
                    let a = mul_div255_u8(u16::from(coverage), u16::from(color.a));
                    let src = [
                        mul_div255_u8(u16::from(color.r), u16::from(a)),
                        mul_div255_u8(u16::from(color.g), u16::from(a)),
                        mul_div255_u8(u16::from(color.b), u16::from(a)),
                        a,
                    ];
                    target.over_pixel(glyph_x + gx as i64, glyph_y + gy as i64, src);
                }
            }
            cursor_x += metrics.advance_width.round() as i64;
        }
        Ok(())
    }

    fn leave_timeline(&mut self) {
        self.font = None;
    }
}
