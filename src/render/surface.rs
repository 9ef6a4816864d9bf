use crate::foundation::error::{ForgeError, ForgeResult};
use crate::foundation::math::mul_div255_u8;

/// Shared frame target: premultiplied RGBA8 pixels, row-major, SDR.
///
/// Exactly one producer writes a surface at a time; the scheduler's draw
/// stage is sequential for this reason.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Surface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

/// Premultiplied RGBA8 pixel.
pub type PremulRgba8 = [u8; 4];

impl Surface {
    /// Allocate a transparent surface.
    pub fn new(width: u32, height: u32) -> ForgeResult<Self> {
        if width == 0 || height == 0 {
            return Err(ForgeError::config("surface dimensions must be non-zero"));
        }
        Ok(Self {
            width,
            height,
            data: vec![0u8; width as usize * height as usize * 4],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Borrow the raw premultiplied RGBA8 bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Reset every pixel to transparent black. Called between frames so no
    /// residual pixels bleed into the next composite.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    pub fn pixel(&self, x: u32, y: u32) -> PremulRgba8 {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Composite `src` over the pixel at (x, y); out-of-bounds is a no-op.
    pub fn over_pixel(&mut self, x: i64, y: i64, src: PremulRgba8) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let dst = [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]];
        let out = over(dst, src);
        self.data[i..i + 4].copy_from_slice(&out);
    }

    /// Fill an axis-aligned rectangle, clipped to the surface.
    pub fn fill_rect(&mut self, x: i64, y: i64, w: u32, h: u32, src: PremulRgba8) {
        for py in 0..i64::from(h) {
            for px in 0..i64::from(w) {
                self.over_pixel(x + px, y + py, src);
            }
        }
    }

    /// Composite a straight-alpha RGBA8 bitmap over this surface at (x, y),
    /// optionally nearest-neighbor scaled to `target` size.
    pub fn blit_straight_rgba(
        &mut self,
        bitmap: &[u8],
        src_w: u32,
        src_h: u32,
        x: i64,
        y: i64,
        target: Option<(u32, u32)>,
    ) -> ForgeResult<()> {
        if bitmap.len() != src_w as usize * src_h as usize * 4 {
            return Err(ForgeError::config(
                "blit source length does not match its dimensions",
            ));
        }
        let (dst_w, dst_h) = target.unwrap_or((src_w, src_h));
        if dst_w == 0 || dst_h == 0 || src_w == 0 || src_h == 0 {
            return Ok(());
        }

        for dy in 0..dst_h {
            let sy = (u64::from(dy) * u64::from(src_h) / u64::from(dst_h)) as u32;
            for dx in 0..dst_w {
                let sx = (u64::from(dx) * u64::from(src_w) / u64::from(dst_w)) as u32;
                let i = (sy as usize * src_w as usize + sx as usize) * 4;
                let a = bitmap[i + 3];
                if a == 0 {
                    continue;
                }
                let src = [
                    mul_div255_u8(u16::from(bitmap[i]), u16::from(a)),
                    mul_div255_u8(u16::from(bitmap[i + 1]), u16::from(a)),
                    mul_div255_u8(u16::from(bitmap[i + 2]), u16::from(a)),
                    a,
                ];
                self.over_pixel(x + i64::from(dx), y + i64::from(dy), src);
            }
        }
        Ok(())
    }
}

/// Porter-Duff `over` for premultiplied RGBA8, saturating.
pub fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    if src[3] == 0 {
        return dst;
    }
    if src[3] == 255 {
        return src;
    }
    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        let dc = mul_div255_u8(u16::from(dst[i]), inv);
        out[i] = src[i].saturating_add(dc);
    }
    out
}
