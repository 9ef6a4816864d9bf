use crate::foundation::core::TimeMs;
use crate::foundation::error::{ForgeError, ForgeResult};
use crate::foundation::math::{mul_div255_u8, unpremul_u8};
use crate::render::renderer::ItemRenderer;
use crate::render::surface::Surface;
use crate::timeline::model::{EffectItem, ItemKind, TimelineItem};

/// Compiled form of an effect item's source string.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EffectKind {
    Grayscale,
    Invert,
    /// Radial darkening toward the region edges; strength in 0..=1.
    Vignette(f32),
    /// Multiplies color channels; 1.0 is identity.
    Brightness(f32),
}

/// Parse the tiny `name` / `name(arg)` effect language.
///
/// Also used at validation time so bad programs surface as configuration
/// errors before a render starts.
pub fn parse_effect(source: &str) -> ForgeResult<EffectKind> {
    let src = source.trim();
    let (name, arg) = match src.split_once('(') {
        None => (src, None),
        Some((name, rest)) => {
            let inner = rest
                .strip_suffix(')')
                .ok_or_else(|| ForgeError::config(format!("effect '{src}': missing ')'")))?;
            (name.trim(), Some(inner.trim()))
        }
    };

    let parse_arg = |default: f32| -> ForgeResult<f32> {
        match arg {
            None => Ok(default),
            Some(a) => a
                .parse::<f32>()
                .map_err(|_| ForgeError::config(format!("effect '{src}': bad argument '{a}'"))),
        }
    };

    match name {
        "grayscale" => Ok(EffectKind::Grayscale),
        "invert" => Ok(EffectKind::Invert),
        "vignette" => {
            let strength = parse_arg(0.5)?;
            if !(0.0..=1.0).contains(&strength) {
                return Err(ForgeError::config(format!(
                    "effect '{src}': vignette strength must be in 0..=1"
                )));
            }
            Ok(EffectKind::Vignette(strength))
        }
        "brightness" => {
            let factor = parse_arg(1.0)?;
            if !(factor.is_finite() && factor >= 0.0) {
                return Err(ForgeError::config(format!(
                    "effect '{src}': brightness factor must be >= 0"
                )));
            }
            Ok(EffectKind::Brightness(factor))
        }
        other => Err(ForgeError::config(format!("unknown effect '{other}'"))),
    }
}

/// Post-processing pass over a region of the already-composited target.
///
/// Drawn like any other canvas item, so its layer index decides which lower
/// layers it affects. Compilation of the source string is the enter-time
/// resource.
pub struct EffectRenderer {
    item: TimelineItem,
    effect: EffectItem,
    compiled: Option<EffectKind>,
}

impl EffectRenderer {
    pub fn new(item: TimelineItem) -> ForgeResult<Self> {
        let ItemKind::Effect(effect) = item.kind.clone() else {
            return Err(ForgeError::config("EffectRenderer requires an effect item"));
        };
        Ok(Self {
            item,
            effect,
            compiled: None,
        })
    }
}

impl ItemRenderer for EffectRenderer {
    fn item(&self) -> &TimelineItem {
        &self.item
    }

    fn enter_timeline(&mut self) -> ForgeResult<()> {
        if self.compiled.is_none() {
            self.compiled = Some(parse_effect(&self.effect.source)?);
        }
        Ok(())
    }

    fn draw(&mut self, target: &mut Surface, _t: TimeMs) -> ForgeResult<()> {
        let kind = self
            .compiled
            .ok_or_else(|| ForgeError::resource("effect renderer drawn before enter_timeline"))?;

        let (rx, ry, rw, rh) = match self.effect.region {
            Some(r) => (r.x, r.y, r.width, r.height),
            None => (0, 0, target.width(), target.height()),
        };
        let width = target.width() as i64;
        let height = target.height() as i64;
        let x0 = rx.clamp(0, width);
        let y0 = ry.clamp(0, height);
        let x1 = (rx + i64::from(rw)).clamp(0, width);
        let y1 = (ry + i64::from(rh)).clamp(0, height);
        if x0 >= x1 || y0 >= y1 {
            return Ok(());
        }

        let cx = (x0 + x1) as f32 / 2.0;
        let cy = (y0 + y1) as f32 / 2.0;
        let max_r = ((x1 - x0).max(y1 - y0)) as f32 / 2.0;

        let stride = target.width() as usize * 4;
        let data = target.data_mut();
        for y in y0..y1 {
            for x in x0..x1 {
                let i = y as usize * stride + x as usize * 4;
                let a = data[i + 3];
                let px = apply_effect(
                    kind,
                    [data[i], data[i + 1], data[i + 2], a],
                    (x as f32 - cx, y as f32 - cy),
                    max_r,
                );
                data[i..i + 4].copy_from_slice(&px);
            }
        }
        Ok(())
    }

    fn leave_timeline(&mut self) {
        self.compiled = None;
    }
}

fn apply_effect(kind: EffectKind, px: [u8; 4], offset: (f32, f32), max_r: f32) -> [u8; 4] {
    let a = px[3];
    match kind {
        EffectKind::Grayscale => {
            // Luma works directly on premultiplied channels since all three
            // carry the same alpha factor.
            let luma = (u32::from(px[0]) * 54 + u32::from(px[1]) * 183 + u32::from(px[2]) * 19)
                / 256;
            let l = luma.min(255) as u8;
            [l, l, l, a]
        }
        EffectKind::Invert => {
            // Inversion is defined on straight alpha.
            let mut out = [0u8; 4];
            for c in 0..3 {
                let straight = unpremul_u8(px[c], a);
                out[c] = mul_div255_u8(u16::from(255 - straight), u16::from(a));
            }
            out[3] = a;
            out
        }
        EffectKind::Vignette(strength) => {
            let dist = (offset.0 * offset.0 + offset.1 * offset.1).sqrt() / max_r.max(1.0);
            let gain = (1.0 - strength * dist.min(1.0)).clamp(0.0, 1.0);
            let g = (gain * 255.0).round() as u16;
            [
                mul_div255_u8(u16::from(px[0]), g),
                mul_div255_u8(u16::from(px[1]), g),
                mul_div255_u8(u16::from(px[2]), g),
                a,
            ]
        }
        EffectKind::Brightness(factor) => {
            let scale = |c: u8| -> u8 {
                ((f32::from(c) * factor).round() as u32).min(u32::from(a)).min(255) as u8
            };
            [scale(px[0]), scale(px[1]), scale(px[2]), a]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_bare_and_parameterized_forms() {
        assert_eq!(parse_effect("grayscale").unwrap(), EffectKind::Grayscale);
        assert_eq!(parse_effect("invert").unwrap(), EffectKind::Invert);
        assert_eq!(
            parse_effect("vignette(0.8)").unwrap(),
            EffectKind::Vignette(0.8)
        );
        assert_eq!(
            parse_effect(" brightness( 1.5 ) ").unwrap(),
            EffectKind::Brightness(1.5)
        );
    }

    #[test]
    fn parse_rejects_unknown_and_malformed() {
        assert!(parse_effect("bloom").is_err());
        assert!(parse_effect("vignette(2.0)").is_err());
        assert!(parse_effect("vignette(0.4").is_err());
        assert!(parse_effect("brightness(abc)").is_err());
    }

    #[test]
    fn grayscale_flattens_channels() {
        let out = apply_effect(EffectKind::Grayscale, [255, 0, 0, 255], (0.0, 0.0), 1.0);
        assert_eq!(out[0], out[1]);
        assert_eq!(out[1], out[2]);
        assert_eq!(out[3], 255);
    }

    #[test]
    fn invert_flips_opaque_pixels() {
        let out = apply_effect(EffectKind::Invert, [255, 0, 0, 255], (0.0, 0.0), 1.0);
        assert_eq!(out, [0, 255, 255, 255]);
    }

    #[test]
    fn vignette_is_identity_at_center() {
        let px = [100, 120, 140, 255];
        let out = apply_effect(EffectKind::Vignette(1.0), px, (0.0, 0.0), 100.0);
        assert_eq!(out, px);
    }
}
