use crate::foundation::error::{ForgeError, ForgeResult};

/// Milliseconds on the global output timeline.
pub type TimeMs = u64;

/// Half-open interval `[start_ms, stop_ms)` on the global timeline during
/// which an item is active.
///
/// The half-open convention applies uniformly: an item whose window stops at
/// `t` is already inactive at `t`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct DisplayTime {
    /// Inclusive start, in milliseconds.
    pub start_ms: TimeMs,
    /// Exclusive stop, in milliseconds.
    pub stop_ms: TimeMs,
}

impl DisplayTime {
    /// Create a validated window with `start_ms <= stop_ms`.
    pub fn new(start_ms: TimeMs, stop_ms: TimeMs) -> ForgeResult<Self> {
        if stop_ms < start_ms {
            return Err(ForgeError::config("DisplayTime stop_ms must be >= start_ms"));
        }
        Ok(Self { start_ms, stop_ms })
    }

    /// Window length in milliseconds.
    pub fn duration_ms(self) -> u64 {
        self.stop_ms.saturating_sub(self.start_ms)
    }

    /// Return `true` when `t` is inside `[start_ms, stop_ms)`.
    pub fn contains(self, t: TimeMs) -> bool {
        self.start_ms <= t && t < self.stop_ms
    }

    /// Map a global timeline instant to the source's own timeline.
    ///
    /// `crop_offset_ms` is the point within the source that corresponds to
    /// this window's start. Callers must only pass `t` inside the window.
    pub fn source_time_ms(self, t: TimeMs, crop_offset_ms: u64) -> u64 {
        t.saturating_sub(self.start_ms) + crop_offset_ms
    }
}

/// Output frames-per-second as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> ForgeResult<Self> {
        if num == 0 || den == 0 {
            return Err(ForgeError::config("Fps num and den must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Presentation time of frame `frame`, rounded to the nearest ms.
    ///
    /// Computed from the absolute frame index each call, so repeated frames
    /// accumulate no rounding drift.
    pub fn frame_to_ms(self, frame: u64) -> TimeMs {
        let num = u128::from(frame) * 1000 * u128::from(self.den);
        let den = u128::from(self.num);
        ((num + den / 2) / den) as u64
    }

    /// Number of whole output frames covering `duration_ms`.
    pub fn frames_for_duration_ms(self, duration_ms: u64) -> u64 {
        let num = u128::from(duration_ms) * u128::from(self.num);
        let den = 1000u128 * u128::from(self.den);
        num.div_ceil(den) as u64
    }
}

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Straight-alpha RGBA8 color as it appears in project files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    /// Opaque color with full alpha.
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Convert to premultiplied RGBA8.
    pub fn to_premul(self) -> [u8; 4] {
        fn premul(c: u8, a: u8) -> u8 {
            let c = u16::from(c);
            let a = u16::from(a);
            (((c * a) + 127) / 255) as u8
        }
        [
            premul(self.r, self.a),
            premul(self.g, self.a),
            premul(self.b, self.a),
            self.a,
        ]
    }
}
