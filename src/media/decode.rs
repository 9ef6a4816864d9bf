use std::path::Path;

use crate::foundation::error::{ForgeError, ForgeResult};

/// Decode one RGBA8 frame at `source_time_sec` from a video source.
///
/// `width`/`height` must come from a prior probe of the same source; the raw
/// pipe output is validated against them.
pub fn decode_video_frame_rgba8(
    path: &Path,
    width: u32,
    height: u32,
    source_time_sec: f64,
) -> ForgeResult<Vec<u8>> {
    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-ss", &format!("{source_time_sec:.9}")])
        .arg("-i")
        .arg(path)
        .args([
            "-frames:v",
            "1",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "pipe:1",
        ])
        .output()
        .map_err(|e| ForgeError::resource(format!("failed to run ffmpeg for video decode: {e}")))?;

    if !out.status.success() {
        return Err(ForgeError::resource(format!(
            "ffmpeg video decode failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let expected_len = width as usize * height as usize * 4;
    if expected_len == 0 || out.stdout.len() < expected_len {
        return Err(ForgeError::resource(format!(
            "decoded frame from '{}' has {} bytes, expected {expected_len}",
            path.display(),
            out.stdout.len()
        )));
    }
    // Seeking past EOF can yield extra frames of padding in some builds; keep
    // only the first frame.
    Ok(out.stdout[..expected_len].to_vec())
}

/// Decode a source's audio to interleaved stereo `f32` PCM at `sample_rate`.
///
/// Sources without an audio stream decode to an empty buffer rather than an
/// error, so video-only clips mix silently.
pub fn decode_audio_f32_stereo(path: &Path, sample_rate: u32) -> ForgeResult<Vec<f32>> {
    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            "2",
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| ForgeError::resource(format!("failed to run ffmpeg for audio decode: {e}")))?;

    if !out.status.success() {
        let msg = String::from_utf8_lossy(&out.stderr);
        if msg.contains("Stream specifier")
            || msg.contains("matches no streams")
            || msg.contains("does not contain any stream")
        {
            return Ok(Vec::new());
        }
        return Err(ForgeError::resource(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            msg.trim()
        )));
    }

    if !out.stdout.len().is_multiple_of(4) {
        return Err(ForgeError::resource(
            "decoded audio byte length is not aligned to f32 samples",
        ));
    }
    let mut pcm = Vec::<f32>::with_capacity(out.stdout.len() / 4);
    for chunk in out.stdout.chunks_exact(4) {
        pcm.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok(pcm)
}

// Shelling out to `ffmpeg` is validated end to end in the integration tests,
// which synthesize sources with lavfi and skip when the tool is missing.
