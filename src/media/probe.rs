use std::path::Path;

use crate::foundation::error::{ForgeError, ForgeResult};

/// Metadata for a media source, as reported by `ffprobe`.
#[derive(Clone, Debug)]
pub struct MediaInfo {
    /// Video frame size, when the source has a video stream.
    pub video_size: Option<(u32, u32)>,
    /// Container duration in milliseconds, when known.
    pub duration_ms: Option<u64>,
    /// Whether at least one audio stream is present.
    pub has_audio: bool,
}

/// Probe a media source through `ffprobe`.
pub fn probe_media(path: &Path) -> ForgeResult<MediaInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| ForgeError::resource(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(ForgeError::resource(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| ForgeError::resource(format!("ffprobe json parse failed: {e}")))?;

    let video_size = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .and_then(|s| Some((s.width?, s.height?)));
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));
    let duration_ms = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(|d| (d * 1000.0).round() as u64);

    Ok(MediaInfo {
        video_size,
        duration_ms,
        has_audio,
    })
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    tool_responds("ffmpeg")
}

/// Return `true` when `ffprobe` can be invoked from `PATH`.
pub fn is_ffprobe_on_path() -> bool {
    tool_responds("ffprobe")
}

fn tool_responds(tool: &str) -> bool {
    std::process::Command::new(tool)
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

// No unit tests here: probing shells out to `ffprobe` and is covered by
// integration tests that skip when the tool is unavailable.
