use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::foundation::error::{ForgeError, ForgeResult};

use super::encoder::{EncodedChunk, TrackFormat};
use super::faststart::relocate_moov;
use super::ffmpeg::IVF_HEADER_LEN;

pub type TrackId = usize;

/// Interleaves encoded chunks from multiple tracks into one container.
///
/// `add_track` is called exactly once per track before its first chunk.
/// Chunks written before *every* expected track has been added are
/// buffered, so the video task may race ahead of audio negotiation (and
/// vice versa) without the sink seeing a half-configured container.
pub trait ContainerSink: Send {
    fn add_track(&mut self, format: TrackFormat) -> ForgeResult<TrackId>;
    fn write_chunk(&mut self, track: TrackId, chunk: EncodedChunk) -> ForgeResult<()>;
    fn finalize(&mut self) -> ForgeResult<()>;
    /// Best-effort cleanup; never fails, safe after any prior state.
    fn abort(&mut self);
}

/// Deletes the held path on drop. Disarm by taking the inner option.
struct TempFileGuard(Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(&path);
        }
    }
}

fn spool_path(track: TrackId, ext: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "reelforge_spool_{}_{}_{track}.{ext}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    ))
}

enum SpoolKind {
    /// VP9 in IVF with a 1/1000 timebase, so the pts field carries
    /// milliseconds straight through the stream copy.
    Ivf { frames: u32 },
    /// Self-framing ADTS, appended as-is.
    Adts,
}

struct Spool {
    file: std::fs::File,
    _guard: TempFileGuard,
    path: PathBuf,
    kind: SpoolKind,
}

impl Spool {
    fn create(track: TrackId, format: &TrackFormat) -> ForgeResult<Self> {
        let (ext, kind) = match format {
            TrackFormat::Video { .. } => ("ivf", SpoolKind::Ivf { frames: 0 }),
            TrackFormat::Audio { .. } => ("aac", SpoolKind::Adts),
        };
        let path = spool_path(track, ext);
        let mut file = std::fs::File::create(&path).map_err(|e| {
            ForgeError::pipeline(format!("failed to create spool '{}': {e}", path.display()))
        })?;
        let guard = TempFileGuard(Some(path.clone()));

        if let TrackFormat::Video { width, height, .. } = format {
            file.write_all(&ivf_header(*width, *height))
                .map_err(|e| ForgeError::pipeline(format!("failed to write spool header: {e}")))?;
        }
        Ok(Self {
            file,
            _guard: guard,
            path,
            kind,
        })
    }

    fn append(&mut self, chunk: &EncodedChunk) -> ForgeResult<()> {
        let io = |e: std::io::Error| ForgeError::pipeline(format!("spool write failed: {e}"));
        match &mut self.kind {
            SpoolKind::Ivf { frames } => {
                self.file
                    .write_all(&(chunk.data.len() as u32).to_le_bytes())
                    .map_err(io)?;
                self.file.write_all(&chunk.pts_ms.to_le_bytes()).map_err(io)?;
                self.file.write_all(&chunk.data).map_err(io)?;
                *frames += 1;
            }
            SpoolKind::Adts => self.file.write_all(&chunk.data).map_err(io)?,
        }
        Ok(())
    }

    fn close(mut self) -> ForgeResult<(PathBuf, TempFileGuard)> {
        if let SpoolKind::Ivf { frames } = self.kind {
            // Backfill the frame count now that it is known.
            self.file
                .seek(SeekFrom::Start(24))
                .and_then(|_| self.file.write_all(&frames.to_le_bytes()))
                .map_err(|e| ForgeError::pipeline(format!("spool frame count patch failed: {e}")))?;
        }
        self.file
            .sync_all()
            .map_err(|e| ForgeError::pipeline(format!("spool flush failed: {e}")))?;
        Ok((self.path, self._guard))
    }
}

fn ivf_header(width: u32, height: u32) -> [u8; IVF_HEADER_LEN] {
    let mut h = [0u8; IVF_HEADER_LEN];
    h[0..4].copy_from_slice(b"DKIF");
    // version 0, header length 32
    h[6..8].copy_from_slice(&(IVF_HEADER_LEN as u16).to_le_bytes());
    h[8..12].copy_from_slice(b"VP90");
    h[12..14].copy_from_slice(&(width as u16).to_le_bytes());
    h[14..16].copy_from_slice(&(height as u16).to_le_bytes());
    h[16..20].copy_from_slice(&1000u32.to_le_bytes()); // timebase denominator
    h[20..24].copy_from_slice(&1u32.to_le_bytes()); // timebase numerator
    // frame count at 24..28 is patched on close
    h
}

/// Production sink: spools each track as an elementary stream, then stream
/// copies both into an MP4 and runs the faststart pass. A faststart
/// failure downgrades to a warning, the non-progressive file still plays.
pub struct Mp4Muxer {
    out_path: PathBuf,
    expected_tracks: usize,
    tracks: Vec<TrackFormat>,
    spools: Vec<Spool>,
    pending: Vec<(TrackId, EncodedChunk)>,
    finalized: bool,
}

impl Mp4Muxer {
    pub fn new(out_path: impl Into<PathBuf>, expected_tracks: usize) -> ForgeResult<Self> {
        if expected_tracks == 0 {
            return Err(ForgeError::config("container needs at least one track"));
        }
        let out_path = out_path.into();
        if let Some(parent) = out_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                ForgeError::resource(format!(
                    "failed to create output directory '{}': {e}",
                    parent.display()
                ))
            })?;
        }
        Ok(Self {
            out_path,
            expected_tracks,
            tracks: Vec::new(),
            spools: Vec::new(),
            pending: Vec::new(),
            finalized: false,
        })
    }

    fn negotiated(&self) -> bool {
        self.tracks.len() == self.expected_tracks
    }

    fn remux(&self, spool_paths: &[&Path]) -> ForgeResult<()> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-loglevel", "error", "-y"]);
        for path in spool_paths {
            cmd.arg("-i").arg(path);
        }
        for i in 0..spool_paths.len() {
            cmd.arg("-map").arg(format!("{i}:0"));
        }
        cmd.args(["-c", "copy", "-f", "mp4"]).arg(&self.out_path);

        let output = cmd
            .output()
            .map_err(|e| ForgeError::resource(format!("failed to run ffmpeg mux: {e}")))?;
        if !output.status.success() {
            return Err(ForgeError::pipeline(format!(
                "ffmpeg mux exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl ContainerSink for Mp4Muxer {
    fn add_track(&mut self, format: TrackFormat) -> ForgeResult<TrackId> {
        if self.finalized {
            return Err(ForgeError::pipeline("container is already finalized"));
        }
        if self.tracks.len() >= self.expected_tracks {
            return Err(ForgeError::pipeline(format!(
                "all {} tracks already negotiated",
                self.expected_tracks
            )));
        }
        let id = self.tracks.len();
        self.spools.push(Spool::create(id, &format)?);
        self.tracks.push(format);

        if self.negotiated() {
            for (track, chunk) in std::mem::take(&mut self.pending) {
                self.spools[track].append(&chunk)?;
            }
        }
        Ok(id)
    }

    fn write_chunk(&mut self, track: TrackId, chunk: EncodedChunk) -> ForgeResult<()> {
        if self.finalized {
            return Err(ForgeError::pipeline("container is already finalized"));
        }
        if track >= self.tracks.len() {
            return Err(ForgeError::pipeline(format!("unknown track id {track}")));
        }
        if !self.negotiated() {
            self.pending.push((track, chunk));
            return Ok(());
        }
        self.spools[track].append(&chunk)
    }

    fn finalize(&mut self) -> ForgeResult<()> {
        if self.finalized {
            return Err(ForgeError::pipeline("container is already finalized"));
        }
        if !self.negotiated() {
            return Err(ForgeError::pipeline(format!(
                "finalize with {} of {} tracks negotiated",
                self.tracks.len(),
                self.expected_tracks
            )));
        }

        let mut guards = Vec::with_capacity(self.spools.len());
        let mut paths = Vec::with_capacity(self.spools.len());
        for spool in self.spools.drain(..) {
            let (path, guard) = spool.close()?;
            paths.push(path);
            guards.push(guard);
        }

        // Mark finalized only once the container exists; until then a
        // failed finalize can still be aborted and the partial output
        // deleted.
        self.remux(&paths.iter().map(PathBuf::as_path).collect::<Vec<_>>())?;
        self.finalized = true;

        match relocate_moov(&self.out_path) {
            Ok(true) => tracing::debug!(out = %self.out_path.display(), "relocated moov for progressive playback"),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(out = %self.out_path.display(), error = %e, "faststart pass failed, keeping non-progressive output");
            }
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.spools.clear();
        self.pending.clear();
        if !self.finalized {
            let _ = std::fs::remove_file(&self.out_path);
        }
        self.finalized = true;
    }
}

/// Test sink: records everything, muxes nothing.
#[derive(Default)]
pub struct MemoryMuxer {
    expected_tracks: usize,
    pub tracks: Vec<TrackFormat>,
    pub chunks: Vec<Vec<EncodedChunk>>,
    pending: Vec<(TrackId, EncodedChunk)>,
    pub finalized: bool,
    pub aborted: bool,
}

impl MemoryMuxer {
    pub fn new(expected_tracks: usize) -> Self {
        Self {
            expected_tracks,
            ..Self::default()
        }
    }
}

impl ContainerSink for MemoryMuxer {
    fn add_track(&mut self, format: TrackFormat) -> ForgeResult<TrackId> {
        if self.finalized {
            return Err(ForgeError::pipeline("container is already finalized"));
        }
        if self.tracks.len() >= self.expected_tracks {
            return Err(ForgeError::pipeline("all tracks already negotiated"));
        }
        let id = self.tracks.len();
        self.tracks.push(format);
        self.chunks.push(Vec::new());

        if self.tracks.len() == self.expected_tracks {
            for (track, chunk) in std::mem::take(&mut self.pending) {
                self.chunks[track].push(chunk);
            }
        }
        Ok(id)
    }

    fn write_chunk(&mut self, track: TrackId, chunk: EncodedChunk) -> ForgeResult<()> {
        if self.finalized {
            return Err(ForgeError::pipeline("container is already finalized"));
        }
        if track >= self.tracks.len() {
            return Err(ForgeError::pipeline(format!("unknown track id {track}")));
        }
        if self.tracks.len() < self.expected_tracks {
            self.pending.push((track, chunk));
        } else {
            self.chunks[track].push(chunk);
        }
        Ok(())
    }

    fn finalize(&mut self) -> ForgeResult<()> {
        if self.finalized {
            return Err(ForgeError::pipeline("container is already finalized"));
        }
        if self.tracks.len() < self.expected_tracks {
            return Err(ForgeError::pipeline("finalize before track negotiation"));
        }
        self.finalized = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.aborted = true;
        self.finalized = true;
    }
}
