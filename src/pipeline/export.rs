use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{SyncSender, sync_channel};

use crate::audio::mixer::AudioMixer;
use crate::audio::source::{MIX_CHANNELS, MIX_SAMPLE_RATE, ms_to_sample_frames};
use crate::encode::encoder::{
    AudioEncoder, EncodedChunk, TrackFormat, TrackKind, TrackProgress, VideoEncoder,
};
use crate::encode::ffmpeg::{FfmpegAudioEncoder, FfmpegVideoEncoder};
use crate::encode::mux::{ContainerSink, Mp4Muxer, TrackId};
use crate::foundation::core::TimeMs;
use crate::foundation::error::{ForgeError, ForgeResult};
use crate::media::probe::{is_ffmpeg_on_path, is_ffprobe_on_path};
use crate::render::scheduler::RenderScheduler;
use crate::render::surface::Surface;
use crate::timeline::project::Project;

/// Cooperative cancellation flag shared between the caller and the export
/// tasks. Cloning hands out another handle to the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Debug)]
pub struct ExportOpts {
    pub overwrite: bool,
    /// Audio mix window length fed to the encoder per iteration.
    pub audio_window_ms: TimeMs,
}

impl Default for ExportOpts {
    fn default() -> Self {
        Self {
            overwrite: true,
            audio_window_ms: 100,
        }
    }
}

/// Counters reported by a completed export.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub frames_total: u64,
    pub items_drawn: u64,
    pub items_skipped: u64,
    pub video_chunks: u64,
    pub audio_chunks: u64,
}

#[derive(Debug, Default)]
struct VideoTaskStats {
    frames: u64,
    drawn: u64,
    skipped: u64,
}

enum MuxMsg {
    Track(TrackKind, TrackFormat),
    Chunk(TrackKind, EncodedChunk),
    Draining(TrackKind),
    Done(TrackKind, ForgeResult<VideoTaskStats>),
}

/// Renders a frozen project snapshot to an MP4 file.
///
/// The export runs three tasks under one scope: a video task (scheduler +
/// compositor + VP9 encoder) and an audio task (mixer + AAC encoder) feed
/// one mux consumer on the calling thread over a bounded channel. The
/// first failing task cancels its sibling through the shared token; the
/// container is finalized only after both tasks drained cleanly.
pub struct Exporter {
    cancel: CancelToken,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Exporter {
    pub fn new() -> Self {
        Self {
            cancel: CancelToken::new(),
        }
    }

    /// Handle that cancels this exporter's in-flight export.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn export(
        &self,
        project: &Project,
        out_path: &Path,
        opts: &ExportOpts,
        mut on_progress: impl FnMut(TimeMs),
    ) -> ForgeResult<ExportStats> {
        project.validate()?;
        if !is_ffmpeg_on_path() || !is_ffprobe_on_path() {
            return Err(ForgeError::resource(
                "export requires ffmpeg and ffprobe on PATH",
            ));
        }
        project.validate_sources()?;
        if !opts.overwrite && out_path.exists() {
            return Err(ForgeError::config(format!(
                "output file '{}' already exists",
                out_path.display()
            )));
        }

        let mixer = AudioMixer::from_items(&project.items)?;
        let has_audio = !mixer.is_silent();
        let expected_tracks = 1 + usize::from(has_audio);
        let mut sink = Mp4Muxer::new(out_path, expected_tracks)?;

        let frames_total = project.fps.frames_for_duration_ms(project.duration_ms);
        let has_canvas_items = !project.canvas_items().is_empty();
        let cancel = self.cancel.clone();

        let outcome = std::thread::scope(|scope| {
            let (tx, rx) = sync_channel::<MuxMsg>(64);

            {
                let tx = tx.clone();
                let cancel = cancel.clone();
                scope.spawn(move || {
                    let result = video_task(project, frames_total, &cancel, &tx);
                    let _ = tx.send(MuxMsg::Done(TrackKind::Video, result));
                });
            }
            if has_audio {
                let tx = tx.clone();
                let cancel = cancel.clone();
                let duration_ms = project.duration_ms;
                let window_ms = opts.audio_window_ms.max(1);
                scope.spawn(move || {
                    let result = audio_task(&mixer, duration_ms, window_ms, &cancel, &tx);
                    let _ = tx.send(MuxMsg::Done(TrackKind::Audio, result));
                });
            }
            drop(tx);

            let mut ids: [Option<TrackId>; 2] = [None, None];
            let mut progress = [
                TrackProgress::new(TrackKind::Video),
                TrackProgress::new(TrackKind::Audio),
            ];
            let idx = |kind: TrackKind| match kind {
                TrackKind::Video => 0usize,
                TrackKind::Audio => 1,
            };

            let mut stats = ExportStats {
                frames_total,
                ..ExportStats::default()
            };
            let mut first_err: Option<ForgeError> = None;
            let mut fail = |err: ForgeError, first_err: &mut Option<ForgeError>| {
                if first_err.is_none() {
                    *first_err = Some(err);
                    cancel.cancel();
                }
            };

            let mut pending = 1 + usize::from(has_audio);
            while pending > 0 {
                let Ok(msg) = rx.recv() else { break };
                match msg {
                    MuxMsg::Track(kind, format) => {
                        if first_err.is_some() {
                            continue;
                        }
                        match sink.add_track(format).and_then(|id| {
                            progress[idx(kind)].start()?;
                            Ok(id)
                        }) {
                            Ok(id) => ids[idx(kind)] = Some(id),
                            Err(e) => fail(e, &mut first_err),
                        }
                    }
                    MuxMsg::Chunk(kind, chunk) => {
                        if first_err.is_some() {
                            continue;
                        }
                        let pts_ms = chunk.pts_ms;
                        let write = progress[idx(kind)].record_chunk(&chunk).and_then(|()| {
                            let id = ids[idx(kind)].ok_or_else(|| {
                                ForgeError::pipeline("chunk received before track negotiation")
                            })?;
                            sink.write_chunk(id, chunk)
                        });
                        match write {
                            Ok(()) => {
                                match kind {
                                    TrackKind::Video => {
                                        stats.video_chunks += 1;
                                        on_progress(pts_ms);
                                    }
                                    TrackKind::Audio => stats.audio_chunks += 1,
                                }
                            }
                            Err(e) => fail(e, &mut first_err),
                        }
                    }
                    MuxMsg::Draining(kind) => {
                        if first_err.is_none()
                            && let Err(e) = progress[idx(kind)].begin_drain()
                        {
                            fail(e, &mut first_err);
                        }
                    }
                    MuxMsg::Done(kind, result) => {
                        pending -= 1;
                        match result {
                            Ok(task) => {
                                if kind == TrackKind::Video {
                                    stats.items_drawn = task.drawn;
                                    stats.items_skipped = task.skipped;
                                }
                                if first_err.is_none()
                                    && let Err(e) = progress[idx(kind)].stop()
                                {
                                    fail(e, &mut first_err);
                                }
                            }
                            Err(e) => fail(e, &mut first_err),
                        }
                    }
                }
            }

            if let Some(err) = first_err {
                sink.abort();
                return Err(err);
            }
            if has_canvas_items && stats.items_drawn == 0 {
                sink.abort();
                return Err(ForgeError::pipeline(
                    "no item rendered over the whole export",
                ));
            }
            if let Err(e) = sink.finalize() {
                sink.abort();
                return Err(e);
            }
            Ok(stats)
        });

        if matches!(outcome, Err(ForgeError::Cancelled)) {
            tracing::info!(out = %out_path.display(), "export cancelled, partial output removed");
        }
        outcome
    }
}

fn video_task(
    project: &Project,
    frames_total: u64,
    cancel: &CancelToken,
    tx: &SyncSender<MuxMsg>,
) -> ForgeResult<VideoTaskStats> {
    let mut scheduler = RenderScheduler::new();
    scheduler.set_items(&project.items);
    let result = video_task_frames(project, frames_total, cancel, tx, &mut scheduler);
    scheduler.destroy_all();
    result
}

fn video_task_frames(
    project: &Project,
    frames_total: u64,
    cancel: &CancelToken,
    tx: &SyncSender<MuxMsg>,
    scheduler: &mut RenderScheduler,
) -> ForgeResult<VideoTaskStats> {
    let mut surface = Surface::new(project.canvas.width, project.canvas.height)?;
    let mut encoder =
        FfmpegVideoEncoder::new(project.canvas.width, project.canvas.height, project.fps)?;
    let _ = tx.send(MuxMsg::Track(TrackKind::Video, encoder.format()));

    let mut stats = VideoTaskStats::default();
    for frame in 0..frames_total {
        if cancel.is_cancelled() {
            return Err(ForgeError::Cancelled);
        }
        let t = project.fps.frame_to_ms(frame);
        let frame_stats = scheduler.render_frame(t, &mut surface)?;
        stats.frames += 1;
        stats.drawn += frame_stats.drawn as u64;
        stats.skipped += frame_stats.skipped as u64;

        encoder.push_frame(surface.data(), t)?;
        for chunk in encoder.poll_chunks() {
            let _ = tx.send(MuxMsg::Chunk(TrackKind::Video, chunk));
        }
    }

    let _ = tx.send(MuxMsg::Draining(TrackKind::Video));
    for chunk in encoder.finish()? {
        let _ = tx.send(MuxMsg::Chunk(TrackKind::Video, chunk));
    }
    Ok(stats)
}

fn audio_task(
    mixer: &AudioMixer,
    duration_ms: TimeMs,
    window_ms: TimeMs,
    cancel: &CancelToken,
    tx: &SyncSender<MuxMsg>,
) -> ForgeResult<VideoTaskStats> {
    let mut encoder = FfmpegAudioEncoder::new(MIX_SAMPLE_RATE, MIX_CHANNELS)?;
    let _ = tx.send(MuxMsg::Track(TrackKind::Audio, encoder.format()));

    let mut start = 0;
    while start < duration_ms {
        if cancel.is_cancelled() {
            return Err(ForgeError::Cancelled);
        }
        let end = (start + window_ms).min(duration_ms);
        // Window length from absolute sample boundaries so consecutive
        // windows tile the timeline without rounding drift.
        let frames = (ms_to_sample_frames(end) - ms_to_sample_frames(start)) as usize;
        let samples = mixer.mix_window(start, frames);
        encoder.push_samples(&samples)?;
        for chunk in encoder.poll_chunks() {
            let _ = tx.send(MuxMsg::Chunk(TrackKind::Audio, chunk));
        }
        start = end;
    }

    let _ = tx.send(MuxMsg::Draining(TrackKind::Audio));
    for chunk in encoder.finish()? {
        let _ = tx.send(MuxMsg::Chunk(TrackKind::Audio, chunk));
    }
    Ok(VideoTaskStats::default())
}

/// Render a single timestamp to pixels, sharing nothing with any export.
pub fn render_preview_frame(project: &Project, t_ms: TimeMs) -> ForgeResult<Surface> {
    project.validate()?;
    if t_ms >= project.duration_ms {
        return Err(ForgeError::config(format!(
            "preview time {t_ms} ms is outside the project duration {} ms",
            project.duration_ms
        )));
    }
    let mut scheduler = RenderScheduler::new();
    scheduler.set_items(&project.items);
    let mut surface = Surface::new(project.canvas.width, project.canvas.height)?;
    let result = scheduler.render_frame(t_ms, &mut surface);
    scheduler.destroy_all();
    result?;
    Ok(surface)
}
