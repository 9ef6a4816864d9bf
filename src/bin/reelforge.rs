use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use reelforge::{ExportOpts, Exporter, Project, render_preview_frame};

#[derive(Parser, Debug)]
#[command(name = "reelforge", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a single timestamp as a PNG.
    Frame(FrameArgs),
    /// Export the project to MP4 (requires `ffmpeg` and `ffprobe` on PATH).
    Export(ExportArgs),
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Timeline position in milliseconds.
    #[arg(long)]
    at: u64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    /// Overwrite output if it already exists.
    #[arg(long, default_value_t = true)]
    overwrite: bool,

    /// Suppress progress output.
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Frame(args) => cmd_frame(args),
        Command::Export(args) => cmd_export(args),
    }
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let project = Project::from_path(&args.in_path)?;
    let surface = render_preview_frame(&project, args.at)?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    image::save_buffer_with_format(
        &args.out,
        surface.data(),
        surface.width(),
        surface.height(),
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let project = Project::from_path(&args.in_path)?;
    let duration_ms = project.duration_ms;

    let opts = ExportOpts {
        overwrite: args.overwrite,
        ..ExportOpts::default()
    };
    let exporter = Exporter::new();
    let mut last_report = 0u64;
    let stats = exporter.export(&project, &args.out, &opts, |t_ms| {
        if !args.quiet && (t_ms >= last_report + 1000 || t_ms == 0) {
            last_report = t_ms;
            eprintln!(
                "encoded {:.1}s / {:.1}s",
                t_ms as f64 / 1000.0,
                duration_ms as f64 / 1000.0
            );
        }
    })?;

    eprintln!(
        "wrote {} ({} frames, {} video chunks, {} audio chunks)",
        args.out.display(),
        stats.frames_total,
        stats.video_chunks,
        stats.audio_chunks
    );
    Ok(())
}
