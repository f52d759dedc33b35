use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use traincue::audio::{check_required_tools, AudioEngine, SystemRunner};
use traincue::{assemble_tracks, config, WorkoutConfig};

#[derive(Parser)]
#[command(name = "traincue")]
#[command(version, about = "Convert a workout plan to audio files")]
#[command(
    long_about = "Convert a workout YAML plan into spoken audio tracks (pauses, cues and countdowns) plus a playlist, using sox, ffmpeg and a text-to-speech tool."
)]
struct Cli {
    /// Workout plan file (YAML)
    input: Option<PathBuf>,

    /// Directory for the final tracks and playlist
    #[arg(short, long, default_value = "traincue-output")]
    output_dir: PathBuf,

    /// Directory for intermediate files (reused across runs)
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Print an example workout plan and exit
    #[arg(long)]
    example: bool,

    /// Validate the plan and tool availability without producing audio
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Suppress the progress bar
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("traincue-intermediate-files")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if cli.example {
        print!("{}", config::example());
        return Ok(());
    }

    let input = cli
        .input
        .context("missing workout plan file (use --example to print one)")?;
    if !input.exists() {
        anyhow::bail!("Workout plan not found: {}", input.display());
    }

    let config = WorkoutConfig::load(&input).context("Failed to load workout plan")?;
    let tts = config.tts.to_spec()?;

    check_required_tools(config.audio_format, &tts)
        .context("A required external tool is missing")?;

    if cli.dry_run {
        println!("✓ Dry run validation successful:");
        println!("  Plan:      {} ({} exercises)", input.display(), config.exercises.len());
        println!("  Format:    {}", config.audio_format);
        println!("  Output:    {}", cli.output_dir.display());
        println!("  Tools:     available");
        return Ok(());
    }

    // First Ctrl+C cancels in-flight jobs, second one force-exits.
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            std::process::exit(1);
        }
        eprintln!("\nReceived Ctrl+C, cancelling... (press again to force quit)");
        handler_token.cancel();
    })
    .ok();

    let temp_dir = cli.temp_dir.unwrap_or_else(default_temp_dir);
    let tracks = assemble_tracks(&config);

    let engine = AudioEngine::new(
        Arc::new(SystemRunner),
        tts,
        config.audio_format,
        temp_dir,
        cli.output_dir.clone(),
    )?
    .with_progress(!cli.quiet);

    engine.batch_create(&cancel, &tracks).await?;

    info!(
        "Wrote {} tracks to {}",
        tracks.len(),
        cli.output_dir.display()
    );
    Ok(())
}
