pub mod builder;
pub mod cache;
pub mod engine;
pub mod fingerprint;
pub mod format;
pub mod job;
pub mod segment;
pub mod sounds;
pub mod tts;

pub use cache::{CacheStatus, FileCache};
pub use engine::{AudioEngine, PLAYLIST_NAME};
pub use format::Format;
pub use job::{FileOp, SystemRunner, ToolRunner};
pub use segment::{Segment, Track};
pub use tts::{TtsEngine, TtsSpec};

use crate::error::{Result, TraincueError};

/// Checks that an external tool is installed and runnable.
pub fn check_tool(program: &str, version_arg: &str) -> Result<()> {
    let output = std::process::Command::new(program)
        .arg(version_arg)
        .output()
        .map_err(|e| TraincueError::ToolFailure {
            program: program.to_string(),
            args: version_arg.to_string(),
            detail: format!("not found in PATH: {e}"),
        })?;
    if !output.status.success() {
        return Err(TraincueError::ToolFailure {
            program: program.to_string(),
            args: version_arg.to_string(),
            detail: String::from_utf8_lossy(&output.stderr)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string(),
        });
    }
    Ok(())
}

/// Checks the tools a plan actually needs: sox always, ffmpeg for mp3
/// output and espeak-ng when it is the selected synthesizer.
pub fn check_required_tools(format: Format, tts: &TtsSpec) -> Result<()> {
    check_tool("sox", "--version")?;
    if format == Format::Mp3 {
        check_tool("ffmpeg", "-version")?;
    }
    if tts.engine == TtsEngine::EspeakNg {
        check_tool("espeak-ng", "--version")?;
    }
    Ok(())
}
