//! File-producing jobs and the subprocess seam they run through.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::audio::fingerprint::{fmt_duration, hash_short, replace_hash};
use crate::dag::Node;
use crate::error::{Result, TraincueError};

/// Narrow interface to the external audio tools. Returns the combined
/// stdout and stderr of the process.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[String],
    ) -> Result<Vec<u8>>;
}

/// Runs tools as real subprocesses. Nothing is written to stdin; the child
/// is killed when the ambient token is cancelled.
pub struct SystemRunner;

#[async_trait]
impl ToolRunner for SystemRunner {
    async fn run(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[String],
    ) -> Result<Vec<u8>> {
        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| tool_failure(program, args, e.to_string().as_bytes()))?;

        tokio::select! {
            _ = cancel.cancelled() => Err(TraincueError::Cancelled),
            output = child.wait_with_output() => {
                let output = output?;
                let mut combined = output.stdout;
                combined.extend_from_slice(&output.stderr);
                if !output.status.success() {
                    return Err(tool_failure(program, args, &combined));
                }
                Ok(combined)
            }
        }
    }
}

/// Builds a `ToolFailure` carrying the first line of the tool's output.
pub(crate) fn tool_failure(program: &str, args: &[String], output: &[u8]) -> TraincueError {
    let detail = String::from_utf8_lossy(output)
        .lines()
        .next()
        .unwrap_or_default()
        .to_string();
    TraincueError::ToolFailure {
        program: program.to_string(),
        args: args.join(" "),
        detail,
    }
}

/// Outcome of a job, as reported per track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    /// Nothing had to happen; the file was already in place.
    Noop,
    /// The tool ran and produced the file.
    Created,
    /// A file with the exact name existed before the run.
    Skipped,
    /// Produced by copying an equal-fingerprint file.
    Copied,
}

impl std::fmt::Display for FileOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FileOp::Noop => "noop",
            FileOp::Created => "created",
            FileOp::Skipped => "skipped",
            FileOp::Copied => "copied",
        })
    }
}

/// A tool invocation with a fixed argument vector. Exactly one argument
/// carries the `<hash>` placeholder naming the output file.
pub struct ExecJob {
    runner: Arc<dyn ToolRunner>,
    program: String,
    args: Vec<String>,
    out_file: String,
    fingerprint: String,
}

impl std::fmt::Debug for ExecJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecJob")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("out_file", &self.out_file)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl ExecJob {
    pub fn new(runner: Arc<dyn ToolRunner>, program: &str, args: Vec<String>) -> Self {
        let (args, out_file, fingerprint) = replace_hash(program, args);
        Self {
            runner,
            program: program.to_string(),
            args,
            out_file,
            fingerprint,
        }
    }

    /// For invocations whose output name is fixed up front, e.g. custom TTS
    /// command templates.
    pub fn with_fingerprint(
        runner: Arc<dyn ToolRunner>,
        program: &str,
        args: Vec<String>,
        out_file: String,
        fingerprint: String,
    ) -> Self {
        Self {
            runner,
            program: program.to_string(),
            args,
            out_file,
            fingerprint,
        }
    }

    pub fn out_file(&self) -> &str {
        &self.out_file
    }
}

#[async_trait]
impl Node<FileOp> for ExecJob {
    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }

    fn name(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }

    async fn run(&self, cancel: &CancellationToken, _inputs: &[FileOp]) -> Result<FileOp> {
        debug!(cmd = %self.name(), "execute");
        self.runner.run(cancel, &self.program, &self.args).await?;
        Ok(FileOp::Created)
    }
}

/// Copies an already-produced file to a new destination.
pub struct CopyJob {
    src: PathBuf,
    dst: PathBuf,
    out_file: String,
    fingerprint: String,
}

impl CopyJob {
    /// `dst_template` carries the `<hash>` placeholder; the fingerprint is
    /// derived from the source basename and the destination extension so it
    /// stays stable across directory moves and renames.
    pub fn new(src: PathBuf, dst_template: &Path) -> Self {
        let (args, out_file, fingerprint) = replace_hash(
            "copy",
            vec![
                src.display().to_string(),
                dst_template.display().to_string(),
            ],
        );
        let dst = dst_template
            .parent()
            .map(|p| p.join(&out_file))
            .unwrap_or_else(|| PathBuf::from(&args[1]));
        Self {
            src,
            dst,
            out_file,
            fingerprint,
        }
    }

    pub fn out_file(&self) -> &str {
        &self.out_file
    }
}

#[async_trait]
impl Node<FileOp> for CopyJob {
    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }

    fn name(&self) -> String {
        format!("copy {} {}", self.src.display(), self.dst.display())
    }

    async fn run(&self, _cancel: &CancellationToken, _inputs: &[FileOp]) -> Result<FileOp> {
        fs::copy(&self.src, &self.dst)?;
        Ok(FileOp::Copied)
    }
}

/// A declared output that needs no work; reports a predetermined outcome.
pub struct NoopJob {
    out_file: String,
    op: FileOp,
}

impl NoopJob {
    pub fn new(out_file: impl Into<String>, op: FileOp) -> Self {
        Self {
            out_file: out_file.into(),
            op,
        }
    }
}

#[async_trait]
impl Node<FileOp> for NoopJob {
    fn fingerprint(&self) -> String {
        hash_short::<&str>(&self.out_file, &[])
    }

    fn name(&self) -> String {
        self.out_file.clone()
    }

    async fn run(&self, _cancel: &CancellationToken, _inputs: &[FileOp]) -> Result<FileOp> {
        Ok(self.op)
    }
}

/// Pads a wav up to a target duration. The seconds to add are only known
/// once the input exists and has been measured, so the final argument is
/// computed at execution time; the fingerprint is derived statically from
/// the input basename and the requested duration.
pub struct AdaptivePadJob {
    runner: Arc<dyn ToolRunner>,
    input_path: PathBuf,
    padded_path: PathBuf,
    out_file: String,
    target: Duration,
    fingerprint: String,
}

impl AdaptivePadJob {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        temp_dir: &Path,
        input_file: &str,
        target: Duration,
    ) -> Self {
        let (stem, ext) = match input_file.rsplit_once('.') {
            Some((stem, ext)) => (stem, format!(".{ext}")),
            None => (input_file, String::new()),
        };
        let target_str = fmt_duration(target);
        let fingerprint = hash_short(
            "sox",
            &[input_file, ext.as_str(), "pad", "0", target_str.as_str()],
        );
        let out_file = format!("{stem}_extended-{target_str}-{fingerprint}{ext}");
        Self {
            runner,
            input_path: temp_dir.join(input_file),
            padded_path: temp_dir.join(&out_file),
            out_file,
            target,
            fingerprint,
        }
    }

    pub fn out_file(&self) -> &str {
        &self.out_file
    }

    async fn measure(&self, cancel: &CancellationToken) -> Result<f64> {
        let args = vec![
            "--i".to_string(),
            "-D".to_string(),
            self.input_path.display().to_string(),
        ];
        debug!(cmd = %format!("sox {}", args.join(" ")), "execute");
        let output = self.runner.run(cancel, "sox", &args).await?;
        let text = String::from_utf8_lossy(&output).into_owned();
        text.lines()
            .find_map(|line| line.trim().parse::<f64>().ok())
            .ok_or(TraincueError::ToolOutputUnparsable {
                program: "sox".to_string(),
                output: text,
            })
    }
}

#[async_trait]
impl Node<FileOp> for AdaptivePadJob {
    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }

    fn name(&self) -> String {
        format!(
            "sox {} {} pad 0",
            self.input_path.display(),
            self.padded_path.display()
        )
    }

    async fn run(&self, cancel: &CancellationToken, _inputs: &[FileOp]) -> Result<FileOp> {
        let measured = self.measure(cancel).await?;

        let add = self.target.as_secs_f64() - measured;
        if add <= 0.0 {
            fs::copy(&self.input_path, &self.padded_path)?;
            return Ok(FileOp::Noop);
        }

        let args = vec![
            self.input_path.display().to_string(),
            self.padded_path.display().to_string(),
            "pad".to_string(),
            "0".to_string(),
            format!("{add:.6}"),
        ];
        debug!(cmd = %format!("sox {}", args.join(" ")), "execute");
        self.runner.run(cancel, "sox", &args).await?;
        Ok(FileOp::Created)
    }
}
