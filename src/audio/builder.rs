//! Lowers composition trees into file-producing jobs.
//!
//! Every job is checked against the file cache before it enters the graph:
//! files already on disk contribute no nodes, equal-fingerprint files are
//! duplicated eagerly on this (single) thread, and only real misses are
//! scheduled with their dependency edges.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::audio::cache::{CacheStatus, FileCache};
use crate::audio::fingerprint::fmt_duration;
use crate::audio::format::Format;
use crate::audio::job::{AdaptivePadJob, CopyJob, ExecJob, FileOp, NoopJob, ToolRunner};
use crate::audio::segment::{Segment, Track};
use crate::audio::tts::TtsSpec;
use crate::dag::{Dag, Node};
use crate::error::{Result, TraincueError};

/// The terminal job of one track: the final artifact's basename and the
/// graph node whose result is reported for the track.
pub struct TerminalJob {
    pub filename: String,
    pub node: Arc<dyn Node<FileOp>>,
}

impl std::fmt::Debug for TerminalJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalJob")
            .field("filename", &self.filename)
            .field("node", &self.node.name())
            .finish()
    }
}

/// An intermediate wav: its basename in the temp directory, and the node
/// producing it when work was actually scheduled.
struct WavOut {
    file: String,
    node: Option<Arc<dyn Node<FileOp>>>,
}

pub struct JobBuilder<'a> {
    runner: Arc<dyn ToolRunner>,
    cache: &'a FileCache,
    tts: &'a TtsSpec,
    format: Format,
    temp_dir: &'a Path,
    output_dir: &'a Path,
}

impl<'a> JobBuilder<'a> {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        cache: &'a FileCache,
        tts: &'a TtsSpec,
        format: Format,
        temp_dir: &'a Path,
        output_dir: &'a Path,
    ) -> Self {
        Self {
            runner,
            cache,
            tts,
            format,
            temp_dir,
            output_dir,
        }
    }

    /// Lowers a whole track: one wav per segment, a concatenation when there
    /// is more than one, and the format conversion into the output directory.
    pub fn build_track(&self, dag: &mut Dag<FileOp>, track: &Track) -> Result<TerminalJob> {
        if track.segments.is_empty() {
            return Err(TraincueError::InvalidSegment(format!(
                "track '{}' has no segments",
                track.name
            )));
        }
        let body = self.build_wav_concat(dag, &track.segments)?;
        self.build_convert(dag, body, &track.name)
    }

    fn build_wav_concat(&self, dag: &mut Dag<FileOp>, segments: &[Segment]) -> Result<WavOut> {
        if segments.len() == 1 {
            return self.build_wav(dag, &segments[0]);
        }

        let outs = segments
            .iter()
            .map(|s| self.build_wav(dag, s))
            .collect::<Result<Vec<_>>>()?;

        let mut args: Vec<String> = outs
            .iter()
            .map(|o| self.temp_dir.join(&o.file).display().to_string())
            .collect();
        args.push(self.temp_dir.join("concat-<hash>.wav").display().to_string());

        let job = ExecJob::new(self.runner.clone(), "sox", args);
        let children = outs.into_iter().filter_map(|o| o.node).collect();
        self.schedule(dag, job, children)
    }

    fn build_wav(&self, dag: &mut Dag<FileOp>, segment: &Segment) -> Result<WavOut> {
        match segment {
            Segment::Sound { name, duration } => {
                // Assets are materialized into the temp dir at startup.
                let body = WavOut {
                    file: name.clone(),
                    node: None,
                };
                self.build_pad(dag, body, *duration)
            }
            Segment::Text { text, duration } => {
                if text.is_empty() {
                    if duration.is_zero() {
                        return Err(TraincueError::InvalidSegment(
                            "empty text requires a duration".to_string(),
                        ));
                    }
                    return self.build_silence(dag, *duration);
                }
                let spoken = self.build_tts(dag, text)?;
                self.build_pad(dag, spoken, *duration)
            }
            Segment::Silence { duration } => self.build_silence(dag, *duration),
            Segment::Group { segments, duration } => {
                if segments.is_empty() {
                    return self.build_silence(dag, *duration);
                }
                let body = self.build_wav_concat(dag, segments)?;
                self.build_pad(dag, body, *duration)
            }
        }
    }

    fn build_tts(&self, dag: &mut Dag<FileOp>, text: &str) -> Result<WavOut> {
        let job = self
            .tts
            .build_job(self.runner.clone(), self.temp_dir, text)?;
        self.schedule(dag, job, Vec::new())
    }

    fn build_silence(&self, dag: &mut Dag<FileOp>, duration: Duration) -> Result<WavOut> {
        if duration.is_zero() {
            return Err(TraincueError::InvalidSegment(
                "negative or zero duration for silence".to_string(),
            ));
        }
        let out = self
            .temp_dir
            .join(format!("silence_{}-<hash>.wav", fmt_duration(duration)));
        let job = ExecJob::new(
            self.runner.clone(),
            "sox",
            vec![
                "-n".to_string(),
                "-r".to_string(),
                "22050".to_string(),
                out.display().to_string(),
                "trim".to_string(),
                "0.0".to_string(),
                format!("{:.2}", duration.as_secs_f64()),
            ],
        );
        self.schedule(dag, job, Vec::new())
    }

    /// Chains an adaptive pad behind `input` when a target duration is
    /// requested. Whether padding actually happens is decided at run time
    /// from the measured input length.
    fn build_pad(&self, dag: &mut Dag<FileOp>, input: WavOut, target: Duration) -> Result<WavOut> {
        if target.is_zero() {
            return Ok(input);
        }
        let job = AdaptivePadJob::new(self.runner.clone(), self.temp_dir, &input.file, target);
        let children = input.node.into_iter().collect();
        self.schedule_pad(dag, job, children)
    }

    fn build_convert(
        &self,
        dag: &mut Dag<FileOp>,
        body: WavOut,
        name: &str,
    ) -> Result<TerminalJob> {
        let src = self.temp_dir.join(&body.file);
        let template = self
            .output_dir
            .join(format!("{name}-<hash>.{}", self.format.extension()));

        let (node, out_file): (Arc<dyn Node<FileOp>>, String) = match self.format {
            Format::Wav => {
                let job = CopyJob::new(src, &template);
                let out_file = job.out_file().to_string();
                (Arc::new(job), out_file)
            }
            Format::M4a => {
                let job = ExecJob::new(
                    self.runner.clone(),
                    "afconvert",
                    vec![
                        // m4af for macOS Music App compatibility; mp4f is not
                        // accepted there.
                        "--file".to_string(),
                        "m4af".to_string(),
                        "--data".to_string(),
                        "aac".to_string(),
                        "--quality".to_string(),
                        "127".to_string(),
                        "--strategy".to_string(),
                        "2".to_string(),
                        src.display().to_string(),
                        template.display().to_string(),
                    ],
                );
                let out_file = job.out_file().to_string();
                (Arc::new(job), out_file)
            }
            Format::Mp3 => {
                let job = ExecJob::new(
                    self.runner.clone(),
                    "ffmpeg",
                    vec![
                        "-i".to_string(),
                        src.display().to_string(),
                        "-ab".to_string(),
                        "256k".to_string(),
                        "-ar".to_string(),
                        "44100".to_string(),
                        "-ac".to_string(),
                        "2".to_string(),
                        template.display().to_string(),
                    ],
                );
                let out_file = job.out_file().to_string();
                (Arc::new(job), out_file)
            }
        };

        match self.cache.lookup(&out_file) {
            CacheStatus::Exists => {
                let noop: Arc<dyn Node<FileOp>> =
                    Arc::new(NoopJob::new(out_file.as_str(), FileOp::Skipped));
                dag.add_chain(std::slice::from_ref(&noop))?;
                Ok(TerminalJob {
                    filename: out_file,
                    node: noop,
                })
            }
            CacheStatus::Duplicate(cached) => {
                let dst = self.output_dir.join(&out_file);
                debug!(src = %cached.display(), dst = %dst.display(), "duplicating cached file");
                fs::copy(&cached, &dst)?;
                let noop: Arc<dyn Node<FileOp>> =
                    Arc::new(NoopJob::new(out_file.as_str(), FileOp::Copied));
                dag.add_chain(std::slice::from_ref(&noop))?;
                Ok(TerminalJob {
                    filename: out_file,
                    node: noop,
                })
            }
            CacheStatus::Miss => {
                match body.node {
                    Some(child) => dag.add_edge(node.clone(), child)?,
                    None => dag.add_chain(std::slice::from_ref(&node))?,
                }
                Ok(TerminalJob {
                    filename: out_file,
                    node,
                })
            }
        }
    }

    fn schedule(
        &self,
        dag: &mut Dag<FileOp>,
        job: ExecJob,
        children: Vec<Arc<dyn Node<FileOp>>>,
    ) -> Result<WavOut> {
        let out_file = job.out_file().to_string();
        self.schedule_node(dag, Arc::new(job), out_file, children)
    }

    fn schedule_pad(
        &self,
        dag: &mut Dag<FileOp>,
        job: AdaptivePadJob,
        children: Vec<Arc<dyn Node<FileOp>>>,
    ) -> Result<WavOut> {
        let out_file = job.out_file().to_string();
        self.schedule_node(dag, Arc::new(job), out_file, children)
    }

    /// Wraps a job with the cache decision: existing files short-circuit,
    /// equal-fingerprint files are copied to the desired name right away,
    /// and only misses enter the graph.
    fn schedule_node(
        &self,
        dag: &mut Dag<FileOp>,
        node: Arc<dyn Node<FileOp>>,
        out_file: String,
        children: Vec<Arc<dyn Node<FileOp>>>,
    ) -> Result<WavOut> {
        match self.cache.lookup(&out_file) {
            CacheStatus::Exists => Ok(WavOut {
                file: out_file,
                node: None,
            }),
            CacheStatus::Duplicate(cached) => {
                let dst = self.temp_dir.join(&out_file);
                debug!(src = %cached.display(), dst = %dst.display(), "duplicating cached file");
                fs::copy(&cached, &dst)?;
                Ok(WavOut {
                    file: out_file,
                    node: None,
                })
            }
            CacheStatus::Miss => {
                if children.is_empty() {
                    dag.add_chain(std::slice::from_ref(&node))?;
                } else {
                    for child in children {
                        dag.add_edge(node.clone(), child)?;
                    }
                }
                Ok(WavOut {
                    file: out_file,
                    node: Some(node),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::job::SystemRunner;
    use crate::audio::tts::TtsEngine;

    fn tts() -> TtsSpec {
        TtsSpec {
            engine: TtsEngine::EspeakNg,
            voice: "en-GB".to_string(),
        }
    }

    fn empty_cache() -> FileCache {
        let dir = tempfile::tempdir().unwrap();
        FileCache::index(&[dir.path()]).unwrap()
    }

    #[test]
    fn silence_requires_positive_duration() {
        let cache = empty_cache();
        let tts = tts();
        let temp = Path::new("/tmp/t");
        let out = Path::new("/tmp/o");
        let builder = JobBuilder::new(
            Arc::new(SystemRunner),
            &cache,
            &tts,
            Format::Mp3,
            temp,
            out,
        );

        let mut dag = Dag::new();
        let track = Track::new("bad", vec![Segment::silence(Duration::ZERO)]);
        let err = builder.build_track(&mut dag, &track).unwrap_err();
        assert!(matches!(err, TraincueError::InvalidSegment(_)));
    }

    #[test]
    fn empty_text_without_duration_is_invalid() {
        let cache = empty_cache();
        let tts = tts();
        let builder = JobBuilder::new(
            Arc::new(SystemRunner),
            &cache,
            &tts,
            Format::Mp3,
            Path::new("/tmp/t"),
            Path::new("/tmp/o"),
        );

        let mut dag = Dag::new();
        let track = Track::new("bad", vec![Segment::text("")]);
        let err = builder.build_track(&mut dag, &track).unwrap_err();
        assert!(matches!(err, TraincueError::InvalidSegment(_)));
    }

    #[test]
    fn empty_text_with_duration_becomes_silence() {
        let cache = empty_cache();
        let tts = tts();
        let builder = JobBuilder::new(
            Arc::new(SystemRunner),
            &cache,
            &tts,
            Format::Mp3,
            Path::new("/tmp/t"),
            Path::new("/tmp/o"),
        );

        let mut dag = Dag::new();
        let track = Track::new(
            "quiet",
            vec![Segment::timed_text("", Duration::from_secs(2))],
        );
        let terminal = builder.build_track(&mut dag, &track).unwrap();
        // silence job + convert job
        assert_eq!(dag.len(), 2);
        assert!(terminal.filename.starts_with("quiet-"));
        assert!(terminal.filename.ends_with(".mp3"));
    }

    #[test]
    fn empty_group_collapses_to_silence_of_its_duration() {
        let cache = empty_cache();
        let tts = tts();
        let builder = JobBuilder::new(
            Arc::new(SystemRunner),
            &cache,
            &tts,
            Format::Mp3,
            Path::new("/tmp/t"),
            Path::new("/tmp/o"),
        );

        let mut dag = Dag::new();
        let track = Track::new(
            "group",
            vec![Segment::group(Vec::new(), Duration::from_secs(3))],
        );
        builder.build_track(&mut dag, &track).unwrap();
        let dot = dag.to_string();
        assert!(dot.contains("silence_3s"));
    }

    #[test]
    fn shared_segments_are_scheduled_once() {
        let cache = empty_cache();
        let tts = tts();
        let builder = JobBuilder::new(
            Arc::new(SystemRunner),
            &cache,
            &tts,
            Format::Mp3,
            Path::new("/tmp/t"),
            Path::new("/tmp/o"),
        );

        let mut dag = Dag::new();
        let a = Track::new("a", vec![Segment::text("hello")]);
        let b = Track::new(
            "b",
            vec![Segment::text("hello"), Segment::silence(Duration::from_secs(1))],
        );
        builder.build_track(&mut dag, &a).unwrap();
        let before = dag.len();
        builder.build_track(&mut dag, &b).unwrap();
        // Track b adds silence, concat and its own convert, but reuses the
        // "hello" synthesis node.
        assert_eq!(dag.len(), before + 3);
    }

    #[test]
    fn timed_text_chains_adaptive_pad() {
        let cache = empty_cache();
        let tts = tts();
        let builder = JobBuilder::new(
            Arc::new(SystemRunner),
            &cache,
            &tts,
            Format::Mp3,
            Path::new("/tmp/t"),
            Path::new("/tmp/o"),
        );

        let mut dag = Dag::new();
        let track = Track::new(
            "timed",
            vec![Segment::timed_text("hello", Duration::from_secs(4))],
        );
        builder.build_track(&mut dag, &track).unwrap();
        let dot = dag.to_string();
        assert!(dot.contains("_extended-4s-"));
        // tts + pad + convert
        assert_eq!(dag.len(), 3);
    }
}
