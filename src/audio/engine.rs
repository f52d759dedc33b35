//! Drives one batch run: assemble all track jobs, execute the graph, write
//! the playlist and prune stale files from the output directory.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::info;
use unicode_normalization::UnicodeNormalization;

use crate::audio::builder::JobBuilder;
use crate::audio::cache::{list_files, FileCache};
use crate::audio::format::Format;
use crate::audio::job::{FileOp, ToolRunner};
use crate::audio::segment::Track;
use crate::audio::sounds;
use crate::audio::tts::TtsSpec;
use crate::dag::Dag;
use crate::error::Result;
use crate::playlist::Playlist;

pub const PLAYLIST_NAME: &str = "playlist.m3u";

pub struct AudioEngine {
    runner: Arc<dyn ToolRunner>,
    tts: TtsSpec,
    format: Format,
    temp_dir: PathBuf,
    output_dir: PathBuf,
    cache: FileCache,
    show_progress: bool,
}

impl AudioEngine {
    /// Prepares a run: creates the directories, materializes the bundled
    /// sounds and indexes the files already present.
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        tts: TtsSpec,
        format: Format,
        temp_dir: PathBuf,
        output_dir: PathBuf,
    ) -> Result<Self> {
        fs::create_dir_all(&temp_dir)?;
        fs::create_dir_all(&output_dir)?;
        sounds::materialize(&temp_dir)?;

        let cache = FileCache::index(&[temp_dir.as_path(), output_dir.as_path()])?;
        Ok(Self {
            runner,
            tts,
            format,
            temp_dir,
            output_dir,
            cache,
            show_progress: false,
        })
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Builds and executes the job graph for all tracks, streaming per-track
    /// outcomes in order, then writes the playlist and deletes every file in
    /// the output directory this run did not produce.
    pub async fn batch_create(&self, cancel: &CancellationToken, tracks: &[Track]) -> Result<()> {
        let mut dag = Dag::new();
        let builder = JobBuilder::new(
            self.runner.clone(),
            &self.cache,
            &self.tts,
            self.format,
            &self.temp_dir,
            &self.output_dir,
        );

        let playlist_path = self.output_dir.join(PLAYLIST_NAME);
        let mut keep = HashSet::new();
        keep.insert(nfc_path(&playlist_path));

        let mut playlist = Playlist::new();
        let mut terminals = Vec::with_capacity(tracks.len());
        for track in tracks {
            let terminal = builder.build_track(&mut dag, track)?;
            let path = self.output_dir.join(&terminal.filename);
            // TODO: measure the finished artifact for the real duration.
            playlist.add(std::path::absolute(&path)?, Duration::from_secs(1));
            keep.insert(nfc_path(&path));
            terminals.push(terminal);
        }

        let progress = self.show_progress.then(|| {
            let pb = ProgressBar::new(terminals.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} tracks")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        });

        let nodes: Vec<_> = terminals.iter().map(|t| t.node.clone()).collect();
        let mut results = dag.run(cancel, &nodes);
        let mut index = 0;
        while let Some(result) = results.next().await {
            let op: FileOp = result?;
            let path = self.output_dir.join(&terminals[index].filename);
            info!(path = %path.display(), "{op}");
            if let Some(pb) = &progress {
                pb.inc(1);
            }
            index += 1;
        }
        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        let mut file = fs::File::create(&playlist_path)?;
        playlist.write(&mut file)?;

        self.remove_other_files(&keep)
    }

    /// Deletes every top-level file in the output directory whose normalized
    /// path is not part of this run.
    fn remove_other_files(&self, keep: &HashSet<String>) -> Result<()> {
        for path in list_files(&self.output_dir)? {
            let normalized = nfc_path(&path);
            if !keep.contains(&normalized) {
                fs::remove_file(&path)?;
                info!(path = %normalized, "removed");
            }
        }
        Ok(())
    }
}

/// Paths are compared NFC-normalized; some tools write decomposed filenames.
fn nfc_path(path: &Path) -> String {
    path.to_string_lossy().nfc().collect()
}
