//! End-to-end tests of the batch engine against a recording fake runner.
//!
//! The fake stands in for sox/ffmpeg/espeak-ng: it records every command
//! line and creates the files the real tools would have written, so cache
//! hits and re-runs behave exactly like production.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use traincue::audio::{
    AudioEngine, Format, Segment, ToolRunner, Track, TtsEngine, TtsSpec, PLAYLIST_NAME,
};
use traincue::{Result, TraincueError};

struct RecordingRunner {
    calls: Mutex<Vec<String>>,
    dirs: Vec<PathBuf>,
    measured_secs: f64,
}

impl RecordingRunner {
    fn new(dirs: &[&Path], measured_secs: f64) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            dirs: dirs.iter().map(|d| d.to_path_buf()).collect(),
            measured_secs,
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolRunner for RecordingRunner {
    async fn run(
        &self,
        _cancel: &CancellationToken,
        program: &str,
        args: &[String],
    ) -> Result<Vec<u8>> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", program, args.join(" ")));

        if args.first().map(String::as_str) == Some("--i") {
            return Ok(format!("{:.6}\n", self.measured_secs).into_bytes());
        }

        // Touch every argument that points into one of the working
        // directories; the real tools would have produced those files.
        for arg in args {
            let path = Path::new(arg);
            if self.dirs.iter().any(|dir| path.starts_with(dir)) {
                fs::write(path, b"fake audio").map_err(TraincueError::Io)?;
            }
        }
        Ok(Vec::new())
    }
}

fn espeak() -> TtsSpec {
    TtsSpec {
        engine: TtsEngine::EspeakNg,
        voice: "en-GB".to_string(),
    }
}

fn output_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn assert_fingerprinted_name(name: &str) {
    let (stem, ext) = name.rsplit_once('.').expect("extension");
    assert!(!ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    let fingerprint: String = stem.chars().rev().take(7).collect();
    assert_eq!(fingerprint.chars().count(), 7, "short stem in {name}");
    assert!(
        fingerprint.chars().all(|c| c.is_ascii_hexdigit()),
        "no fingerprint in {name}"
    );
    assert_eq!(stem.chars().rev().nth(7), Some('-'), "no separator in {name}");
}

#[tokio::test]
async fn silence_only_track_runs_sox_then_ffmpeg() {
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let runner = Arc::new(RecordingRunner::new(&[temp.path(), out.path()], 1.0));

    let engine = AudioEngine::new(
        runner.clone(),
        espeak(),
        Format::Mp3,
        temp.path().to_path_buf(),
        out.path().to_path_buf(),
    )
    .unwrap();

    let tracks = vec![Track::new(
        "my-file",
        vec![Segment::silence(Duration::from_secs(1))],
    )];
    let cancel = CancellationToken::new();
    engine.batch_create(&cancel, &tracks).await.unwrap();

    let calls = runner.calls();
    assert_eq!(calls.len(), 2, "calls: {calls:#?}");

    assert!(
        calls[0].starts_with(&format!(
            "sox -n -r 22050 {}/silence_1s-",
            temp.path().display()
        )),
        "unexpected: {}",
        calls[0]
    );
    assert!(calls[0].ends_with(" trim 0.0 1.00"));

    let silence_path = calls[0]
        .split_whitespace()
        .nth(4)
        .expect("silence output path");
    assert!(
        calls[1].starts_with(&format!("ffmpeg -i {silence_path} -ab 256k -ar 44100 -ac 2 ")),
        "unexpected: {}",
        calls[1]
    );
    assert!(calls[1].contains(&format!("{}/my-file-", out.path().display())));
    assert!(calls[1].ends_with(".mp3"));

    // Output directory holds exactly the artifact and the playlist.
    let names = output_files(out.path());
    assert_eq!(names.len(), 2);
    let artifact = names.iter().find(|n| n.ends_with(".mp3")).unwrap();
    assert_fingerprinted_name(artifact);

    let playlist = fs::read_to_string(out.path().join(PLAYLIST_NAME)).unwrap();
    let abs = std::path::absolute(out.path().join(artifact)).unwrap();
    assert_eq!(
        playlist,
        format!("#EXTM3U\n#EXTINF:1,{artifact}\nfile://{}\n", abs.display())
    );
}

#[tokio::test]
async fn shared_text_is_synthesized_once() {
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let runner = Arc::new(RecordingRunner::new(&[temp.path(), out.path()], 1.0));

    let engine = AudioEngine::new(
        runner.clone(),
        espeak(),
        Format::Mp3,
        temp.path().to_path_buf(),
        out.path().to_path_buf(),
    )
    .unwrap();

    let tracks = vec![
        Track::new("a", vec![Segment::text("hello")]),
        Track::new(
            "b",
            vec![
                Segment::text("hello"),
                Segment::silence(Duration::from_secs(1)),
            ],
        ),
    ];
    let cancel = CancellationToken::new();
    engine.batch_create(&cancel, &tracks).await.unwrap();

    let tts_calls: Vec<_> = runner
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("espeak-ng"))
        .collect();
    assert_eq!(tts_calls.len(), 1, "tts calls: {tts_calls:#?}");

    let artifacts: Vec<_> = output_files(out.path())
        .into_iter()
        .filter(|n| n.ends_with(".mp3"))
        .collect();
    assert_eq!(artifacts.len(), 2);
    assert!(artifacts[0].starts_with("a-"));
    assert!(artifacts[1].starts_with("b-"));
    assert_ne!(artifacts[0], artifacts[1]);
}

#[tokio::test]
async fn rerun_with_intact_artifacts_is_idempotent() {
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let runner = Arc::new(RecordingRunner::new(&[temp.path(), out.path()], 1.0));

    let tracks = vec![Track::new(
        "my-file",
        vec![Segment::silence(Duration::from_secs(1))],
    )];
    let cancel = CancellationToken::new();

    let engine = AudioEngine::new(
        runner.clone(),
        espeak(),
        Format::Mp3,
        temp.path().to_path_buf(),
        out.path().to_path_buf(),
    )
    .unwrap();
    engine.batch_create(&cancel, &tracks).await.unwrap();
    let first_calls = runner.calls().len();
    let first_files = output_files(out.path());

    // A fresh engine re-indexes the directories, as a new process would.
    let engine = AudioEngine::new(
        runner.clone(),
        espeak(),
        Format::Mp3,
        temp.path().to_path_buf(),
        out.path().to_path_buf(),
    )
    .unwrap();
    engine.batch_create(&cancel, &tracks).await.unwrap();

    assert_eq!(runner.calls().len(), first_calls, "no new tool invocations");
    assert_eq!(output_files(out.path()), first_files);
}

#[tokio::test]
async fn renamed_track_is_copied_from_matching_fingerprint() {
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let runner = Arc::new(RecordingRunner::new(&[temp.path(), out.path()], 1.0));
    let cancel = CancellationToken::new();

    let engine = AudioEngine::new(
        runner.clone(),
        espeak(),
        Format::Mp3,
        temp.path().to_path_buf(),
        out.path().to_path_buf(),
    )
    .unwrap();
    engine
        .batch_create(
            &cancel,
            &[Track::new(
                "my-file",
                vec![Segment::silence(Duration::from_secs(1))],
            )],
        )
        .await
        .unwrap();
    let calls_before = runner.calls().len();
    let old_artifact = output_files(out.path())
        .into_iter()
        .find(|n| n.ends_with(".mp3"))
        .unwrap();
    let fingerprint = old_artifact
        .trim_end_matches(".mp3")
        .rsplit('-')
        .next()
        .unwrap()
        .to_string();

    // Same content, new name: produced by copying, not by running tools.
    let engine = AudioEngine::new(
        runner.clone(),
        espeak(),
        Format::Mp3,
        temp.path().to_path_buf(),
        out.path().to_path_buf(),
    )
    .unwrap();
    engine
        .batch_create(
            &cancel,
            &[Track::new(
                "my-file-v2",
                vec![Segment::silence(Duration::from_secs(1))],
            )],
        )
        .await
        .unwrap();

    assert_eq!(runner.calls().len(), calls_before, "no new tool invocations");
    let names = output_files(out.path());
    assert!(names.contains(&format!("my-file-v2-{fingerprint}.mp3")));
    // The old name is no longer part of the run and was pruned.
    assert!(!names.contains(&old_artifact));
}

#[tokio::test]
async fn pruning_removes_unrelated_files() {
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::write(out.path().join("stale-0000000.mp3"), b"old").unwrap();
    let runner = Arc::new(RecordingRunner::new(&[temp.path(), out.path()], 1.0));

    let engine = AudioEngine::new(
        runner,
        espeak(),
        Format::Mp3,
        temp.path().to_path_buf(),
        out.path().to_path_buf(),
    )
    .unwrap();
    let cancel = CancellationToken::new();
    engine
        .batch_create(
            &cancel,
            &[Track::new(
                "keep",
                vec![Segment::silence(Duration::from_secs(2))],
            )],
        )
        .await
        .unwrap();

    let names = output_files(out.path());
    assert!(!names.iter().any(|n| n.starts_with("stale-")));
    assert_eq!(names.len(), 2); // artifact + playlist
}

#[tokio::test]
async fn wav_format_copies_the_body_into_place() {
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let runner = Arc::new(RecordingRunner::new(&[temp.path(), out.path()], 1.0));

    let engine = AudioEngine::new(
        runner.clone(),
        espeak(),
        Format::Wav,
        temp.path().to_path_buf(),
        out.path().to_path_buf(),
    )
    .unwrap();
    let cancel = CancellationToken::new();
    engine
        .batch_create(
            &cancel,
            &[Track::new(
                "plain",
                vec![Segment::silence(Duration::from_secs(1))],
            )],
        )
        .await
        .unwrap();

    // Only the silence synthesis ran; the conversion was a copy.
    assert_eq!(runner.calls().len(), 1);
    let names = output_files(out.path());
    let artifact = names.iter().find(|n| n.ends_with(".wav")).unwrap();
    assert!(artifact.starts_with("plain-"));
    assert_fingerprinted_name(artifact);
}

#[tokio::test]
async fn padded_sound_track_measures_and_extends() {
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    // Every measurement reports half a second, so a 2s target pads by 1.5s.
    let runner = Arc::new(RecordingRunner::new(&[temp.path(), out.path()], 0.5));

    let engine = AudioEngine::new(
        runner.clone(),
        espeak(),
        Format::Mp3,
        temp.path().to_path_buf(),
        out.path().to_path_buf(),
    )
    .unwrap();
    let cancel = CancellationToken::new();
    engine
        .batch_create(
            &cancel,
            &[Track::new(
                "cue",
                vec![Segment::sound(
                    traincue::audio::sounds::START_SOUND,
                    Duration::from_secs(2),
                )],
            )],
        )
        .await
        .unwrap();

    let calls = runner.calls();
    let pad_call = calls
        .iter()
        .find(|c| c.contains(" pad 0 "))
        .expect("pad invocation");
    assert!(pad_call.ends_with("pad 0 1.500000"), "got: {pad_call}");
    assert!(calls.iter().any(|c| c.starts_with("sox --i -D ")));
}

#[tokio::test]
async fn cancelled_run_reports_cancellation() {
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let runner = Arc::new(RecordingRunner::new(&[temp.path(), out.path()], 1.0));

    let engine = AudioEngine::new(
        runner,
        espeak(),
        Format::Mp3,
        temp.path().to_path_buf(),
        out.path().to_path_buf(),
    )
    .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine
        .batch_create(
            &cancel,
            &[Track::new(
                "never",
                vec![Segment::silence(Duration::from_secs(1))],
            )],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TraincueError::Cancelled));
}
