//! Speech synthesizer adapters.
//!
//! Three engines are supported: the macOS `say` tool, `espeak-ng`, and a
//! user-supplied command template with two positional placeholders,
//! `%[1]s` for the output path and `%[2]s` for the text.

use std::path::Path;
use std::sync::Arc;

use crate::audio::fingerprint::hash_short;
use crate::audio::job::{ExecJob, ToolRunner};
use crate::error::{Result, TraincueError};

pub const OUTPUT_PLACEHOLDER: &str = "%[1]s";
pub const TEXT_PLACEHOLDER: &str = "%[2]s";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsEngine {
    Say,
    EspeakNg,
    Custom,
}

/// Selected synthesizer plus its voice identifier. For `Custom`, `voice`
/// holds the command template.
#[derive(Debug, Clone)]
pub struct TtsSpec {
    pub engine: TtsEngine,
    pub voice: String,
}

impl TtsSpec {
    /// Builds the synthesis job for one piece of text. The output lands in
    /// `temp_dir` under a fingerprinted name.
    pub fn build_job(
        &self,
        runner: Arc<dyn ToolRunner>,
        temp_dir: &Path,
        text: &str,
    ) -> Result<ExecJob> {
        match self.engine {
            TtsEngine::Say => Ok(ExecJob::new(
                runner,
                "say",
                vec![
                    // LEF32@22050 is required for wav output from say;
                    // higher sample rates are not recommended.
                    "--data-format".to_string(),
                    "LEF32@22050".to_string(),
                    "--voice".to_string(),
                    self.voice.clone(),
                    "--output-file".to_string(),
                    temp_dir.join("say-<hash>.wav").display().to_string(),
                    text.to_string(),
                ],
            )),
            TtsEngine::EspeakNg => Ok(ExecJob::new(
                runner,
                "espeak-ng",
                vec![
                    "-v".to_string(),
                    self.voice.clone(),
                    "-w".to_string(),
                    temp_dir.join("espeak-ng-<hash>.wav").display().to_string(),
                    text.to_string(),
                ],
            )),
            TtsEngine::Custom => self.build_custom_job(runner, temp_dir, text),
        }
    }

    fn build_custom_job(
        &self,
        runner: Arc<dyn ToolRunner>,
        temp_dir: &Path,
        text: &str,
    ) -> Result<ExecJob> {
        let template = &self.voice;
        check_placeholder(template, OUTPUT_PLACEHOLDER)?;
        check_placeholder(template, TEXT_PLACEHOLDER)?;

        let fingerprint = hash_short(template, &[text]);
        let mut parts = template.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| TraincueError::Config("empty tts command template".to_string()))?
            .to_string();

        let stem = Path::new(&program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.clone());
        let out_file = format!("{stem}-{fingerprint}.wav");
        let out_path = temp_dir.join(&out_file).display().to_string();

        let args = parts
            .map(|part| {
                part.replace(OUTPUT_PLACEHOLDER, &out_path)
                    .replace(TEXT_PLACEHOLDER, text)
            })
            .collect();

        Ok(ExecJob::with_fingerprint(
            runner,
            &program,
            args,
            out_file,
            fingerprint,
        ))
    }
}

fn check_placeholder(template: &str, placeholder: &str) -> Result<()> {
    if !template.contains(placeholder) {
        return Err(TraincueError::Config(format!(
            "{template} does not contain {placeholder}"
        )));
    }
    Ok(())
}
