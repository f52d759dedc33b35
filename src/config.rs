//! Workout plan configuration.
//!
//! The plan is a YAML file supplying the TTS engine, target format, spoken
//! texts (as templates over named placeholders) and the exercise list.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::audio::{Format, TtsEngine, TtsSpec};
use crate::error::{Result, TraincueError};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkoutConfig {
    pub tts: TtsConfig,
    #[serde(default)]
    pub audio_format: Format,
    pub i18n: I18n,
    #[serde(default)]
    pub before_workout_announce: Option<TextTemplate>,
    #[serde(default)]
    pub after_workout_announce: Option<TextTemplate>,
    pub pause: Announce,
    pub half_time: Announce,
    pub exercise_beginning: TextTemplate,
    pub exercises: Vec<Exercise>,
}

impl WorkoutConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(contents).map_err(|e| TraincueError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.tts.to_spec()?;
        if self.exercises.is_empty() {
            return Err(TraincueError::Config(
                "exercises must not be empty".to_string(),
            ));
        }
        for exercise in &self.exercises {
            exercise.validate()?;
        }
        Ok(())
    }
}

/// Returns the bundled example plan.
pub fn example() -> &'static str {
    include_str!("../assets/example.yaml")
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TtsConfig {
    #[serde(default)]
    pub say_voice: Option<String>,
    #[serde(default)]
    pub espeak_ng_voice: Option<String>,
    #[serde(default)]
    pub custom_command: Option<String>,
}

impl TtsConfig {
    pub fn to_spec(&self) -> Result<TtsSpec> {
        match (&self.say_voice, &self.espeak_ng_voice, &self.custom_command) {
            (Some(voice), None, None) => {
                if !cfg!(target_os = "macos") {
                    return Err(TraincueError::Config(
                        "tts.say_voice is only available on macOS".to_string(),
                    ));
                }
                Ok(TtsSpec {
                    engine: TtsEngine::Say,
                    voice: voice.clone(),
                })
            }
            (None, Some(voice), None) => Ok(TtsSpec {
                engine: TtsEngine::EspeakNg,
                voice: voice.clone(),
            }),
            (None, None, Some(command)) => Ok(TtsSpec {
                engine: TtsEngine::Custom,
                voice: command.clone(),
            }),
            _ => Err(TraincueError::Config(
                "set exactly one of tts.say_voice, tts.espeak_ng_voice or tts.custom_command"
                    .to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Announce {
    pub text: TextTemplate,
    #[serde(default, deserialize_with = "de_duration")]
    pub duration: Duration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Exercise {
    pub name: String,
    #[serde(deserialize_with = "de_duration")]
    pub duration: Duration,
    #[serde(default)]
    pub texts: Vec<String>,
    #[serde(default)]
    pub half_time: bool,
    #[serde(default, deserialize_with = "de_opt_duration")]
    pub pause_duration: Option<Duration>,
}

impl Exercise {
    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(TraincueError::Config(
                "exercise.name must not be empty".to_string(),
            ));
        }
        if self.duration.is_zero() {
            return Err(TraincueError::Config(format!(
                "exercise '{}' needs a positive duration",
                self.name
            )));
        }
        Ok(())
    }
}

/// Singular/plural word pair and joiner used to speak durations.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct I18n {
    pub and: String,
    pub second: Word,
    pub minute: Word,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Word {
    pub singular: String,
    pub plural: String,
}

impl I18n {
    pub fn duration_to_text(&self, d: Duration) -> String {
        let total_seconds = d.as_secs();
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;

        if minutes == 0 {
            return amount_and_unit(seconds, &self.second);
        }
        if seconds == 0 {
            return amount_and_unit(minutes, &self.minute);
        }
        format!(
            "{} {} {}",
            amount_and_unit(minutes, &self.minute),
            self.and,
            amount_and_unit(seconds, &self.second),
        )
    }
}

fn amount_and_unit(amount: u64, word: &Word) -> String {
    if amount == 1 {
        format!("1 {}", word.singular)
    } else {
        format!("{amount} {}", word.plural)
    }
}

/// Announcement text with `{placeholder}` substitution, validated at load.
#[derive(Debug, Clone)]
pub struct TextTemplate {
    raw: String,
}

pub const PLACEHOLDERS: &[&str] = &[
    "exercise_count",
    "workout_duration",
    "workout_duration_without_pauses",
    "exercise_duration",
    "exercise_name",
];

#[derive(Debug, Clone, Default)]
pub struct TemplateValues {
    pub exercise_count: usize,
    pub workout_duration: String,
    pub workout_duration_without_pauses: String,
    pub exercise_duration: String,
    pub exercise_name: String,
}

impl TextTemplate {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(TraincueError::Config("empty template string".to_string()));
        }
        validate_placeholders(&raw).map_err(TraincueError::Config)?;
        Ok(Self { raw })
    }

    pub fn render(&self, values: &TemplateValues) -> String {
        self.raw
            .replace("{exercise_count}", &values.exercise_count.to_string())
            .replace("{workout_duration}", &values.workout_duration)
            .replace(
                "{workout_duration_without_pauses}",
                &values.workout_duration_without_pauses,
            )
            .replace("{exercise_duration}", &values.exercise_duration)
            .replace("{exercise_name}", &values.exercise_name)
    }
}

fn validate_placeholders(raw: &str) -> std::result::Result<(), String> {
    let mut rest = raw;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            return Err(format!("unterminated placeholder in '{raw}'"));
        };
        let token = &after[..end];
        if !PLACEHOLDERS.contains(&token) {
            return Err(format!("unknown placeholder '{{{token}}}' in '{raw}'"));
        }
        rest = &after[end + 1..];
    }
    Ok(())
}

impl<'de> Deserialize<'de> for TextTemplate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TextTemplate::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Parses compact unit durations: `500ms`, `30s`, `1m30s`, `1.5s`, `1h`.
fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    let mut total = Duration::ZERO;
    let mut number = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
            continue;
        }
        let mut unit = String::from(c);
        while let Some(&next) = chars.peek() {
            if next.is_ascii_alphabetic() {
                unit.push(next);
                chars.next();
            } else {
                break;
            }
        }
        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid number in duration '{s}'"))?;
        number.clear();
        let seconds = match unit.as_str() {
            "ms" => value / 1000.0,
            "s" => value,
            "m" => value * 60.0,
            "h" => value * 3600.0,
            _ => return Err(format!("unknown unit '{unit}' in duration '{s}'")),
        };
        total += Duration::from_secs_f64(seconds);
    }
    if !number.is_empty() {
        return Err(format!("missing unit in duration '{s}'"));
    }
    Ok(total)
}

fn de_duration<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Duration, D::Error> {
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

fn de_opt_duration<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Duration>, D::Error> {
    let s = Option::<String>::deserialize(deserializer)?;
    s.map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}
