//! Turns a validated workout plan into the ordered track list.
//!
//! Per exercise this produces a pause track and an exercise track; the
//! optional plan-level announcements open and close the batch.

use std::time::Duration;

use crate::audio::{sounds, Segment, Track};
use crate::config::{TemplateValues, WorkoutConfig};

const START_SOUND_DUR: Duration = Duration::from_secs(2);
const EXERCISE_NAME_DUR: Duration = Duration::from_secs(4);
const COUNTDOWN_START: u64 = 5;

pub fn assemble_tracks(config: &WorkoutConfig) -> Vec<Track> {
    let (workout_dur, workout_dur_without_pauses) = workout_durations(config);
    let mut values = TemplateValues {
        exercise_count: config.exercises.len(),
        workout_duration: config.i18n.duration_to_text(workout_dur),
        workout_duration_without_pauses: config
            .i18n
            .duration_to_text(workout_dur_without_pauses),
        ..Default::default()
    };

    let countdown_dur = Duration::from_secs(COUNTDOWN_START);
    let countdown: Vec<Segment> = (1..=COUNTDOWN_START)
        .rev()
        .map(|i| Segment::timed_text(i.to_string(), Duration::from_secs(1)))
        .collect();

    let mut tracks = Vec::new();

    if let Some(announce) = &config.before_workout_announce {
        tracks.push(Track::new(
            "00-Before_Workout",
            vec![Segment::text(announce.render(&values))],
        ));
    }

    for (i, exercise) in config.exercises.iter().enumerate() {
        let ordinal = i + 1;
        values.exercise_duration = config.i18n.duration_to_text(exercise.duration);
        values.exercise_name = exercise.name.clone();

        // Pause before the exercise: start cue, announcement padded to fill
        // the pause up to the countdown, then the countdown.
        let pause_dur = exercise.pause_duration.unwrap_or(config.pause.duration);
        let pause_remainder = pause_dur.saturating_sub(START_SOUND_DUR + countdown_dur);
        let mut pause_segments = vec![
            Segment::sound(sounds::START_SOUND, START_SOUND_DUR),
            Segment::timed_text(config.pause.text.render(&values), pause_remainder),
        ];
        pause_segments.extend(countdown.iter().cloned());
        tracks.push(Track::new(format!("{ordinal:02}-0-Pause"), pause_segments));

        // The exercise itself: start cue and name, the exercise texts
        // stretched over the duration, then the countdown.
        let mut segments = vec![
            Segment::sound(sounds::START_SOUND, START_SOUND_DUR),
            Segment::timed_text(config.exercise_beginning.render(&values), EXERCISE_NAME_DUR),
        ];

        let mut texts = Vec::new();
        for text in &exercise.texts {
            texts.push(Segment::text(format!("{text}, ")));
            texts.push(Segment::silence(Duration::from_secs(1)));
        }

        if exercise.half_time {
            let half = exercise.duration / 2;
            segments.push(Segment::group(
                texts,
                half.saturating_sub(START_SOUND_DUR + EXERCISE_NAME_DUR),
            ));
            segments.push(Segment::timed_text(
                config.half_time.text.render(&values),
                config.half_time.duration,
            ));
            segments.push(Segment::sound(sounds::START_SOUND, Duration::from_secs(1)));
            segments.push(Segment::silence(
                half.saturating_sub(Duration::from_secs(1) + countdown_dur),
            ));
        } else {
            segments.push(Segment::group(
                texts,
                exercise
                    .duration
                    .saturating_sub(START_SOUND_DUR + EXERCISE_NAME_DUR + countdown_dur),
            ));
        }
        segments.extend(countdown.iter().cloned());
        tracks.push(Track::new(
            format!("{ordinal:02}-1-{}", sanitize_filename(&exercise.name)),
            segments,
        ));
    }

    if let Some(announce) = &config.after_workout_announce {
        tracks.push(Track::new(
            format!("{:02}-After_Workout", config.exercises.len() + 1),
            vec![
                Segment::sound(sounds::SUCCESS_SOUND, Duration::ZERO),
                Segment::text(announce.render(&values)),
            ],
        ));
    }

    tracks
}

fn workout_durations(config: &WorkoutConfig) -> (Duration, Duration) {
    let mut with_pauses = Duration::ZERO;
    let mut without_pauses = Duration::ZERO;
    for exercise in &config.exercises {
        let pause = exercise.pause_duration.unwrap_or(config.pause.duration);
        with_pauses += exercise.duration + pause;
        without_pauses += exercise.duration;
    }
    (with_pauses, without_pauses)
}

/// Maps filesystem-reserved characters to `_`, collapsing and trimming runs.
fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let mapped = match c {
            ' ' | '<' | '>' | ':' | '"' | '\\' | '/' | '|' | '?' | '*' => '_',
            other => other,
        };
        if mapped == '_' && out.ends_with('_') {
            continue;
        }
        out.push(mapped);
    }
    out.trim_matches('_').to_string()
}
