//! Bundled cue sounds, materialized into the temp directory at startup so
//! jobs can reference them like any other intermediate file.
//!
//! Assets are mono 22050 Hz wavs; their filenames carry a fingerprint of
//! the file content.

use std::fs;
use std::io;
use std::path::Path;

/// Short beep marking the start of an exercise or pause.
pub const START_SOUND: &str = "start-2257a45.wav";

/// Ascending chime played when the workout is done.
pub const SUCCESS_SOUND: &str = "success-06238ec.wav";

const SOUNDS: &[(&str, &[u8])] = &[
    (
        START_SOUND,
        include_bytes!("../../assets/sounds/start-2257a45.wav"),
    ),
    (
        SUCCESS_SOUND,
        include_bytes!("../../assets/sounds/success-06238ec.wav"),
    ),
];

pub fn materialize(dst_dir: &Path) -> io::Result<()> {
    for (name, data) in SOUNDS {
        fs::write(dst_dir.join(name), data)?;
    }
    Ok(())
}
