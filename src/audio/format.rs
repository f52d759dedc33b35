use serde::{Deserialize, Serialize};

use crate::error::TraincueError;

/// Target format of the final track files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    M4a,
    Mp3,
    Wav,
}

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Format::M4a => "m4a",
            Format::Mp3 => "mp3",
            Format::Wav => "wav",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for Format {
    type Err = TraincueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "m4a" => Ok(Format::M4a),
            "mp3" => Ok(Format::Mp3),
            "wav" => Ok(Format::Wav),
            _ => Err(TraincueError::UnknownFormat(s.to_string())),
        }
    }
}
