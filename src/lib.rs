pub mod audio;
pub mod config;
pub mod dag;
pub mod error;
pub mod playlist;
pub mod workout;

pub use audio::{AudioEngine, Format, Segment, SystemRunner, ToolRunner, Track};
pub use config::WorkoutConfig;
pub use error::{Result, TraincueError};
pub use workout::assemble_tracks;
