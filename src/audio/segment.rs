use std::time::Duration;

/// A node of the composition tree for one output track.
///
/// A zero duration means "natural length"; a positive duration is a target
/// the rendered audio is padded up to. Padding never truncates: a target
/// shorter than the natural length is a silent no-op.
#[derive(Debug, Clone)]
pub enum Segment {
    /// Spoken words. Empty text with a positive duration renders as silence.
    Text { text: String, duration: Duration },
    /// A bundled sound asset referenced by filename.
    Sound { name: String, duration: Duration },
    /// Pure silence; the duration must be positive.
    Silence { duration: Duration },
    /// An ordered sequence of child segments. A positive duration pads the
    /// concatenated children; an empty group collapses to silence.
    Group {
        segments: Vec<Segment>,
        duration: Duration,
    },
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            duration: Duration::ZERO,
        }
    }

    pub fn timed_text(text: impl Into<String>, duration: Duration) -> Self {
        Self::Text {
            text: text.into(),
            duration,
        }
    }

    pub fn sound(name: impl Into<String>, duration: Duration) -> Self {
        Self::Sound {
            name: name.into(),
            duration,
        }
    }

    pub fn silence(duration: Duration) -> Self {
        Self::Silence { duration }
    }

    pub fn group(segments: Vec<Segment>, duration: Duration) -> Self {
        Self::Group { segments, duration }
    }
}

/// One output artifact: a name and the segments composing it. The position
/// in the batch fixes the filename prefix; the name fixes the stem.
#[derive(Debug, Clone)]
pub struct Track {
    pub name: String,
    pub segments: Vec<Segment>,
}

impl Track {
    pub fn new(name: impl Into<String>, segments: Vec<Segment>) -> Self {
        Self {
            name: name.into(),
            segments,
        }
    }
}
