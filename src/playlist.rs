//! Extended M3U playlist writing.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use unicode_normalization::UnicodeNormalization;

struct Item {
    abs_path: PathBuf,
    duration: Duration,
}

#[derive(Default)]
pub struct Playlist {
    items: Vec<Item>,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, abs_path: PathBuf, duration: Duration) {
        self.items.push(Item { abs_path, duration });
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "#EXTM3U")?;
        for item in &self.items {
            let base = item
                .abs_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            writeln!(w, "#EXTINF:{},{}", item.duration.as_secs(), base)?;
            writeln!(w, "file://{}", escape(&item.abs_path.to_string_lossy()))?;
        }
        Ok(())
    }
}

/// Decomposes to NFD and percent-encodes every byte above 127 and the
/// percent sign itself. Some players only resolve `file://` URLs in this
/// form.
fn escape(input: &str) -> String {
    let decomposed: String = input.nfd().collect();
    let mut escaped = String::with_capacity(decomposed.len());
    for b in decomposed.bytes() {
        if b > 127 || b == b'%' {
            escaped.push_str(&format!("%{b:02X}"));
        } else {
            escaped.push(b as char);
        }
    }
    escaped
}
