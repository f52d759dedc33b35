//! Stable short fingerprints for tool invocations and artifacts.
//!
//! Output files are named `<stem>-<fingerprint>.<ext>`; the last seven
//! characters of the stem are reserved for the fingerprint.

use std::path::{Path, MAIN_SEPARATOR};
use std::time::Duration;

use sha2::{Digest, Sha256};

/// Placeholder in an argument that stands for the not-yet-known fingerprint.
pub const HASH_TOKEN: &str = "<hash>";

pub const FINGERPRINT_LEN: usize = 7;

/// Hashes a seed string followed by a deterministic encoding of the
/// auxiliary values into a 7-char lowercase hex fingerprint.
pub fn hash_short<S: AsRef<str>>(seed: &str, aux: &[S]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    for value in aux {
        let bytes = value.as_ref().as_bytes();
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// Replaces the `<hash>` placeholder in the one argument carrying it with the
/// fingerprint of the invocation. Returns the final argument vector, the
/// output file basename and the fingerprint.
pub fn replace_hash(program: &str, mut args: Vec<String>) -> (Vec<String>, String, String) {
    let fingerprint = hash_short(program, &args_base_path(&args));

    let idx = args
        .iter()
        .position(|arg| arg.contains(HASH_TOKEN))
        .expect("one argument must contain the <hash> placeholder");
    args[idx] = args[idx].replace(HASH_TOKEN, &fingerprint);
    let out_file = base_name(&args[idx]);

    (args, out_file, fingerprint)
}

/// Strips directory components so hashing is independent of where the temp
/// and output directories live. Arguments carrying the `<hash>` placeholder
/// reduce to their extension, since their name depends on the hash itself.
fn args_base_path(args: &[String]) -> Vec<String> {
    args.iter()
        .map(|arg| {
            if arg.contains(HASH_TOKEN) {
                extension_of(arg)
            } else if arg.contains(MAIN_SEPARATOR) || arg.contains('/') {
                base_name(arg)
            } else {
                arg.clone()
            }
        })
        .collect()
}

/// Extracts the fingerprint from a filename: the last seven characters of
/// the stem before the extension.
pub fn extract_fingerprint(filename: &str) -> String {
    let stem = filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(filename);
    let skip = stem.chars().count().saturating_sub(FINGERPRINT_LEN);
    stem.chars().skip(skip).collect()
}

fn base_name(arg: &str) -> String {
    Path::new(arg)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| arg.to_string())
}

/// The extension including the leading dot, or an empty string.
fn extension_of(arg: &str) -> String {
    Path::new(arg)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

/// Compact unit form used in generated filenames: `500ms`, `2s`, `1m30s`.
pub fn fmt_duration(d: Duration) -> String {
    let total_ms = d.as_millis();
    if total_ms == 0 {
        return "0s".to_string();
    }
    if total_ms < 1000 {
        return format!("{total_ms}ms");
    }

    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    let millis = d.subsec_millis();

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if millis > 0 {
        let frac = format!("{millis:03}");
        out.push_str(&format!("{secs}.{}s", frac.trim_end_matches('0')));
    } else {
        out.push_str(&format!("{secs}s"));
    }
    out
}
