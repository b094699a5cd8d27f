//! Extraction of tunnel metadata from forwarder logs.
//!
//! Logs are append-only and written concurrently by the forwarder, so both
//! readers here tolerate partial trailing lines and files that do not exist
//! yet.

use std::{
    fs::{self, File},
    io::{BufRead, BufReader},
    path::Path,
    sync::OnceLock,
};

use regex::Regex;

use crate::constants::PUBLIC_URL_PATTERN;

fn public_url_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(PUBLIC_URL_PATTERN).expect("public URL pattern is valid"))
}

/// Returns the publicly reachable URL advertised in a tunnel's log.
///
/// The forwarder logs a fresh hostname on every (re)connect, so the **last**
/// match wins. Returns `None` when the file is missing or holds no match.
pub fn extract_public_url(log_path: &Path) -> Option<String> {
    let bytes = fs::read(log_path).ok()?;
    let contents = String::from_utf8_lossy(&bytes);
    public_url_regex()
        .find_iter(&contents)
        .last()
        .map(|found| found.as_str().to_string())
}

/// Returns the last `lines` lines of a log file, or `None` when it is
/// missing.
pub fn tail(log_path: &Path, lines: usize) -> Option<Vec<String>> {
    let file = File::open(log_path).ok()?;
    let reader = BufReader::new(file);
    let all_lines: Vec<String> = reader.lines().map_while(Result::ok).collect();

    let start = all_lines.len().saturating_sub(lines);
    Some(all_lines[start..].to_vec())
}
