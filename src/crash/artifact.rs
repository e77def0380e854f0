// src/crash/artifact.rs

//! Crash artifact discovery and filename metadata.
//!
//! Artifacts follow the `{app}.{time}.{pid}.{unused}.{suffix}` naming
//! convention. Names that do not split into exactly five dot-separated
//! fields are still uploaded, with placeholder metadata.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Application name used when the filename does not follow the convention.
pub const UNKNOWN_APP: &str = "unknownApp";

const FIELD_COUNT: usize = 5;

/// Metadata recovered from an artifact filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashArtifact {
    pub app_name: String,
    /// Report time as it appears in the name (epoch seconds).
    pub report_time: String,
    pub pid: String,
    /// Fourth field; carried through without interpretation.
    pub unused: String,
    pub suffix: String,
}

impl CrashArtifact {
    /// Parse `filename`, falling back to [`UNKNOWN_APP`], `now_secs` and pid
    /// `0` when it does not have exactly five fields.
    pub fn parse(filename: &str, now_secs: u64) -> Self {
        let fields: Vec<&str> = filename
            .split('.')
            .filter(|tok| !tok.is_empty())
            .take(FIELD_COUNT)
            .collect();
        let field = |i: usize| fields.get(i).copied().unwrap_or_default().to_string();

        if fields.len() == FIELD_COUNT {
            Self {
                app_name: field(0),
                report_time: field(1),
                pid: field(2),
                unused: field(3),
                suffix: field(4),
            }
        } else {
            Self {
                app_name: UNKNOWN_APP.to_string(),
                report_time: now_secs.to_string(),
                pid: "0".to_string(),
                unused: field(3),
                suffix: field(4),
            }
        }
    }
}

/// Regular files directly under `dir` whose name ends with one of
/// `suffixes`, sorted by name.
///
/// A missing or unreadable directory yields nothing.
pub fn find_artifacts(dir: &Path, suffixes: &[String]) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "scan directory unavailable");
            return Vec::new();
        }
    };

    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "cannot read directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            suffixes.iter().any(|s| name.ends_with(s.as_str()))
        })
        .map(|entry| entry.path())
        .collect();
    found.sort();
    found
}
