//! Advisory print statistics scraped from slicer output.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::domain::jobs::{PrintMetadata, UNKNOWN_METADATA};

static FILAMENT_MM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"; filament used \[mm\] = ([\d.]+)").expect("valid regex"));
static FILAMENT_PLAIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"; filament used = ([\d.]+)").expect("valid regex"));
static PRINT_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"; estimated printing time(?: \(normal mode\))? = ([\dA-Za-z \t]+)")
        .expect("valid regex")
});

/// Extract filament length and print time from slicer output text.
///
/// The first match of each pattern wins. Missing values are reported as `Unknown`.
pub fn extract_print_metadata(text: &str) -> PrintMetadata {
    let filament_used = FILAMENT_MM
        .captures(text)
        .or_else(|| FILAMENT_PLAIN.captures(text))
        .and_then(|captures| captures.get(1))
        .map(|length| format!("{}mm", length.as_str()))
        .unwrap_or_else(|| UNKNOWN_METADATA.to_string());

    let estimated_time = PRINT_TIME
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|time| time.as_str().trim().to_string())
        .filter(|time| !time.is_empty())
        .unwrap_or_else(|| UNKNOWN_METADATA.to_string());

    PrintMetadata {
        filament_used,
        estimated_time,
    }
}

/// Read a sliced file and extract its metadata. Unreadable files yield `Unknown`
/// values; metadata never fails a job.
pub async fn read_print_metadata(path: &Path) -> PrintMetadata {
    match tokio::fs::read(path).await {
        Ok(bytes) => extract_print_metadata(&String::from_utf8_lossy(&bytes)),
        Err(err) => {
            warn!(
                target = "application::pipeline::metadata",
                op = "metadata::read",
                result = "error",
                path = %path.display(),
                error = %err,
                "Failed to read sliced output for metadata"
            );
            PrintMetadata::unknown()
        }
    }
}
