//! Utility functions

use serde::{Deserialize, Serialize};

/// Version information for the publisher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Longest slug kept before the timestamp suffix; the remote name limit is 64
const MAX_SLUG_LEN: usize = 50;

/// Build a unique content name from a title and a millisecond timestamp.
///
/// Runs of characters outside `[A-Za-z0-9_-]` become a single `_`.
pub fn content_name(title: &str, timestamp_millis: i64) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut in_run = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            slug.push(ch);
            in_run = false;
        } else if !in_run {
            slug.push('_');
            in_run = true;
        }
    }
    slug.truncate(MAX_SLUG_LEN);
    format!("{}-{}", slug, timestamp_millis)
}

/// Content name stamped with the current time
pub fn generate_content_name(title: &str) -> String {
    content_name(title, chrono::Utc::now().timestamp_millis())
}

/// Percent-encode each segment of a notebook server path.
///
/// The notebook server form-decodes the path it receives, so a literal `+`
/// or `%` has to be escaped to survive the trip.
pub fn encode_notebook_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            url::form_urlencoded::byte_serialize(segment.as_bytes()).collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("/")
}
