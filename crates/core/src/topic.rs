//! Topic naming: validation, derivation, and list parsing.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::limits::{MAX_TOPIC_NAME_LEN, TOPIC_NAME_PATTERN};

/// Compiled topic name regex (lazy initialization).
static TOPIC_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TOPIC_NAME_PATTERN).expect("invalid topic name pattern"));

/// Validates a single topic name.
///
/// Names must be 1-249 characters of `[A-Za-z0-9._-]`. The broker also
/// refuses `.` and `..`.
pub fn validate_topic_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::configuration("topic name must not be empty"));
    }

    if name.len() > MAX_TOPIC_NAME_LEN {
        return Err(Error::configuration(format!(
            "topic name is {} characters, exceeds {} limit",
            name.len(),
            MAX_TOPIC_NAME_LEN
        )));
    }

    if !TOPIC_NAME_REGEX.is_match(name) {
        return Err(Error::configuration(format!(
            "topic name {:?} contains characters outside [A-Za-z0-9._-]",
            name
        )));
    }

    if name == "." || name == ".." {
        return Err(Error::configuration(format!(
            "topic name {:?} is reserved",
            name
        )));
    }

    Ok(())
}

/// Validates an ordered topic list: non-empty, unique, every name valid.
pub fn validate_topic_list(topics: &[String]) -> Result<()> {
    if topics.is_empty() {
        return Err(Error::configuration("at least one topic is required"));
    }

    let mut seen = HashSet::with_capacity(topics.len());
    for topic in topics {
        validate_topic_name(topic)?;
        if !seen.insert(topic.as_str()) {
            return Err(Error::configuration(format!(
                "duplicate topic name {:?}",
                topic
            )));
        }
    }

    Ok(())
}

/// Derives the topic names owned by a service.
///
/// `topic_i = "<prefix>-service-<index>-topic-<i>"` for `i` in `[0, count)`.
pub fn derive_topic_names(prefix: &str, service_index: u32, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("{}-service-{}-topic-{}", prefix, service_index, i))
        .collect()
}

/// Parses a comma-separated topic list, trimming whitespace and dropping
/// empty entries.
pub fn parse_topic_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
