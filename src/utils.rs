use std::time::{SystemTime, UNIX_EPOCH};

pub fn get_current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub fn format_store_key(prefix: &str, key: &str) -> String {
    format!("{}:{}", prefix, key)
}

const TRUNCATION_MARKER: &str = "...";

/// Cut `value` down to at most `max_chars` characters, marker included.
pub fn truncate_snippet(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let marker_len = TRUNCATION_MARKER.len();
    if max_chars <= marker_len {
        return value.chars().take(max_chars).collect();
    }
    let mut out: String = value.chars().take(max_chars - marker_len).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}
