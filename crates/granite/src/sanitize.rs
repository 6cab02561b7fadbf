//! Helpers for sanitizing user input before it reaches the filesystem,
//! tracing span attributes, or the job record shown to clients.

use std::path::Path;

/// Maximum length of a topic slug used in output directory names.
pub const MAX_SLUG_LEN: usize = 40;

/// Maximum length of an error message stored for display.
pub const MAX_DISPLAY_ERROR_LEN: usize = 500;

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields: reveals the file name without exposing the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Turns a free-text topic into a lowercase, dash-separated ASCII slug.
///
/// Runs of non-alphanumeric characters collapse into a single `-`, the result
/// is capped at [`MAX_SLUG_LEN`] characters, and an empty slug becomes `video`.
pub fn slugify(topic: &str) -> String {
    let mut slug = String::with_capacity(topic.len().min(MAX_SLUG_LEN));
    let mut pending_dash = false;

    for c in topic.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    let slug = slug.trim_end_matches('-').to_string();

    if slug.is_empty() {
        "video".to_string()
    } else {
        slug
    }
}

/// Sanitizes an uploaded file name so it can be joined onto a directory.
///
/// Drops any directory components and replaces characters outside
/// `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Truncates a message to at most `max_chars` characters, appending `...`
/// when anything was cut.
pub fn truncate_for_display(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let cut: String = message.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut)
}
