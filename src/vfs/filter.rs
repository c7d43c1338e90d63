//! Path filters applied while expanding directories.

use std::path::Path;

/// Check if a file is OS clutter (Finder, Explorer, desktop metadata)
pub fn is_os_hidden_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    match name {
        // macOS
        ".DS_Store" | ".AppleDouble" | ".LSOverride" => true,
        // Windows
        "Thumbs.db" | "ehthumbs.db" | "Desktop.ini" | "$RECYCLE.BIN" => true,
        // Linux
        ".directory" => true,
        // macOS resource forks, trash folders
        _ => name.starts_with("._") || name.starts_with(".Trash-"),
    }
}

/// Returns true if `path` found under `root` should be scheduled.
pub fn should_include(path: &Path, root: &Path, exclude_patterns: &[String]) -> bool {
    if path == root || is_os_hidden_file(path) {
        return false;
    }
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return true;
    };
    let path_str = path.to_str().unwrap_or("");
    !exclude_patterns
        .iter()
        .any(|pattern| glob_match(pattern, name) || glob_match(pattern, path_str))
}

/// Simple glob pattern matching (supports * and ?)
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.strip_prefix('!').unwrap_or(pattern).chars().collect();
    let text: Vec<char> = text.chars().collect();
    glob_match_chars(&pattern, &text)
}

fn glob_match_chars(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('*', rest)) => {
            // trailing * matches everything
            rest.is_empty() || (0..=text.len()).any(|i| glob_match_chars(rest, &text[i..]))
        }
        Some(('?', rest)) => !text.is_empty() && glob_match_chars(rest, &text[1..]),
        Some((c, rest)) => text.first() == Some(c) && glob_match_chars(rest, &text[1..]),
    }
}
