//! Text chunking and image-path scanning shared by chat adapters.

use std::path::{Path, PathBuf};

/// Recognized image extensions for attachment scanning.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Punctuation commonly wrapped around a path in prose.
const TRIM_CHARS: &[char] = &['"', '\'', '`', '(', ')', '[', ']', '<', '>', ',', ';', ':', '.'];

/// Split text into chunks no longer than `max_len` bytes.
///
/// Prefers paragraph boundaries, then line boundaries, then hard-cuts at
/// a char boundary. Platform adapters pick `max_len` from their message
/// size limits.
#[must_use]
pub fn chunk_text(text: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 || text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let hard_cut = floor_char_boundary(remaining, max_len);
        let split_at = find_split_point(remaining, hard_cut, "\n\n")
            .or_else(|| find_split_point(remaining, hard_cut, "\n"))
            .unwrap_or(hard_cut);

        let (chunk, rest) = remaining.split_at(split_at);
        chunks.push(chunk.to_string());
        remaining = rest.trim_start_matches('\n');
    }

    chunks
}

/// Find a split point by searching backwards from `boundary` for
/// `delimiter`. `boundary` must be a char boundary.
#[must_use]
pub fn find_split_point(text: &str, boundary: usize, delimiter: &str) -> Option<usize> {
    text[..boundary]
        .rfind(delimiter)
        .map(|pos| pos.saturating_add(delimiter.len()))
        .filter(|&pos| pos > 0 && pos < boundary)
}

/// Largest char boundary at or below `index`.
fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut boundary = index;
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary = boundary.saturating_sub(1);
    }
    boundary
}

/// Scan assistant text for referenced image files that exist on disk.
///
/// Accepts absolute paths, `~/`-prefixed paths, and paths relative to
/// the session working directory; only regular files with a recognized
/// image extension qualify. Each path is returned once.
#[must_use]
pub fn find_image_paths(text: &str, cwd: &Path, home: Option<&Path>) -> Vec<PathBuf> {
    let mut found = Vec::new();

    for raw in text.split_whitespace() {
        let token = raw.trim_matches(TRIM_CHARS);
        if token.is_empty() || !has_image_extension(token) {
            continue;
        }

        let candidate = if let Some(stripped) = token.strip_prefix("~/") {
            match home {
                Some(home) => home.join(stripped),
                None => continue,
            }
        } else if Path::new(token).is_absolute() {
            PathBuf::from(token)
        } else {
            cwd.join(token)
        };

        if candidate.is_file() && !found.contains(&candidate) {
            found.push(candidate);
        }
    }

    found
}

fn has_image_extension(token: &str) -> bool {
    Path::new(token)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}
