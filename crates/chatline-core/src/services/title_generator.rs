use tracing::debug;

/// Longest title produced from a message
const MAX_TITLE_CHARS: usize = 50;

/// Truncate text to max length
fn truncate_text(text: &str, max_len: usize) -> String {
    text.chars().take(max_len).collect()
}

/// Clean a candidate title: strip quotes, keep the first line, collapse whitespace
pub fn clean_title(raw_title: &str) -> Option<String> {
    let first_line = raw_title.lines().find(|line| !line.trim().is_empty())?;
    let unquoted = first_line.trim().trim_matches('"').trim_matches('\'');

    let cleaned = unquoted.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

/// Derive a conversation title from the first user message.
///
/// Long text is cut at a word boundary and suffixed with an ellipsis.
/// Returns `None` if there is nothing usable (e.g. an image-only message).
pub fn derive_title(first_user_text: &str) -> Option<String> {
    let cleaned = clean_title(first_user_text)?;

    if cleaned.chars().count() <= MAX_TITLE_CHARS {
        return Some(cleaned);
    }

    let cut = truncate_text(&cleaned, MAX_TITLE_CHARS);
    let title = match cut.rfind(' ') {
        Some(space) if space > MAX_TITLE_CHARS / 2 => format!("{}...", &cut[..space]),
        _ => format!("{}...", cut),
    };

    debug!(title = %title, "Derived conversation title");
    Some(title)
}
