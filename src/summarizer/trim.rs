/// Cuts `text` to at most `max_chars` characters.
///
/// Prefers ending on the last `.`, `!` or `?` inside the limit, then on the
/// last space, and only hard-truncates when neither exists. A boundary at the
/// very first character does not count.
pub fn trim_to_sentence_boundary(text: &str, max_chars: usize) -> &str {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text;
    };
    let truncated = &text[..cut];

    match truncated.rfind(['.', '!', '?']) {
        Some(end) if end > 0 => &truncated[..=end],
        _ => match truncated.rfind(' ') {
            Some(space) if space > 0 => &truncated[..space],
            _ => truncated,
        },
    }
}
