/// Returns the offset immediately following the codepoint that begins at
/// `at` in `haystack`.
///
/// This is how a search is forced past an empty match: it must advance by
/// one whole codepoint, never by a single byte, or else the next search could
/// start in the middle of a UTF-8 encoded codepoint.
///
/// This returns `None` if and only if `at >= haystack.len()`.
#[inline(always)]
pub(crate) fn next_boundary(haystack: &str, at: usize) -> Option<usize> {
    let ch = haystack.get(at..)?.chars().next()?;
    Some(at + ch.len_utf8())
}

/// Returns a prefix of `text` containing at most `limit` codepoints. If any
/// codepoints were dropped, an ellipsis is appended.
pub(crate) fn preview(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        None => text.to_string(),
        Some((i, _)) => {
            let mut s = String::with_capacity(i + 3);
            s.push_str(&text[..i]);
            s.push_str("...");
            s
        }
    }
}
