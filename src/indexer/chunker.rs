//! Fixed-size chunker: consecutive, non-overlapping character slices.

/// A surviving slice of a file's content.
///
/// `index` is the slice's ordinal position before empty slices are
/// filtered out, so gaps in the sequence mark whitespace-only regions of
/// the source. Spans derived from it (see [`line_span`]) are raw character
/// offsets, not exact line numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub index: usize,
    pub text: String,
}

/// Split `content` into consecutive slices of `size` characters (the last
/// may be shorter), trim each slice, and drop slices that end up empty.
pub fn chunk(content: &str, size: usize) -> Vec<Fragment> {
    if size == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = content.chars().collect();
    chars
        .chunks(size)
        .enumerate()
        .filter_map(|(index, slice)| {
            let text: String = slice.iter().collect();
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(Fragment {
                    index,
                    text: trimmed.to_string(),
                })
            }
        })
        .collect()
}

/// Span recorded for a fragment, derived from its pre-filter position.
pub fn line_span(index: usize, size: usize) -> (i64, i64) {
    ((index * size + 1) as i64, ((index + 1) * size) as i64)
}
