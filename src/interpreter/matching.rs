use crate::error::ScriptError;

/// Index of the single item matching `pattern`
///
/// Zero matches and several matches are both reported as no unique match, so a
/// vague title never acts on the wrong book.
pub fn unique_index<T>(
    items: &[T],
    pattern: &str,
    matches: impl Fn(&T, &str) -> bool,
) -> Result<usize, ScriptError> {
    let mut hits = items
        .iter()
        .enumerate()
        .filter(|(_, item)| matches(item, pattern))
        .map(|(i, _)| i);
    match (hits.next(), hits.count()) {
        (Some(index), 0) => Ok(index),
        (first, rest) => Err(ScriptError::NoUniqueMatch {
            pattern: pattern.to_string(),
            matches: usize::from(first.is_some()) + rest,
        }),
    }
}
