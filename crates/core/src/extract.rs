// Field extraction helpers for reshaping upstream JSON

use crate::error::UpstreamError;

/// Collect numbered field pairs such as `strIngredient1`/`strMeasure1`.
///
/// Slots run from 1 to `max_slots`. `accessor` looks a field up by name. Slots
/// whose primary value is missing or blank are skipped; otherwise the output is
/// `"<primary> - <secondary>"`, or just the primary when the secondary is blank.
pub fn indexed_pairs<'a, F>(
    max_slots: usize,
    primary_prefix: &str,
    secondary_prefix: &str,
    accessor: F,
) -> Vec<String>
where
    F: Fn(&str) -> Option<&'a str>,
{
    (1..=max_slots)
        .filter_map(|slot| {
            let primary = accessor(&format!("{}{}", primary_prefix, slot))
                .map(str::trim)
                .filter(|value| !value.is_empty())?;

            let secondary = accessor(&format!("{}{}", secondary_prefix, slot))
                .map(str::trim)
                .unwrap_or_default();

            Some(if secondary.is_empty() {
                primary.to_string()
            } else {
                format!("{} - {}", primary, secondary)
            })
        })
        .collect()
}

/// Split multi-line text into trimmed, non-empty segments.
pub fn non_empty_lines(text: &str) -> Vec<String> {
    text.split(|c: char| c == '\n' || c == '\r')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Take the primary result, which upstream APIs put first in a collection.
///
/// `what` names the missing thing in the error.
pub fn first_or<T>(items: Option<Vec<T>>, what: &str) -> Result<T, UpstreamError> {
    items
        .and_then(|items| items.into_iter().next())
        .ok_or_else(|| UpstreamError::MissingResult(what.to_string()))
}
