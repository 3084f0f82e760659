//! Search value extraction
//!
//! A search expression turns a document into an ordered list of strings.
//! Plain paths yield one string per match; `concat()` pairs the matches of
//! its sub-paths positionally.

use crate::resolve::resolve;
use jenrich_codec::Materializer;
use jenrich_format::{search_string, EnrichError, JsonEvent, Result, SearchExpression};
use serde_json::Value;
use tracing::debug;

/// Evaluate a search expression against an in-memory document
///
/// At least one search value is required.
pub fn evaluate_search(document: &Value, search: &SearchExpression) -> Result<Vec<String>> {
    let columns = search
        .paths()
        .iter()
        .map(|path| {
            resolve(document, path)
                .iter()
                .map(|node| search_string(&node.value))
                .collect()
        })
        .collect();
    finish_columns(search, columns)
}

/// Extract search values from an event stream in a single pass
///
/// Every path of the expression is collected concurrently by one
/// [`Materializer`].
pub fn extract_search_values<I>(events: I, search: &SearchExpression) -> Result<Vec<String>>
where
    I: IntoIterator<Item = Result<JsonEvent>>,
{
    let mut columns: Vec<Vec<String>> = vec![Vec::new(); search.paths().len()];
    for event in Materializer::new(events.into_iter(), search.paths().to_vec()) {
        if let JsonEvent::MaterializedValue { pattern, value, .. } = event? {
            if let Some(column) = columns.get_mut(pattern) {
                column.push(search_string(&value));
            }
        }
    }
    finish_columns(search, columns)
}

fn finish_columns(search: &SearchExpression, columns: Vec<Vec<String>>) -> Result<Vec<String>> {
    let values = match search {
        SearchExpression::Path(path) => {
            let values = columns.into_iter().next().unwrap_or_default();
            if values.is_empty() {
                return Err(EnrichError::Resolution {
                    expression: path.source().to_string(),
                });
            }
            values
        }
        SearchExpression::Concat(concat) => concat.join_columns(&columns)?,
    };
    debug!(
        expression = %search,
        count = values.len(),
        "extracted search values"
    );
    Ok(values)
}
