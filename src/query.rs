//! `:path` decomposition into a route path and ordered query parameters.

use thiserror::Error;

/// Hard cap on query parameters per request.
pub const MAX_QUERY_PARAMS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("query string has more than {max} parameters")]
    TooManyParams { max: usize },
}

/// A `:path` split at the first `?`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecomposedPath {
    pub path: String,
    pub params: Vec<(String, String)>,
}

/// Split `target` into path and raw query parameters.
///
/// Pairs are split on `&` and `=` only. Values are passed through as sent,
/// percent escapes and `+` included. Parameters keep their order and
/// duplicates; a pair without `=` has an empty value. Parameters with an
/// empty key are skipped with a warning.
pub fn decompose(target: &str) -> Result<DecomposedPath, QueryError> {
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    };

    let mut params = Vec::new();
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key.is_empty() {
            tracing::warn!(path = %target, "Query parameter without a key");
            continue;
        }
        if params.len() == MAX_QUERY_PARAMS {
            return Err(QueryError::TooManyParams {
                max: MAX_QUERY_PARAMS,
            });
        }
        params.push((key.to_string(), value.to_string()));
    }

    Ok(DecomposedPath {
        path: path.to_string(),
        params,
    })
}
