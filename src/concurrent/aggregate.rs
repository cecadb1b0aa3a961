//! Aggregation of keyed futures
//!
//! Waits for a whole batch of keyed futures and folds them into one map,
//! applying the partial-failure policy shared by every bulk operation.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use futures::future::join_all;

use crate::error::{CacheError, Result};

// == All ==
/// Waits for every future in `futures` and collects the successful values by key.
///
/// Only completes after every input completed.
/// - `fail_on_error == true`: any failure fails the aggregate with a
///   [`CacheError::Aggregate`] holding every error observed.
/// - `fail_on_error == false`: failed keys are left out of the map, unless
///   every input failed, in which case the aggregate error is returned.
///
/// An empty input resolves to an empty map.
pub async fn all<K, T, F>(fail_on_error: bool, futures: HashMap<K, F>) -> Result<HashMap<K, T>>
where
    K: Eq + Hash,
    F: Future<Output = Result<T>>,
{
    if futures.is_empty() {
        return Ok(HashMap::new());
    }

    let total = futures.len();
    let (keys, pending): (Vec<K>, Vec<F>) = futures.into_iter().unzip();
    let outcomes = join_all(pending).await;

    let mut values = HashMap::with_capacity(total);
    let mut errors = Vec::new();
    for (key, outcome) in keys.into_iter().zip(outcomes) {
        match outcome {
            Ok(value) => {
                values.insert(key, value);
            }
            Err(err) => errors.push(err),
        }
    }

    if !errors.is_empty() && (fail_on_error || errors.len() == total) {
        return Err(CacheError::Aggregate(errors));
    }

    Ok(values)
}

// == All Present ==
/// Same as [`all`] for futures of optional values; `None` results are left out.
///
/// A `None` counts as a success, so a batch of misses resolves to an empty map
/// rather than an error.
pub async fn all_present<K, T, F>(
    fail_on_error: bool,
    futures: HashMap<K, F>,
) -> Result<HashMap<K, T>>
where
    K: Eq + Hash,
    F: Future<Output = Result<Option<T>>>,
{
    let values = all(fail_on_error, futures).await?;
    Ok(values
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect())
}
