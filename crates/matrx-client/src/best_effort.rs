use std::future::Future;

use crate::error::Result;

/// Runs a non-critical read. A failure is logged at debug level and replaced
/// by `fallback`. Use this only where an empty state is acceptable (sync
/// status, proxy status, scraper availability); tool invocations and user
/// edits must propagate their errors instead.
pub async fn best_effort<T, F>(label: &str, fut: F, fallback: T) -> T
where
    F: Future<Output = Result<T>>,
{
    match fut.await {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!("Best-effort read '{}' failed: {}", label, e);
            fallback
        }
    }
}

/// [`best_effort`] with `T::default()` as the fallback.
pub async fn best_effort_default<T, F>(label: &str, fut: F) -> T
where
    T: Default,
    F: Future<Output = Result<T>>,
{
    best_effort(label, fut, T::default()).await
}
