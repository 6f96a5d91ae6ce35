//! Shared utility functions.

use tokio::task::spawn_blocking;
use uuid::Uuid;

use crate::{Error, Result};

/// Run a blocking closure off the async runtime's worker threads.
pub async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(f)
        .await
        .map_err(|e| Error::TaskJoin(e.to_string()))?
}

/// Generate a short opaque identifier: 6 lowercase hex characters
/// drawn from a fresh v4 UUID.
pub fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..6].to_lowercase()
}

/// Truncate a description to its first `n` words, appending an ellipsis
/// when anything was cut. Used for compact log lines.
pub fn truncate_words(text: &str, n: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() > n {
        format!("{}...", words[..n].join(" "))
    } else {
        words.join(" ")
    }
}
