//! Deadline helper shared by probing and forwarding.

use std::future::Future;
use std::time::Duration;

/// Await `fut` for at most `limit`. Returns `None` when the deadline
/// expires before the future resolves.
pub async fn deadline<F: Future>(limit: Duration, fut: F) -> Option<F::Output> {
    tokio::time::timeout(limit, fut).await.ok()
}
