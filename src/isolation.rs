//! Per-item failure isolation
//!
//! The scheduler and the consumer run one item at a time. Whatever one item
//! does, error or panic, the loop moves on to the next. [`run_isolated`] is the
//! boundary: it turns a panic into [`Error::Panicked`] so the caller sees an
//! ordinary per-item failure and can tell it apart from a failure of the loop.

use crate::error::{Error, Result};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Run one item's work, converting a panic into an error
pub async fn run_isolated<T, F>(item: &str, work: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            tracing::error!(item, panic = %message, "item panicked, continuing with next item");
            Err(Error::Panicked(message))
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ok_and_err_pass_through() {
        assert_eq!(run_isolated("a", async { Ok(5) }).await.unwrap(), 5);

        let err = run_isolated::<(), _>("b", async { Err(Error::Other("boom".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Other(_)));
    }

    #[tokio::test]
    async fn panic_becomes_error() {
        let explode = true;
        let err = run_isolated::<(), _>("c", async move {
            if explode {
                panic!("dataset exploded");
            }
            Ok(())
        })
        .await
        .unwrap_err();

        match err {
            Error::Panicked(message) => assert_eq!(message, "dataset exploded"),
            other => panic!("expected Panicked, got {other:?}"),
        }
    }
}
