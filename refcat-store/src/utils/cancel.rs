//! Caller-driven cancellation
//!
//! Operations never impose their own timeout. The caller hands in a
//! [`CancellationToken`]; when it fires, the in-flight future is dropped,
//! which rolls back any open transaction, and the call reports
//! [`Error::Canceled`].

use refcat_common::{Error, Result};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Run `fut` until it completes or `cancel` fires, whichever comes first
pub async fn cancellable<F, T>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(Error::Canceled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!("Operation canceled by caller");
            Err(Error::Canceled)
        }
        res = fut => res,
    }
}
