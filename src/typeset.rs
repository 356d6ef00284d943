//! Bounded wait for an external math typesetting engine.
//!
//! The crate never typesets math itself: it leaves `$…$` and `$$…$$` in the
//! HTML for an engine the caller loads. Loading can hang (a script that never
//! arrives, a worker that never starts), so callers wait through these
//! helpers and render untypeset math when the engine is not ready in time.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::error::ArticleError;

/// Outcome of waiting for the typesetting engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Ready,
    /// Timed out or failed; math stays as source text.
    Unavailable,
}

impl EngineStatus {
    pub fn is_ready(self) -> bool {
        self == EngineStatus::Ready
    }
}

/// Await `loader` for at most `timeout`.
///
/// # Errors
///
/// [`ArticleError::Timeout`] if the loader does not finish in time,
/// [`ArticleError::EngineUnavailable`] if it fails.
pub async fn load_engine<F, E>(loader: F, timeout: Duration) -> Result<(), ArticleError>
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match tokio::time::timeout(timeout, loader).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ArticleError::EngineUnavailable(e.to_string())),
        Err(_) => Err(ArticleError::Timeout(timeout.as_millis() as u64)),
    }
}

/// Like [`load_engine`], but never fails: problems are logged and reported
/// as [`EngineStatus::Unavailable`].
pub async fn wait_for_engine<F, E>(loader: F, timeout: Duration) -> EngineStatus
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match load_engine(loader, timeout).await {
        Ok(()) => {
            tracing::debug!("typesetting engine ready");
            EngineStatus::Ready
        }
        Err(err) => {
            tracing::warn!(%err, "typesetting engine unavailable, math left as text");
            EngineStatus::Unavailable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParseOptions;

    #[tokio::test]
    async fn ready_engine() {
        let status = wait_for_engine(async { Ok::<(), String>(()) }, Duration::from_millis(100)).await;
        assert_eq!(status, EngineStatus::Ready);
        assert!(status.is_ready());
    }

    #[tokio::test]
    async fn failing_loader_is_unavailable() {
        let err = load_engine(async { Err::<(), _>("script blocked") }, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ArticleError::EngineUnavailable(ref m) if m == "script blocked"));

        let status = wait_for_engine(async { Err::<(), _>("script blocked") }, Duration::from_millis(100)).await;
        assert_eq!(status, EngineStatus::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_loader_times_out() {
        let hang = async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<(), String>(())
        };
        let err = load_engine(hang, Duration::from_millis(250)).await.unwrap_err();
        assert!(matches!(err, ArticleError::Timeout(250)));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_from_options() {
        let options = ParseOptions::default();
        let hang = std::future::pending::<Result<(), String>>();
        let status = wait_for_engine(hang, options.typeset_timeout()).await;
        assert_eq!(status, EngineStatus::Unavailable);
    }
}
