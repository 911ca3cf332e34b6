//! Handler used by the command line tool
//!
//! Logs every group and optionally writes it to stdout as a JSON line.

use crate::pipeline::api::{HandlerError, MessageGroup, MessageHandler};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct LoggingHandler {
    echo: bool,
    handled: Arc<AtomicU64>,
    // Keeps concurrent invocations from interleaving their output lines
    stdout: Mutex<()>,
}

impl LoggingHandler {
    pub fn new(echo: bool) -> Self {
        Self {
            echo,
            ..Self::default()
        }
    }

    /// Shared count of groups handled so far
    pub fn handled(&self) -> Arc<AtomicU64> {
        self.handled.clone()
    }
}

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(
        &self,
        group: Arc<MessageGroup>,
        cancel: CancellationToken,
    ) -> Result<(), HandlerError> {
        if cancel.is_cancelled() {
            return Err("cancelled before processing".into());
        }

        log::info!(
            "{}: {} {} message(s)",
            group.label(),
            group.kind,
            group.len()
        );

        if self.echo {
            let mut line = serde_json::to_vec(group.as_ref())?;
            line.push(b'\n');
            let _guard = self.stdout.lock().await;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&line).await?;
            stdout.flush().await?;
        }

        self.handled.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::api::UpsertKind;

    fn group() -> Arc<MessageGroup> {
        Arc::new(MessageGroup::new(
            vec![serde_json::json!({"id": "m1"})],
            UpsertKind::Append,
        ))
    }

    #[tokio::test]
    async fn test_counts_handled_groups() {
        let handler = LoggingHandler::new(false);
        let handled = handler.handled();

        handler.handle(group(), CancellationToken::new()).await.unwrap();
        handler.handle(group(), CancellationToken::new()).await.unwrap();

        assert_eq!(handled.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_cancelled_attempt_is_refused() {
        let handler = LoggingHandler::new(false);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(handler.handle(group(), cancel).await.is_err());
        assert_eq!(handler.handled().load(Ordering::Relaxed), 0);
    }
}
