//! JSON lines input
//!
//! Reads message groups one per line and feeds them to the pipeline. Blank
//! lines are ignored and malformed ones are logged and skipped. Reading
//! stops at end of input, when `stop` fires, or once the pipeline refuses
//! further submissions.

use crate::pipeline::api::{MessageGroup, Submitter};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

/// What happened to the input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSummary {
    pub lines: u64,
    pub submitted: u64,
    pub malformed: u64,
    /// The pipeline closed before the input was exhausted
    pub closed: bool,
}

pub async fn feed<R>(
    reader: R,
    submitter: &Submitter,
    stop: &CancellationToken,
) -> std::io::Result<FeedSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut summary = FeedSummary::default();

    loop {
        let line = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        summary.lines += 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let group = match serde_json::from_str::<MessageGroup>(line) {
            Ok(group) => group,
            Err(e) => {
                summary.malformed += 1;
                log::warn!("Skipping line {}: {}", summary.lines, e);
                continue;
            }
        };

        match submitter.submit_wait(group).await {
            Ok(sequence) => {
                summary.submitted += 1;
                log::trace!("Line {} submitted as group #{}", summary.lines, sequence);
            }
            Err(e) => {
                log::warn!("Line {} not submitted: {}", summary.lines, e);
                summary.closed = true;
                break;
            }
        }
    }

    Ok(summary)
}
