//! JSON-lines change source.
//!
//! Reads one change event per line (`{"path": "...", "kind": "CHANGED"}`)
//! and publishes it into a [`ChangeFeed`]. Blank lines are ignored; malformed
//! lines are logged and skipped so one bad producer cannot stall the feed.
//! When the feed's queue is full the reader delivers a batch itself before
//! publishing, so a backlog larger than the queue is never dropped.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use crate::feed::ChangeFeed;
use crate::invalidation::ChangeEvent;

use super::error::InfraError;

/// Counters for one pass over a change stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadSummary {
    pub lines: usize,
    pub published: usize,
    /// Events delivered while reading to make room in a full queue.
    pub delivered: usize,
    pub dropped: usize,
    pub malformed: usize,
}

/// Decode a single line; `Ok(None)` for blank lines.
pub fn decode_line(line_no: usize, line: &str) -> Result<Option<ChangeEvent>, InfraError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|err| InfraError::change_decode(line_no, err))
}

/// Read `reader` to the end, publishing every decoded event into `feed`.
///
/// A full queue is drained by delivering up to `batch_limit` events.
pub async fn read_changes<R>(
    reader: R,
    feed: &ChangeFeed,
    batch_limit: usize,
) -> Result<ReadSummary, InfraError>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = ReadSummary::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        summary.lines += 1;
        match decode_line(summary.lines, &line) {
            Ok(Some(event)) => {
                if feed.is_full() {
                    let delivered = feed.deliver(batch_limit.max(1)).await;
                    debug!(delivered, "Change queue full; delivered a batch before publishing");
                    summary.delivered += delivered;
                }
                if feed.publish(event) {
                    summary.published += 1;
                } else {
                    summary.dropped += 1;
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "Skipping malformed change event");
                summary.malformed += 1;
            }
        }
    }

    Ok(summary)
}
