//! Per-asset states and the progress events emitted on every transition

use std::fmt;

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use tracing::{debug, info, warn};

use iwbridge_core::{AssetId, ErrorKind};

/// Lifecycle of one asset inside a batch
///
/// `Queued → Parsing → Converting → Committing → Done`, with `Failed` from
/// any state, `Skipped` from `Queued` and `Cancelled` at a stage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AssetState {
    Queued,
    Parsing,
    Converting,
    Committing,
    Done,
    Skipped { reason: SkipReason },
    Failed {
        kind: ErrorKind,
        message: String,
        /// Offending byte offset for container errors
        #[serde(skip_serializing_if = "Option::is_none")]
        offset: Option<u64>,
    },
    Cancelled,
}

impl AssetState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssetState::Done
                | AssetState::Skipped { .. }
                | AssetState::Failed { .. }
                | AssetState::Cancelled
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            AssetState::Queued => "queued",
            AssetState::Parsing => "parsing",
            AssetState::Converting => "converting",
            AssetState::Committing => "committing",
            AssetState::Done => "done",
            AssetState::Skipped { .. } => "skipped",
            AssetState::Failed { .. } => "failed",
            AssetState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AssetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The catalog records the same content hash
    Unchanged,
    /// The hash changed but the mismatch policy keeps the recorded artifacts
    KeptOnMismatch,
}

/// Discrete progress notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    BatchStarted {
        total: usize,
    },
    Transition {
        asset: AssetId,
        from: AssetState,
        to: AssetState,
    },
    Retrying {
        asset: AssetId,
        attempt: u32,
        delay_ms: u64,
        message: String,
    },
    BatchFinished {
        succeeded: usize,
        failed: usize,
        skipped: usize,
        cancelled: usize,
    },
}

/// Receives progress events; called from worker threads
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: &ProgressEvent) {}
}

/// Logs events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::BatchStarted { total } => info!(total, "Batch started"),
            ProgressEvent::Transition { asset, to, .. } => match to {
                AssetState::Failed {
                    kind,
                    message,
                    offset,
                } => warn!(asset = %asset, %kind, ?offset, %message, "Asset failed"),
                AssetState::Done | AssetState::Skipped { .. } | AssetState::Cancelled => {
                    info!(asset = %asset, state = %to, "Asset finished")
                }
                _ => debug!(asset = %asset, state = %to, "Asset transition"),
            },
            ProgressEvent::Retrying {
                asset,
                attempt,
                delay_ms,
                message,
            } => warn!(asset = %asset, attempt, delay_ms, %message, "Retrying commit"),
            ProgressEvent::BatchFinished {
                succeeded,
                failed,
                skipped,
                cancelled,
            } => info!(succeeded, failed, skipped, cancelled, "Batch finished"),
        }
    }
}

/// Forwards events over a crossbeam channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(sender: Sender<ProgressEvent>) -> Self {
        Self { sender }
    }

    /// Sink plus the receiving end of an unbounded channel
    pub fn unbounded() -> (Self, Receiver<ProgressEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: &ProgressEvent) {
        // A dropped receiver only means nobody is listening any more
        let _ = self.sender.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_delivers_in_order() {
        let (sink, rx) = ChannelSink::unbounded();
        sink.emit(&ProgressEvent::BatchStarted { total: 1 });
        sink.emit(&ProgressEvent::Transition {
            asset: AssetId::new("a"),
            from: AssetState::Queued,
            to: AssetState::Parsing,
        });
        assert_eq!(rx.try_recv().unwrap(), ProgressEvent::BatchStarted { total: 1 });
        assert!(matches!(rx.try_recv().unwrap(), ProgressEvent::Transition { .. }));
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (sink, rx) = ChannelSink::unbounded();
        drop(rx);
        sink.emit(&ProgressEvent::BatchStarted { total: 0 });
        TracingSink.emit(&ProgressEvent::BatchStarted { total: 0 });
    }

    #[test]
    fn test_event_json() {
        let event = ProgressEvent::Transition {
            asset: AssetId::new("a/b"),
            from: AssetState::Committing,
            to: AssetState::Failed {
                kind: ErrorKind::CatalogIo,
                message: "busy".into(),
                offset: None,
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "transition");
        assert_eq!(value["to"]["state"], "failed");
        assert_eq!(value["to"]["kind"], "catalog_io");
        assert!(value["to"].get("offset").is_none());
        assert!(AssetState::Done.is_terminal());
        assert!(!AssetState::Committing.is_terminal());
    }
}
