use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use crate::ingest::types::{IncomingTransaction, TransferEvent};
use crate::pipeline::{IngestPipeline, Origin};

use super::messages::FeedEvent;

/// Sending half: one queue per inbound event type.
#[derive(Clone)]
pub struct EventRouter {
    transactions: mpsc::UnboundedSender<IncomingTransaction>,
    token_transfers: mpsc::UnboundedSender<TransferEvent>,
    nft_transfers: mpsc::UnboundedSender<TransferEvent>,
}

/// Receiving half, consumed by the workers.
pub struct EventChannels {
    pub transactions: mpsc::UnboundedReceiver<IncomingTransaction>,
    pub token_transfers: mpsc::UnboundedReceiver<TransferEvent>,
    pub nft_transfers: mpsc::UnboundedReceiver<TransferEvent>,
}

pub fn event_channels() -> (EventRouter, EventChannels) {
    let (tx_send, tx_recv) = mpsc::unbounded_channel();
    let (token_send, token_recv) = mpsc::unbounded_channel();
    let (nft_send, nft_recv) = mpsc::unbounded_channel();

    (
        EventRouter {
            transactions: tx_send,
            token_transfers: token_send,
            nft_transfers: nft_send,
        },
        EventChannels {
            transactions: tx_recv,
            token_transfers: token_recv,
            nft_transfers: nft_recv,
        },
    )
}

impl EventRouter {
    /// Queue an event for its worker. Never blocks the feed reader.
    pub fn route(&self, event: FeedEvent) -> eyre::Result<()> {
        let kind = event.kind();
        let sent = match event {
            FeedEvent::Transaction(tx) => self.transactions.send(tx).is_ok(),
            FeedEvent::TokenTransfer(ev) => self.token_transfers.send(ev).is_ok(),
            FeedEvent::NftTransfer(ev) => self.nft_transfers.send(ev).is_ok(),
        };
        if sent {
            Ok(())
        } else {
            Err(eyre::eyre!("{} worker has stopped", kind))
        }
    }
}

/// Start one worker per queue. Workers exit once the router is dropped and
/// their queue is drained.
pub fn spawn_workers(channels: EventChannels, pipeline: Arc<IngestPipeline>, tracker: &TaskTracker) {
    tracker.spawn(run_worker(
        "transaction",
        channels.transactions,
        pipeline.clone(),
        tracker.clone(),
        |tx| tx,
    ));
    tracker.spawn(run_worker(
        "token_transfer",
        channels.token_transfers,
        pipeline.clone(),
        tracker.clone(),
        TransferEvent::into_token_transaction,
    ));
    tracker.spawn(run_worker(
        "nft_transfer",
        channels.nft_transfers,
        pipeline,
        tracker.clone(),
        TransferEvent::into_nft_transaction,
    ));
}

/// Pull events and process each as its own task, so a slow unit never holds up
/// the next one.
async fn run_worker<T, F>(
    kind: &'static str,
    mut queue: mpsc::UnboundedReceiver<T>,
    pipeline: Arc<IngestPipeline>,
    tracker: TaskTracker,
    normalize: F,
) where
    T: Send + 'static,
    F: Fn(T) -> IncomingTransaction + Send + 'static,
{
    while let Some(item) = queue.recv().await {
        let tx = normalize(item);
        let pipeline = pipeline.clone();
        tracker.spawn(async move {
            let hash = tx.hash.clone();
            match pipeline.ingest(tx, &Origin::Stream).await {
                Ok(outcome) => {
                    tracing::debug!(kind, hash = %hash, ?outcome, "Feed event processed");
                }
                Err(e) => {
                    tracing::error!(kind, hash = %hash, error = %e, "Failed to process feed event");
                }
            }
        });
    }
    tracing::debug!(kind, "Feed worker stopped");
}
