use std::sync::Arc;

use devnet_block_api::{SyncBlock, log::FilterLog};
use devnet_primitives::{B256, U256};
use tokio::sync::mpsc;

/// Subscription event.
#[derive(Clone, Debug)]
pub struct SubscriptionEvent {
    /// ID of the subscription
    pub filter_id: U256,
    /// The event's payload
    pub result: SubscriptionEventData,
}

/// Subscription event data.
#[derive(Clone, Debug)]
pub enum SubscriptionEventData {
    /// Logs of a newly mined block that match the subscription's criteria
    Logs(Vec<FilterLog>),
    /// A newly mined block
    NewHeads(Arc<dyn SyncBlock>),
    /// Hash of a transaction that was added to the mempool
    NewPendingTransactions(B256),
}

/// Sending half of the channel that subscription events are written to.
pub type SubscriptionSender = mpsc::UnboundedSender<SubscriptionEvent>;

/// Receiving half of the channel that subscription events are written to.
pub type SubscriptionReceiver = mpsc::UnboundedReceiver<SubscriptionEvent>;

/// Creates a channel for subscription events.
pub fn subscription_channel() -> (SubscriptionSender, SubscriptionReceiver) {
    mpsc::unbounded_channel()
}
