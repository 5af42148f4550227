use tokio::sync::mpsc::Sender;

use crate::pipeline::cancel::CancelToken;

/// Outcome of a cancellable send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The item was accepted into the channel buffer and counts as delivered.
    Sent,
    /// Cancellation won the race; the item was dropped.
    Cancelled,
    /// The receiving side is gone.
    Closed,
}

/// Sends `item` unless `cancel` fires first.
///
/// A slot is reserved before the item is moved into the channel, so an
/// abandoned send never leaves a half-written item behind. Cancellation is
/// checked first when both are ready.
pub async fn send_or_cancel<T>(output: &Sender<T>, item: T, cancel: &CancelToken) -> Delivery {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Delivery::Cancelled,
        permit = output.reserve() => match permit {
            Ok(permit) => {
                permit.send(item);
                Delivery::Sent
            }
            Err(_) => Delivery::Closed,
        },
    }
}
