use tokio::sync::mpsc;

use crate::pipeline::cancel::CancelToken;
use crate::pipeline::send::{send_or_cancel, Delivery};
use crate::pipeline::stage::Sequence;

/// Feeds `items` into a new sequence from one producer task.
///
/// The producer stops at the first of: iterator exhausted, `cancel` raised,
/// receiver dropped. `buffer` of zero is treated as one.
pub fn from_iter<I>(items: I, buffer: usize, cancel: &CancelToken) -> Sequence<I::Item>
where
    I: IntoIterator,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    let (output, rx) = mpsc::channel(buffer.max(1));
    let cancel = cancel.clone();
    let items = items.into_iter();

    tokio::spawn(async move {
        for item in items {
            match send_or_cancel(&output, item, &cancel).await {
                Delivery::Sent => {}
                Delivery::Cancelled => {
                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::DEBUG,
                        event = "stagepipe.cancelled",
                        stage = "source",
                        where_ = "send",
                        "stagepipe.cancelled"
                    );
                    break;
                }
                Delivery::Closed => {
                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::INFO,
                        event = "stagepipe.downstream.closed",
                        stage = "source",
                        "stagepipe.downstream.closed"
                    );
                    break;
                }
            }
        }
    });

    rx
}
