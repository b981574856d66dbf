//! Watch-stream plumbing between a subscription and an outbound transport.
//!
//! The transport itself (a streaming RPC, SSE, ...) lives outside this
//! crate and plugs in through [`UpdateSink`].

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_stream::Stream;

use crate::cache::Subscription;

impl<T: Send + 'static> Subscription<T> {
    /// Turns the subscription into a stream of events.
    ///
    /// The stream ends once the subscription is removed and drained.
    /// Dropping the stream unsubscribes.
    pub fn into_stream(mut self) -> impl Stream<Item = T> + Send + 'static {
        async_stream::stream! {
            while let Some(event) = self.recv().await {
                yield event;
            }
        }
    }
}

/// Outbound side of one watch connection.
#[async_trait]
pub trait UpdateSink<T>: Send {
    /// Hands one update to the transport.
    async fn send(&mut self, update: T) -> anyhow::Result<()>;
}

/// Why [`forward_updates`] returned.
#[derive(Debug)]
pub enum WatchEnd {
    /// The subscription was removed and its queue drained.
    Closed,
    /// The shutdown signal fired, or its sender was dropped.
    Shutdown,
    /// The transport rejected an update.
    Transport(anyhow::Error),
}

impl WatchEnd {
    pub fn is_transport_error(&self) -> bool {
        matches!(self, WatchEnd::Transport(_))
    }
}

/// Drains `subscription` into `sink` until the queue closes, the sink fails
/// or `shutdown` fires.
///
/// The subscription is released before returning, whatever the reason.
pub async fn forward_updates<T, S>(
    mut subscription: Subscription<T>,
    sink: &mut S,
    mut shutdown: broadcast::Receiver<()>,
) -> WatchEnd
where
    T: Send,
    S: UpdateSink<T> + ?Sized,
{
    let subscriber_id = subscription.id();
    tracing::debug!(%subscriber_id, "Watch started");

    let end = loop {
        let update = tokio::select! {
            update = subscription.recv() => update,
            _ = shutdown.recv() => break WatchEnd::Shutdown,
        };

        let Some(update) = update else {
            break WatchEnd::Closed;
        };

        if let Err(err) = sink.send(update).await {
            break WatchEnd::Transport(err);
        }
    };

    subscription.unsubscribe();

    match &end {
        WatchEnd::Transport(err) => {
            tracing::warn!(%subscriber_id, error = %err, "Watch ended: transport failed")
        }
        other => tracing::debug!(%subscriber_id, reason = ?other, "Watch ended"),
    }

    end
}
