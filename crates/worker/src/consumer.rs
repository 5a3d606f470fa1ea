//! Consumer loop feeding broker deliveries into an [`EventPipeline`].
//!
//! Messages are handled strictly one at a time in delivery order. The
//! subscription acknowledges at receipt, so nothing here acks, nacks or
//! requeues: a failed run is logged, counted and forgotten.

use futures::{Stream, StreamExt};
use postmaster_events::{extract_token, BrokerError, DeliveryTransport, InboundMessage};
use postmaster_pipeline::{EventPipeline, Notification, TemplateStore};
use tokio_util::sync::CancellationToken;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Shutdown was requested.
    Cancelled,
    /// The broker stopped delivering (connection or channel closed).
    StreamClosed,
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub delivered: u64,
    pub failed: u64,
    /// Messages that never reached the pipeline (bad envelope, stream error).
    pub skipped: u64,
    pub exit: LoopExit,
}

pub struct ConsumerLoop<N, S, T> {
    pipeline: EventPipeline<N, S, T>,
}

impl<N, S, T> ConsumerLoop<N, S, T>
where
    N: Notification,
    S: TemplateStore,
    T: DeliveryTransport,
{
    pub fn new(pipeline: EventPipeline<N, S, T>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &EventPipeline<N, S, T> {
        &self.pipeline
    }

    /// Consume `deliveries` until the stream ends or `cancel` fires.
    ///
    /// Cancellation is observed between messages; a run that has already
    /// started is allowed to finish.
    pub async fn run<D>(&self, mut deliveries: D, cancel: CancellationToken) -> LoopSummary
    where
        D: Stream<Item = Result<InboundMessage, BrokerError>> + Unpin,
    {
        let routing_key = self.pipeline.routing_key();
        let mut delivered = 0u64;
        let mut failed = 0u64;
        let mut skipped = 0u64;

        tracing::info!(routing_key, "Consumer loop started");

        let exit = loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => break LoopExit::Cancelled,
                next = deliveries.next() => next,
            };

            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    skipped += 1;
                    tracing::warn!(routing_key, error = %e, "Broker delivery error");
                    continue;
                }
                None => break LoopExit::StreamClosed,
            };

            let token = match extract_token(&message.body) {
                Ok(token) => token,
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(
                        routing_key,
                        delivery_tag = message.delivery_tag,
                        error = %e,
                        "Skipping unreadable message"
                    );
                    continue;
                }
            };

            if message.redelivered {
                tracing::debug!(
                    routing_key,
                    delivery_tag = message.delivery_tag,
                    "Message was redelivered"
                );
            }

            // Outcome is logged by the pipeline itself.
            match self.pipeline.handle(&token).await {
                Ok(_) => delivered += 1,
                Err(_) => failed += 1,
            }
        };

        let summary = LoopSummary {
            delivered,
            failed,
            skipped,
            exit,
        };
        tracing::info!(
            routing_key,
            delivered,
            failed,
            skipped,
            exit = ?exit,
            "Consumer loop stopped"
        );
        summary
    }
}
