//! Event emission
//!
//! Drives one segmented upload through the pipeline and sends its events over a
//! bounded channel to the response writer:
//!
//! `INIT → SEGMENTED (count) → PROCESSING(0..total) → DONE (done)`
//!
//! Up to `region_concurrency` regions are in flight; completions are flushed in
//! index order. When the consumer goes away (channel closed or cancellation
//! token fired) the run stops, dropping any in-flight region work.

use super::{Pipeline, SegmentedUpload};
use futures::stream::{self, StreamExt};
use prodscan_common::PipelineEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

/// How an emitter run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// All events including `done` were delivered
    Completed { regions: usize },
    /// Consumer disconnected; `next_index` is the first region not delivered
    Cancelled { next_index: usize },
}

/// Handle to a running emitter
pub struct EventStream {
    pub events: mpsc::Receiver<PipelineEvent>,
    /// Cancelling stops the run; the HTTP body holds a drop guard of this token
    pub cancel: CancellationToken,
    pub task: JoinHandle<RunOutcome>,
}

/// Sequences events for one upload
pub struct StreamEmitter {
    pipeline: Arc<Pipeline>,
    tx: mpsc::Sender<PipelineEvent>,
    cancel: CancellationToken,
}

impl StreamEmitter {
    pub fn new(
        pipeline: Arc<Pipeline>,
        tx: mpsc::Sender<PipelineEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            tx,
            cancel,
        }
    }

    /// Spawn an emitter for `upload` on the runtime
    ///
    /// The task inherits the caller's tracing span.
    pub fn spawn(pipeline: Arc<Pipeline>, upload: SegmentedUpload) -> EventStream {
        let (tx, events) = mpsc::channel(pipeline.config().event_buffer.max(1));
        let cancel = CancellationToken::new();

        let emitter = StreamEmitter::new(pipeline, tx, cancel.clone());
        let task = tokio::spawn(emitter.run(upload).in_current_span());

        EventStream {
            events,
            cancel,
            task,
        }
    }

    pub async fn run(self, upload: SegmentedUpload) -> RunOutcome {
        let SegmentedUpload { image, regions, .. } = upload;
        let total = regions.len();

        if !self.emit(PipelineEvent::Count { total }).await {
            return self.cancelled(0);
        }

        let pipeline: &Pipeline = &self.pipeline;
        let image = &image;
        let concurrency = pipeline.config().region_concurrency.max(1);

        // `buffered` yields in input order even when later regions finish first
        let results = stream::iter(regions.into_iter().enumerate())
            .map(move |(index, region)| pipeline.process_region(image, index, region))
            .buffered(concurrency);
        tokio::pin!(results);

        let mut next_index = 0;
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.cancelled(next_index),
                event = results.next() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            debug!(index = next_index, kind = event.event_type(), "Emitting region event");
            if !self.emit(event).await {
                return self.cancelled(next_index);
            }
            next_index += 1;
        }

        if !self.emit(PipelineEvent::Done).await {
            return self.cancelled(total);
        }

        info!(regions = total, "Upload stream complete");
        RunOutcome::Completed { regions: total }
    }

    /// Send one event; false once the consumer is gone
    async fn emit(&self, event: PipelineEvent) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(event) => {
                if sent.is_err() {
                    self.cancel.cancel();
                }
                sent.is_ok()
            }
        }
    }

    fn cancelled(&self, next_index: usize) -> RunOutcome {
        info!(next_index, "Client disconnected, stopping upload stream");
        RunOutcome::Cancelled { next_index }
    }
}
