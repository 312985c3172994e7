//! Bounded-concurrency batch collection.
//!
//! [`CollectionGateway`] is the boundary to whatever service knows about
//! applications. [`BatchCollector`] drives it: identifiers are split into
//! consecutive chunks of `batch_size`, chunks run strictly one after the
//! other, and lookups inside a chunk run concurrently behind one semaphore
//! of `max_concurrent` permits shared by the whole batch. The effective
//! number of lookups in flight therefore never exceeds
//! `min(batch_size, max_concurrent)`.
//!
//! A failed or panicking lookup only loses its own record.

#[cfg(feature = "http-client")]
pub mod http;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::Semaphore;

use crate::constants::{COLLECTING_END, COLLECTING_START};
use crate::types::{AppRecord, CollectionOutcome};

/// Source of application records.
///
/// Implementations must never fail past this boundary: timeouts, transport
/// errors and decode errors all become failed [`CollectionOutcome`]s.
/// Timeout and retry policy belong to the implementation.
#[async_trait]
pub trait CollectionGateway: Send + Sync {
    /// Looks up a single identifier.
    async fn fetch(&self, app_id: &str) -> CollectionOutcome;

    /// Looks up several identifiers, one outcome per input in input order.
    ///
    /// The default runs every lookup concurrently with no bound; the
    /// [`BatchCollector`] calls [`fetch`](Self::fetch) itself so that it can
    /// enforce its own bound.
    async fn fetch_batch(&self, app_ids: &[String]) -> Vec<CollectionOutcome> {
        join_all(app_ids.iter().map(|id| self.fetch(id))).await
    }

    /// Returns `true` if the backing service is reachable.
    async fn health_check(&self) -> bool;
}

/// Progress report emitted after each finished chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    /// Chunks finished so far, including this one.
    pub completed: usize,
    /// Total number of chunks.
    pub total: usize,
    /// Records collected so far.
    pub collected: usize,
    /// Lookups that failed so far.
    pub failed: usize,
}

impl ChunkProgress {
    /// Overall task progress for this point, inside the collecting sub-range.
    ///
    /// # Examples
    ///
    /// ```
    /// use archi_pipeline::collector::ChunkProgress;
    ///
    /// let halfway = ChunkProgress { completed: 1, total: 2, collected: 3, failed: 0 };
    /// assert!((halfway.stage_progress() - 0.2).abs() < 1e-9);
    /// ```
    pub fn stage_progress(&self) -> f64 {
        if self.total == 0 {
            return COLLECTING_END;
        }
        let fraction = self.completed as f64 / self.total as f64;
        COLLECTING_START + (COLLECTING_END - COLLECTING_START) * fraction
    }
}

/// Number of chunks `len` identifiers split into with chunks of `batch_size`.
pub fn chunk_count(len: usize, batch_size: usize) -> usize {
    len.div_ceil(batch_size.max(1))
}

/// Chunked, bounded fan-out over a [`CollectionGateway`].
#[derive(Clone)]
pub struct BatchCollector {
    gateway: Arc<dyn CollectionGateway>,
    batch_size: usize,
    max_concurrent: usize,
}

impl BatchCollector {
    /// Creates a collector. Zero sizes are treated as one.
    pub fn new(
        gateway: Arc<dyn CollectionGateway>,
        batch_size: usize,
        max_concurrent: usize,
    ) -> Self {
        Self {
            gateway,
            batch_size: batch_size.max(1),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// The gateway this collector drives.
    pub fn gateway(&self) -> &Arc<dyn CollectionGateway> {
        &self.gateway
    }

    /// Collects records for `app_ids`.
    ///
    /// `on_chunk` is called after every chunk. The returned records are
    /// those whose lookup succeeded, in no guaranteed order; an empty
    /// result means every lookup failed.
    pub async fn collect<F>(&self, app_ids: &[String], mut on_chunk: F) -> Vec<AppRecord>
    where
        F: FnMut(&ChunkProgress),
    {
        let total = chunk_count(app_ids.len(), self.batch_size);
        let limiter = Arc::new(Semaphore::new(self.max_concurrent));
        let mut records = Vec::with_capacity(app_ids.len());
        let mut failed = 0;

        for (index, chunk) in app_ids.chunks(self.batch_size).enumerate() {
            tracing::debug!(
                chunk = index + 1,
                total,
                size = chunk.len(),
                "collecting chunk"
            );
            let lookups = chunk
                .iter()
                .map(|app_id| self.fetch_guarded(Arc::clone(&limiter), app_id));

            for outcome in join_all(lookups).await {
                let app_id = outcome.app_id.clone();
                let error = outcome.error_message.clone();
                match outcome.into_record() {
                    Some(record) => records.push(record),
                    None => {
                        failed += 1;
                        tracing::warn!(
                            app_id = %app_id,
                            error = error.as_deref().unwrap_or("no record returned"),
                            "collection failed, skipping identifier"
                        );
                    },
                }
            }

            on_chunk(&ChunkProgress {
                completed: index + 1,
                total,
                collected: records.len(),
                failed,
            });
        }

        records
    }

    async fn fetch_guarded(&self, limiter: Arc<Semaphore>, app_id: &str) -> CollectionOutcome {
        let _permit = match limiter.acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                return CollectionOutcome::failed(app_id, format!("concurrency gate closed: {e}"))
            },
        };
        match AssertUnwindSafe(self.gateway.fetch(app_id)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => CollectionOutcome::failed(app_id, "collection lookup panicked"),
        }
    }
}

impl std::fmt::Debug for BatchCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCollector")
            .field("batch_size", &self.batch_size)
            .field("max_concurrent", &self.max_concurrent)
            .finish_non_exhaustive()
    }
}
