//! Cancellable refetch scheduling
//!
//! Every scheduled request captures a generation number. Scheduling a new
//! request bumps the generation and aborts the task in flight, so a late
//! result from an older request can never overwrite a newer one.

use crate::{
    types::{QualityId, RepresentationSet},
    Error, Result,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Provider of representation sets for an item
#[async_trait]
pub trait RepresentationSource: Send + Sync {
    /// Fetch the representation set for `item_key` at the requested quality
    async fn fetch(&self, item_key: &str, quality: QualityId) -> Result<RepresentationSet>;
}

/// Fetch the first non-empty representation set, trying `qualities` in order
pub async fn fetch_first_available(
    source: &dyn RepresentationSource,
    item_key: &str,
    qualities: &[QualityId],
) -> Result<RepresentationSet> {
    let mut last_error = Error::NoCachedData;

    for &quality in qualities {
        match source.fetch(item_key, quality).await {
            Ok(set) if !set.is_empty() => {
                debug!(item = %item_key, quality, "Representations fetched");
                return Ok(set);
            }
            Ok(_) => {
                debug!(item = %item_key, quality, "Empty representation set, trying next quality");
                last_error = Error::NoCachedData;
            }
            Err(e) => {
                warn!(item = %item_key, quality, error = %e, "Representation fetch failed");
                last_error = e;
            }
        }
    }

    Err(last_error)
}

/// Result of waiting on a scheduled request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    /// The request finished and is still the newest one
    Completed(T),
    /// A newer request (or a cancel) replaced this one
    Superseded { generation: u64 },
}

impl<T> RetryOutcome<T> {
    pub fn is_superseded(&self) -> bool {
        matches!(self, RetryOutcome::Superseded { .. })
    }

    /// Convert into a result, mapping supersession to [`Error::Superseded`]
    pub fn into_result(self) -> Result<T> {
        match self {
            RetryOutcome::Completed(value) => Ok(value),
            RetryOutcome::Superseded { generation } => {
                Err(Error::Superseded { current: generation })
            }
        }
    }
}

/// Handle to a scheduled request
pub struct RetryTicket<T> {
    generation: u64,
    current: Arc<AtomicU64>,
    rx: oneshot::Receiver<T>,
}

impl<T> RetryTicket<T> {
    /// Generation captured when the request was scheduled
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the request to finish
    pub async fn outcome(self) -> RetryOutcome<T> {
        let result = self.rx.await;
        let current = self.current.load(Ordering::SeqCst);

        match result {
            Ok(value) if current == self.generation => RetryOutcome::Completed(value),
            _ => {
                debug!(generation = self.generation, current, "Discarding superseded result");
                RetryOutcome::Superseded { generation: current }
            }
        }
    }
}

/// Runs at most one delayed request at a time
#[derive(Default)]
pub struct RetryScheduler {
    generation: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RetryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Run `request` after `delay`, superseding any request in flight.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, T>(&self, delay: Duration, request: F) -> RetryTicket<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = Arc::clone(&self.generation);
        let (tx, rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let value = request.await;

            if current.load(Ordering::SeqCst) == generation {
                let _ = tx.send(value);
            } else {
                debug!(generation, "Request finished after being superseded");
            }
        });

        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }

        debug!(generation, delay_ms = delay.as_millis() as u64, "Request scheduled");

        RetryTicket {
            generation,
            current: Arc::clone(&self.generation),
            rx,
        }
    }

    /// Abort the request in flight, if any
    pub fn cancel(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!(generation, "Scheduled request cancelled");
        }
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}
