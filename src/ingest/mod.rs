// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! [`IngestPipeline`]: Adapter -> Pruner -> Validator -> bounded queue ->
//! single drain worker -> [`crate::Storage::write_event`].

mod adapter;
mod pruner;
mod validator;

pub use adapter::RawNotification;

use crate::config::StorageConfig;
use crate::error::Error;
use crate::event::ResourceEvent;
use crate::metrics::Metrics;
use crate::storage::Storage;
use crate::stop_signal::StopSignal;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Owns the ingest queue and its single drain worker thread. `N` producers
/// (typically one per watched resource kind) call [`Self::submit`]
/// concurrently; exactly one worker thread commits accepted events to
/// [`Storage`] in submission order.
pub struct IngestPipeline {
    sender: Sender<ResourceEvent>,
    metrics: Arc<Metrics>,
    stop: StopSignal,
    drain_handle: Option<JoinHandle<()>>,
}

impl IngestPipeline {
    /// Spawns the drain worker and returns a handle producers can clone
    /// cheaply (the sender side is itself cloneable) to submit
    /// notifications.
    #[must_use]
    pub fn spawn(storage: Arc<Storage>, config: &StorageConfig) -> Self {
        let (sender, receiver) = bounded(config.queue_capacity);
        let metrics = storage.metrics().clone();
        let stop = StopSignal::default();

        let drain_handle = std::thread::Builder::new()
            .name("spectre-ingest-drain".into())
            .spawn({
                let stop = stop.clone();
                let grace = config.shutdown_grace;
                let batch_size = config.drain_batch_size.max(1);
                move || drain_loop(receiver, storage, stop, grace, batch_size)
            })
            .expect("failed to spawn ingest drain thread");

        Self {
            sender,
            metrics,
            stop,
            drain_handle: Some(drain_handle),
        }
    }

    /// Runs `notification` through the Adapter, Pruner, and Validator, then
    /// enqueues it. Rejected notifications are counted and dropped without
    /// returning an error, per the ingest validator's contract. Blocks the
    /// caller if the queue is full.
    pub fn submit(&self, notification: RawNotification) {
        let event = adapter::adapt(notification);
        let event = pruner::prune(event);

        if !validator::is_acceptable(&event) {
            self.metrics.ingest_dropped.fetch_add(1, Relaxed);
            log::debug!("validator rejected event for {}", event.resource_key());
            return;
        }

        if self.sender.is_full() {
            self.metrics.ingest_queue_full_blocked.fetch_add(1, Relaxed);
        }

        // The only send failure is a disconnected receiver, which only
        // happens after the drain thread has already exited during
        // shutdown; there is nowhere left to report that to.
        let _ = self.sender.send(event);
    }

    /// Signals the drain worker to stop, then blocks until it exits: either
    /// because the queue fully drained, or because `shutdown_grace`
    /// elapsed, whichever comes first. Events still queued past the grace
    /// period are dropped and counted in
    /// [`Metrics::ingest_lost_at_shutdown`].
    pub fn shutdown(mut self) {
        self.stop.send();
        drop(self.sender);
        if let Some(handle) = self.drain_handle.take() {
            let _ = handle.join();
        }
    }
}

fn drain_loop(
    receiver: Receiver<ResourceEvent>,
    storage: Arc<Storage>,
    stop: StopSignal,
    grace: Duration,
    batch_size: usize,
) {
    let mut deadline: Option<Instant> = None;

    loop {
        match receiver.recv_timeout(Duration::from_millis(50)) {
            Ok(event) => {
                commit(&storage, event);
                for _ in 1..batch_size {
                    match receiver.try_recv() {
                        Ok(event) => commit(&storage, event),
                        Err(_) => break,
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if stop.is_stopped() {
            let deadline = *deadline.get_or_insert_with(|| Instant::now() + grace);
            if Instant::now() >= deadline {
                let lost = receiver.try_iter().count() as u64;
                if lost > 0 {
                    storage
                        .metrics()
                        .ingest_lost_at_shutdown
                        .fetch_add(lost, Relaxed);
                    log::warn!("shutdown grace period elapsed, dropping {lost} queued events");
                }
                break;
            }
        }
    }

    if let Err(e) = storage.close() {
        log::error!("failed to seal Open file at ingest shutdown: {e}");
    }
}

fn commit(storage: &Arc<Storage>, event: ResourceEvent) {
    match storage.write_event(event) {
        Ok(()) => {
            storage.metrics().ingest_accepted.fetch_add(1, Relaxed);
        }
        Err(e) => match e {
            Error::Io(_) => log::error!("ingest write failed: {e}"),
            other => log::error!("ingest write failed: {other}"),
        },
    }
}
