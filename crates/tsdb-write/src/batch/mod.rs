// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Batch processor: pending queue, flush scheduler and flush algorithm.
//!
//! ```text
//!            enable()                flush_and_shutdown()
//! Disabled ----------> Armed ------------------------------> Closed
//!    ^                   |
//!    +---- disable() ----+
//! ```
//!
//! While armed, producers [`put`](BatchProcessor::put) entries into a bounded
//! queue. The flush thread drains the whole queue when the size threshold
//! (`actions`) is reached or the periodic deadline expires, groups the
//! drained points by destination and hands them to the [`BatchSink`] in one
//! call. A failed flush goes to the exception handler with the points in
//! drain order; nothing is retried. A panic in the sink or in the handler is
//! caught so the flush thread keeps running.
//!
//! Backpressure: with `drop_on_exhaustion` a full queue hands the entry to the
//! dropped handler and `put` returns `Ok`; otherwise `put` blocks.

mod queue;
mod scheduler;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use self::queue::{PendingQueue, PushError};
use self::scheduler::{Command, SchedulerHandle};
use crate::error::{ConfigError, WriteError};
use crate::point::Point;

/// Default flush threshold in points.
pub const DEFAULT_ACTIONS: usize = 1000;
/// Default periodic flush interval.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(1000);
/// Default queue capacity.
pub const DEFAULT_BUFFER_LIMIT: usize = 10_000;

/// Batching thresholds and overflow policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// Queue length that triggers an immediate flush.
    pub actions: usize,
    /// Periodic flush interval.
    pub flush_interval: Duration,
    /// Upper bound (exclusive) of the random delay added to each interval.
    pub jitter: Duration,
    /// Queue capacity, `0` = unbounded.
    pub buffer_limit: usize,
    /// Drop entries to the dropped handler instead of blocking when full.
    pub drop_on_exhaustion: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            actions: DEFAULT_ACTIONS,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            jitter: Duration::ZERO,
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            drop_on_exhaustion: false,
        }
    }
}

impl BatchOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.actions == 0 {
            return Err(ConfigError::NonPositive { name: "actions" });
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::NonPositive {
                name: "flush_interval",
            });
        }
        Ok(())
    }
}

/// Database and retention policy a point is written to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationKey {
    pub database: String,
    pub retention_policy: String,
}

impl DestinationKey {
    pub fn new(database: impl Into<String>, retention_policy: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            retention_policy: retention_policy.into(),
        }
    }
}

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.database, self.retention_policy)
    }
}

/// A point waiting in the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEntry {
    pub point: Point,
    pub key: DestinationKey,
}

impl PendingEntry {
    pub fn new(point: Point, key: DestinationKey) -> Self {
        Self { point, key }
    }
}

/// Points of one flush that share a destination, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationBatch {
    pub key: DestinationKey,
    pub points: Vec<Point>,
}

/// Receives the grouped output of each flush.
pub trait BatchSink: Send + Sync {
    /// Deliver one flush. `batches` is empty when the queue was empty.
    fn send(&self, batches: &[DestinationBatch]) -> Result<(), WriteError>;

    /// Release resources after the final flush.
    fn close(&self) {}
}

/// Called with each entry dropped on a full queue.
pub type DroppedHandler = Arc<dyn Fn(PendingEntry) + Send + Sync>;

/// Called with the error and the points of each failed flush.
pub type ExceptionHandler = Arc<dyn Fn(&WriteError, &[Point]) + Send + Sync>;

/// Snapshot of processor counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub enqueued: u64,
    pub dropped: u64,
    pub flushed_points: u64,
    pub flushes: u64,
    pub failed_flushes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    flushed_points: AtomicU64,
    flushes: AtomicU64,
    failed_flushes: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ProcessorStats {
        ProcessorStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            flushed_points: self.flushed_points.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
        }
    }
}

/// State shared with the flush thread.
pub(crate) struct Shared {
    queue: PendingQueue<PendingEntry>,
    sink: Arc<dyn BatchSink>,
    options: BatchOptions,
    dropped_handler: Option<DroppedHandler>,
    exception_handler: Option<ExceptionHandler>,
    commands: Sender<Command>,
    flush_requested: AtomicBool,
    counters: Counters,
}

impl Shared {
    /// Flush: drain, group by destination, one sink call.
    fn write(&self) {
        self.flush_requested.store(false, Ordering::Release);

        let drained = self.queue.drain_all();
        let count = drained.len();
        let (batches, order) = group_with_order(drained);

        self.counters.flushes.fetch_add(1, Ordering::Relaxed);
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.sink.send(&batches)))
            .unwrap_or_else(|payload| {
                Err(WriteError::FlushPanicked(panic_message(&*payload)))
            });

        match result {
            Ok(()) => {
                self.counters
                    .flushed_points
                    .fetch_add(count as u64, Ordering::Relaxed);
                if count > 0 {
                    log::debug!(
                        "[batch] flushed {} point(s) to {} destination(s)",
                        count,
                        batches.len()
                    );
                }
            }
            Err(err) => {
                self.counters.failed_flushes.fetch_add(1, Ordering::Relaxed);
                log::warn!("[batch] flush of {} point(s) failed: {}", count, err);
                if let Some(handler) = &self.exception_handler {
                    let points = ungroup(batches, &order);
                    if let Err(payload) =
                        panic::catch_unwind(AssertUnwindSafe(|| handler(&err, &points)))
                    {
                        log::error!(
                            "[batch] exception handler panicked: {}",
                            panic_message(&*payload)
                        );
                    }
                }
            }
        }
    }

    fn request_flush(&self) {
        if !self.flush_requested.swap(true, Ordering::AcqRel) {
            let _ = self.commands.send(Command::Flush);
        }
    }
}

/// Group entries by destination. Groups appear in first-arrival order and
/// keep arrival order inside each group.
pub fn group_by_destination(entries: Vec<PendingEntry>) -> Vec<DestinationBatch> {
    group_with_order(entries).0
}

/// Group entries and record, for each entry in arrival order, the index of
/// the batch it went to.
fn group_with_order(entries: Vec<PendingEntry>) -> (Vec<DestinationBatch>, Vec<usize>) {
    let mut index: HashMap<DestinationKey, usize> = HashMap::new();
    let mut batches: Vec<DestinationBatch> = Vec::new();
    let mut order = Vec::with_capacity(entries.len());

    for entry in entries {
        match index.get(&entry.key) {
            Some(&i) => {
                batches[i].points.push(entry.point);
                order.push(i);
            }
            None => {
                let i = batches.len();
                index.insert(entry.key.clone(), i);
                batches.push(DestinationBatch {
                    key: entry.key,
                    points: vec![entry.point],
                });
                order.push(i);
            }
        }
    }

    (batches, order)
}

/// Inverse of [`group_with_order`]: the points back in arrival order.
fn ungroup(batches: Vec<DestinationBatch>, order: &[usize]) -> Vec<Point> {
    let mut groups: Vec<_> = batches.into_iter().map(|b| b.points.into_iter()).collect();
    order
        .iter()
        .filter_map(|&i| groups.get_mut(i).and_then(Iterator::next))
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Disabled,
    Armed,
    Closed,
}

struct Control {
    state: State,
    scheduler: Option<SchedulerHandle>,
}

/// Queue plus flush thread in front of a [`BatchSink`].
pub struct BatchProcessor {
    shared: Arc<Shared>,
    receiver: Receiver<Command>,
    control: Mutex<Control>,
}

impl BatchProcessor {
    /// Create a disabled processor. Call [`enable`](Self::enable) to start it.
    pub fn new(options: BatchOptions, sink: Arc<dyn BatchSink>) -> Result<Self, ConfigError> {
        Self::with_handlers(options, sink, None, None)
    }

    pub fn with_handlers(
        options: BatchOptions,
        sink: Arc<dyn BatchSink>,
        dropped_handler: Option<DroppedHandler>,
        exception_handler: Option<ExceptionHandler>,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        let (commands, receiver) = channel::unbounded();

        Ok(Self {
            shared: Arc::new(Shared {
                queue: PendingQueue::new(options.buffer_limit),
                sink,
                options,
                dropped_handler,
                exception_handler,
                commands,
                flush_requested: AtomicBool::new(false),
                counters: Counters::default(),
            }),
            receiver,
            control: Mutex::new(Control {
                state: State::Disabled,
                scheduler: None,
            }),
        })
    }

    /// Open the queue and start the flush thread. No-op when already armed.
    pub fn enable(&self) -> Result<(), WriteError> {
        let mut control = self.control.lock();
        match control.state {
            State::Armed => return Ok(()),
            State::Closed => return Err(WriteError::ProcessorClosed),
            State::Disabled => {}
        }

        let handle = scheduler::spawn(
            Arc::clone(&self.shared),
            self.shared.commands.clone(),
            self.receiver.clone(),
        )?;
        self.shared.queue.open();
        control.scheduler = Some(handle);
        control.state = State::Armed;
        log::debug!(
            "[batch] enabled (actions={}, buffer_limit={})",
            self.shared.options.actions,
            self.shared.options.buffer_limit
        );
        Ok(())
    }

    /// Enqueue one entry.
    ///
    /// Returns [`WriteError::ProcessorClosed`] unless the processor is armed.
    /// A full queue either blocks or, with `drop_on_exhaustion`, passes the
    /// entry to the dropped handler and returns `Ok`.
    pub fn put(&self, entry: PendingEntry) -> Result<(), WriteError> {
        let shared = &self.shared;
        let pushed = if shared.options.drop_on_exhaustion {
            shared.queue.try_push(entry)
        } else {
            shared.queue.push(entry)
        };

        match pushed {
            Ok(len) => {
                shared.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                if len >= shared.options.actions {
                    shared.request_flush();
                }
                Ok(())
            }
            Err(PushError::Full(entry)) => {
                shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "[batch] queue full ({}), dropping point for {}",
                    shared.options.buffer_limit,
                    entry.key
                );
                if let Some(handler) = &shared.dropped_handler {
                    handler(entry);
                }
                Ok(())
            }
            Err(PushError::Closed(_)) => Err(WriteError::ProcessorClosed),
        }
    }

    /// Flush now on the flush thread and wait for it. No-op unless armed.
    pub fn flush(&self) {
        let control = self.control.lock();
        if control.state != State::Armed {
            return;
        }
        let (ack, done) = channel::bounded(1);
        if self.shared.commands.send(Command::FlushSync(ack)).is_ok() {
            let _ = done.recv();
        }
        drop(control);
    }

    /// Stop the flush thread, run a final flush and return to `Disabled`.
    pub fn disable(&self) {
        let mut control = self.control.lock();
        if control.state != State::Armed {
            return;
        }
        self.stop(&mut control);
        control.state = State::Disabled;
        log::debug!("[batch] disabled");
    }

    /// Stop the flush thread, run a final flush and close the sink.
    ///
    /// Returns once the in-flight flush and the final flush have completed or
    /// failed. Later `put` calls fail with [`WriteError::ProcessorClosed`].
    pub fn flush_and_shutdown(&self) {
        let mut control = self.control.lock();
        if control.state == State::Closed {
            return;
        }
        if control.state == State::Armed {
            self.stop(&mut control);
        }
        self.shared.sink.close();
        control.state = State::Closed;
        log::debug!("[batch] shut down");
    }

    fn stop(&self, control: &mut Control) {
        if let Some(handle) = control.scheduler.take() {
            handle.stop();
        }
        self.shared.queue.close();
        // entries queued before close
        self.shared.write();
    }

    pub fn is_enabled(&self) -> bool {
        self.control.lock().state == State::Armed
    }

    pub fn is_closed(&self) -> bool {
        self.control.lock().state == State::Closed
    }

    /// Entries currently queued.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn options(&self) -> &BatchOptions {
        &self.shared.options
    }

    pub fn stats(&self) -> ProcessorStats {
        self.shared.counters.snapshot()
    }
}

impl Drop for BatchProcessor {
    fn drop(&mut self) {
        if self.control.get_mut().state == State::Armed {
            log::warn!("[batch] processor dropped while armed, flushing pending points");
            self.flush_and_shutdown();
        }
    }
}

impl fmt::Debug for BatchProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("options", &self.shared.options)
            .field("pending", &self.pending())
            .field("stats", &self.stats())
            .finish()
    }
}
