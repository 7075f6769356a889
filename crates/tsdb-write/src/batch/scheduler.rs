// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flush scheduler thread.
//!
//! One named thread per armed processor runs every flush, so flushes never
//! overlap. It sleeps until the next periodic deadline
//! (`flush_interval + jitter`) or until a command arrives:
//!
//! ```text
//! put() reaches `actions` --Flush------+
//! flush()                 --FlushSync--+--> [tsdb-write-flush] --> Shared::write()
//! disable()/shutdown      --Shutdown---+
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};

use super::Shared;
use crate::error::WriteError;

pub(crate) const THREAD_NAME: &str = "tsdb-write-flush";

pub(crate) enum Command {
    /// Size trigger: flush now, keep the periodic deadline.
    Flush,
    /// Flush now and acknowledge once done.
    FlushSync(Sender<()>),
    /// Finish the in-flight flush and exit.
    Shutdown,
}

/// Owns the scheduler thread. Dropping it stops and joins the thread.
pub(crate) struct SchedulerHandle {
    commands: Sender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop the thread and wait for it. Any flush in progress completes first.
    pub(crate) fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = self.commands.send(Command::Shutdown);
            if handle.join().is_err() {
                log::warn!("[batch] flush thread panicked");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn the scheduler thread for `shared`.
pub(crate) fn spawn(
    shared: Arc<Shared>,
    commands: Sender<Command>,
    receiver: Receiver<Command>,
) -> Result<SchedulerHandle, WriteError> {
    let thread = thread::Builder::new()
        .name(THREAD_NAME.into())
        .spawn(move || flush_loop(&shared, &receiver))
        .map_err(|e| WriteError::Spawn(e.to_string()))?;

    Ok(SchedulerHandle {
        commands,
        thread: Some(thread),
    })
}

fn flush_loop(shared: &Shared, receiver: &Receiver<Command>) {
    let interval = shared.options.flush_interval;
    let jitter = shared.options.jitter;
    log::debug!(
        "[batch] flush thread started (interval={:?}, jitter={:?})",
        interval,
        jitter
    );

    let mut deadline = Instant::now() + next_delay(interval, jitter);
    loop {
        match receiver.recv_deadline(deadline) {
            Ok(Command::Flush) => shared.write(),
            Ok(Command::FlushSync(ack)) => {
                shared.write();
                let _ = ack.send(());
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                shared.write();
                deadline = Instant::now() + next_delay(interval, jitter);
            }
        }
    }

    log::debug!("[batch] flush thread stopped");
}

/// `interval` plus a uniform random jitter in `[0, jitter)`.
pub(crate) fn next_delay(interval: Duration, jitter: Duration) -> Duration {
    let bound = u64::try_from(jitter.as_nanos()).unwrap_or(u64::MAX);
    if bound == 0 {
        return interval;
    }
    interval + Duration::from_nanos(fastrand::u64(0..bound))
}
