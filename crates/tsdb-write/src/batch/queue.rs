// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded blocking queue of pending entries.
//!
//! Producers block in [`PendingQueue::push`] while the queue is full; the
//! flush path empties it in one step with [`PendingQueue::drain_all`]. A
//! closed queue rejects every push and wakes blocked producers.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/// Why a push did not enqueue. The rejected item is handed back.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PushError<T> {
    Full(T),
    Closed(T),
}

#[derive(Debug)]
struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

#[derive(Debug)]
pub(crate) struct PendingQueue<T> {
    inner: Mutex<Inner<T>>,
    not_full: Condvar,
    /// `0` = unbounded.
    limit: usize,
}

impl<T> PendingQueue<T> {
    /// New queue, initially closed.
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: true,
            }),
            not_full: Condvar::new(),
            limit,
        }
    }

    fn is_full(&self, inner: &Inner<T>) -> bool {
        self.limit != 0 && inner.items.len() >= self.limit
    }

    /// Enqueue, blocking while full. Returns the length after insertion.
    pub(crate) fn push(&self, item: T) -> Result<usize, PushError<T>> {
        let mut inner = self.inner.lock();
        while !inner.closed && self.is_full(&inner) {
            self.not_full.wait(&mut inner);
        }
        if inner.closed {
            return Err(PushError::Closed(item));
        }
        inner.items.push_back(item);
        Ok(inner.items.len())
    }

    /// Enqueue without blocking. Returns the length after insertion.
    pub(crate) fn try_push(&self, item: T) -> Result<usize, PushError<T>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(PushError::Closed(item));
        }
        if self.is_full(&inner) {
            return Err(PushError::Full(item));
        }
        inner.items.push_back(item);
        Ok(inner.items.len())
    }

    /// Take every queued item in arrival order.
    pub(crate) fn drain_all(&self) -> Vec<T> {
        let drained: Vec<T> = {
            let mut inner = self.inner.lock();
            inner.items.drain(..).collect()
        };
        if !drained.is_empty() {
            self.not_full.notify_all();
        }
        drained
    }

    pub(crate) fn open(&self) {
        self.inner.lock().closed = false;
    }

    /// Reject further pushes and wake blocked producers. Queued items stay
    /// until drained.
    pub(crate) fn close(&self) {
        self.inner.lock().closed = true;
        self.not_full.notify_all();
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().items.len()
    }
}
