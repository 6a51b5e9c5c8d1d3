// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus fanning published events out to connection subscribers
//!
//! Every subscriber owns a bounded queue. `publish` never blocks: a subscriber
//! whose queue is full is marked overflowed and receives nothing further, so
//! it never observes a gap in the sequence. Its stream then yields
//! [`SlowConsumer`] and the connection is expected to close.

use super::subscription::{Channel, ChannelSet, SubscriberId};
use crate::event::Event;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("unknown subscriber: {0}")]
    UnknownSubscriber(SubscriberId),
}

/// The subscriber fell behind and was dropped from delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("subscriber queue overflowed")]
pub struct SlowConsumer;

#[derive(Default)]
struct Overflow {
    flag: AtomicBool,
    notify: Notify,
}

impl Overflow {
    fn trip(&self) {
        if !self.flag.swap(true, Ordering::AcqRel) {
            self.notify.notify_one();
        }
    }

    fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

struct Subscriber {
    channels: ChannelSet,
    tx: mpsc::Sender<Arc<Event>>,
    overflow: Arc<Overflow>,
}

struct Inner {
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
    capacity: usize,
    next_id: AtomicU64,
}

/// Routes events to subscribers by channel
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: RwLock::new(HashMap::new()),
                capacity: capacity.max(1),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a subscriber with no channels.
    ///
    /// Nothing is delivered until [`EventBus::subscribe`] adds a channel.
    /// Dropping the returned stream removes the subscriber.
    pub fn register(&self) -> EventStream {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let overflow = Arc::new(Overflow::default());

        let mut subs = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner());
        subs.insert(
            id,
            Subscriber {
                channels: ChannelSet::new(),
                tx,
                overflow: Arc::clone(&overflow),
            },
        );
        tracing::debug!(subscriber = %id, "registered subscriber");

        EventStream {
            id,
            rx,
            overflow,
            bus: self.clone(),
        }
    }

    /// Add channels to a subscriber's set. Returns the resulting set.
    pub fn subscribe(
        &self,
        id: SubscriberId,
        channels: impl IntoIterator<Item = Channel>,
    ) -> Result<ChannelSet, BusError> {
        let mut subs = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let sub = subs.get_mut(&id).ok_or(BusError::UnknownSubscriber(id))?;
        sub.channels.insert_all(channels);
        Ok(sub.channels.clone())
    }

    /// Remove channels from a subscriber's set. Returns the resulting set.
    pub fn unsubscribe(
        &self,
        id: SubscriberId,
        channels: impl IntoIterator<Item = Channel>,
    ) -> Result<ChannelSet, BusError> {
        let mut subs = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let sub = subs.get_mut(&id).ok_or(BusError::UnknownSubscriber(id))?;
        sub.channels.remove_all(channels);
        Ok(sub.channels.clone())
    }

    pub fn channels(&self, id: SubscriberId) -> Option<ChannelSet> {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .map(|sub| sub.channels.clone())
    }

    /// Drop a subscriber
    pub fn remove(&self, id: SubscriberId) {
        let removed = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
        if removed.is_some() {
            tracing::debug!(subscriber = %id, "removed subscriber");
        }
    }

    /// Deliver an event to every matching subscriber. Returns how many accepted it.
    ///
    /// Callers may hold entity locks; this only takes the read side of the
    /// subscriber map and never waits on a queue.
    pub fn publish(&self, event: Event) -> usize {
        let event = Arc::new(event);
        let subs = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner());

        let mut delivered = 0;
        for (id, sub) in subs.iter() {
            if sub.overflow.is_set() || !sub.channels.matches(&event) {
                continue;
            }
            match sub.tx.try_send(Arc::clone(&event)) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(subscriber = %id, "subscriber queue full, dropping subscriber");
                    sub.overflow.trip();
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        tracing::trace!(event = %event.event_type(), delivered, "published event");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Receiving half handed to a connection
pub struct EventStream {
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<Event>>,
    overflow: Arc<Overflow>,
    bus: EventBus,
}

impl EventStream {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event.
    ///
    /// Returns `Ok(None)` once the bus is gone and `Err(SlowConsumer)` as soon
    /// as the queue has overflowed, without draining what was buffered.
    pub async fn recv(&mut self) -> Result<Option<Arc<Event>>, SlowConsumer> {
        if self.overflow.is_set() {
            return Err(SlowConsumer);
        }
        tokio::select! {
            biased;
            _ = self.overflow.notify.notified() => Err(SlowConsumer),
            event = self.rx.recv() => Ok(event),
        }
    }

    /// Non-blocking variant of [`EventStream::recv`]
    pub fn try_recv(&mut self) -> Result<Option<Arc<Event>>, SlowConsumer> {
        if self.overflow.is_set() {
            return Err(SlowConsumer);
        }
        Ok(self.rx.try_recv().ok())
    }

    pub fn is_overflowed(&self) -> bool {
        self.overflow.is_set()
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.bus.remove(self.id);
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
