//! Per-system message queue with typed handler dispatch.
//!
//! The queue and the handler map sit behind separate locks. Draining swaps
//! the queue out under its lock and invokes handlers with no lock held, so a
//! handler may send messages or register handlers without deadlocking, and
//! producers on other threads never wait on a drain.

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{error, warn};

use crate::error::MessageError;
use crate::message::{Message, MessageType};

/// Callback invoked for each delivered message.
pub type MessageHandler = Arc<dyn Fn(&Message) -> anyhow::Result<()> + Send + Sync>;

/// Identifies a registered handler. Ids grow with registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

struct SharedQueue {
    messages: Mutex<VecDeque<Message>>,
    open: AtomicBool,
}

impl SharedQueue {
    fn push(&self, message: Message) -> Result<(), MessageError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(MessageError::BusClosed);
        }
        self.messages.lock().push_back(message);
        Ok(())
    }
}

/// Cloneable, thread-safe handle for enqueueing onto a [`MessageBus`].
#[derive(Clone)]
pub struct MessageSender {
    queue: Arc<SharedQueue>,
}

impl MessageSender {
    pub fn send(&self, message: Message) -> Result<(), MessageError> {
        self.queue.push(message)
    }
}

/// Counters reported by [`MessageBus::drain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub messages: usize,
    pub invocations: usize,
    pub failures: usize,
}

pub struct MessageBus {
    queue: Arc<SharedQueue>,
    handlers: RwLock<HashMap<MessageType, Vec<(HandlerId, MessageHandler)>>>,
    next_handler: AtomicU64,
}

impl MessageBus {
    /// Create an open bus.
    pub fn new() -> Self {
        Self {
            queue: Arc::new(SharedQueue {
                messages: Mutex::new(VecDeque::new()),
                open: AtomicBool::new(true),
            }),
            handlers: RwLock::new(HashMap::new()),
            next_handler: AtomicU64::new(0),
        }
    }

    /// Enqueue a message. Fails only when the bus is closed.
    pub fn send(&self, message: Message) -> Result<(), MessageError> {
        self.queue.push(message)
    }

    pub fn sender(&self) -> MessageSender {
        MessageSender {
            queue: Arc::clone(&self.queue),
        }
    }

    pub fn is_open(&self) -> bool {
        self.queue.open.load(Ordering::Acquire)
    }

    /// Accept or refuse new messages. Closing also discards the pending queue.
    pub fn set_open(&self, open: bool) {
        self.queue.open.store(open, Ordering::Release);
        if !open {
            self.queue.messages.lock().clear();
        }
    }

    /// Number of messages waiting for the next drain.
    pub fn pending(&self) -> usize {
        self.queue.messages.lock().len()
    }

    pub fn register_handler<F>(&self, message_type: MessageType, handler: F) -> HandlerId
    where
        F: Fn(&Message) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_handler.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .entry(message_type)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove every handler registered for a message type. Returns how many were removed.
    pub fn unregister_handlers(&self, message_type: MessageType) -> usize {
        self.handlers
            .write()
            .remove(&message_type)
            .map_or(0, |list| list.len())
    }

    /// Remove a single handler. Returns whether it was registered.
    pub fn unregister_handler(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let mut found = false;
        for list in handlers.values_mut() {
            let before = list.len();
            list.retain(|(handler_id, _)| *handler_id != id);
            found |= list.len() != before;
        }
        handlers.retain(|_, list| !list.is_empty());
        found
    }

    pub fn clear_handlers(&self) {
        self.handlers.write().clear();
    }

    pub fn handler_count(&self, message_type: MessageType) -> usize {
        self.handlers
            .read()
            .get(&message_type)
            .map_or(0, |list| list.len())
    }

    /// Union of the handlers registered for every tag on the message, in
    /// registration order.
    fn handlers_for(&self, message: &Message) -> Vec<(HandlerId, MessageHandler)> {
        let handlers = self.handlers.read();
        let mut selected: Vec<(HandlerId, MessageHandler)> = message
            .types()
            .iter()
            .filter_map(|t| handlers.get(t))
            .flatten()
            .map(|(id, handler)| (*id, Arc::clone(handler)))
            .collect();
        selected.sort_by_key(|(id, _)| *id);
        selected.dedup_by_key(|(id, _)| *id);
        selected
    }

    /// Deliver every queued message, in FIFO order, to its handlers.
    ///
    /// A handler that fails or panics is logged and skipped; remaining
    /// handlers and messages still run. Messages sent while draining wait for
    /// the next drain.
    pub fn drain(&self) -> DrainReport {
        let batch = std::mem::take(&mut *self.queue.messages.lock());
        let mut report = DrainReport::default();

        for message in batch {
            report.messages += 1;
            let handlers = self.handlers_for(&message);
            if handlers.is_empty() {
                continue;
            }
            for (id, handler) in handlers {
                report.invocations += 1;
                match panic::catch_unwind(AssertUnwindSafe(|| handler(&message))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        report.failures += 1;
                        error!(
                            "Handler {:?} failed on {:?} message: {:#}",
                            id,
                            message.primary_type(),
                            e
                        );
                    }
                    Err(_) => {
                        report.failures += 1;
                        error!(
                            "Handler {:?} panicked on {:?} message",
                            id,
                            message.primary_type()
                        );
                    }
                }
            }
        }

        if report.failures > 0 {
            warn!(
                "Drained {} messages with {} handler failures",
                report.messages, report.failures
            );
        }
        report
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
