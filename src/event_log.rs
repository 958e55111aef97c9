//! Multi-cursor append-fanout log of pending mirror events.
//!
//! The differ appends batches; every peer owns an independent cursor and
//! drains at its own pace. Events accumulate in the active chunk until it
//! reaches [`EVENTS_PER_CHUNK`] entries, at which point the chunk is sealed
//! and handed to every cursor as a shared reference; a sealed chunk is freed
//! once the last cursor has moved past it. Wakeups coalesce: each cursor
//! carries a single-permit notify token, so signaling is lossy by design.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Capacity of one chunk. A batch larger than the remaining space still
/// lands in one chunk; sealing happens after the append.
pub const EVENTS_PER_CHUNK: usize = 1 << 10;

/// A pending change: entry `name` inside root-relative directory `dir`
/// appeared/changed (`is_delete == false`) or disappeared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub dir: String,
    pub name: String,
    pub is_delete: bool,
}

struct Cursor {
    /// Sealed chunks not yet fully drained, oldest first. The active chunk
    /// is shared implicitly; `pos` indexes into the first sealed chunk, or
    /// into the active chunk when none are queued.
    sealed: VecDeque<Arc<Vec<Event>>>,
    pos: usize,
    notify: Arc<Notify>,
}

#[derive(Default)]
struct Inner {
    active: Vec<Event>,
    clients: HashMap<u64, Cursor>,
    next_id: u64,
}

/// The shared log; one writer (the differ), one [`Client`] per peer.
#[derive(Default)]
pub struct EventLog {
    inner: Mutex<Inner>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a batch atomically and wakes every client. No cursor ever
    /// observes a partial batch.
    pub fn add(&self, events: Vec<Event>) {
        let mut inner = self.inner.lock();
        inner.active.extend(events);
        if inner.active.len() >= EVENTS_PER_CHUNK {
            let sealed = Arc::new(std::mem::take(&mut inner.active));
            for cursor in inner.clients.values_mut() {
                cursor.sealed.push_back(Arc::clone(&sealed));
            }
        }
        for cursor in inner.clients.values() {
            cursor.notify.notify_one();
        }
    }

    fn notify_handle(&self, id: u64) -> Option<Arc<Notify>> {
        self.inner.lock().clients.get(&id).map(|cursor| Arc::clone(&cursor.notify))
    }

    fn drain(&self, id: u64) -> Vec<Event> {
        let mut inner = self.inner.lock();
        let Inner { active, clients, .. } = &mut *inner;
        let Some(cursor) = clients.get_mut(&id) else {
            return Vec::new();
        };
        if let Some(chunk) = cursor.sealed.pop_front() {
            let drained = chunk[cursor.pos..].to_vec();
            cursor.pos = 0;
            // More chunks (or the active tail) may still be pending.
            cursor.notify.notify_one();
            drained
        } else if active.len() > cursor.pos {
            let drained = active[cursor.pos..].to_vec();
            cursor.pos = active.len();
            drained
        } else {
            Vec::new()
        }
    }

    fn remove_client(&self, id: u64) {
        self.inner.lock().clients.remove(&id);
    }
}

/// A peer's cursor into the log. Dropping it deregisters the cursor and
/// releases its chunk references.
pub struct Client {
    log: Arc<EventLog>,
    id: u64,
    label: String,
}

impl Client {
    /// Registers a cursor positioned at the start of the current active
    /// chunk. Events already in that chunk are replayed to the new client.
    pub fn register(log: &Arc<EventLog>, label: &str) -> Client {
        let mut inner = log.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.clients.insert(
            id,
            Cursor { sealed: VecDeque::new(), pos: 0, notify: Arc::new(Notify::new()) },
        );
        Client { log: Arc::clone(log), id, label: label.to_string() }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Waits for the cursor's notify token, then drains whatever the cursor
    /// can see. Returns empty on cancellation or timeout without consuming
    /// any event.
    pub async fn get(&self, cancel: &CancellationToken, timeout: Duration) -> Vec<Event> {
        let Some(notify) = self.log.notify_handle(self.id) else {
            return Vec::new();
        };
        tokio::select! {
            () = cancel.cancelled() => return Vec::new(),
            () = notify.notified() => {}
            () = tokio::time::sleep(timeout) => return Vec::new(),
        }
        self.log.drain(self.id)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.log.remove_client(self.id);
    }
}
