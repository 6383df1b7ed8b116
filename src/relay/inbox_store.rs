use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::frame::frame_model::ClientId;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PendingMessage {
    pub sender_id: ClientId,
    pub payload: Bytes,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PushResult {
    Accepted,
    Full,
}

/// Per-recipient FIFO queues of messages waiting to be picked up, each bounded by
///  `max_buffer_size`.
///
/// A recipient's queue is created on the first push to it and lives for the rest of the process'
///  lifetime, even when it is drained. All queues are guarded by a single lock, so the
///  capacity check and the append in [InboxStore::push] (or the emptiness check and removal in
///  [InboxStore::pop]) happen atomically.
pub struct InboxStore {
    max_buffer_size: usize,
    inboxes: Mutex<FxHashMap<ClientId, VecDeque<PendingMessage>>>,
}
impl InboxStore {
    pub fn new(max_buffer_size: usize) -> InboxStore {
        InboxStore {
            max_buffer_size,
            inboxes: Default::default(),
        }
    }

    fn inboxes(&self) -> MutexGuard<'_, FxHashMap<ClientId, VecDeque<PendingMessage>>> {
        self.inboxes.lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, recipient_id: &ClientId, sender_id: &ClientId, payload: Bytes) -> PushResult {
        let mut inboxes = self.inboxes();

        if let Some(inbox) = inboxes.get(recipient_id) {
            if inbox.len() >= self.max_buffer_size {
                trace!("inbox for {} is full", recipient_id);
                return PushResult::Full;
            }
        }

        inboxes.entry(recipient_id.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.max_buffer_size))
            .push_back(PendingMessage {
                sender_id: sender_id.clone(),
                payload,
            });
        PushResult::Accepted
    }

    /// Removes and returns the oldest pending message for a client, or `None` if there is none
    pub fn pop(&self, client_id: &ClientId) -> Option<PendingMessage> {
        self.inboxes()
            .get_mut(client_id)
            .and_then(|inbox| inbox.pop_front())
    }

    pub fn pending(&self, client_id: &ClientId) -> usize {
        self.inboxes()
            .get(client_id)
            .map(|inbox| inbox.len())
            .unwrap_or(0)
    }

    pub fn num_inboxes(&self) -> usize {
        self.inboxes().len()
    }
}
