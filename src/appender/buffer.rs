//! Append Buffer Nodes and the Drain Queue
//!
//! The mailbox queue is a list of nodes: byte blocks (appends coalesce into
//! the tail block while spare capacity allows) and single-shot waiter gates
//! planted by flush barriers. A waiter gate opens when every byte queued
//! before it has been handed to the sink.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// Minimum allocation for a data block; larger appends get their own block.
const MIN_BLOCK_CAPACITY: usize = 4096;

// =============================================================================
// Waiter gate
// =============================================================================

/// Single-shot latch: one opener, any number of waiters.
pub struct WaitGate {
    opened: Mutex<bool>,
    cv: Condvar,
}

impl WaitGate {
    pub fn new() -> Self {
        Self {
            opened: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    pub fn open(&self) {
        let mut opened = self.opened.lock();
        *opened = true;
        self.cv.notify_all();
    }

    pub fn wait(&self) {
        let mut opened = self.opened.lock();
        while !*opened {
            self.cv.wait(&mut opened);
        }
    }

    pub fn is_open(&self) -> bool {
        *self.opened.lock()
    }
}

impl Default for WaitGate {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Blocks and nodes
// =============================================================================

pub(crate) struct Block {
    bytes: Vec<u8>,
    read_pos: usize,
}

impl Block {
    fn for_payload(payload: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(MIN_BLOCK_CAPACITY.max(payload.len()));
        bytes.extend_from_slice(payload);
        Self { bytes, read_pos: 0 }
    }

    /// Spare tail capacity without reallocating.
    fn spare(&self) -> usize {
        self.bytes.capacity() - self.bytes.len()
    }

    fn unread(&self) -> &[u8] {
        &self.bytes[self.read_pos..]
    }

    fn unread_len(&self) -> usize {
        self.bytes.len() - self.read_pos
    }
}

pub(crate) enum Node {
    Data(Block),
    Waiter(std::sync::Arc<WaitGate>),
}

// =============================================================================
// Drain queue
// =============================================================================

/// The working buffer handed to [`AppendSink::consume`]. The sink reads the
/// front chunk and acknowledges bytes with [`DrainQueue::pop_consumed`];
/// anything left unconsumed stays as residual and triggers another drain.
///
/// [`AppendSink::consume`]: super::AppendSink::consume
#[derive(Default)]
pub struct DrainQueue {
    nodes: VecDeque<Node>,
}

impl DrainQueue {
    pub(crate) fn new() -> Self {
        Self {
            nodes: VecDeque::new(),
        }
    }

    /// Coalescing push used on the producer side.
    pub(crate) fn push_bytes(&mut self, bytes: &[u8]) {
        if let Some(Node::Data(block)) = self.nodes.back_mut() {
            if block.read_pos == 0 && block.spare() >= bytes.len() {
                block.bytes.extend_from_slice(bytes);
                return;
            }
        }
        self.nodes.push_back(Node::Data(Block::for_payload(bytes)));
    }

    pub(crate) fn push_waiter(&mut self, gate: std::sync::Arc<WaitGate>) {
        self.nodes.push_back(Node::Waiter(gate));
    }

    /// Move every node of `other` onto the back of this queue.
    pub(crate) fn append_from(&mut self, other: &mut DrainQueue) {
        self.nodes.append(&mut other.nodes);
    }

    /// Fire leading waiters (everything before them is consumed) and drop
    /// fully consumed blocks from the front.
    pub(crate) fn normalize(&mut self) {
        loop {
            match self.nodes.front() {
                Some(Node::Waiter(_)) => {
                    if let Some(Node::Waiter(gate)) = self.nodes.pop_front() {
                        gate.open();
                    }
                }
                Some(Node::Data(block)) if block.unread_len() == 0 => {
                    self.nodes.pop_front();
                }
                _ => return,
            }
        }
    }

    /// First unconsumed chunk, if any.
    pub fn chunk(&self) -> Option<&[u8]> {
        self.nodes.iter().find_map(|n| match n {
            Node::Data(block) if block.unread_len() > 0 => Some(block.unread()),
            _ => None,
        })
    }

    /// Acknowledge `n` bytes as consumed, front to back. Waiter gates passed
    /// along the way open immediately.
    pub fn pop_consumed(&mut self, mut n: usize) {
        self.normalize();
        while n > 0 {
            match self.nodes.front_mut() {
                Some(Node::Data(block)) => {
                    let take = n.min(block.unread_len());
                    block.read_pos += take;
                    n -= take;
                    if block.unread_len() > 0 {
                        break;
                    }
                }
                _ => break,
            }
            self.normalize();
        }
        self.normalize();
    }

    /// Total unconsumed bytes across all blocks.
    pub fn total_unread(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| match n {
                Node::Data(block) => block.unread_len(),
                Node::Waiter(_) => 0,
            })
            .sum()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// True when nothing remains: no unread bytes and no pending waiters.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
