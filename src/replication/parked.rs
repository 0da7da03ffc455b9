//! Parked binlog pulls
//!
//! A pull that asks for exactly the end of the binlog is parked here instead
//! of blocking a thread. Whoever appends next drains the set and answers each
//! pull through its one-shot channel; the connection's own task owns the
//! receiving end and does the actual HTTP send.

use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::error::Result;
use crate::protocol::LogPos;

/// Raw binlog frames plus the position to ask for next
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullBatch {
    pub body: Vec<u8>,
    pub next: LogPos,
}

impl PullBatch {
    /// "No new data" answer for a pull at `pos`
    pub fn empty(pos: LogPos) -> Self {
        Self {
            body: Vec::new(),
            next: pos,
        }
    }
}

/// What a parked pull eventually receives
pub type PullReply = Result<PullBatch>;

/// Receiving side of a parked pull
#[derive(Debug)]
pub struct ParkedPull {
    pub id: u64,
    pub pos: LogPos,
    pub reply: oneshot::Receiver<PullReply>,
}

struct Waiter {
    pos: LogPos,
    reply: oneshot::Sender<PullReply>,
}

/// Registry of parked pulls, keyed by pull id
#[derive(Default)]
pub struct ParkedPulls {
    waiting: HashMap<u64, Waiter>,
}

impl ParkedPulls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pull at `pos`, returning the handle its connection awaits
    pub fn park(&mut self, id: u64, pos: LogPos) -> ParkedPull {
        let (tx, rx) = oneshot::channel();
        self.waiting.insert(id, Waiter { pos, reply: tx });
        ParkedPull { id, pos, reply: rx }
    }

    /// Remove every parked pull, returning `(pos, sender)` pairs to answer
    pub fn drain(&mut self) -> Vec<(LogPos, oneshot::Sender<PullReply>)> {
        self.waiting
            .drain()
            .map(|(_, w)| (w.pos, w.reply))
            .collect()
    }

    /// Answer every parked pull with no data
    pub fn answer_empty(&mut self) -> usize {
        let drained = self.drain();
        let count = drained.len();
        for (pos, reply) in drained {
            // Receiver gone means the slave hung up; nothing to do
            let _ = reply.send(Ok(PullBatch::empty(pos)));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}
