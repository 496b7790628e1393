//! C6: the overflow controller applied uniformly at every bounded hand-off in the
//! pipeline (raw-row ingest, window-to-aggregator, aggregator-to-sink). spec.md §4.6 lists
//! five policies; unlike `streamer_core`'s single hard-coded `try_send`-and-drop, every
//! bounded queue here is built from the same `bounded()` constructor so a caller picks the
//! policy once per hand-off via `OverflowConfig` instead of re-implementing backpressure at
//! each stage.
//!
//! The queue itself is a small mutex-guarded ring rather than `tokio::sync::mpsc`, because
//! `DropNewest` and `Expand` both need the sending side to see and mutate what's already
//! queued (evict the head, or spill to a side buffer) -- something a plain mpsc `Sender`
//! cannot do once items have crossed into the channel.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

use crate::error::{Result, StreamSqlError};
use crate::runtime::spill::SpillRing;
use crate::runtime::stats::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowStrategy {
    /// Wait for room, up to `block_timeout`; past that, drop (spec.md §4.6).
    Block,
    /// Non-blocking; drop the incoming item if the queue is full.
    Drop,
    /// Non-blocking; evict the oldest queued item to make room for the incoming one.
    DropNewest,
    /// Grow an unbounded side buffer and drain it back in as room frees up.
    Expand,
    /// Spill to disk (framed records, see `runtime::spill`) and replay FIFO as room frees.
    PersistSpill,
}

#[derive(Debug, Clone)]
pub struct OverflowConfig {
    pub capacity: usize,
    pub strategy: OverflowStrategy,
    /// Upper bound on how long `Block` waits before counting the item as dropped.
    pub block_timeout: Duration,
    /// If false, `Block` waits indefinitely instead of honoring `block_timeout` -- only
    /// meant for tests that want to assert zero data loss.
    pub allow_data_loss: bool,
    /// Cap on the `Expand` side buffer; once full, further items degrade to `Drop`.
    pub expand_max: usize,
    pub spill_path: Option<PathBuf>,
    pub spill_max_bytes: u64,
}

impl Default for OverflowConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            strategy: OverflowStrategy::Block,
            block_timeout: Duration::from_millis(100),
            allow_data_loss: true,
            expand_max: 10_000,
            spill_path: None,
            spill_max_bytes: 64 * 1024 * 1024,
        }
    }
}

struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    expand_buf: Mutex<VecDeque<T>>,
    spill: Option<Mutex<SpillRing>>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
    closed: AtomicBool,
    /// Count of drop/replace/spill decisions, for the rate-limited warning below.
    overflow_events: AtomicU64,
}

/// A saturated channel can fire this on every single send; only surface a `warn!` once per
/// this many occurrences so the log doesn't drown in it.
const OVERFLOW_WARN_EVERY: u64 = 1000;

fn note_overflow_event<T>(shared: &Shared<T>, stage: &str) {
    let n = shared.overflow_events.fetch_add(1, Ordering::Relaxed) + 1;
    if n % OVERFLOW_WARN_EVERY == 1 {
        log::warn!("overflow event #{n} on stage '{stage}' (further events logged every {OVERFLOW_WARN_EVERY})");
    }
}

pub fn bounded<T>(cfg: OverflowConfig) -> Result<(Sender<T>, Receiver<T>)>
where
    T: Send + 'static + serde::Serialize + serde::de::DeserializeOwned,
{
    let spill = match (&cfg.strategy, &cfg.spill_path) {
        (OverflowStrategy::PersistSpill, Some(path)) => {
            Some(Mutex::new(SpillRing::open(path, cfg.spill_max_bytes)?))
        }
        (OverflowStrategy::PersistSpill, None) => {
            return Err(StreamSqlError::Fatal("PersistSpill requires a spill_path".into()))
        }
        _ => None,
    };
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(cfg.capacity.min(64))),
        expand_buf: Mutex::new(VecDeque::new()),
        spill,
        capacity: cfg.capacity,
        not_empty: Notify::new(),
        not_full: Notify::new(),
        closed: AtomicBool::new(false),
        overflow_events: AtomicU64::new(0),
    });
    Ok((Sender { shared: shared.clone(), cfg }, Receiver { shared }))
}

pub struct Sender<T> {
    shared: Arc<Shared<T>>,
    cfg: OverflowConfig,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone(), cfg: self.cfg.clone() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Dropped,
}

impl<T: Send + 'static> Sender<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.not_empty.notify_waiters();
    }

    /// Enqueues `item` according to `self.cfg.strategy`. Never blocks longer than
    /// `block_timeout` (when `allow_data_loss` is set). `stats.record_dropped`/
    /// `record_replaced` are invoked on the caller's behalf for the `stage` label.
    pub async fn send(&self, item: T, stats: &Stats, stage: &str) -> Result<SendOutcome> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(StreamSqlError::ChannelClosed);
        }
        match self.cfg.strategy {
            OverflowStrategy::Block => self.send_block(item, stats, stage).await,
            OverflowStrategy::Drop => self.send_drop(item, stats, stage).await,
            OverflowStrategy::DropNewest => self.send_drop_newest(item, stats, stage).await,
            OverflowStrategy::Expand => self.send_expand(item, stats, stage).await,
            OverflowStrategy::PersistSpill => self.send_spill(item, stats, stage).await,
        }
    }

    async fn push_locked(&self, item: T) {
        let mut q = self.shared.queue.lock().await;
        q.push_back(item);
        drop(q);
        self.shared.not_empty.notify_one();
    }

    async fn has_room(&self) -> bool {
        self.shared.queue.lock().await.len() < self.cfg.capacity
    }

    async fn send_block(&self, item: T, stats: &Stats, stage: &str) -> Result<SendOutcome> {
        let deadline_wait = async {
            loop {
                if self.has_room().await {
                    self.push_locked(item).await;
                    return SendOutcome::Sent;
                }
                self.shared.not_full.notified().await;
            }
        };
        if !self.cfg.allow_data_loss {
            return Ok(deadline_wait.await);
        }
        match tokio::time::timeout(self.cfg.block_timeout, deadline_wait).await {
            Ok(outcome) => Ok(outcome),
            Err(_) => {
                log::debug!("[{stage}] block timeout elapsed, dropping item");
                note_overflow_event(&self.shared, stage);
                stats.record_dropped(stage);
                Ok(SendOutcome::Dropped)
            }
        }
    }

    async fn send_drop(&self, item: T, stats: &Stats, stage: &str) -> Result<SendOutcome> {
        if self.has_room().await {
            self.push_locked(item).await;
            Ok(SendOutcome::Sent)
        } else {
            log::debug!("[{stage}] queue full, dropping item");
            note_overflow_event(&self.shared, stage);
            stats.record_dropped(stage);
            Ok(SendOutcome::Dropped)
        }
    }

    async fn send_drop_newest(&self, item: T, stats: &Stats, stage: &str) -> Result<SendOutcome> {
        let mut q = self.shared.queue.lock().await;
        if q.len() >= self.cfg.capacity {
            q.pop_front();
            log::debug!("[{stage}] queue full, evicting oldest item");
            note_overflow_event(&self.shared, stage);
            stats.record_replaced(stage);
        }
        q.push_back(item);
        drop(q);
        self.shared.not_empty.notify_one();
        Ok(SendOutcome::Sent)
    }

    async fn send_expand(&self, item: T, stats: &Stats, stage: &str) -> Result<SendOutcome> {
        if self.has_room().await {
            self.push_locked(item).await;
            return Ok(SendOutcome::Sent);
        }
        let mut overflow = self.shared.expand_buf.lock().await;
        if overflow.len() >= self.cfg.expand_max {
            log::debug!("[{stage}] expand buffer at cap, dropping item");
            note_overflow_event(&self.shared, stage);
            stats.record_dropped(stage);
            return Ok(SendOutcome::Dropped);
        }
        log::debug!("[{stage}] queue full, spilling into expand buffer");
        overflow.push_back(item);
        Ok(SendOutcome::Sent)
    }

    async fn send_spill(&self, item: T, stats: &Stats, stage: &str) -> Result<SendOutcome> {
        if self.has_room().await {
            self.push_locked(item).await;
            return Ok(SendOutcome::Sent);
        }
        let Some(spill) = &self.shared.spill else {
            note_overflow_event(&self.shared, stage);
            stats.record_dropped(stage);
            return Ok(SendOutcome::Dropped);
        };
        let mut ring = spill.lock().await;
        match ring.write(&item) {
            Ok(()) => {
                log::debug!("[{stage}] queue full, spilled item to disk");
                Ok(SendOutcome::Sent)
            }
            Err(e) => {
                log::error!("[{stage}] spill write failed, dropping item: {e}");
                note_overflow_event(&self.shared, stage);
                stats.record_dropped(stage);
                Ok(SendOutcome::Dropped)
            }
        }
    }
}

pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Receiver<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let mut q = self.shared.queue.lock().await;
            if let Some(item) = q.pop_front() {
                drop(q);
                self.shared.not_full.notify_waiters();
                drain_backlog(&self.shared).await;
                return Some(item);
            }
            if self.shared.closed.load(Ordering::SeqCst) {
                return None;
            }
            drop(q);
            self.shared.not_empty.notified().await;
        }
    }
}

/// Moves one item from the `Expand` side buffer or the spill ring into the main queue, if
/// there's room. Called after every successful `recv` so backlog drains as the consumer
/// catches up with an `Expand`/`PersistSpill` producer that outran it.
async fn drain_backlog<T>(shared: &Shared<T>)
where
    T: Send + 'static + serde::Serialize + serde::de::DeserializeOwned,
{
    let mut q = shared.queue.lock().await;
    if q.len() >= shared.capacity {
        return;
    }
    let mut overflow = shared.expand_buf.lock().await;
    if let Some(item) = overflow.pop_front() {
        q.push_back(item);
        drop(overflow);
        drop(q);
        shared.not_empty.notify_one();
        return;
    }
    drop(overflow);
    if let Some(spill) = &shared.spill {
        let mut ring = spill.lock().await;
        if let Ok(Some(item)) = ring.read_next::<T>() {
            q.push_back(item);
            drop(ring);
            drop(q);
            shared.not_empty.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drop_newest_replaces_oldest_without_dropping() {
        let cfg = OverflowConfig { capacity: 1, strategy: OverflowStrategy::DropNewest, ..Default::default() };
        let (tx, _rx) = bounded::<i32>(cfg).unwrap();
        let stats = Stats::new();
        assert_eq!(tx.send(1, &stats, "test").await.unwrap(), SendOutcome::Sent);
        assert_eq!(tx.send(2, &stats, "test").await.unwrap(), SendOutcome::Sent);
        assert_eq!(tx.send(3, &stats, "test").await.unwrap(), SendOutcome::Sent);
        let snap = stats.snapshot();
        assert_eq!(snap.replaced, 2);
        // DropNewest's evictions are folded into `dropped` so P5's
        // received == sent + dropped + in_flight invariant still holds; see DESIGN.md.
        assert_eq!(snap.dropped, 2);
    }

    #[tokio::test]
    async fn plain_drop_discards_when_full() {
        let cfg = OverflowConfig { capacity: 1, strategy: OverflowStrategy::Drop, ..Default::default() };
        let (tx, _rx) = bounded::<i32>(cfg).unwrap();
        let stats = Stats::new();
        assert_eq!(tx.send(1, &stats, "test").await.unwrap(), SendOutcome::Sent);
        assert_eq!(tx.send(2, &stats, "test").await.unwrap(), SendOutcome::Dropped);
        assert_eq!(stats.snapshot().dropped, 1);
    }

    #[tokio::test]
    async fn block_times_out_when_consumer_is_slow() {
        let cfg = OverflowConfig {
            capacity: 1,
            strategy: OverflowStrategy::Block,
            block_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let (tx, mut rx) = bounded::<i32>(cfg).unwrap();
        let stats = Stats::new();
        assert_eq!(tx.send(1, &stats, "test").await.unwrap(), SendOutcome::Sent);
        // Nobody drains, so the second send must time out and count as dropped.
        assert_eq!(tx.send(2, &stats, "test").await.unwrap(), SendOutcome::Dropped);
        assert_eq!(rx.recv().await, Some(1));
    }
}
