//! FIFO queue exposed as a file — each read consumes one item.
//!
//! Suited to event streams and error queues. Items bigger than the read
//! budget are carried over in a pending buffer so nothing is lost to a
//! small `count`.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::fcall::{QId, Stat};
use crate::file::{FileMeta, SyntheticFile};
use crate::error::Result;

/// Items kept before the oldest is dropped
pub const DEFAULT_MAX_ITEMS: usize = 1000;

/// How long an empty-queue read waits before returning empty
const READ_WAIT: Duration = Duration::from_millis(100);

struct QueueInner {
    items: VecDeque<Vec<u8>>,
    max_items: usize,
    /// remainder of an item that exceeded a read's count
    pending: Vec<u8>,
}

/// Bounded FIFO of byte blobs behind a file interface.
pub struct QueueFile {
    meta: FileMeta,
    inner: Mutex<QueueInner>,
    events: watch::Sender<u64>,
}

impl QueueFile {
    pub fn new(name: &str) -> std::sync::Arc<QueueFile> {
        QueueFile::with_max_items(name, DEFAULT_MAX_ITEMS)
    }

    pub fn with_max_items(name: &str, max_items: usize) -> std::sync::Arc<QueueFile> {
        let (events, _) = watch::channel(0);
        std::sync::Arc::new(QueueFile {
            meta: FileMeta::file(name),
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                max_items,
                pending: Vec::new(),
            }),
            events,
        })
    }

    /// Enqueue an item, dropping the oldest when full.
    pub fn post(&self, item: &[u8]) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.items.len() >= inner.max_items {
                inner.items.pop_front();
            }
            inner.items.push_back(item.to_vec());
        }
        self.meta.touch();
        self.events.send_modify(|v| *v = v.wrapping_add(1));
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take at most `count` bytes: leftover pending bytes first, otherwise
    /// the next queued item, stashing any overflow back into pending.
    fn take(&self, count: usize) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.pending.is_empty() {
            let n = count.min(inner.pending.len());
            let rest = inner.pending.split_off(n);
            let data = std::mem::replace(&mut inner.pending, rest);
            return Some(data);
        }
        let mut item = inner.items.pop_front()?;
        if item.len() > count {
            inner.pending = item.split_off(count);
        }
        Some(item)
    }
}

#[async_trait]
impl SyntheticFile for QueueFile {
    fn qid(&self) -> QId {
        self.meta.qid()
    }

    fn name(&self) -> String {
        self.meta.name().to_owned()
    }

    async fn stat(&self) -> Stat {
        self.meta.stat(self.len() as u64)
    }

    async fn read(&self, _handle: u64, _offset: u64, count: u32) -> Result<Vec<u8>> {
        let mut rx = self.events.subscribe();
        let wait = timeout(READ_WAIT, async {
            loop {
                rx.borrow_and_update();
                if let Some(data) = self.take(count as usize) {
                    self.meta.accessed();
                    return data;
                }
                if rx.changed().await.is_err() {
                    return Vec::new();
                }
            }
        });
        // an empty queue yields an empty read after a brief wait rather
        // than parking the client indefinitely
        Ok(wait.await.unwrap_or_default())
    }

    async fn write(&self, _handle: u64, _offset: u64, data: &[u8]) -> Result<u32> {
        self.post(data);
        Ok(data.len() as u32)
    }
}
