//! Streaming file with state-aware blocking reads.
//!
//! The stream file is the primitive that makes
//! `while true; do cat $agent/output; done` a lifelong, zero-polling event
//! subscription:
//!
//! 1. idle: `read` blocks on the generation gate until [`StreamFile::reset`]
//! 2. streaming: `read` blocks until data arrives, then returns chunks
//! 3. EOF: `read` returns empty, so `cat` exits
//! 4. the shell loop reopens at offset 0, which lands back on the gate
//!
//! The gate decouples "a producer will deliver" from "the producer has
//! delivered". A stream that merely blocked while empty and returned EOF on
//! finish would hand a reopened `cat` an instant EOF between generations, and
//! clearing EOF at open time instead would lose data for consumers that open
//! mid-generation. The latch avoids both: it is opened by `reset`, closed by
//! `finish`, and only readers whose cursor sits at 0 consult it.
//!
//! The 9P dispatcher runs every message as its own task, so a read parked
//! here never prevents a write to another file on the same connection.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::fcall::{QId, Stat};
use crate::file::{FileMeta, SyntheticFile};
use crate::rerror;
use crate::error::Result;

/// Soft bound on buffered bytes; oldest bytes are discarded beyond it
pub const DEFAULT_BUFFER_LIMIT: usize = 1_000_000;

struct StreamState {
    buffer: Vec<u8>,
    limit: usize,
    /// per-handle read positions into `buffer`; erased wholesale by `reset`
    cursors: HashMap<u64, usize>,
    eof: bool,
    /// the generation gate: true while a generation is running
    gate_open: bool,
    /// bumped by every `reset`; lets a parked gate waiter recognize that a
    /// generation started (and possibly finished) while it slept
    generation: u64,
}

/// Append-only stream with per-fid cursors and a generation gate.
pub struct StreamFile {
    meta: FileMeta,
    state: Mutex<StreamState>,
    events: watch::Sender<u64>,
}

impl StreamFile {
    pub fn new(name: &str) -> std::sync::Arc<StreamFile> {
        StreamFile::with_limit(name, DEFAULT_BUFFER_LIMIT)
    }

    pub fn with_limit(name: &str, limit: usize) -> std::sync::Arc<StreamFile> {
        let (events, _) = watch::channel(0);
        std::sync::Arc::new(StreamFile {
            meta: FileMeta::read_only(name),
            state: Mutex::new(StreamState {
                buffer: Vec::new(),
                limit,
                cursors: HashMap::new(),
                eof: false,
                gate_open: false,
                generation: 0,
            }),
            events,
        })
    }

    fn wake(&self) {
        self.events.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Start a new generation: drop buffered bytes, erase every cursor,
    /// clear EOF, and open the gate.
    pub fn reset(&self) {
        {
            let mut st = self.state.lock().unwrap();
            st.buffer.clear();
            st.cursors.clear();
            st.eof = false;
            st.gate_open = true;
            st.generation += 1;
        }
        self.meta.touch();
        self.wake();
    }

    /// Append producer data, discarding the oldest bytes past the limit.
    pub fn append(&self, data: &[u8]) {
        {
            let mut st = self.state.lock().unwrap();
            st.buffer.extend_from_slice(data);
            if st.buffer.len() > st.limit {
                let trim = st.buffer.len() - st.limit;
                st.buffer.drain(..trim);
                for cursor in st.cursors.values_mut() {
                    *cursor = cursor.saturating_sub(trim);
                }
            }
        }
        self.meta.touch();
        self.wake();
    }

    /// End the current generation: set EOF and close the gate.
    pub fn finish(&self) {
        {
            let mut st = self.state.lock().unwrap();
            st.eof = true;
            st.gate_open = false;
        }
        self.wake();
    }

    /// Whether a generation is currently running
    pub fn is_streaming(&self) -> bool {
        self.state.lock().unwrap().gate_open
    }

    /// Snapshot of the live buffer
    pub fn buffer_content(&self) -> Vec<u8> {
        self.state.lock().unwrap().buffer.clone()
    }
}

#[async_trait]
impl SyntheticFile for StreamFile {
    fn qid(&self) -> QId {
        self.meta.qid()
    }

    fn name(&self) -> String {
        self.meta.name().to_owned()
    }

    async fn stat(&self) -> Stat {
        // streams report length 0: the ring buffer trims, so a live length
        // would not mean what stat callers expect
        self.meta.stat(0)
    }

    async fn open(&self, handle: u64, _mode: u8) -> Result<()> {
        self.state.lock().unwrap().cursors.insert(handle, 0);
        Ok(())
    }

    fn clunk(&self, handle: u64) {
        self.state.lock().unwrap().cursors.remove(&handle);
    }

    async fn read(&self, handle: u64, _offset: u64, count: u32) -> Result<Vec<u8>> {
        let mut rx = self.events.subscribe();

        self.state
            .lock()
            .unwrap()
            .cursors
            .entry(handle)
            .or_insert(0);

        // Gate: a reader whose cursor sits at 0 waits for a generation to
        // start. Readers mid-buffer skip straight to the serve loop. The
        // generation counter releases a parked waiter even when the whole
        // generation (reset through finish) elapsed before it woke; the
        // buffered bytes are still there for it to drain.
        let entry_generation = self.state.lock().unwrap().generation;
        loop {
            rx.borrow_and_update();
            {
                let mut st = self.state.lock().unwrap();
                let cursor = st.cursors.get(&handle).copied().unwrap_or(0);
                if cursor != 0 {
                    break;
                }
                if st.gate_open || st.generation != entry_generation {
                    // a reset may have erased the cursor while we waited
                    st.cursors.insert(handle, 0);
                    break;
                }
            }
            if rx.changed().await.is_err() {
                return Ok(Vec::new());
            }
        }

        loop {
            rx.borrow_and_update();
            {
                let mut st = self.state.lock().unwrap();
                let Some(cursor) = st.cursors.get(&handle).copied() else {
                    // cursor erased by reset: the generation this reader was
                    // following is gone
                    return Ok(Vec::new());
                };

                let available = st.buffer.len().saturating_sub(cursor);
                if available > 0 {
                    let n = available.min(count as usize);
                    let data = st.buffer[cursor..cursor + n].to_vec();
                    st.cursors.insert(handle, cursor + n);
                    self.meta.accessed();
                    return Ok(data);
                }

                if st.eof {
                    return Ok(Vec::new());
                }
            }
            if rx.changed().await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn write(&self, _handle: u64, _offset: u64, _data: &[u8]) -> Result<u32> {
        rerror!("Stream is producer-only, use append()")
    }
}
