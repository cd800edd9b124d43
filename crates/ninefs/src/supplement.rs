//! One-shot companion files: supplementary outputs and captured stdout.
//!
//! Both types deliver exactly one payload per producer cycle with blocking
//! reads, then rearm when a reader reopens at offset 0. They are the
//! single-delivery reduction of the stream file's gate idiom: a plumbing
//! rule extracts fenced code from an agent's main stream into a
//! [`SupplementaryFile`]; a PTY layer funnels settled shell output into a
//! [`TermStdoutFile`]. Either way, `cat` on the file blocks until the
//! payload is ready, delivers it whole, and exits — which is exactly what a
//! route's cat-loop needs.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::fcall::{QId, Stat};
use crate::file::{FileMeta, SyntheticFile};
use crate::rerror;
use crate::error::Result;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum SuppState {
    Waiting,
    Ready,
    Consumed,
}

struct SuppInner {
    state: SuppState,
    content: Vec<u8>,
}

/// Write-once-per-generation companion file.
///
/// WAITING → READY (`set_ready`) → CONSUMED (a read reaches the end) →
/// WAITING again when a reader reopens at offset 0.
pub struct SupplementaryFile {
    meta: FileMeta,
    inner: Mutex<SuppInner>,
    events: watch::Sender<u64>,
}

impl SupplementaryFile {
    pub fn new(name: &str) -> std::sync::Arc<SupplementaryFile> {
        let (events, _) = watch::channel(0);
        std::sync::Arc::new(SupplementaryFile {
            meta: FileMeta::file(name),
            inner: Mutex::new(SuppInner {
                state: SuppState::Waiting,
                content: Vec::new(),
            }),
            events,
        })
    }

    fn wake(&self) {
        self.events.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Store this generation's payload and release blocked readers.
    pub fn set_ready(&self, content: &[u8]) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.content = content.to_vec();
            inner.state = SuppState::Ready;
        }
        self.meta.touch();
        self.wake();
    }
}

#[async_trait]
impl SyntheticFile for SupplementaryFile {
    fn qid(&self) -> QId {
        self.meta.qid()
    }

    fn name(&self) -> String {
        self.meta.name().to_owned()
    }

    async fn stat(&self) -> Stat {
        self.meta.stat(self.inner.lock().unwrap().content.len() as u64)
    }

    async fn read(&self, _handle: u64, offset: u64, count: u32) -> Result<Vec<u8>> {
        let mut rx = self.events.subscribe();
        loop {
            rx.borrow_and_update();
            {
                let mut inner = self.inner.lock().unwrap();
                if inner.state == SuppState::Consumed {
                    if offset == 0 {
                        // reopen at the start rearms for the next cycle
                        inner.state = SuppState::Waiting;
                    } else {
                        // the consuming reader's follow-up read sees EOF
                        return Ok(Vec::new());
                    }
                }
                if inner.state == SuppState::Ready {
                    let start = (offset as usize).min(inner.content.len());
                    let end = (start + count as usize).min(inner.content.len());
                    let data = inner.content[start..end].to_vec();
                    if end >= inner.content.len() {
                        inner.state = SuppState::Consumed;
                    }
                    self.meta.accessed();
                    return Ok(data);
                }
            }
            if rx.changed().await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    /// A client write injects content directly, as if the producer had
    /// called `set_ready`.
    async fn write(&self, _handle: u64, _offset: u64, data: &[u8]) -> Result<u32> {
        self.set_ready(data);
        Ok(data.len() as u32)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum CaptureState {
    Idle,
    Capturing,
    Ready,
    Consumed,
}

struct CaptureInner {
    state: CaptureState,
    content: Vec<u8>,
}

/// Captured PTY output, marked ready once the producer goes quiet.
///
/// The debounce timer itself lives in the PTY layer; this file only needs
/// `start_capture` / `capture_output` / `mark_ready` to be called in that
/// order. Reads follow the supplementary contract, rearming to IDLE.
pub struct TermStdoutFile {
    meta: FileMeta,
    inner: Mutex<CaptureInner>,
    events: watch::Sender<u64>,
}

impl TermStdoutFile {
    pub fn new(name: &str) -> std::sync::Arc<TermStdoutFile> {
        let (events, _) = watch::channel(0);
        std::sync::Arc::new(TermStdoutFile {
            meta: FileMeta::read_only(name),
            inner: Mutex::new(CaptureInner {
                state: CaptureState::Idle,
                content: Vec::new(),
            }),
            events,
        })
    }

    fn wake(&self) {
        self.events.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Begin a capture cycle, dropping any previous content.
    pub fn start_capture(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CaptureState::Capturing;
        inner.content.clear();
    }

    /// Append produced bytes; ignored outside a capture cycle.
    pub fn capture_output(&self, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == CaptureState::Capturing {
            inner.content.extend_from_slice(data);
            self.meta.touch();
        }
    }

    /// The producer has settled: release blocked readers.
    pub fn mark_ready(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state != CaptureState::Capturing {
                return;
            }
            inner.state = CaptureState::Ready;
        }
        self.wake();
    }
}

#[async_trait]
impl SyntheticFile for TermStdoutFile {
    fn qid(&self) -> QId {
        self.meta.qid()
    }

    fn name(&self) -> String {
        self.meta.name().to_owned()
    }

    async fn stat(&self) -> Stat {
        self.meta.stat(self.inner.lock().unwrap().content.len() as u64)
    }

    async fn read(&self, _handle: u64, offset: u64, count: u32) -> Result<Vec<u8>> {
        let mut rx = self.events.subscribe();
        loop {
            rx.borrow_and_update();
            {
                let mut inner = self.inner.lock().unwrap();
                if inner.state == CaptureState::Consumed {
                    if offset == 0 {
                        inner.state = CaptureState::Idle;
                    } else {
                        return Ok(Vec::new());
                    }
                }
                if inner.state == CaptureState::Ready {
                    let start = (offset as usize).min(inner.content.len());
                    let end = (start + count as usize).min(inner.content.len());
                    let data = inner.content[start..end].to_vec();
                    if end >= inner.content.len() {
                        inner.state = CaptureState::Consumed;
                    }
                    self.meta.accessed();
                    return Ok(data);
                }
            }
            if rx.changed().await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn write(&self, _handle: u64, _offset: u64, _data: &[u8]) -> Result<u32> {
        rerror!("Captured output is read-only")
    }
}
