//! Control files — the Plan 9 pattern for driving a service.
//!
//! Writing a line executes a command against the attached handler; reading
//! returns the handler's current status. This is the exclusive write-side
//! control plane for every service behind the tree: agents, capture
//! sessions, route management.

use async_trait::async_trait;
use log::debug;

use crate::fcall::{QId, Stat};
use crate::file::{FileMeta, SyntheticFile};
use crate::rerror;
use crate::error::Result;
use std::sync::Arc;

/// Command handler behind a [`CtlFile`].
///
/// `execute` receives one trimmed, non-empty command line at a time and may
/// return a short response; unknown commands should fail with a descriptive
/// error, which reaches the writer as an `RError`.
#[async_trait]
pub trait CtlHandler: Send + Sync {
    async fn execute(&self, command: &str) -> Result<Option<String>>;

    /// Current status, served on every read of the control file
    async fn status(&self) -> Vec<u8>;
}

/// Write commands, read status.
pub struct CtlFile {
    meta: FileMeta,
    handler: Arc<dyn CtlHandler>,
    /// concurrent writers serialize; their command batches never interleave
    write_lock: tokio::sync::Mutex<()>,
}

impl CtlFile {
    pub fn new(name: &str, handler: Arc<dyn CtlHandler>) -> Arc<CtlFile> {
        Arc::new(CtlFile {
            meta: FileMeta::file(name),
            handler,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }
}

#[async_trait]
impl SyntheticFile for CtlFile {
    fn qid(&self) -> QId {
        self.meta.qid()
    }

    fn name(&self) -> String {
        self.meta.name().to_owned()
    }

    async fn stat(&self) -> Stat {
        self.meta.stat(0)
    }

    async fn read(&self, _handle: u64, offset: u64, count: u32) -> Result<Vec<u8>> {
        self.meta.accessed();
        let status = self.handler.status().await;
        let start = (offset as usize).min(status.len());
        let end = (start + count as usize).min(status.len());
        Ok(status[start..end].to_vec())
    }

    async fn write(&self, _handle: u64, _offset: u64, data: &[u8]) -> Result<u32> {
        let Ok(text) = std::str::from_utf8(data) else {
            return rerror!("Control commands must be UTF-8");
        };

        let _guard = self.write_lock.lock().await;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(response) = self.handler.execute(line).await? {
                debug!("ctl {}: {line} -> {response}", self.meta.name());
            }
        }

        self.meta.touch();
        Ok(data.len() as u32)
    }
}
