//! Synthetic file objects served over 9P.
//!
//! A synthetic file is a file-shaped interface to some in-process
//! functionality. Every variant implements the same small capability set —
//! qid, stat, open, read, write, clunk — and the dispatcher in [`crate::srv`]
//! treats them uniformly. The interesting variants (streams, supplementary
//! outputs, queues) live in their own modules; this one holds the trait, the
//! shared metadata block, directories, and the plain in-memory files.
//!
//! # Ownership
//!
//! The server tree owns its files through `Arc<dyn SyntheticFile>`. Fids hold
//! clones of those Arcs, so a file removed from its parent stays readable by
//! any fid still pointing at it. Per-fid state kept *inside* a file (stream
//! cursors, pending queue bytes) is keyed by a server-allocated handle that
//! is unique across connections — raw 9P fids are only unique within one.

use std::sync::{
    Arc, Mutex, Weak,
    atomic::{AtomicU32, AtomicU64, Ordering},
};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::error::string as errstr;
use crate::fcall::{QId, QIdType, Stat, dm};
use crate::rerror;
use crate::error::Result;

/// Owner/group/modifier reported in every stat
pub const FS_USER: &str = "llmfs";

static NEXT_QID_PATH: AtomicU64 = AtomicU64::new(1);

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Identity and metadata shared by every synthetic file variant.
///
/// The qid path is allocated from a process-wide counter at construction and
/// never changes; the qid version increments on every observable mutation
/// via [`FileMeta::touch`].
#[derive(Debug)]
pub struct FileMeta {
    name: String,
    qid_path: u64,
    qid_type: QIdType,
    mode: u32,
    version: AtomicU32,
    atime: AtomicU32,
    mtime: AtomicU32,
}

impl FileMeta {
    pub fn new(name: &str, qid_type: QIdType, mode: u32) -> FileMeta {
        let now = unix_now();
        FileMeta {
            name: name.to_owned(),
            qid_path: NEXT_QID_PATH.fetch_add(1, Ordering::Relaxed),
            qid_type,
            mode,
            version: AtomicU32::new(0),
            atime: AtomicU32::new(now),
            mtime: AtomicU32::new(now),
        }
    }

    /// A plain read/write file
    pub fn file(name: &str) -> FileMeta {
        FileMeta::new(name, QIdType::FILE, 0o666)
    }

    /// A file clients may only read
    pub fn read_only(name: &str) -> FileMeta {
        FileMeta::new(name, QIdType::FILE, 0o444)
    }

    /// A directory
    pub fn dir(name: &str) -> FileMeta {
        FileMeta::new(name, QIdType::DIR, dm::DIR | 0o777)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn qid(&self) -> QId {
        QId {
            typ: self.qid_type,
            version: self.version.load(Ordering::Relaxed),
            path: self.qid_path,
        }
    }

    /// Record a mutation: bump mtime and the qid version
    pub fn touch(&self) {
        self.mtime.store(unix_now(), Ordering::Relaxed);
        self.version.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a read access
    pub fn accessed(&self) {
        self.atime.store(unix_now(), Ordering::Relaxed);
    }

    pub fn stat(&self, length: u64) -> Stat {
        Stat {
            typ: 0,
            dev: 0,
            qid: self.qid(),
            mode: self.mode,
            atime: self.atime.load(Ordering::Relaxed),
            mtime: self.mtime.load(Ordering::Relaxed),
            length,
            name: self.name.clone(),
            uid: FS_USER.to_owned(),
            gid: FS_USER.to_owned(),
            muid: FS_USER.to_owned(),
        }
    }
}

/// The uniform capability set of every synthetic file.
///
/// `read`/`write`/`open`/`lookup`/`stat` are async so that blocking variants
/// (streams, supplementary files) can suspend the calling task, and so that
/// proxy directories may perform I/O during lookup. `clunk` is synchronous
/// and infallible: from the client's point of view clunk always succeeds.
#[async_trait]
pub trait SyntheticFile: Send + Sync {
    /// Server-unique identity, stable for the file's lifetime
    fn qid(&self) -> QId;

    /// Name of this file within its parent
    fn name(&self) -> String;

    /// Current metadata
    async fn stat(&self) -> Stat;

    fn is_dir(&self) -> bool {
        false
    }

    /// Look up a child by name. Only meaningful for directories.
    async fn lookup(&self, _name: &str) -> Option<Arc<dyn SyntheticFile>> {
        None
    }

    /// Children in iteration order. Only meaningful for directories.
    fn list(&self) -> Vec<Arc<dyn SyntheticFile>> {
        Vec::new()
    }

    /// Containing directory, wired up by [`Dir::add`]
    fn parent(&self) -> Option<Arc<Dir>> {
        None
    }

    #[doc(hidden)]
    fn set_parent(&self, _parent: &Arc<Dir>) {}

    /// Called when a fid opens this file
    async fn open(&self, _handle: u64, _mode: u8) -> Result<()> {
        Ok(())
    }

    /// Called when a fid holding this file is clunked
    fn clunk(&self, _handle: u64) {}

    /// Read up to `count` bytes at `offset`. Returning an empty vector
    /// signals EOF.
    async fn read(&self, handle: u64, offset: u64, count: u32) -> Result<Vec<u8>>;

    /// Write `data` at `offset`, returning the count accepted
    async fn write(&self, handle: u64, offset: u64, data: &[u8]) -> Result<u32>;

    /// Create a child file (Tcreate). Directories opt in by overriding.
    async fn create(&self, _name: &str, _perm: u32, _mode: u8) -> Result<Arc<dyn SyntheticFile>> {
        rerror!(errstr::CREATE_NOT_SUPPORTED)
    }

    /// Truncate-to-zero, driven by Twstat with length 0. Default no-op.
    fn truncate(&self) {}
}

/// Directory containing other synthetic files.
///
/// Children keep their insertion order so directory reads are
/// deterministic.
pub struct Dir {
    meta: FileMeta,
    children: Mutex<Vec<(String, Arc<dyn SyntheticFile>)>>,
    parent: Mutex<Weak<Dir>>,
}

impl Dir {
    pub fn new(name: &str) -> Arc<Dir> {
        Arc::new(Dir {
            meta: FileMeta::dir(name),
            children: Mutex::new(Vec::new()),
            parent: Mutex::new(Weak::new()),
        })
    }

    /// The root of a served tree
    pub fn root() -> Arc<Dir> {
        Dir::new("")
    }

    /// Add a child, replacing any existing child of the same name
    pub fn add(self: &Arc<Self>, child: Arc<dyn SyntheticFile>) {
        child.set_parent(self);
        let name = child.name();
        let mut children = self.children.lock().unwrap();
        if let Some(slot) = children.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = child;
        } else {
            children.push((name, child));
        }
        drop(children);
        self.meta.touch();
    }

    /// Remove a child by name, handing it back if present
    pub fn remove(&self, name: &str) -> Option<Arc<dyn SyntheticFile>> {
        let mut children = self.children.lock().unwrap();
        let pos = children.iter().position(|(n, _)| n == name)?;
        let (_, child) = children.remove(pos);
        drop(children);
        self.meta.touch();
        Some(child)
    }

    /// Get a child by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn SyntheticFile>> {
        let children = self.children.lock().unwrap();
        children
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c.clone())
    }

    /// Resolve a path of components relative to this directory.
    ///
    /// `..` walks to the parent (or stays at the root), `.` stays in place.
    pub async fn walk(self: &Arc<Self>, path: &[&str]) -> Option<Arc<dyn SyntheticFile>> {
        let mut current: Arc<dyn SyntheticFile> = self.clone();
        for name in path {
            current = match *name {
                "." => current,
                ".." => match current.parent() {
                    Some(parent) => parent as Arc<dyn SyntheticFile>,
                    None => current,
                },
                name => current.lookup(name).await?,
            };
        }
        Some(current)
    }
}

#[async_trait]
impl SyntheticFile for Dir {
    fn qid(&self) -> QId {
        self.meta.qid()
    }

    fn name(&self) -> String {
        self.meta.name().to_owned()
    }

    async fn stat(&self) -> Stat {
        // directory length is always 0 in 9P
        self.meta.stat(0)
    }

    fn is_dir(&self) -> bool {
        true
    }

    async fn lookup(&self, name: &str) -> Option<Arc<dyn SyntheticFile>> {
        self.get(name)
    }

    fn list(&self) -> Vec<Arc<dyn SyntheticFile>> {
        let children = self.children.lock().unwrap();
        children.iter().map(|(_, c)| c.clone()).collect()
    }

    fn parent(&self) -> Option<Arc<Dir>> {
        self.parent.lock().unwrap().upgrade()
    }

    fn set_parent(&self, parent: &Arc<Dir>) {
        *self.parent.lock().unwrap() = Arc::downgrade(parent);
    }

    async fn read(&self, _handle: u64, _offset: u64, _count: u32) -> Result<Vec<u8>> {
        // directory reads go through the dispatcher's stat-record framing
        rerror!("Cannot read directory directly")
    }

    async fn write(&self, _handle: u64, _offset: u64, _data: &[u8]) -> Result<u32> {
        rerror!("Cannot write to directory")
    }
}

/// Simple file that stores data in memory.
///
/// Useful for configuration files, prompts, scratch state. Writes past the
/// end zero-fill the gap; a Twstat with length 0 truncates in place.
pub struct DataFile {
    meta: FileMeta,
    data: Mutex<Vec<u8>>,
}

impl DataFile {
    pub fn new(name: &str, initial: &[u8]) -> Arc<DataFile> {
        Arc::new(DataFile {
            meta: FileMeta::file(name),
            data: Mutex::new(initial.to_vec()),
        })
    }

    pub fn read_only(name: &str, initial: &[u8]) -> Arc<DataFile> {
        Arc::new(DataFile {
            meta: FileMeta::read_only(name),
            data: Mutex::new(initial.to_vec()),
        })
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }

    pub fn set_contents(&self, bytes: &[u8]) {
        *self.data.lock().unwrap() = bytes.to_vec();
        self.meta.touch();
    }
}

#[async_trait]
impl SyntheticFile for DataFile {
    fn qid(&self) -> QId {
        self.meta.qid()
    }

    fn name(&self) -> String {
        self.meta.name().to_owned()
    }

    async fn stat(&self) -> Stat {
        self.meta.stat(self.data.lock().unwrap().len() as u64)
    }

    async fn read(&self, _handle: u64, offset: u64, count: u32) -> Result<Vec<u8>> {
        self.meta.accessed();
        let data = self.data.lock().unwrap();
        let start = (offset as usize).min(data.len());
        let end = (start + count as usize).min(data.len());
        Ok(data[start..end].to_vec())
    }

    async fn write(&self, _handle: u64, offset: u64, data: &[u8]) -> Result<u32> {
        let mut buf = self.data.lock().unwrap();
        let end = offset as usize + data.len();
        if end > buf.len() {
            buf.resize(end, 0);
        }
        buf[offset as usize..end].copy_from_slice(data);
        drop(buf);
        self.meta.touch();
        Ok(data.len() as u32)
    }

    fn truncate(&self) {
        self.data.lock().unwrap().clear();
        self.meta.touch();
    }
}

type ReadFn = dyn Fn() -> Vec<u8> + Send + Sync;
type WriteFn = dyn Fn(&[u8]) -> Result<u32> + Send + Sync;

/// File that delegates reads and writes to closures.
///
/// For small dynamic files (a status view, a one-off injector) that don't
/// warrant a dedicated type.
pub struct CallbackFile {
    meta: FileMeta,
    on_read: Option<Box<ReadFn>>,
    on_write: Option<Box<WriteFn>>,
}

impl CallbackFile {
    pub fn read_only<F>(name: &str, on_read: F) -> Arc<CallbackFile>
    where
        F: Fn() -> Vec<u8> + Send + Sync + 'static,
    {
        Arc::new(CallbackFile {
            meta: FileMeta::read_only(name),
            on_read: Some(Box::new(on_read)),
            on_write: None,
        })
    }

    pub fn new<R, W>(name: &str, on_read: R, on_write: W) -> Arc<CallbackFile>
    where
        R: Fn() -> Vec<u8> + Send + Sync + 'static,
        W: Fn(&[u8]) -> Result<u32> + Send + Sync + 'static,
    {
        Arc::new(CallbackFile {
            meta: FileMeta::file(name),
            on_read: Some(Box::new(on_read)),
            on_write: Some(Box::new(on_write)),
        })
    }
}

#[async_trait]
impl SyntheticFile for CallbackFile {
    fn qid(&self) -> QId {
        self.meta.qid()
    }

    fn name(&self) -> String {
        self.meta.name().to_owned()
    }

    async fn stat(&self) -> Stat {
        let length = self.on_read.as_ref().map(|f| f().len() as u64).unwrap_or(0);
        self.meta.stat(length)
    }

    async fn read(&self, _handle: u64, offset: u64, count: u32) -> Result<Vec<u8>> {
        let Some(on_read) = &self.on_read else {
            return Ok(Vec::new());
        };
        let data = on_read();
        let start = (offset as usize).min(data.len());
        let end = (start + count as usize).min(data.len());
        Ok(data[start..end].to_vec())
    }

    async fn write(&self, _handle: u64, _offset: u64, data: &[u8]) -> Result<u32> {
        let Some(on_write) = &self.on_write else {
            return rerror!("File is read-only");
        };
        let count = on_write(data)?;
        self.meta.touch();
        Ok(count)
    }
}
