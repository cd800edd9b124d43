//! Persistent source→destination pipes between synthetic files.
//!
//! A route is an external subprocess running the moral equivalent of
//!
//! ```sh
//! while true; do cat "$SOURCE" > "$DEST"; done
//! ```
//!
//! against mounted paths. Because `cat` on a synthetic file blocks
//! server-side until content is ready (stream gate, supplementary readiness)
//! and exits on generation EOF, the loop is zero-CPU at rest and delivers
//! each generation the instant it opens. Routes belong to the server, not to
//! any client or panel: they survive terminal lifetimes until removed.
//!
//! [`RoutesFile`] exposes the manager in the served tree: reading lists the
//! routes, writing `a -> b` creates one and `-a` removes one.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::fcall::{QId, Stat};
use crate::file::{FileMeta, SyntheticFile};
use crate::rerror;
use crate::error::Result;

const STOP_GRACE: Duration = Duration::from_secs(2);

struct RouteEntry {
    source: String,
    destination: String,
    child: Child,
}

impl RouteEntry {
    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

/// Owner of all active routes, shared across connections and panels.
pub struct RouteManager {
    routes: Mutex<Vec<RouteEntry>>,
}

impl Default for RouteManager {
    fn default() -> Self {
        RouteManager {
            routes: Mutex::new(Vec::new()),
        }
    }
}

impl RouteManager {
    pub fn new() -> Arc<RouteManager> {
        Arc::new(RouteManager::default())
    }

    /// Create and start a route, replacing any existing route for `source`.
    pub async fn add(&self, source: &str, destination: &str) -> Result<()> {
        let mut routes = self.routes.lock().await;
        if let Some(pos) = routes.iter().position(|r| r.source == source) {
            let old = routes.remove(pos);
            stop_child(old.child).await;
        }

        let child = spawn_cat_loop(source, destination)?;
        info!("route started: {source} -> {destination}");
        routes.push(RouteEntry {
            source: source.to_owned(),
            destination: destination.to_owned(),
            child,
        });
        Ok(())
    }

    /// Stop and erase the route for `source`, reporting whether one existed.
    pub async fn remove(&self, source: &str) -> bool {
        let mut routes = self.routes.lock().await;
        let Some(pos) = routes.iter().position(|r| r.source == source) else {
            return false;
        };
        let old = routes.remove(pos);
        drop(routes);
        stop_child(old.child).await;
        info!("route removed: {source}");
        true
    }

    /// `(source, destination, running)` triples in insertion order.
    ///
    /// A route whose subprocess died stays listed as stopped until it is
    /// removed.
    pub async fn list(&self) -> Vec<(String, String, bool)> {
        let mut routes = self.routes.lock().await;
        routes
            .iter_mut()
            .map(|r| {
                let running = r.is_running();
                (r.source.clone(), r.destination.clone(), running)
            })
            .collect()
    }

    /// Tear down every route.
    pub async fn stop_all(&self) {
        let mut routes = self.routes.lock().await;
        for entry in routes.drain(..) {
            stop_child(entry.child).await;
        }
    }
}

fn spawn_cat_loop(source: &str, destination: &str) -> Result<Child> {
    // its own process group, so stopping the route kills the shell loop
    // and whichever cat it is currently blocked in
    let script =
        format!(r#"while true; do cat "{source}" > "{destination}" 2>/dev/null; done"#);
    let child = Command::new("sh")
        .arg("-c")
        .arg(script)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()?;
    Ok(child)
}

async fn stop_child(mut child: Child) {
    if let Some(pid) = child.id() {
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
    if timeout(STOP_GRACE, child.wait()).await.is_err() {
        if let Some(pid) = child.id() {
            let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
        }
        let _ = child.kill().await;
    }
}

/// The routes manager as a synthetic file.
pub struct RoutesFile {
    meta: FileMeta,
    manager: Arc<RouteManager>,
}

impl RoutesFile {
    pub fn new(manager: Arc<RouteManager>) -> Arc<RoutesFile> {
        Arc::new(RoutesFile {
            meta: FileMeta::file("routes"),
            manager,
        })
    }

    async fn render(&self) -> Vec<u8> {
        let routes = self.manager.list().await;
        if routes.is_empty() {
            return b"(no routes)\n".to_vec();
        }
        let mut out = String::new();
        for (source, destination, running) in routes {
            let state = if running { "running" } else { "stopped" };
            out.push_str(&format!("{source} -> {destination} [{state}]\n"));
        }
        out.into_bytes()
    }
}

#[async_trait]
impl SyntheticFile for RoutesFile {
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
        let listing = self.render().await;
        let start = (offset as usize).min(listing.len());
        let end = (start + count as usize).min(listing.len());
        Ok(listing[start..end].to_vec())
    }

    async fn write(&self, _handle: u64, _offset: u64, data: &[u8]) -> Result<u32> {
        let Ok(text) = std::str::from_utf8(data) else {
            return rerror!("Route directives must be UTF-8");
        };

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(source) = line.strip_prefix('-') {
                if !self.manager.remove(source.trim()).await {
                    warn!("route removal for unknown source: {source}");
                }
            } else if let Some((source, destination)) = line.split_once("->") {
                let (source, destination) = (source.trim(), destination.trim());
                if source.is_empty() || destination.is_empty() {
                    return rerror!(format!("Invalid route directive: {line}"));
                }
                self.manager.add(source, destination).await?;
            } else {
                return rerror!(format!("Invalid route directive: {line}"));
            }
        }

        self.meta.touch();
        Ok(data.len() as u32)
    }
}
