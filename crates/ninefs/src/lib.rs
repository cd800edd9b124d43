#![forbid(unsafe_code)]
//! Synthetic file servers over 9P2000, Plan 9 style.
//!
//! This crate lets a process expose arbitrary in-process services — LLM
//! agents, display servers, shell-attached terminals — as a tree of
//! *synthetic files* served over the 9P2000 protocol. Clients mount the
//! server (typically through a user-space 9P-FUSE bridge) and every
//! interaction becomes an ordinary file operation: write a prompt into
//! `$agent/input`, `cat $agent/output` to stream the reply, pipe one
//! agent's output into another's input.
//!
//! # Overview
//!
//! Build a tree out of the file types in [`file`], [`stream`],
//! [`supplement`], [`queue`], [`ctl`], and [`routes`], then hand its root
//! to [`srv::Server`]:
//!
//! ```no_run
//! use ninefs::file::{DataFile, Dir};
//! use ninefs::srv::Server;
//! use ninefs::stream::StreamFile;
//!
//! #[tokio::main]
//! async fn main() -> ninefs::Result<()> {
//!     let root = Dir::root();
//!     let agent = Dir::new("echo");
//!     root.add(agent.clone());
//!     agent.add(DataFile::new("input", b""));
//!     agent.add(StreamFile::new("output"));
//!
//!     Server::new(root).serve("tcp!127.0.0.1!5640").await
//! }
//! ```
//!
//! # The generation gate
//!
//! The heart of the crate is [`stream::StreamFile`]: an append-only buffer
//! whose readers block on a *generation gate* while no producer session is
//! running. The shell idiom
//!
//! ```sh
//! while true; do cat $agent/output; done
//! ```
//!
//! thereby becomes a lifelong event subscription — `cat` parks on the gate
//! between generations (zero CPU), streams the active generation with
//! per-token latency, exits on generation EOF, and the loop re-arms it.
//! [`supplement::SupplementaryFile`] and [`supplement::TermStdoutFile`]
//! apply the same idiom to single-payload deliveries, and
//! [`routes::RouteManager`] composes such files into persistent
//! source→destination pipes driven by exactly that `cat` loop.
//!
//! # Protocol notes
//!
//! The server speaks plain 9P2000 — no .u or .L extensions. Authentication
//! is refused, `Tremove` is unsupported, and `Twstat` honors only
//! truncate-to-zero; this is a synthetic tree, not a disk. Every T-message
//! except `Tversion` is dispatched as its own task, so one blocked read
//! never stalls the connection — the property the whole design leans on.
//!
//! # Transport
//!
//! - **TCP**: `"tcp!host!port"` (e.g. `"tcp!0.0.0.0!5640"`)
//! - **Unix domain sockets**: `"unix!path!suffix"` (e.g. `"unix!/tmp/agentfs!0"`)
pub mod ctl;
pub mod error;
pub mod fcall;
pub mod file;
pub mod queue;
pub mod routes;
pub mod serialize;
pub mod srv;
pub mod stream;
pub mod supplement;

pub use crate::error::Error;
pub use crate::error::Result;
pub use crate::error::string as errstr;
pub use crate::fcall::*;
