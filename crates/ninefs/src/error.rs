//! Error representations for 9P2000 servers.
//!
//! 9P2000 reports failures to clients as human-readable strings carried in
//! `RError`. Every error a handler produces therefore boils down to an
//! *ename*; I/O errors are kept structured until they cross the wire.

use std::{fmt, io};

pub type Result<T> = std::result::Result<T, Error>;

/// Fail a 9P operation with the ename the client will read out of
/// `RError`. Accepts anything `Error` converts from: a string literal, a
/// `format!` result, or an `io::Error`.
#[macro_export]
macro_rules! rerror {
    ($err:expr) => {
        Err($crate::error::Error::from($err))
    };
}

/// The error type for 9P operations.
#[derive(Debug)]
pub enum Error {
    /// System-level I/O error, fatal to the connection it occurred on
    Io(io::Error),
    /// Protocol or handler error, delivered to the client as `RError`
    Ename(String),
}

impl Error {
    /// The string sent to the client in `RError`
    pub fn ename(&self) -> String {
        match self {
            Error::Io(e) => e.to_string(),
            Error::Ename(s) => s.clone(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "{e}"),
            Error::Ename(s) => f.write_str(s),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Ename(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Ename(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Ename(s.to_owned())
    }
}

/// Well-known error strings, stable enough to match in scripts
pub mod string {
    pub const AUTH_NOT_REQUIRED: &str = "Authentication not required";
    pub const FID_IN_USE: &str = "Fid already in use";
    pub const UNKNOWN_FID: &str = "Unknown fid";
    pub const FID_NOT_OPEN: &str = "Fid not open";
    pub const FID_ALREADY_OPEN: &str = "Fid already open";
    pub const NOT_A_DIRECTORY: &str = "Not a directory";
    pub const FILE_NOT_FOUND: &str = "File not found";
    pub const PERMISSION_DENIED: &str = "Permission denied";
    pub const REMOVE_NOT_SUPPORTED: &str = "Remove not supported";
    pub const CREATE_NOT_SUPPORTED: &str = "Create not supported";
    pub const UNKNOWN_MSG_TYPE: &str = "Unknown message type";
}
