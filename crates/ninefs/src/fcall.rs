//! 9P protocol data types and constants.
//!
//! # Protocol
//! 9P2000

use std::mem::{size_of, size_of_val};

use bitflags::bitflags;
use enum_primitive::*;

/// 9P2000 version string
pub const P92000: &str = "9P2000";

/// The version string that comes with RVersion when the server does not understand
/// the client's version string
pub const VERSION_UNKNOWN: &str = "unknown";

/*
 * 9P magic numbers
 */
/// Special tag which `TVersion`/`RVersion` must use as `tag`
pub const NOTAG: u16 = !0;

/// Special value which `TAttach` with no auth must use as `afid`
///
/// If the client does not wish to authenticate the connection, or knows that
/// authentication is not required, the afid field in the attach message should
/// be set to `NOFID`
pub const NOFID: u32 = !0;

/// Ample room for `TWrite`/`RRead` header
///
/// size[4] TRead/TWrite[1] tag[2] fid[4] offset[8] count[4]
pub const IOHDRSZ: u32 = 24;

/// Conventional first port for a synthetic file server
pub const NINEP_PORT: u16 = 5640;

/// The type of I/O
///
/// Open mode to be checked against the permissions for the file.
pub mod om {
    /// Open for read
    pub const READ: u8 = 0;
    /// Write
    pub const WRITE: u8 = 1;
    /// Read and write
    pub const RDWR: u8 = 2;
    /// Execute, == read but check execute permission
    pub const EXEC: u8 = 3;
    /// Or'ed in (except for exec), truncate file first
    pub const TRUNC: u8 = 16;
    /// Or'ed in, close on exec
    pub const CEXEC: u8 = 32;
    /// Or'ed in, remove on close
    pub const RCLOSE: u8 = 64;
}

/// Bits in Stat.mode
pub mod dm {
    /// Mode bit for directories
    pub const DIR: u32 = 0x80000000;
    /// Mode bit for append only files
    pub const APPEND: u32 = 0x40000000;
    /// Mode bit for exclusive use files
    pub const EXCL: u32 = 0x20000000;
    /// Mode bit for mounted channel
    pub const MOUNT: u32 = 0x10000000;
    /// Mode bit for authentication file
    pub const AUTH: u32 = 0x08000000;
    /// Mode bit for non-backed-up files
    pub const TMP: u32 = 0x04000000;
    /// Mode bit for read permission
    pub const READ: u32 = 0x4;
    /// Mode bit for write permission
    pub const WRITE: u32 = 0x2;
    /// Mode bit for execute permission
    pub const EXEC: u32 = 0x1;
}

bitflags! {
    /// Bits in QId.typ
    ///
    /// # Protocol
    /// 9P2000
    #[derive(Copy, Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord)]
    pub struct QIdType: u8 {
        #[doc = "Type bit for directories"]
        const DIR       = 0x80;
        #[doc = "Type bit for append only files"]
        const APPEND    = 0x40;
        #[doc = "Type bit for exclusive use files"]
        const EXCL      = 0x20;
        #[doc = "Type bit for mounted channel"]
        const MOUNT     = 0x10;
        #[doc = "Type bit for authentication file"]
        const AUTH      = 0x08;
        #[doc = "Type bit for not-backed-up file"]
        const TMP       = 0x04;
        #[doc = "Plain file"]
        const FILE      = 0x00;
    }
}

/// Server side data type for path tracking
///
/// The server's unique identification for the file being accessed
///
/// # Protocol
/// 9P2000
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct QId {
    /// Specify whether the file is a directory, append-only file, etc.
    pub typ: QIdType,
    /// Version number for a file; incremented every time the file is modified
    pub version: u32,
    /// An integer which is unique among all files in the hierarchy
    pub path: u64,
}

impl QId {
    pub fn size(&self) -> u32 {
        (size_of::<QIdType>() + size_of::<u32>() + size_of::<u64>()) as u32
    }
}

/// Plan 9 namespace metadata (somewhat like a unix fstat)
///
/// NOTE: Defined as `Dir` in libc.h of Plan 9
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stat {
    /// Server type
    pub typ: u16,
    /// Server subtype
    pub dev: u32,
    /// Unique id from server
    pub qid: QId,
    /// Permissions
    pub mode: u32,
    /// Last read time
    pub atime: u32,
    /// Last write time
    pub mtime: u32,
    /// File length
    pub length: u64,
    /// Last element of path
    pub name: String,
    /// Owner name
    pub uid: String,
    /// Group name
    pub gid: String,
    /// Last modifier name
    pub muid: String,
}

impl Stat {
    /// Byte count of the packed stat body, excluding the leading
    /// 2-byte size field itself
    pub fn size(&self) -> u16 {
        (size_of_val(&self.typ)
            + size_of_val(&self.dev)
            + self.qid.size() as usize
            + size_of_val(&self.mode)
            + size_of_val(&self.atime)
            + size_of_val(&self.mtime)
            + size_of_val(&self.length)
            + (size_of::<u16>() * 4)
            + self.name.len()
            + self.uid.len()
            + self.gid.len()
            + self.muid.len()) as u16
    }
}

/// Data type used in `RRead` and `TWrite`
///
/// # Protocol
/// 9P2000
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Data(pub Vec<u8>);

enum_from_primitive! {
    #[doc = "Message type, 9P operations"]
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    pub enum MsgType {
        TVersion        = 100,
        RVersion,
        TAuth           = 102,
        RAuth,
        TAttach         = 104,
        RAttach,
        //TError        = 106,  // Illegal, never used
        RError          = 107,
        TFlush          = 108,
        RFlush,
        TWalk           = 110,
        RWalk,
        TOpen           = 112,
        ROpen,
        TCreate         = 114,
        RCreate,
        TRead           = 116,
        RRead,
        TWrite          = 118,
        RWrite,
        TClunk          = 120,
        RClunk,
        TRemove         = 122,
        RRemove,
        TStat           = 124,
        RStat,
        TWStat          = 126,
        RWStat,
    }
}

impl MsgType {
    /// If the message type is T-message
    pub fn is_t(&self) -> bool {
        !self.is_r()
    }

    /// If the message type is R-message
    pub fn is_r(&self) -> bool {
        use crate::MsgType::*;

        matches!(
            *self,
            RVersion
                | RAuth
                | RAttach
                | RError
                | RFlush
                | RWalk
                | ROpen
                | RCreate
                | RRead
                | RWrite
                | RClunk
                | RRemove
                | RStat
                | RWStat
        )
    }
}

impl<'a> From<&'a FCall> for MsgType {
    fn from(fcall: &'a FCall) -> MsgType {
        match *fcall {
            FCall::TVersion { .. } => MsgType::TVersion,
            FCall::RVersion { .. } => MsgType::RVersion,
            FCall::TAuth { .. } => MsgType::TAuth,
            FCall::RAuth { .. } => MsgType::RAuth,
            FCall::TAttach { .. } => MsgType::TAttach,
            FCall::RAttach { .. } => MsgType::RAttach,
            FCall::RError { .. } => MsgType::RError,
            FCall::TFlush { .. } => MsgType::TFlush,
            FCall::RFlush => MsgType::RFlush,
            FCall::TWalk { .. } => MsgType::TWalk,
            FCall::RWalk { .. } => MsgType::RWalk,
            FCall::TOpen { .. } => MsgType::TOpen,
            FCall::ROpen { .. } => MsgType::ROpen,
            FCall::TCreate { .. } => MsgType::TCreate,
            FCall::RCreate { .. } => MsgType::RCreate,
            FCall::TRead { .. } => MsgType::TRead,
            FCall::RRead { .. } => MsgType::RRead,
            FCall::TWrite { .. } => MsgType::TWrite,
            FCall::RWrite { .. } => MsgType::RWrite,
            FCall::TClunk { .. } => MsgType::TClunk,
            FCall::RClunk => MsgType::RClunk,
            FCall::TRemove { .. } => MsgType::TRemove,
            FCall::RRemove => MsgType::RRemove,
            FCall::TStat { .. } => MsgType::TStat,
            FCall::RStat { .. } => MsgType::RStat,
            FCall::TWStat { .. } => MsgType::TWStat,
            FCall::RWStat => MsgType::RWStat,
        }
    }
}

/// A data type encapsulating the various 9P messages
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FCall {
    TVersion {
        msize: u32,
        version: String,
    },
    RVersion {
        msize: u32,
        version: String,
    },
    TAuth {
        afid: u32,
        uname: String,
        aname: String,
    },
    RAuth {
        aqid: QId,
    },
    TAttach {
        fid: u32,
        afid: u32,
        uname: String,
        aname: String,
    },
    RAttach {
        qid: QId,
    },
    RError {
        ename: String,
    },
    TFlush {
        oldtag: u16,
    },
    RFlush,
    TWalk {
        fid: u32,
        newfid: u32,
        wnames: Vec<String>,
    },
    RWalk {
        wqids: Vec<QId>,
    },
    TOpen {
        fid: u32,
        mode: u8,
    },
    ROpen {
        qid: QId,
        iounit: u32,
    },
    TCreate {
        fid: u32,
        name: String,
        perm: u32,
        mode: u8,
    },
    RCreate {
        qid: QId,
        iounit: u32,
    },
    TRead {
        fid: u32,
        offset: u64,
        count: u32,
    },
    RRead {
        data: Data,
    },
    TWrite {
        fid: u32,
        offset: u64,
        data: Data,
    },
    RWrite {
        count: u32,
    },
    TClunk {
        fid: u32,
    },
    RClunk,
    TRemove {
        fid: u32,
    },
    RRemove,
    TStat {
        fid: u32,
    },
    RStat {
        stat: Stat,
    },
    TWStat {
        fid: u32,
        stat: Stat,
    },
    RWStat,
}

/// Envelope for 9P messages
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Msg {
    /// Chosen and used by the client to identify the message.
    /// The reply to the message will have the same tag
    pub tag: u16,
    /// Message body encapsulating the various 9P messages
    pub body: FCall,
}
