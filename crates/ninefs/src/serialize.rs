//! 9P2000 wire format: serialize messages to and from bytes.
//!
//! Every protocol type implements [`Wire9p`]: `write_to` appends the type's
//! wire form to a writer and `read_from` parses one value back off a
//! reader. Integers are little-endian, strings carry a 2-byte length prefix
//! and must be UTF-8, a qid packs to exactly 13 bytes, and a stat leads
//! with a 2-byte size of its body. `RStat` and `TWStat` carry one more
//! 2-byte size in front of the (already size-prefixed) packed stat.
//!
//! The connection layer frames messages by their 4-byte size field before
//! decoding, so `read_from` always sees one complete message; running out
//! of bytes mid-message is a malformed message, not a short read to retry.

use std::io::{self, Read, Write};

use num_traits::FromPrimitive;

use crate::fcall::*;

/// A type with a defined 9P2000 wire representation.
pub trait Wire9p: Sized {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()>;
    fn read_from<R: Read>(r: &mut R) -> io::Result<Self>;
}

fn malformed(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("malformed 9P message: {what}"))
}

macro_rules! uint_wire {
    ($($ty:ty),*) => {$(
        impl Wire9p for $ty {
            fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
                w.write_all(&self.to_le_bytes())
            }

            fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                r.read_exact(&mut raw)?;
                Ok(<$ty>::from_le_bytes(raw))
            }
        }
    )*};
}

uint_wire!(u8, u16, u32, u64);

impl Wire9p for String {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        (self.len() as u16).write_to(w)?;
        w.write_all(self.as_bytes())
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let len = u16::read_from(r)? as usize;
        let mut raw = vec![0; len];
        r.read_exact(&mut raw)?;
        String::from_utf8(raw).map_err(|_| malformed("string is not UTF-8"))
    }
}

impl Wire9p for QId {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.typ.bits().write_to(w)?;
        self.version.write_to(w)?;
        self.path.write_to(w)
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(QId {
            typ: QIdType::from_bits_truncate(Wire9p::read_from(r)?),
            version: Wire9p::read_from(r)?,
            path: Wire9p::read_from(r)?,
        })
    }
}

impl Wire9p for Stat {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.size().write_to(w)?;
        self.typ.write_to(w)?;
        self.dev.write_to(w)?;
        self.qid.write_to(w)?;
        self.mode.write_to(w)?;
        self.atime.write_to(w)?;
        self.mtime.write_to(w)?;
        self.length.write_to(w)?;
        self.name.write_to(w)?;
        self.uid.write_to(w)?;
        self.gid.write_to(w)?;
        self.muid.write_to(w)
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let _size = u16::read_from(r)?;
        Ok(Stat {
            typ: Wire9p::read_from(r)?,
            dev: Wire9p::read_from(r)?,
            qid: Wire9p::read_from(r)?,
            mode: Wire9p::read_from(r)?,
            atime: Wire9p::read_from(r)?,
            mtime: Wire9p::read_from(r)?,
            length: Wire9p::read_from(r)?,
            name: Wire9p::read_from(r)?,
            uid: Wire9p::read_from(r)?,
            gid: Wire9p::read_from(r)?,
            muid: Wire9p::read_from(r)?,
        })
    }
}

impl Wire9p for Data {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        (self.0.len() as u32).write_to(w)?;
        w.write_all(&self.0)
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let len = u32::read_from(r)? as usize;
        let mut raw = vec![0; len];
        r.read_exact(&mut raw)?;
        Ok(Data(raw))
    }
}

/// Counted sequences: the `nwname[2]` walk names and `nwqid[2]` qids
impl<T: Wire9p> Wire9p for Vec<T> {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        (self.len() as u16).write_to(w)?;
        for item in self {
            item.write_to(w)?;
        }
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let count = u16::read_from(r)? as usize;
        let mut items = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            items.push(T::read_from(r)?);
        }
        Ok(items)
    }
}

impl Wire9p for Msg {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        (MsgType::from(&self.body) as u8).write_to(w)?;
        self.tag.write_to(w)?;

        match &self.body {
            FCall::TVersion { msize, version } | FCall::RVersion { msize, version } => {
                msize.write_to(w)?;
                version.write_to(w)
            }
            FCall::TAuth { afid, uname, aname } => {
                afid.write_to(w)?;
                uname.write_to(w)?;
                aname.write_to(w)
            }
            FCall::RAuth { aqid } => aqid.write_to(w),
            FCall::TAttach {
                fid,
                afid,
                uname,
                aname,
            } => {
                fid.write_to(w)?;
                afid.write_to(w)?;
                uname.write_to(w)?;
                aname.write_to(w)
            }
            FCall::RAttach { qid } => qid.write_to(w),
            FCall::RError { ename } => ename.write_to(w),
            FCall::TFlush { oldtag } => oldtag.write_to(w),
            FCall::TWalk {
                fid,
                newfid,
                wnames,
            } => {
                fid.write_to(w)?;
                newfid.write_to(w)?;
                wnames.write_to(w)
            }
            FCall::RWalk { wqids } => wqids.write_to(w),
            FCall::TOpen { fid, mode } => {
                fid.write_to(w)?;
                mode.write_to(w)
            }
            FCall::ROpen { qid, iounit } | FCall::RCreate { qid, iounit } => {
                qid.write_to(w)?;
                iounit.write_to(w)
            }
            FCall::TCreate {
                fid,
                name,
                perm,
                mode,
            } => {
                fid.write_to(w)?;
                name.write_to(w)?;
                perm.write_to(w)?;
                mode.write_to(w)
            }
            FCall::TRead { fid, offset, count } => {
                fid.write_to(w)?;
                offset.write_to(w)?;
                count.write_to(w)
            }
            FCall::RRead { data } => data.write_to(w),
            FCall::TWrite { fid, offset, data } => {
                fid.write_to(w)?;
                offset.write_to(w)?;
                data.write_to(w)
            }
            FCall::RWrite { count } => count.write_to(w),
            FCall::TClunk { fid } | FCall::TRemove { fid } | FCall::TStat { fid } => {
                fid.write_to(w)
            }
            FCall::RStat { stat } => {
                // outer size counts the stat's own leading size field
                (stat.size() + 2).write_to(w)?;
                stat.write_to(w)
            }
            FCall::TWStat { fid, stat } => {
                fid.write_to(w)?;
                (stat.size() + 2).write_to(w)?;
                stat.write_to(w)
            }
            FCall::RFlush | FCall::RClunk | FCall::RRemove | FCall::RWStat => Ok(()),
        }
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let typ = u8::read_from(r)?;
        let tag = u16::read_from(r)?;

        let body = match MsgType::from_u8(typ) {
            Some(MsgType::TVersion) => FCall::TVersion {
                msize: Wire9p::read_from(r)?,
                version: Wire9p::read_from(r)?,
            },
            Some(MsgType::RVersion) => FCall::RVersion {
                msize: Wire9p::read_from(r)?,
                version: Wire9p::read_from(r)?,
            },
            Some(MsgType::TAuth) => FCall::TAuth {
                afid: Wire9p::read_from(r)?,
                uname: Wire9p::read_from(r)?,
                aname: Wire9p::read_from(r)?,
            },
            Some(MsgType::RAuth) => FCall::RAuth {
                aqid: Wire9p::read_from(r)?,
            },
            Some(MsgType::TAttach) => FCall::TAttach {
                fid: Wire9p::read_from(r)?,
                afid: Wire9p::read_from(r)?,
                uname: Wire9p::read_from(r)?,
                aname: Wire9p::read_from(r)?,
            },
            Some(MsgType::RAttach) => FCall::RAttach {
                qid: Wire9p::read_from(r)?,
            },
            Some(MsgType::RError) => FCall::RError {
                ename: Wire9p::read_from(r)?,
            },
            Some(MsgType::TFlush) => FCall::TFlush {
                oldtag: Wire9p::read_from(r)?,
            },
            Some(MsgType::RFlush) => FCall::RFlush,
            Some(MsgType::TWalk) => FCall::TWalk {
                fid: Wire9p::read_from(r)?,
                newfid: Wire9p::read_from(r)?,
                wnames: Wire9p::read_from(r)?,
            },
            Some(MsgType::RWalk) => FCall::RWalk {
                wqids: Wire9p::read_from(r)?,
            },
            Some(MsgType::TOpen) => FCall::TOpen {
                fid: Wire9p::read_from(r)?,
                mode: Wire9p::read_from(r)?,
            },
            Some(MsgType::ROpen) => FCall::ROpen {
                qid: Wire9p::read_from(r)?,
                iounit: Wire9p::read_from(r)?,
            },
            Some(MsgType::TCreate) => FCall::TCreate {
                fid: Wire9p::read_from(r)?,
                name: Wire9p::read_from(r)?,
                perm: Wire9p::read_from(r)?,
                mode: Wire9p::read_from(r)?,
            },
            Some(MsgType::RCreate) => FCall::RCreate {
                qid: Wire9p::read_from(r)?,
                iounit: Wire9p::read_from(r)?,
            },
            Some(MsgType::TRead) => FCall::TRead {
                fid: Wire9p::read_from(r)?,
                offset: Wire9p::read_from(r)?,
                count: Wire9p::read_from(r)?,
            },
            Some(MsgType::RRead) => FCall::RRead {
                data: Wire9p::read_from(r)?,
            },
            Some(MsgType::TWrite) => FCall::TWrite {
                fid: Wire9p::read_from(r)?,
                offset: Wire9p::read_from(r)?,
                data: Wire9p::read_from(r)?,
            },
            Some(MsgType::RWrite) => FCall::RWrite {
                count: Wire9p::read_from(r)?,
            },
            Some(MsgType::TClunk) => FCall::TClunk {
                fid: Wire9p::read_from(r)?,
            },
            Some(MsgType::RClunk) => FCall::RClunk,
            Some(MsgType::TRemove) => FCall::TRemove {
                fid: Wire9p::read_from(r)?,
            },
            Some(MsgType::RRemove) => FCall::RRemove,
            Some(MsgType::TStat) => FCall::TStat {
                fid: Wire9p::read_from(r)?,
            },
            Some(MsgType::RStat) => {
                let _outer = u16::read_from(r)?;
                FCall::RStat {
                    stat: Wire9p::read_from(r)?,
                }
            }
            Some(MsgType::TWStat) => {
                let fid = u32::read_from(r)?;
                let _outer = u16::read_from(r)?;
                FCall::TWStat {
                    fid,
                    stat: Wire9p::read_from(r)?,
                }
            }
            Some(MsgType::RWStat) => FCall::RWStat,
            None => return Err(malformed("unknown message type")),
        };

        Ok(Msg { tag, body })
    }
}

/// Read one 9P message off a complete, size-stripped frame
pub fn read_msg<R: Read>(r: &mut R) -> io::Result<Msg> {
    Msg::read_from(r)
}

/// Write a 9P message body (size framing is the transport's job)
pub fn write_msg<W: Write>(w: &mut W, msg: &Msg) -> io::Result<()> {
    msg.write_to(w)
}
