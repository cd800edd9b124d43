//! Asynchronous server side 9P library.
//!
//! # Protocol
//! 9P2000
//!
//! Serves a synthetic file tree (see [`crate::file`]) to any number of
//! connections. Each connection runs a framing loop that slices complete
//! messages off the socket and dispatches every non-version T-message as its
//! own task. That concurrency is load-bearing, not an optimization: a Tread
//! parked on a stream file's generation gate must never prevent the Twrite
//! to `input` that starts the generation — it is what makes
//! `cat $agent/output & echo prompt > $agent/input` work from one mount.
//!
//! Responses are serialized through a per-connection write lock so frames
//! never interleave on the wire. `Tflush` aborts the task servicing the
//! flushed tag; only the handler future is abortable, so a cancelled request
//! can never leave half a frame behind.

use {
    crate::{
        error::{Error, Result, string as errstr},
        fcall::*,
        file::{Dir, SyntheticFile},
        rerror, serialize,
    },
    bytes::buf::{Buf, BufMut},
    futures::{
        future::{AbortHandle, Abortable},
        sink::SinkExt,
    },
    log::{debug, error, info, warn},
    num_traits::FromPrimitive,
    std::{
        collections::HashMap,
        path::{Path, PathBuf},
        sync::{
            Arc,
            atomic::{AtomicU32, AtomicU64, Ordering},
        },
    },
    tokio::{
        io::{AsyncRead, AsyncWrite},
        net::{TcpListener, UnixListener},
        sync::{Mutex, RwLock, watch},
        time::{Duration, timeout},
    },
    tokio_stream::StreamExt,
    tokio_util::codec::{FramedWrite, length_delimited::LengthDelimitedCodec},
};

/// Server-side maximum message size offered during version negotiation
pub const DEFAULT_MSIZE: u32 = 65536;

/// Conservative msize assumed before Tversion arrives
const INITIAL_MSIZE: u32 = 8192;

/// Budget for one child's stat during a directory read
const STAT_TIMEOUT: Duration = Duration::from_secs(1);

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

struct OpenState {
    mode: u8,
    /// packed stat records, built once per readdir pass (§ directory reads)
    dir_cache: Option<Vec<u8>>,
}

/// Everything one fid refers to.
///
/// `handle` stands in for the raw fid in all file hooks: raw fids are only
/// unique within a connection, while the files they point at are shared
/// across connections.
struct FidState {
    handle: u64,
    path: String,
    qid: QId,
    file: Arc<dyn SyntheticFile>,
    open: Mutex<Option<OpenState>>,
}

impl FidState {
    fn new(path: impl Into<String>, file: Arc<dyn SyntheticFile>) -> Arc<FidState> {
        Arc::new(FidState {
            handle: NEXT_HANDLE.fetch_add(1, Ordering::Relaxed),
            path: path.into(),
            qid: file.qid(),
            file,
            open: Mutex::new(None),
        })
    }
}

struct Conn {
    root: Arc<Dir>,
    server_msize: u32,
    msize: AtomicU32,
    fids: RwLock<HashMap<u32, Arc<FidState>>>,
    /// in-flight tags, abortable via Tflush
    pending: std::sync::Mutex<HashMap<u16, AbortHandle>>,
}

impl Conn {
    fn new(root: Arc<Dir>, server_msize: u32) -> Arc<Conn> {
        Arc::new(Conn {
            root,
            server_msize,
            msize: AtomicU32::new(INITIAL_MSIZE),
            fids: RwLock::new(HashMap::new()),
            pending: std::sync::Mutex::new(HashMap::new()),
        })
    }

    fn msize(&self) -> u32 {
        self.msize.load(Ordering::Relaxed)
    }

    fn iounit(&self) -> u32 {
        self.msize().saturating_sub(IOHDRSZ)
    }

    async fn fid(&self, fid: u32) -> Result<Arc<FidState>> {
        self.fids
            .read()
            .await
            .get(&fid)
            .cloned()
            .ok_or_else(|| Error::from(errstr::UNKNOWN_FID))
    }

    /// Version negotiation. Runs inline in the framing loop because it
    /// resets the fid table and sets the msize framing depends on.
    async fn version(&self, client_msize: u32, version: &str) -> FCall {
        let msize = client_msize.min(self.server_msize);
        self.msize.store(msize, Ordering::Relaxed);
        self.fids.write().await.clear();

        let version = if version.contains(P92000) {
            P92000
        } else {
            VERSION_UNKNOWN
        };
        debug!("version negotiated: msize={msize}, version={version}");

        FCall::RVersion {
            msize,
            version: version.to_owned(),
        }
    }

    async fn handle_message(&self, msg: Msg) -> Result<FCall> {
        match msg.body {
            FCall::TAuth { .. } => rerror!(errstr::AUTH_NOT_REQUIRED),
            FCall::TAttach {
                fid,
                ref uname,
                ref aname,
                ..
            } => self.attach(fid, uname, aname).await,
            FCall::TWalk {
                fid,
                newfid,
                ref wnames,
            } => self.walk(fid, newfid, wnames).await,
            FCall::TOpen { fid, mode } => self.open(fid, mode).await,
            FCall::TCreate {
                fid,
                ref name,
                perm,
                mode,
            } => self.create(fid, name, perm, mode).await,
            FCall::TRead { fid, offset, count } => self.read(fid, offset, count).await,
            FCall::TWrite {
                fid,
                offset,
                ref data,
            } => self.write(fid, offset, data).await,
            FCall::TClunk { fid } => self.clunk(fid).await,
            FCall::TStat { fid } => self.stat(fid).await,
            FCall::TWStat { fid, ref stat } => self.wstat(fid, stat).await,
            FCall::TFlush { oldtag } => self.flush(oldtag),
            FCall::TRemove { .. } => rerror!(errstr::REMOVE_NOT_SUPPORTED),
            // Tversion is handled inline; anything else (an R-message from
            // a confused client) is refused under its own tag
            _ => rerror!(errstr::UNKNOWN_MSG_TYPE),
        }
    }

    async fn attach(&self, fid: u32, uname: &str, aname: &str) -> Result<FCall> {
        let mut fids = self.fids.write().await;
        if fids.contains_key(&fid) {
            return rerror!(errstr::FID_IN_USE);
        }

        let state = FidState::new("/", self.root.clone() as Arc<dyn SyntheticFile>);
        let qid = state.qid;
        fids.insert(fid, state);

        debug!("attach: fid={fid} uname={uname} aname={aname}");
        Ok(FCall::RAttach { qid })
    }

    async fn walk(&self, fid: u32, newfid: u32, wnames: &[String]) -> Result<FCall> {
        let start = self.fid(fid).await?;

        // empty walk clones the fid
        if wnames.is_empty() {
            if newfid != fid {
                let clone = FidState::new(start.path.clone(), start.file.clone());
                self.fids.write().await.insert(newfid, clone);
            }
            return Ok(FCall::RWalk { wqids: Vec::new() });
        }

        let mut current = start.file.clone();
        let mut current_path = start.path.clone();
        let mut wqids = Vec::new();

        for (i, name) in wnames.iter().enumerate() {
            if !current.is_dir() {
                if i == 0 {
                    return rerror!(errstr::NOT_A_DIRECTORY);
                }
                break;
            }

            match name.as_str() {
                ".." => {
                    if let Some(parent) = current.parent() {
                        current = parent;
                    }
                    current_path = parent_path(&current_path);
                }
                "." => {}
                name => match current.lookup(name).await {
                    Some(child) => {
                        current = child;
                        current_path = join_path(&current_path, name);
                    }
                    None => {
                        if i == 0 {
                            return rerror!(format!("{}: {name}", errstr::FILE_NOT_FOUND));
                        }
                        break;
                    }
                },
            }

            wqids.push(current.qid());
        }

        // newfid only materializes on a full walk; partial success just
        // reports how far we got
        if wqids.len() == wnames.len() {
            let state = FidState::new(current_path, current);
            self.fids.write().await.insert(newfid, state);
        }

        debug!("walk: fid={fid} -> {}/{} components", wqids.len(), wnames.len());
        Ok(FCall::RWalk { wqids })
    }

    async fn open(&self, fid: u32, mode: u8) -> Result<FCall> {
        let fs = self.fid(fid).await?;
        let mut open = fs.open.lock().await;
        if open.is_some() {
            return rerror!(errstr::FID_ALREADY_OPEN);
        }

        if matches!(mode & 0x3, om::WRITE | om::RDWR) {
            let stat = fs.file.stat().await;
            if stat.mode & 0o200 == 0 {
                warn!("open for write denied: {} has mode {:#o}", fs.path, stat.mode);
                return rerror!(errstr::PERMISSION_DENIED);
            }
        }

        fs.file.open(fs.handle, mode).await?;
        *open = Some(OpenState {
            mode,
            dir_cache: None,
        });

        debug!("open: {} mode={mode:#x}", fs.path);
        Ok(FCall::ROpen {
            qid: fs.qid,
            iounit: self.iounit(),
        })
    }

    async fn read(&self, fid: u32, offset: u64, count: u32) -> Result<FCall> {
        let fs = self.fid(fid).await?;
        if fs.open.lock().await.is_none() {
            return rerror!(errstr::FID_NOT_OPEN);
        }

        let count = count.min(self.iounit());
        let data = if fs.file.is_dir() {
            self.read_dir(&fs, offset, count).await?
        } else {
            fs.file.read(fs.handle, offset, count).await?
        };

        debug!(
            "read: {} offset={offset} requested={count} got={}",
            fs.path,
            data.len()
        );
        Ok(FCall::RRead { data: Data(data) })
    }

    /// Directory read protocol: serve whole packed stat records out of a
    /// per-fid cache, rebuilt whenever a readdir restarts at offset 0.
    async fn read_dir(&self, fs: &Arc<FidState>, offset: u64, count: u32) -> Result<Vec<u8>> {
        use crate::serialize::Wire9p;

        let mut open = fs.open.lock().await;
        let Some(state) = open.as_mut() else {
            return rerror!(errstr::FID_NOT_OPEN);
        };

        if offset == 0 || state.dir_cache.is_none() {
            let mut blob = Vec::new();
            for child in fs.file.list() {
                // one stalled stat hook must not wedge the whole listing
                match timeout(STAT_TIMEOUT, child.stat()).await {
                    Ok(stat) => {
                        stat.write_to(&mut blob)?;
                    }
                    Err(_) => {
                        warn!("stat timeout in {}, skipping {}", fs.path, child.name());
                        continue;
                    }
                }
            }
            state.dir_cache = Some(blob);
        }

        let cache = state.dir_cache.as_deref().unwrap_or_default();
        let offset = offset as usize;
        if offset >= cache.len() {
            return Ok(Vec::new());
        }

        // advance over whole records only; no stat entry is ever split
        let end = (offset + count as usize).min(cache.len());
        let mut pos = offset;
        while pos < end {
            if pos + 2 > cache.len() {
                break;
            }
            let entry_size = u16::from_le_bytes([cache[pos], cache[pos + 1]]) as usize;
            let entry_total = entry_size + 2;
            if pos + entry_total > end {
                if pos == offset {
                    // an undersized count still gets the first record whole,
                    // so small readers always make progress
                    pos += entry_total;
                }
                break;
            }
            pos += entry_total;
        }
        let pos = pos.min(cache.len());

        Ok(cache[offset..pos].to_vec())
    }

    async fn write(&self, fid: u32, offset: u64, data: &Data) -> Result<FCall> {
        let fs = self.fid(fid).await?;
        if fs.open.lock().await.is_none() {
            return rerror!(errstr::FID_NOT_OPEN);
        }

        let count = fs.file.write(fs.handle, offset, &data.0).await?;
        debug!("write: {} offset={offset} wrote={count}", fs.path);
        Ok(FCall::RWrite { count })
    }

    async fn clunk(&self, fid: u32) -> Result<FCall> {
        let fs = self
            .fids
            .write()
            .await
            .remove(&fid)
            .ok_or_else(|| Error::from(errstr::UNKNOWN_FID))?;

        // the fid is already gone whatever the hook does
        fs.file.clunk(fs.handle);

        debug!("clunk: fid={fid} ({})", fs.path);
        Ok(FCall::RClunk)
    }

    async fn stat(&self, fid: u32) -> Result<FCall> {
        let fs = self.fid(fid).await?;
        let stat = fs.file.stat().await;
        Ok(FCall::RStat { stat })
    }

    async fn wstat(&self, fid: u32, stat: &Stat) -> Result<FCall> {
        let fs = self.fid(fid).await?;

        // the one honored wstat: the kernel expresses O_TRUNC as a wstat
        // with length 0; everything else succeeds silently
        if stat.length == 0 {
            fs.file.truncate();
            debug!("wstat: truncated {}", fs.path);
        }

        Ok(FCall::RWStat)
    }

    fn flush(&self, oldtag: u16) -> Result<FCall> {
        if let Some(task) = self.pending.lock().unwrap().remove(&oldtag) {
            task.abort();
            debug!("flush: cancelled tag={oldtag}");
        } else {
            debug!("flush: tag={oldtag} not in flight");
        }
        Ok(FCall::RFlush)
    }

    async fn create(&self, fid: u32, name: &str, perm: u32, mode: u8) -> Result<FCall> {
        let fs = self.fid(fid).await?;
        if !fs.file.is_dir() {
            return rerror!(errstr::NOT_A_DIRECTORY);
        }

        let file = fs.file.create(name, perm, mode).await?;
        let state = FidState::new(join_path(&fs.path, name), file.clone());
        file.open(state.handle, mode).await?;
        *state.open.lock().await = Some(OpenState {
            mode,
            dir_cache: None,
        });
        let qid = state.qid;

        // after create, the original fid refers to the created file
        self.fids.write().await.insert(fid, state);

        info!("create: {}/{name}", fs.path);
        Ok(FCall::RCreate {
            qid,
            iounit: self.iounit(),
        })
    }
}

fn parent_path(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_owned(),
        Some(i) => path[..i].to_owned(),
    }
}

fn join_path(path: &str, name: &str) -> String {
    if path == "/" {
        format!("/{name}")
    } else {
        format!("{path}/{name}")
    }
}

type SharedWriter<W> = Arc<Mutex<FramedWrite<W, LengthDelimitedCodec>>>;

async fn send_msg<W>(writer: &SharedWriter<W>, msg: &Msg) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = bytes::BytesMut::with_capacity(4096).writer();
    serialize::write_msg(&mut buf, msg)?;
    let frozen = buf.into_inner().freeze();

    let mut writer = writer.lock().await;
    writer.send(frozen).await?;
    Ok(())
}

async fn dispatch<Reader, Writer>(
    root: Arc<Dir>,
    server_msize: u32,
    reader: Reader,
    writer: Writer,
) -> Result<()>
where
    Reader: 'static + AsyncRead + Send + std::marker::Unpin,
    Writer: 'static + AsyncWrite + Send + std::marker::Unpin,
{
    let conn = Conn::new(root, server_msize);

    let mut framedread = LengthDelimitedCodec::builder()
        .length_field_offset(0)
        .length_field_length(4)
        .length_adjustment(-4)
        .little_endian()
        .new_read(reader);
    let framedwrite = LengthDelimitedCodec::builder()
        .length_field_offset(0)
        .length_field_length(4)
        .length_adjustment(-4)
        .little_endian()
        .new_write(writer);
    let framedwrite = Arc::new(Mutex::new(framedwrite));

    // flipped by any task whose response write fails; fails the whole
    // connection rather than leaving a client waiting on lost replies
    let (closed_tx, mut closed_rx) = watch::channel(false);

    loop {
        let bytes = tokio::select! {
            next = framedread.next() => match next {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    error!("framing error: {e}");
                    break;
                }
                None => break,
            },
            _ = closed_rx.changed() => {
                error!("response writer failed, closing connection");
                break;
            }
        };

        if bytes.len() as u32 + 4 > conn.msize() {
            error!(
                "message too large: {} > {}, closing connection",
                bytes.len() + 4,
                conn.msize()
            );
            break;
        }

        let msg = match serialize::read_msg(&mut bytes.clone().reader()) {
            Ok(msg) => msg,
            Err(e) => {
                // a well-formed header with an unrecognized type byte still
                // gets an answer under its tag; true garbage is dropped
                // (there is no tag to reply under)
                let known_t = bytes
                    .first()
                    .and_then(|b| MsgType::from_u8(*b))
                    .is_some_and(|t| t.is_t());
                if bytes.len() >= 3 && !known_t {
                    let tag = u16::from_le_bytes([bytes[1], bytes[2]]);
                    warn!("unknown message type {} tag={tag}", bytes[0]);
                    let resp = Msg {
                        tag,
                        body: FCall::RError {
                            ename: errstr::UNKNOWN_MSG_TYPE.to_owned(),
                        },
                    };
                    if send_msg(&framedwrite, &resp).await.is_err() {
                        break;
                    }
                } else {
                    error!("decode error: {e}");
                }
                continue;
            }
        };
        info!("\t← {:?}", msg);

        // version is special: it resets connection state the framing loop
        // itself depends on, so it never runs concurrently
        if let FCall::TVersion { msize, ref version } = msg.body {
            let body = conn.version(msize, version).await;
            let resp = Msg { tag: msg.tag, body };
            info!("\t→ {:?}", resp);
            if send_msg(&framedwrite, &resp).await.is_err() {
                break;
            }
            continue;
        }

        let (abort_handle, abort_reg) = AbortHandle::new_pair();
        conn.pending.lock().unwrap().insert(msg.tag, abort_handle);

        let conn = conn.clone();
        let framedwrite = framedwrite.clone();
        let closed_tx = closed_tx.clone();

        tokio::spawn(async move {
            let tag = msg.tag;
            let result = Abortable::new(conn.handle_message(msg), abort_reg).await;
            conn.pending.lock().unwrap().remove(&tag);

            let body = match result {
                Ok(Ok(body)) => body,
                Ok(Err(e)) => {
                    error!("handler error (tag {tag}): {e}");
                    FCall::RError { ename: e.ename() }
                }
                // flushed: the client has been told to forget this tag
                Err(_aborted) => return,
            };

            let resp = Msg { tag, body };
            info!("\t→ {:?}", resp);
            if let Err(e) = send_msg(&framedwrite, &resp).await {
                error!("failed to send response for tag {tag}: {e}");
                let _ = closed_tx.send(true);
            }
        });
    }

    // connection teardown cancels every pending task
    for (_, task) in conn.pending.lock().unwrap().drain() {
        task.abort();
    }

    Ok(())
}

/// A listen address in Plan 9 dial-string form.
///
/// Exactly two transports are understood: `tcp!host!port` and
/// `unix!path!suffix` (the suffix is conventional and ignored, as in
/// `unix!/tmp/agentfs!0`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListenAddr {
    /// `host:port`, ready for [`TcpListener::bind`]
    Tcp(String),
    Unix(PathBuf),
}

impl std::str::FromStr for ListenAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<ListenAddr> {
        let mut parts = s.splitn(3, '!');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("tcp"), Some(host), Some(port)) if !host.is_empty() => {
                if port.parse::<u16>().is_err() {
                    return rerror!(format!("bad port in dial string: {s}"));
                }
                Ok(ListenAddr::Tcp(format!("{host}:{port}")))
            }
            (Some("unix"), Some(path), _suffix) if !path.is_empty() => {
                Ok(ListenAddr::Unix(PathBuf::from(path)))
            }
            _ => rerror!(format!(
                "invalid dial string: {s} (expected tcp!host!port or unix!path!suffix)"
            )),
        }
    }
}

/// A 9P2000 server for one synthetic file tree.
///
/// Multiple servers may coexist in one process (say, an agent filesystem
/// and a display server on adjacent ports); all state lives inside the
/// instance.
pub struct Server {
    root: Arc<Dir>,
    msize: u32,
}

impl Server {
    pub fn new(root: Arc<Dir>) -> Server {
        Server {
            root,
            msize: DEFAULT_MSIZE,
        }
    }

    /// Override the advertised maximum message size
    pub fn msize(mut self, msize: u32) -> Server {
        self.msize = msize;
        self
    }

    /// Serve on a [`ListenAddr`] dial string.
    pub async fn serve(&self, addr: &str) -> Result<()> {
        match addr.parse::<ListenAddr>()? {
            ListenAddr::Tcp(addr) => self.serve_tcp(&addr).await,
            ListenAddr::Unix(path) => self.serve_unix(path).await,
        }
    }

    pub async fn serve_tcp(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;

        loop {
            let (stream, peer) = listener.accept().await?;
            info!("accepted: {:?}", peer);

            let root = self.root.clone();
            let msize = self.msize;
            tokio::spawn(async move {
                let (readhalf, writehalf) = stream.into_split();
                if let Err(e) = dispatch(root, msize, readhalf, writehalf).await {
                    error!("connection error: {e}");
                }
            });
        }
    }

    pub async fn serve_unix(&self, addr: impl AsRef<Path>) -> Result<()> {
        use tokio::signal::unix::{SignalKind, signal};

        let listener = DeleteOnDrop::bind(addr)?;

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer) = result?;
                    info!("accepted: {:?}", peer);

                    let root = self.root.clone();
                    let msize = self.msize;
                    tokio::spawn(async move {
                        let (readhalf, writehalf) = tokio::io::split(stream);
                        if let Err(e) = dispatch(root, msize, readhalf, writehalf).await {
                            error!("connection error: {e}");
                        }
                    });
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down");
                    return Ok(());
                }
                _ = sigint.recv() => {
                    info!("received SIGINT, shutting down");
                    return Ok(());
                }
            }
        }
    }
}

struct DeleteOnDrop {
    path: PathBuf,
    listener: UnixListener,
}

impl DeleteOnDrop {
    fn bind(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_owned();
        let _ = std::fs::remove_file(&path);
        UnixListener::bind(&path).map(|listener| DeleteOnDrop { path, listener })
    }
}

impl std::ops::Deref for DeleteOnDrop {
    type Target = UnixListener;

    fn deref(&self) -> &Self::Target {
        &self.listener
    }
}

impl Drop for DeleteOnDrop {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("failed to remove socket file {:?}: {e}", self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::DataFile;
    use crate::stream::StreamFile;
    use std::io::Cursor;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    const TICK: Duration = Duration::from_millis(50);

    #[test]
    fn dial_strings_parse_and_validate() {
        assert_eq!(
            "tcp!0.0.0.0!5640".parse::<ListenAddr>().unwrap(),
            ListenAddr::Tcp("0.0.0.0:5640".to_owned())
        );
        assert_eq!(
            "unix!/tmp/agentfs!0".parse::<ListenAddr>().unwrap(),
            ListenAddr::Unix(PathBuf::from("/tmp/agentfs"))
        );
        // the unix suffix is conventional, not required
        assert_eq!(
            "unix!/tmp/agentfs".parse::<ListenAddr>().unwrap(),
            ListenAddr::Unix(PathBuf::from("/tmp/agentfs"))
        );

        assert!("127.0.0.1:5640".parse::<ListenAddr>().is_err());
        assert!("tcp!host!notaport".parse::<ListenAddr>().is_err());
        assert!("tls!host!5640".parse::<ListenAddr>().is_err());
    }

    fn start(root: Arc<Dir>, msize: u32) -> DuplexStream {
        let (client, server) = tokio::io::duplex(1 << 20);
        tokio::spawn(async move {
            let (readhalf, writehalf) = tokio::io::split(server);
            let _ = dispatch(root, msize, readhalf, writehalf).await;
        });
        client
    }

    async fn send(client: &mut DuplexStream, msg: &Msg) {
        let mut body = Vec::new();
        serialize::write_msg(&mut body, msg).unwrap();
        let mut frame = ((body.len() + 4) as u32).to_le_bytes().to_vec();
        frame.extend_from_slice(&body);
        client.write_all(&frame).await.unwrap();
    }

    async fn recv(client: &mut DuplexStream) -> Msg {
        let mut len = [0u8; 4];
        client.read_exact(&mut len).await.unwrap();
        let mut body = vec![0u8; u32::from_le_bytes(len) as usize - 4];
        client.read_exact(&mut body).await.unwrap();
        serialize::read_msg(&mut Cursor::new(body)).unwrap()
    }

    /// One request/response exchange, asserting the tag echoes back
    async fn rpc(client: &mut DuplexStream, tag: u16, body: FCall) -> FCall {
        send(client, &Msg { tag, body }).await;
        let resp = recv(client).await;
        assert_eq!(resp.tag, tag, "response tag must echo the request tag");
        resp.body
    }

    async fn handshake(client: &mut DuplexStream, msize: u32) {
        let resp = rpc(
            client,
            NOTAG,
            FCall::TVersion {
                msize,
                version: P92000.to_owned(),
            },
        )
        .await;
        assert!(matches!(resp, FCall::RVersion { .. }));

        let resp = rpc(
            client,
            1,
            FCall::TAttach {
                fid: 0,
                afid: NOFID,
                uname: "glenda".to_owned(),
                aname: "".to_owned(),
            },
        )
        .await;
        assert!(matches!(resp, FCall::RAttach { .. }));
    }

    async fn walk_open(client: &mut DuplexStream, fid: u32, path: &[&str], mode: u8) {
        let resp = rpc(
            client,
            2,
            FCall::TWalk {
                fid: 0,
                newfid: fid,
                wnames: path.iter().map(|s| s.to_string()).collect(),
            },
        )
        .await;
        match resp {
            FCall::RWalk { wqids } => assert_eq!(wqids.len(), path.len()),
            other => panic!("walk failed: {other:?}"),
        }
        let resp = rpc(client, 3, FCall::TOpen { fid, mode }).await;
        assert!(matches!(resp, FCall::ROpen { .. }), "open failed: {resp:?}");
    }

    #[tokio::test]
    async fn version_negotiates_msize_and_dialect() {
        let mut client = start(Dir::root(), DEFAULT_MSIZE);

        let resp = rpc(
            &mut client,
            NOTAG,
            FCall::TVersion {
                msize: 1_000_000,
                version: P92000.to_owned(),
            },
        )
        .await;
        assert_eq!(
            resp,
            FCall::RVersion {
                msize: DEFAULT_MSIZE,
                version: P92000.to_owned(),
            }
        );

        let resp = rpc(
            &mut client,
            NOTAG,
            FCall::TVersion {
                msize: 8192,
                version: "9P1999".to_owned(),
            },
        )
        .await;
        assert_eq!(
            resp,
            FCall::RVersion {
                msize: 8192,
                version: VERSION_UNKNOWN.to_owned(),
            }
        );
    }

    #[tokio::test]
    async fn version_resets_the_fid_table() {
        let mut client = start(Dir::root(), DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;

        let resp = rpc(
            &mut client,
            NOTAG,
            FCall::TVersion {
                msize: DEFAULT_MSIZE,
                version: P92000.to_owned(),
            },
        )
        .await;
        assert!(matches!(resp, FCall::RVersion { .. }));

        let resp = rpc(&mut client, 7, FCall::TStat { fid: 0 }).await;
        assert_eq!(
            resp,
            FCall::RError {
                ename: errstr::UNKNOWN_FID.to_owned()
            }
        );
    }

    #[tokio::test]
    async fn auth_is_refused_and_remove_unsupported() {
        let mut client = start(Dir::root(), DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;

        let resp = rpc(
            &mut client,
            5,
            FCall::TAuth {
                afid: 99,
                uname: "glenda".to_owned(),
                aname: "".to_owned(),
            },
        )
        .await;
        assert_eq!(
            resp,
            FCall::RError {
                ename: errstr::AUTH_NOT_REQUIRED.to_owned()
            }
        );

        let resp = rpc(&mut client, 6, FCall::TRemove { fid: 0 }).await;
        assert_eq!(
            resp,
            FCall::RError {
                ename: errstr::REMOVE_NOT_SUPPORTED.to_owned()
            }
        );
    }

    #[tokio::test]
    async fn attach_rejects_fid_in_use() {
        let mut client = start(Dir::root(), DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;

        let resp = rpc(
            &mut client,
            2,
            FCall::TAttach {
                fid: 0,
                afid: NOFID,
                uname: "glenda".to_owned(),
                aname: "".to_owned(),
            },
        )
        .await;
        assert_eq!(
            resp,
            FCall::RError {
                ename: errstr::FID_IN_USE.to_owned()
            }
        );
    }

    #[tokio::test]
    async fn walk_open_read_data_file() {
        let root = Dir::root();
        let a = Dir::new("a");
        root.add(a.clone());
        let b = Dir::new("b");
        a.add(b.clone());
        b.add(DataFile::new("c", b"deep content"));

        let mut client = start(root, DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;
        walk_open(&mut client, 1, &["a", "b", "c"], om::READ).await;

        let resp = rpc(
            &mut client,
            4,
            FCall::TRead {
                fid: 1,
                offset: 5,
                count: 4096,
            },
        )
        .await;
        assert_eq!(resp, FCall::RRead { data: Data(b"content".to_vec()) });

        let resp = rpc(&mut client, 5, FCall::TClunk { fid: 1 }).await;
        assert_eq!(resp, FCall::RClunk);

        // the clunked fid is gone
        let resp = rpc(
            &mut client,
            6,
            FCall::TRead {
                fid: 1,
                offset: 0,
                count: 16,
            },
        )
        .await;
        assert_eq!(
            resp,
            FCall::RError {
                ename: errstr::UNKNOWN_FID.to_owned()
            }
        );
    }

    #[tokio::test]
    async fn walk_partial_success_does_not_create_newfid() {
        let root = Dir::root();
        let a = Dir::new("a");
        root.add(a.clone());
        let b = Dir::new("b");
        a.add(b.clone());
        b.add(DataFile::new("c", b""));

        let mut client = start(root, DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;

        let resp = rpc(
            &mut client,
            2,
            FCall::TWalk {
                fid: 0,
                newfid: 2,
                wnames: vec!["a".to_owned(), "b".to_owned(), "xyz".to_owned()],
            },
        )
        .await;
        match resp {
            FCall::RWalk { wqids } => assert_eq!(wqids.len(), 2),
            other => panic!("expected partial RWalk, got {other:?}"),
        }

        // newfid 2 must not exist after the partial walk
        let resp = rpc(&mut client, 3, FCall::TStat { fid: 2 }).await;
        assert_eq!(
            resp,
            FCall::RError {
                ename: errstr::UNKNOWN_FID.to_owned()
            }
        );

        // the full path succeeds and lands newfid on c
        let resp = rpc(
            &mut client,
            4,
            FCall::TWalk {
                fid: 0,
                newfid: 2,
                wnames: vec!["a".to_owned(), "b".to_owned(), "c".to_owned()],
            },
        )
        .await;
        match resp {
            FCall::RWalk { wqids } => assert_eq!(wqids.len(), 3),
            other => panic!("expected full RWalk, got {other:?}"),
        }
        let resp = rpc(&mut client, 5, FCall::TStat { fid: 2 }).await;
        match resp {
            FCall::RStat { stat } => assert_eq!(stat.name, "c"),
            other => panic!("expected RStat, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn walk_failure_at_first_component_is_an_error() {
        let mut client = start(Dir::root(), DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;

        let resp = rpc(
            &mut client,
            2,
            FCall::TWalk {
                fid: 0,
                newfid: 2,
                wnames: vec!["missing".to_owned()],
            },
        )
        .await;
        assert!(matches!(resp, FCall::RError { .. }));
    }

    #[tokio::test]
    async fn clone_walk_returns_no_qids_and_aliases() {
        let root = Dir::root();
        root.add(DataFile::new("f", b"x"));

        let mut client = start(root, DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;

        let resp = rpc(
            &mut client,
            2,
            FCall::TWalk {
                fid: 0,
                newfid: 1,
                wnames: Vec::new(),
            },
        )
        .await;
        assert_eq!(resp, FCall::RWalk { wqids: Vec::new() });

        // a self walk is distinct: it returns one qid
        let resp = rpc(
            &mut client,
            3,
            FCall::TWalk {
                fid: 0,
                newfid: 2,
                wnames: vec![".".to_owned()],
            },
        )
        .await;
        match resp {
            FCall::RWalk { wqids } => assert_eq!(wqids.len(), 1),
            other => panic!("expected RWalk, got {other:?}"),
        }

        // both aliases resolve the same file
        let resp = rpc(
            &mut client,
            4,
            FCall::TWalk {
                fid: 1,
                newfid: 3,
                wnames: vec!["f".to_owned()],
            },
        )
        .await;
        assert!(matches!(resp, FCall::RWalk { .. }));
    }

    #[tokio::test]
    async fn open_for_write_on_read_only_file_fails() {
        let root = Dir::root();
        root.add(DataFile::read_only("frozen", b"data"));

        let mut client = start(root, DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;

        let resp = rpc(
            &mut client,
            2,
            FCall::TWalk {
                fid: 0,
                newfid: 1,
                wnames: vec!["frozen".to_owned()],
            },
        )
        .await;
        assert!(matches!(resp, FCall::RWalk { .. }));

        let resp = rpc(
            &mut client,
            3,
            FCall::TOpen {
                fid: 1,
                mode: om::WRITE,
            },
        )
        .await;
        assert_eq!(
            resp,
            FCall::RError {
                ename: errstr::PERMISSION_DENIED.to_owned()
            }
        );

        // no side effect: reading still works on a fresh open
        let resp = rpc(
            &mut client,
            4,
            FCall::TOpen {
                fid: 1,
                mode: om::READ,
            },
        )
        .await;
        assert!(matches!(resp, FCall::ROpen { .. }));
    }

    #[tokio::test]
    async fn unopened_fid_never_services_io() {
        let root = Dir::root();
        root.add(DataFile::new("f", b"data"));

        let mut client = start(root, DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;

        let resp = rpc(
            &mut client,
            2,
            FCall::TWalk {
                fid: 0,
                newfid: 1,
                wnames: vec!["f".to_owned()],
            },
        )
        .await;
        assert!(matches!(resp, FCall::RWalk { .. }));

        let resp = rpc(
            &mut client,
            3,
            FCall::TRead {
                fid: 1,
                offset: 0,
                count: 16,
            },
        )
        .await;
        assert_eq!(
            resp,
            FCall::RError {
                ename: errstr::FID_NOT_OPEN.to_owned()
            }
        );

        let resp = rpc(
            &mut client,
            4,
            FCall::TWrite {
                fid: 1,
                offset: 0,
                data: Data(b"x".to_vec()),
            },
        )
        .await;
        assert_eq!(
            resp,
            FCall::RError {
                ename: errstr::FID_NOT_OPEN.to_owned()
            }
        );
    }

    #[tokio::test]
    async fn double_open_fails() {
        let root = Dir::root();
        root.add(DataFile::new("f", b""));

        let mut client = start(root, DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;
        walk_open(&mut client, 1, &["f"], om::READ).await;

        let resp = rpc(
            &mut client,
            4,
            FCall::TOpen {
                fid: 1,
                mode: om::READ,
            },
        )
        .await;
        assert_eq!(
            resp,
            FCall::RError {
                ename: errstr::FID_ALREADY_OPEN.to_owned()
            }
        );
    }

    #[tokio::test]
    async fn read_count_capped_at_iounit() {
        let root = Dir::root();
        root.add(DataFile::new("big", &vec![7u8; 4096]));

        let mut client = start(root, DEFAULT_MSIZE);
        handshake(&mut client, 1024).await; // iounit = 1000

        walk_open(&mut client, 1, &["big"], om::READ).await;
        let resp = rpc(
            &mut client,
            4,
            FCall::TRead {
                fid: 1,
                offset: 0,
                count: 4096,
            },
        )
        .await;
        match resp {
            FCall::RRead { data } => assert_eq!(data.0.len(), (1024 - IOHDRSZ) as usize),
            other => panic!("expected RRead, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sparse_write_and_wstat_truncate() {
        let root = Dir::root();
        root.add(DataFile::new("f", b"ab"));

        let mut client = start(root.clone(), DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;
        walk_open(&mut client, 1, &["f"], om::RDWR).await;

        let resp = rpc(
            &mut client,
            4,
            FCall::TWrite {
                fid: 1,
                offset: 5,
                data: Data(b"cd".to_vec()),
            },
        )
        .await;
        assert_eq!(resp, FCall::RWrite { count: 2 });

        let resp = rpc(
            &mut client,
            5,
            FCall::TRead {
                fid: 1,
                offset: 0,
                count: 64,
            },
        )
        .await;
        assert_eq!(resp, FCall::RRead { data: Data(b"ab\0\0\0cd".to_vec()) });

        // kernel-style truncate: wstat with length 0
        let resp = rpc(
            &mut client,
            6,
            FCall::TWStat {
                fid: 1,
                stat: Stat::default(),
            },
        )
        .await;
        assert_eq!(resp, FCall::RWStat);

        let resp = rpc(&mut client, 7, FCall::TStat { fid: 1 }).await;
        match resp {
            FCall::RStat { stat } => assert_eq!(stat.length, 0),
            other => panic!("expected RStat, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wstat_on_non_data_file_succeeds_silently() {
        let root = Dir::root();
        root.add(StreamFile::new("out"));

        let mut client = start(root, DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;

        let resp = rpc(
            &mut client,
            2,
            FCall::TWalk {
                fid: 0,
                newfid: 1,
                wnames: vec!["out".to_owned()],
            },
        )
        .await;
        assert!(matches!(resp, FCall::RWalk { .. }));

        let resp = rpc(
            &mut client,
            3,
            FCall::TWStat {
                fid: 1,
                stat: Stat::default(),
            },
        )
        .await;
        assert_eq!(resp, FCall::RWStat);
    }

    #[tokio::test]
    async fn generation_gate_end_to_end() {
        let root = Dir::root();
        let out = StreamFile::new("out");
        root.add(out.clone());

        let mut client = start(root, DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;
        walk_open(&mut client, 1, &["out"], om::READ).await;

        // read blocks on the gate
        send(
            &mut client,
            &Msg {
                tag: 10,
                body: FCall::TRead {
                    fid: 1,
                    offset: 0,
                    count: 4096,
                },
            },
        )
        .await;
        tokio::time::sleep(TICK).await;

        out.reset();
        tokio::time::sleep(TICK).await;

        out.append(b"hello");
        let resp = recv(&mut client).await;
        assert_eq!(resp.tag, 10);
        assert_eq!(resp.body, FCall::RRead { data: Data(b"hello".to_vec()) });

        // next read blocks until finish, then EOF
        send(
            &mut client,
            &Msg {
                tag: 11,
                body: FCall::TRead {
                    fid: 1,
                    offset: 5,
                    count: 4096,
                },
            },
        )
        .await;
        tokio::time::sleep(TICK).await;
        out.finish();
        let resp = recv(&mut client).await;
        assert_eq!(resp.tag, 11);
        assert_eq!(resp.body, FCall::RRead { data: Data(Vec::new()) });

        let resp = rpc(&mut client, 12, FCall::TClunk { fid: 1 }).await;
        assert_eq!(resp, FCall::RClunk);

        // a new reader lands back on the gate for the next generation
        walk_open(&mut client, 2, &["out"], om::READ).await;
        send(
            &mut client,
            &Msg {
                tag: 13,
                body: FCall::TRead {
                    fid: 2,
                    offset: 0,
                    count: 4096,
                },
            },
        )
        .await;
        tokio::time::sleep(TICK).await;

        out.reset();
        out.append(b"world");
        out.finish();

        let resp = recv(&mut client).await;
        assert_eq!(resp.body, FCall::RRead { data: Data(b"world".to_vec()) });
        let resp = rpc(
            &mut client,
            14,
            FCall::TRead {
                fid: 2,
                offset: 5,
                count: 4096,
            },
        )
        .await;
        assert_eq!(resp, FCall::RRead { data: Data(Vec::new()) });
    }

    #[tokio::test]
    async fn blocked_read_does_not_block_writes_and_flush_cancels() {
        let root = Dir::root();
        let foo = Dir::new("foo");
        root.add(foo.clone());
        foo.add(StreamFile::new("out"));
        foo.add(DataFile::new("input", b""));

        let mut client = start(root, DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;
        walk_open(&mut client, 1, &["foo", "out"], om::READ).await;

        send(
            &mut client,
            &Msg {
                tag: 20,
                body: FCall::TRead {
                    fid: 1,
                    offset: 0,
                    count: 4096,
                },
            },
        )
        .await;
        tokio::time::sleep(TICK).await;

        // the write on the same connection must be served while the read
        // is still pending
        let resp = rpc(
            &mut client,
            21,
            FCall::TWalk {
                fid: 0,
                newfid: 2,
                wnames: vec!["foo".to_owned(), "input".to_owned()],
            },
        )
        .await;
        assert!(matches!(resp, FCall::RWalk { .. }));
        let resp = rpc(
            &mut client,
            22,
            FCall::TOpen {
                fid: 2,
                mode: om::WRITE,
            },
        )
        .await;
        assert!(matches!(resp, FCall::ROpen { .. }));
        let resp = rpc(
            &mut client,
            23,
            FCall::TWrite {
                fid: 2,
                offset: 0,
                data: Data(b"prompt".to_vec()),
            },
        )
        .await;
        assert_eq!(resp, FCall::RWrite { count: 6 });

        // flush the pending read; Rflush always comes back
        let resp = rpc(&mut client, 24, FCall::TFlush { oldtag: 20 }).await;
        assert_eq!(resp, FCall::RFlush);

        // and tag 20 never answers
        let mut probe = [0u8; 1];
        let silent = timeout(TICK, client.read_exact(&mut probe)).await;
        assert!(silent.is_err(), "flushed read must produce no reply");

        // the connection is still healthy
        let resp = rpc(&mut client, 25, FCall::TStat { fid: 2 }).await;
        assert!(matches!(resp, FCall::RStat { .. }));
    }

    #[tokio::test]
    async fn flush_of_unknown_tag_still_replies() {
        let mut client = start(Dir::root(), DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;

        let resp = rpc(&mut client, 2, FCall::TFlush { oldtag: 999 }).await;
        assert_eq!(resp, FCall::RFlush);
    }

    #[tokio::test]
    async fn directory_reads_never_split_stat_records() {
        let root = Dir::root();
        root.add(DataFile::new("one", b"1"));
        root.add(DataFile::new("somewhat-longer-name", b"22"));
        root.add(DataFile::new("x", b"333"));

        let mut client = start(root.clone(), DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;
        walk_open(&mut client, 1, &[], om::READ).await;

        // record sizes as the server will pack them
        let sizes: Vec<usize> = {
            let mut sizes = Vec::new();
            for child in root.list() {
                sizes.push(child.stat().await.size() as usize + 2);
            }
            sizes
        };
        let total: usize = sizes.iter().sum();

        // a count that fits the first record but not the first two
        let count = (sizes[0] + sizes[1] - 1) as u32;
        let mut offset = 0u64;
        let mut reads = Vec::new();
        loop {
            let resp = rpc(
                &mut client,
                30,
                FCall::TRead {
                    fid: 1,
                    offset,
                    count,
                },
            )
            .await;
            let FCall::RRead { data } = resp else {
                panic!("expected RRead");
            };
            if data.0.is_empty() {
                break;
            }
            offset += data.0.len() as u64;
            reads.push(data.0);
        }

        // successive offsets cover the cache exactly once
        assert_eq!(offset as usize, total);
        // every returned slice is a concatenation of whole records
        for read in &reads {
            let mut pos = 0;
            while pos < read.len() {
                let size = u16::from_le_bytes([read[pos], read[pos + 1]]) as usize;
                pos += size + 2;
            }
            assert_eq!(pos, read.len(), "stat record split across reads");
        }
        assert_eq!(reads[0].len(), sizes[0]);
    }

    #[tokio::test]
    async fn undersized_count_still_returns_first_record() {
        let root = Dir::root();
        root.add(DataFile::new("a-rather-long-file-name", b""));

        let mut client = start(root.clone(), DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;
        walk_open(&mut client, 1, &[], om::READ).await;

        let first = root.list()[0].stat().await.size() as usize + 2;
        let resp = rpc(
            &mut client,
            4,
            FCall::TRead {
                fid: 1,
                offset: 0,
                count: 10, // far less than one record
            },
        )
        .await;
        match resp {
            FCall::RRead { data } => assert_eq!(data.0.len(), first),
            other => panic!("expected RRead, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn directory_read_past_cache_is_eof() {
        let root = Dir::root();
        root.add(DataFile::new("f", b""));

        let mut client = start(root, DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;
        walk_open(&mut client, 1, &[], om::READ).await;

        let resp = rpc(
            &mut client,
            4,
            FCall::TRead {
                fid: 1,
                offset: 1 << 20,
                count: 4096,
            },
        )
        .await;
        assert_eq!(resp, FCall::RRead { data: Data(Vec::new()) });
    }

    #[tokio::test]
    async fn unknown_message_type_answers_rerror_under_its_tag() {
        let mut client = start(Dir::root(), DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;

        // type 250 with tag 0x0102
        let frame: &[u8] = &[7, 0, 0, 0, 250, 0x02, 0x01];
        client.write_all(frame).await.unwrap();

        let resp = recv(&mut client).await;
        assert_eq!(resp.tag, 0x0102);
        assert_eq!(
            resp.body,
            FCall::RError {
                ename: errstr::UNKNOWN_MSG_TYPE.to_owned()
            }
        );
    }

    #[tokio::test]
    async fn r_message_from_client_is_refused() {
        let mut client = start(Dir::root(), DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;

        let resp = rpc(&mut client, 9, FCall::RFlush).await;
        assert_eq!(
            resp,
            FCall::RError {
                ename: errstr::UNKNOWN_MSG_TYPE.to_owned()
            }
        );
    }

    #[tokio::test]
    async fn oversized_frame_closes_the_connection() {
        let mut client = start(Dir::root(), DEFAULT_MSIZE);
        handshake(&mut client, 1024).await;

        // a frame well past the negotiated msize of 1024
        let msg = Msg {
            tag: 5,
            body: FCall::TWrite {
                fid: 0,
                offset: 0,
                data: Data(vec![0u8; 2000]),
            },
        };
        send(&mut client, &msg).await;

        let mut buf = [0u8; 4];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "server should close the connection");
    }

    #[tokio::test]
    async fn create_is_dispatched_to_the_directory_hook() {
        let mut client = start(Dir::root(), DEFAULT_MSIZE);
        handshake(&mut client, DEFAULT_MSIZE).await;

        // the base directory refuses creates
        let resp = rpc(
            &mut client,
            2,
            FCall::TCreate {
                fid: 0,
                name: "newfile".to_owned(),
                perm: 0o644,
                mode: om::RDWR,
            },
        )
        .await;
        assert_eq!(
            resp,
            FCall::RError {
                ename: errstr::CREATE_NOT_SUPPORTED.to_owned()
            }
        );
    }
}
