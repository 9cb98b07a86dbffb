//! ONC RPC transport (RFC 5531): record-marked framing over one owned TCP
//! stream, call construction, credential encoding and reply validation.
//!
//! A channel carries exactly one request at a time; `call` sends the whole
//! framed call and then drains the reply before returning.  There is no
//! pipelining and no background receive task.
use crate::{
    result::{ProtocolError, Result},
    xdr::{PackTo, Packer, Unpacker},
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::borrow::BorrowMut;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{self, AtomicU32};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tracing::{debug, trace};

const LAST_FRAGMENT: u32 = 0x80000000;
const CALL: u32 = 0;
const REPLY: u32 = 1;

/// RPC version, must be 2 per RFC5531.
const RPC_VERSION: u32 = 2;

const AUTH_NULL: u32 = 0;
const AUTH_UNIX: u32 = 1;

const MSG_ACCEPTED: u32 = 0;
const SUCCESS: u32 = 0;

/// Ceiling on a single announced reply fragment.  An untrusted peer gets to
/// pick the length field, not the allocation size.
pub const MAX_FRAGMENT_SIZE: u32 = 0x0001_0000;

/// Legacy NFS servers trust calls arriving from a reserved source port.
const RESERVED_PORT_LOW: u16 = 500;
const RESERVED_PORT_HIGH: u16 = 1024;

/// RFC5531 authsys_parms.
#[derive(Debug, Clone)]
pub struct AuthUnix {
    pub stamp: u32,
    pub machine_name: String,
    pub uid: u32,
    pub gid: u32,
    pub aux_gids: Vec<u32>,
}

impl AuthUnix {
    /// Credential with the auxiliary list defaulted to `[gid]`, the shape
    /// NFS assessment tooling conventionally sends.
    pub fn new(machine_name: &str, uid: u32, gid: u32) -> AuthUnix {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32
            & 0xffff;
        AuthUnix {
            stamp,
            machine_name: machine_name.into(),
            uid,
            gid,
            aux_gids: vec![gid],
        }
    }
}

/// RFC5531 opaque_auth, restricted to the two flavors the protocols here
/// use in requests.
#[derive(Debug, Clone)]
pub enum Credential {
    Null,
    Unix(AuthUnix),
}

impl<B: Packer> PackTo<B> for Credential {
    fn pack_to(&self, buf: &mut B) {
        match self {
            Credential::Null => {
                buf.pack_uint(AUTH_NULL);
                buf.pack_uint(0);
            }
            Credential::Unix(auth) => {
                let mut body = BytesMut::new();
                body.pack_uint(auth.stamp);
                body.pack_string(&auth.machine_name);
                body.pack_uint(auth.uid);
                body.pack_uint(auth.gid);
                // A lone zero auxiliary gid goes out as an empty list.
                if auth.aux_gids == [0] {
                    body.pack_uint(0);
                } else {
                    body.pack_array(&auth.aux_gids, |b: &mut BytesMut, gid| b.pack_uint(*gid));
                }

                buf.pack_uint(AUTH_UNIX);
                buf.pack_opaque(&body);
            }
        }
    }
}

/// Corresponds to RFC5531 call_body plus the leading xid.
pub struct CallHeader<'a> {
    pub xid: u32,
    pub prog: u32,
    pub vers: u32,
    pub proc: u32,
    pub cred: &'a Credential,
}

impl<'a, B: Packer> PackTo<B> for CallHeader<'a> {
    fn pack_to(&self, buf: &mut B) {
        buf.pack_uint(self.xid);
        buf.pack_uint(CALL);
        buf.pack_uint(RPC_VERSION);
        buf.pack_uint(self.prog);
        buf.pack_uint(self.vers);
        buf.pack_uint(self.proc);
        self.cred.pack_to(buf);
        // null verifier
        buf.pack_uint(AUTH_NULL);
        buf.pack_uint(0);
    }
}

/// Returns a new xid (RPC transaction ID).
///
/// Seeded from the clock at first use, then incremented, so ids stay unique
/// under rapid successive calls while remaining time-derived.
fn next_xid() -> u32 {
    static XID: AtomicU32 = AtomicU32::new(0);
    if XID.load(atomic::Ordering::Relaxed) == 0 {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32;
        let _ = XID.compare_exchange(
            0,
            seed.max(1),
            atomic::Ordering::Relaxed,
            atomic::Ordering::Relaxed,
        );
    }
    XID.fetch_add(1, atomic::Ordering::Relaxed)
}

/// Reads one complete reply from `stream`: a sequence of record-marked
/// fragments ending with one whose last-fragment bit is set.  Each receive
/// step is bounded by `recv_timeout`.
async fn read_reply<S: AsyncRead + Unpin>(stream: &mut S, recv_timeout: Duration) -> Result<Bytes> {
    let mut data = BytesMut::new();

    loop {
        let mut mark_buf = [0u8; 4];
        with_timeout(recv_timeout, stream.read_exact(&mut mark_buf)).await?;
        let mark = u32::from_be_bytes(mark_buf);

        let fragment_size = mark & !LAST_FRAGMENT;
        if fragment_size > MAX_FRAGMENT_SIZE {
            return Err(ProtocolError::OversizedFragment(fragment_size).into());
        }

        let mut fragment = vec![0u8; fragment_size as usize];
        with_timeout(recv_timeout, stream.read_exact(&mut fragment)).await?;
        data.put_slice(&fragment);

        trace!(
            size = fragment_size,
            last = (mark & LAST_FRAGMENT) != 0,
            "received fragment"
        );

        if (mark & LAST_FRAGMENT) != 0 {
            return Ok(data.freeze());
        }
    }
}

/// Validates the reply header and leaves `buf` positioned at the
/// procedure-specific results.
fn check_reply_header<B: Buf>(buf: &mut B, sent_xid: u32) -> Result<()> {
    let xid = buf.unpack_uint()?;
    let msg_type = buf.unpack_uint()?;
    let reply_state = buf.unpack_uint()?;
    let _verf_flavor = buf.unpack_uint()?;
    let verf_length = buf.unpack_uint()? as usize;
    buf.skip(verf_length, "reply verifier")?;
    let accept_state = buf.unpack_uint()?;

    if msg_type != REPLY {
        return Err(ProtocolError::NotAReply(msg_type).into());
    }
    if reply_state != MSG_ACCEPTED {
        return Err(ProtocolError::Denied(reply_state).into());
    }
    if accept_state != SUCCESS {
        return Err(ProtocolError::NotAccepted(accept_state).into());
    }
    if xid != sent_xid {
        return Err(ProtocolError::XidMismatch {
            sent: sent_xid,
            got: xid,
        }
        .into());
    }

    Ok(())
}

async fn with_timeout<T, F>(dur: Duration, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(dur, fut).await {
        Ok(res) => res,
        Err(_) => Err(io::ErrorKind::TimedOut.into()),
    }
}

fn new_socket(addr: &SocketAddr) -> io::Result<TcpSocket> {
    match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }
}

/// Best-effort bind of the local source port into the reserved range.
/// Without the privilege for that the socket is left unbound and the OS
/// assigns an ephemeral port.
fn bind_source_port(addr: &SocketAddr) -> io::Result<TcpSocket> {
    let unspecified: std::net::IpAddr = match addr {
        SocketAddr::V4(_) => std::net::Ipv4Addr::UNSPECIFIED.into(),
        SocketAddr::V6(_) => std::net::Ipv6Addr::UNSPECIFIED.into(),
    };

    for port in RESERVED_PORT_LOW..RESERVED_PORT_HIGH {
        let socket = new_socket(addr)?;
        match socket.bind(SocketAddr::new(unspecified, port)) {
            Ok(()) => {
                debug!(port, "bound reserved source port");
                return Ok(socket);
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => break,
            // port taken, keep scanning
            Err(_) => continue,
        }
    }

    new_socket(addr)
}

/// One TCP connection to one RPC service.
///
/// Owns the stream for its whole lifetime; `disconnect` consumes the
/// channel, so a closed channel cannot be reused by construction.
pub struct RpcChannel {
    stream: TcpStream,
    timeout: Duration,
    peer: SocketAddr,
}

impl RpcChannel {
    /// Opens a stream connection to `host:port`.  Connect establishment and
    /// every later receive step are bounded by `timeout`.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<RpcChannel> {
        let target = std::format!("{}:{}", host, port);
        let addr = with_timeout(timeout, async {
            lookup_host(target.as_str())
                .await?
                .next()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address for host"))
        })
        .await?;

        let socket = bind_source_port(&addr)?;
        let stream = with_timeout(timeout, socket.connect(addr)).await?;
        debug!(peer = %addr, "connected");

        Ok(RpcChannel {
            stream,
            timeout,
            peer: addr,
        })
    }

    /// Issues one call and returns the procedure-specific result bytes.
    ///
    /// `args` must already be XDR-encoded by the caller.  The call always
    /// goes out as a single fragment.
    pub async fn call(
        &mut self,
        prog: u32,
        vers: u32,
        proc: u32,
        args: &[u8],
        cred: &Credential,
    ) -> Result<Bytes> {
        let xid = next_xid();

        let mut buf = BytesMut::new();
        buf.pack_uint(0); // placeholder for the record mark
        CallHeader {
            xid,
            prog,
            vers,
            proc,
            cred,
        }
        .pack_to(&mut buf);
        buf.put_slice(args);
        let buf = Self::finalize(buf);

        trace!(peer = %self.peer, xid, prog, vers, proc, len = buf.len(), "call");

        let mut buf = buf;
        while buf.has_remaining() {
            self.stream.write_buf(&mut buf).await?;
        }

        let mut reply = read_reply(&mut self.stream, self.timeout).await?;
        check_reply_header(&mut reply, xid)?;
        trace!(peer = %self.peer, xid, len = reply.remaining(), "reply");

        Ok(reply)
    }

    /// Closes the connection.
    pub async fn disconnect(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        debug!(peer = %self.peer, "disconnected");
        Ok(())
    }

    /// Consumes `buf` and fills in the record mark, returns frozen buffer.
    fn finalize(mut buf: BytesMut) -> Bytes {
        let frag_size = (buf.remaining() - 4) as u32;
        let frag_size = frag_size | LAST_FRAGMENT;
        {
            let borrow: &mut [u8] = buf.borrow_mut();
            (&mut borrow[0..4]).pack_uint(frag_size);
        }

        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Error;
    use crate::xdr::Unpacker;

    fn unix_cred() -> Credential {
        Credential::Unix(AuthUnix {
            stamp: 0x1234,
            machine_name: "scanner".into(),
            uid: 1000,
            gid: 1000,
            aux_gids: vec![1000],
        })
    }

    fn packed(cred: &Credential) -> Bytes {
        let mut buf = BytesMut::new();
        cred.pack_to(&mut buf);
        buf.freeze()
    }

    #[test]
    fn test_auth_null_encoding() {
        assert_eq!(packed(&Credential::Null).as_ref(), &[0u8; 8]);
    }

    #[test]
    fn test_auth_unix_encoding() {
        let mut wire = packed(&unix_cred());
        assert_eq!(wire.unpack_uint().unwrap(), AUTH_UNIX);
        let mut body = wire.unpack_opaque().unwrap();
        assert_eq!(wire.remaining(), 0);

        assert_eq!(body.unpack_uint().unwrap(), 0x1234);
        assert_eq!(body.unpack_opaque().unwrap().as_ref(), b"scanner");
        assert_eq!(body.unpack_uint().unwrap(), 1000); // uid
        assert_eq!(body.unpack_uint().unwrap(), 1000); // gid
        assert_eq!(
            body.unpack_vec(|b| b.unpack_uint()).unwrap(),
            vec![1000u32]
        );
        assert_eq!(body.remaining(), 0);
    }

    #[test]
    fn test_auth_unix_zero_aux_gid_quirk() {
        // [0] encodes as an empty auxiliary list
        let mut with_zero = unix_cred();
        if let Credential::Unix(auth) = &mut with_zero {
            auth.aux_gids = vec![0];
        }
        let mut with_empty = unix_cred();
        if let Credential::Unix(auth) = &mut with_empty {
            auth.aux_gids = Vec::new();
        }
        assert_eq!(packed(&with_zero), packed(&with_empty));

        // [0, 1000] is encoded as a two-element list, the quirk only
        // applies to a lone zero
        let mut two = unix_cred();
        if let Credential::Unix(auth) = &mut two {
            auth.aux_gids = vec![0, 1000];
        }
        let mut wire = packed(&two);
        wire.unpack_uint().unwrap();
        let mut body = wire.unpack_opaque().unwrap();
        body.unpack_uint().unwrap();
        body.unpack_opaque().unwrap();
        body.unpack_uint().unwrap();
        body.unpack_uint().unwrap();
        assert_eq!(
            body.unpack_vec(|b| b.unpack_uint()).unwrap(),
            vec![0u32, 1000]
        );
    }

    #[test]
    fn test_call_header_layout() {
        let cred = Credential::Null;
        let mut buf = BytesMut::new();
        CallHeader {
            xid: 0xdeadbeef,
            prog: 100003,
            vers: 3,
            proc: 6,
            cred: &cred,
        }
        .pack_to(&mut buf);

        let mut buf = buf.freeze();
        assert_eq!(buf.unpack_uint().unwrap(), 0xdeadbeef);
        assert_eq!(buf.unpack_uint().unwrap(), CALL);
        assert_eq!(buf.unpack_uint().unwrap(), RPC_VERSION);
        assert_eq!(buf.unpack_uint().unwrap(), 100003);
        assert_eq!(buf.unpack_uint().unwrap(), 3);
        assert_eq!(buf.unpack_uint().unwrap(), 6);
        assert_eq!(buf.unpack_uint().unwrap(), AUTH_NULL);
        assert_eq!(buf.unpack_uint().unwrap(), 0);
        assert_eq!(buf.unpack_uint().unwrap(), AUTH_NULL);
        assert_eq!(buf.unpack_uint().unwrap(), 0);
        assert_eq!(buf.remaining(), 0);
    }

    fn mark(len: usize, last: bool) -> [u8; 4] {
        let word = len as u32 | if last { LAST_FRAGMENT } else { 0 };
        word.to_be_bytes()
    }

    #[tokio::test]
    async fn test_read_reply_single_fragment() {
        let payload: Vec<u8> = (0u8..64).collect();
        let mut wire = Vec::new();
        wire.extend_from_slice(&mark(payload.len(), true));
        wire.extend_from_slice(&payload);

        let mut stream: &[u8] = &wire;
        let reply = read_reply(&mut stream, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply.as_ref(), &payload[..]);
    }

    #[tokio::test]
    async fn test_read_reply_reassembles_fragments() {
        let payload: Vec<u8> = (0u8..=255).cycle().take(300).collect();

        // the same payload split at arbitrary points must reconstruct
        // identically to the unsplit case
        for splits in [vec![1, 7], vec![100, 150], vec![299]] {
            let mut wire = Vec::new();
            let mut start = 0;
            let mut bounds = splits.clone();
            bounds.push(payload.len());
            for (i, end) in bounds.iter().enumerate() {
                let chunk = &payload[start..*end];
                wire.extend_from_slice(&mark(chunk.len(), i == bounds.len() - 1));
                wire.extend_from_slice(chunk);
                start = *end;
            }

            let mut stream: &[u8] = &wire;
            let reply = read_reply(&mut stream, Duration::from_secs(1))
                .await
                .unwrap();
            assert_eq!(reply.as_ref(), &payload[..], "splits {:?}", splits);
        }
    }

    #[tokio::test]
    async fn test_read_reply_rejects_oversized_fragment() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&mark(0x20000, true));
        wire.extend_from_slice(&[0u8; 16]);

        let mut stream: &[u8] = &wire;
        match read_reply(&mut stream, Duration::from_secs(1)).await {
            Err(Error::Protocol(ProtocolError::OversizedFragment(0x20000))) => {}
            other => panic!("expected oversized fragment error, got {:?}", other.map(|_| ())),
        }
    }

    fn reply_header(xid: u32, msg_type: u32, reply_state: u32, accept_state: u32) -> Bytes {
        let mut buf = BytesMut::new();
        buf.pack_uint(xid);
        buf.pack_uint(msg_type);
        buf.pack_uint(reply_state);
        buf.pack_uint(AUTH_NULL);
        buf.pack_uint(0);
        buf.pack_uint(accept_state);
        buf.freeze()
    }

    #[test]
    fn test_check_reply_header() {
        let mut ok = reply_header(7, REPLY, MSG_ACCEPTED, SUCCESS);
        check_reply_header(&mut ok, 7).unwrap();
        assert_eq!(ok.remaining(), 0);

        let mut wrong_xid = reply_header(8, REPLY, MSG_ACCEPTED, SUCCESS);
        assert!(matches!(
            check_reply_header(&mut wrong_xid, 7),
            Err(Error::Protocol(ProtocolError::XidMismatch { sent: 7, got: 8 }))
        ));

        let mut not_reply = reply_header(7, CALL, MSG_ACCEPTED, SUCCESS);
        assert!(matches!(
            check_reply_header(&mut not_reply, 7),
            Err(Error::Protocol(ProtocolError::NotAReply(0)))
        ));

        let mut denied = reply_header(7, REPLY, 1, SUCCESS);
        assert!(matches!(
            check_reply_header(&mut denied, 7),
            Err(Error::Protocol(ProtocolError::Denied(1)))
        ));

        let mut rejected = reply_header(7, REPLY, MSG_ACCEPTED, 2);
        assert!(matches!(
            check_reply_header(&mut rejected, 7),
            Err(Error::Protocol(ProtocolError::NotAccepted(2)))
        ));

        let mut short: Bytes = Bytes::from_static(&[0, 0, 0, 1, 0, 0]);
        assert!(matches!(
            check_reply_header(&mut short, 7),
            Err(Error::Protocol(ProtocolError::Truncated(_)))
        ));
    }

    #[test]
    fn test_xids_are_unique() {
        let a = next_xid();
        let b = next_xid();
        assert_ne!(a, b);
        assert_ne!(a, 0);
    }
}
