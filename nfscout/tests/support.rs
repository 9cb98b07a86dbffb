//! Scripted TCP endpoint standing in for an RPC service: answers each
//! incoming call with a canned result body behind an accepted-success
//! reply header, framed and fragmented however the test prescribes.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const LAST_FRAGMENT: u32 = 0x8000_0000;

/// How one reply gets framed onto the stream.
pub enum Framing {
    /// one record carrying the whole reply
    Whole,
    /// multiple records, split at the given byte offsets into the reply
    Split(Vec<usize>),
}

/// Canned procedure result bodies (everything after the reply header),
/// served one per incoming call, in order.
pub struct Script {
    pub replies: Vec<(Framing, Vec<u8>)>,
}

/// Raw call messages as received, record marks stripped.
pub type Calls = Arc<Mutex<Vec<Vec<u8>>>>;

/// Binds a listener, serves `script` on the first accepted connection and
/// logs each raw incoming call.  Returns the listening port and the log.
pub async fn serve(script: Script) -> (u16, Calls) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let log = calls.clone();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        for (framing, body) in script.replies {
            let call = read_call(&mut stream).await;
            let xid = u32::from_be_bytes(call[0..4].try_into().unwrap());
            log.lock().unwrap().push(call);

            let mut reply = Vec::new();
            // xid, REPLY, MSG_ACCEPTED, null verifier, SUCCESS
            for word in [xid, 1, 0, 0, 0, 0] {
                reply.extend_from_slice(&word.to_be_bytes());
            }
            reply.extend_from_slice(&body);

            write_reply(&mut stream, &reply, &framing).await;
        }
    });

    (port, calls)
}

async fn read_call(stream: &mut TcpStream) -> Vec<u8> {
    let mut mark = [0u8; 4];
    stream.read_exact(&mut mark).await.unwrap();
    let len = u32::from_be_bytes(mark) & !LAST_FRAGMENT;
    let mut call = vec![0u8; len as usize];
    stream.read_exact(&mut call).await.unwrap();
    call
}

async fn write_reply(stream: &mut TcpStream, reply: &[u8], framing: &Framing) {
    let bounds: Vec<usize> = match framing {
        Framing::Whole => vec![reply.len()],
        Framing::Split(splits) => {
            let mut bounds = splits.clone();
            bounds.push(reply.len());
            bounds
        }
    };

    let mut start = 0;
    for (i, end) in bounds.iter().enumerate() {
        let chunk = &reply[start..*end];
        let last = i == bounds.len() - 1;
        let mark = chunk.len() as u32 | if last { LAST_FRAGMENT } else { 0 };
        stream.write_all(&mark.to_be_bytes()).await.unwrap();
        stream.write_all(chunk).await.unwrap();
        start = *end;
    }
}

/// Byte offset of the procedure arguments inside a call that carries
/// AUTH_NULL credentials: xid, message type, RPC version, program, version,
/// procedure, credential (flavor + length), verifier (flavor + length).
pub const NULL_CRED_ARGS_OFFSET: usize = 10 * 4;
