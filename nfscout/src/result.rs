//! Error taxonomy shared by the transport, codec and protocol clients.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed reply framing, a decode failure, or a reply header
    /// carrying a non-success state.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A MOUNT procedure returned a nonzero status.
    #[error("mount call failed with status {0}")]
    MountAccess(u32),

    /// An NFS procedure returned a nonzero status.
    #[error("nfs call failed with status {0}")]
    NfsAccess(u32),

    /// Caller-supplied argument rejected before any I/O took place.
    #[error("bad argument: {0}")]
    Precondition(&'static str),

    /// Connection refused, reset or timed out; surfaced unmodified.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

/// Wire-level anomalies.  Every variant carries enough context to tell a
/// hostile or broken server's exact offense apart from a local bug.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The reply ended before a declared field could be decoded.
    #[error("reply truncated while decoding {0}")]
    Truncated(&'static str),

    /// A record-marking header announced a fragment larger than the
    /// sanity ceiling.
    #[error("announced fragment of {0} bytes exceeds the 64 KiB ceiling")]
    OversizedFragment(u32),

    /// The message-type field of the reply header was not REPLY.
    #[error("expected a reply, got message type {0}")]
    NotAReply(u32),

    /// The reply state was not ACCEPTED.
    #[error("call denied, reply state {0}")]
    Denied(u32),

    /// The accept state was not SUCCESS.
    #[error("call not accepted, accept state {0}")]
    NotAccepted(u32),

    /// The reply carried a different transaction id than the call.
    #[error("reply xid {got:#x} does not match call xid {sent:#x}")]
    XidMismatch { sent: u32, got: u32 },

    /// A boolean field held a value other than 0 or 1.
    #[error("invalid boolean value {0}")]
    InvalidBool(u32),

    /// A union discriminant matched no known arm.
    #[error("union discriminant {0} matches no arm")]
    UnknownDiscriminant(u32),

    /// A string field held bytes that are not valid UTF-8.
    #[error("string field is not valid utf-8")]
    InvalidUtf8,

    /// A READ reply declared one byte count but carried another.
    #[error("read reply declared {declared} bytes but carried {actual}")]
    CountMismatch { declared: u32, actual: usize },

    /// The server kept returning data pages past the accumulation cap.
    #[error("directory listing exceeded {0} entries")]
    ListOverflow(usize),

    /// A READ reply carried no data without signalling end-of-file.
    #[error("read stalled at offset {0}")]
    StalledRead(u64),

    /// A READDIRPLUS page carried no entries without signalling end-of-file.
    #[error("directory listing stalled at cookie {0}")]
    StalledListing(u64),
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(_: std::string::FromUtf8Error) -> Error {
        ProtocolError::InvalidUtf8.into()
    }
}
