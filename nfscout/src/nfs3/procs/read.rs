use crate::{
    nfs3::{Count3, Fattr3, NfsFh3, Offset3},
    result::{Error, ProtocolError},
    xdr::{self, UnpackFrom, Unpacker},
};
use nfscout_macros::PackTo;
use thiserror::Error as ThisError;

#[derive(PackTo, Debug)]
pub struct Read3Args {
    pub file: NfsFh3,
    pub offset: Offset3,
    pub count: Count3,
}

/// One decoded READ reply chunk.
#[derive(Debug, Clone)]
pub struct ReadReply {
    pub attributes: Option<Fattr3>,
    pub count: Count3,
    pub eof: bool,
    pub data: bytes::Bytes,
}

impl<B: Unpacker> UnpackFrom<B> for ReadReply {
    fn unpack_from(buf: &mut B) -> xdr::Result<Self> {
        let attributes = Option::<Fattr3>::unpack_from(buf)?;
        let count = buf.unpack_uint()?;
        let eof = buf.unpack_bool()?;
        let data = buf.unpack_opaque()?;

        // a declared count that disagrees with the payload means the reply
        // is corrupt; do not pass the bytes along
        if data.len() != count as usize {
            return Err(ProtocolError::CountMismatch {
                declared: count,
                actual: data.len(),
            }
            .into());
        }

        Ok(ReadReply {
            attributes,
            count,
            eof,
            data,
        })
    }
}

/// Failure of an accumulating read.  Keeps whatever was fetched before the
/// error so callers can salvage partial file contents.
#[derive(Debug, ThisError)]
#[error("read failed after {} bytes: {source}", .partial.len())]
pub struct ReadError {
    pub partial: Vec<u8>,
    pub source: Error,
}
