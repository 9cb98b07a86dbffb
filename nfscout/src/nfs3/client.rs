use crate::{
    nfs3::{self, procs, Cookie3, CookieVerf3, NfsFh3},
    result::{Error, ProtocolError, Result},
    rpc::{Credential, RpcChannel},
    xdr::{PackTo as _, UnpackFrom as _, Unpacker as _},
};
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tracing::debug;

/// READDIRPLUS size limits sent with every call.
const READDIR_DIRCOUNT: u32 = 4096;
const READDIR_MAXCOUNT: u32 = READDIR_DIRCOUNT * 8;

/// Cap on entries accumulated across continuation pages; a server that
/// pages past this is stringing us along.
const MAX_DIR_ENTRIES: usize = 65536;

/// Client for one NFSv3 endpoint.
///
/// Handles come from the Mount client (`mnt`) or from `lookup`, and are
/// only as durable as the server's willingness to honor them.
pub struct NfsClient {
    chan: RpcChannel,
}

impl NfsClient {
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<NfsClient> {
        let chan = RpcChannel::connect(host, port, timeout).await?;
        Ok(NfsClient { chan })
    }

    pub async fn disconnect(self) -> Result<()> {
        self.chan.disconnect().await
    }

    async fn call(&mut self, proc: u32, args: &[u8], cred: &Credential) -> Result<Bytes> {
        self.chan
            .call(nfs3::PROG_NFS, nfs3::VERSION, proc, args, cred)
            .await
    }

    fn check_handle(handle: &NfsFh3) -> Result<()> {
        if handle.data.is_empty() || handle.data.len() > nfs3::FHSIZE3 {
            return Err(Error::Precondition(
                "file handle must be between 1 and 64 opaque bytes",
            ));
        }
        Ok(())
    }

    fn check_status(reply: &mut Bytes) -> Result<()> {
        let status = reply.unpack_uint()?;
        if status != nfs3::NFS3_OK {
            return Err(Error::NfsAccess(status));
        }
        Ok(())
    }

    /// Liveness probe.
    pub async fn null(&mut self) -> Result<()> {
        self.call(nfs3::NFSPROC3_NULL, &[], &Credential::Null)
            .await?;
        Ok(())
    }

    /// Resolves `name` inside the directory `dir`.
    pub async fn lookup(
        &mut self,
        dir: &NfsFh3,
        name: &str,
        cred: &Credential,
    ) -> Result<procs::LookupReply> {
        Self::check_handle(dir)?;

        let mut args = BytesMut::new();
        procs::Lookup3Args {
            dir: dir.clone(),
            name: name.into(),
        }
        .pack_to(&mut args);

        let mut reply = self.call(nfs3::NFSPROC3_LOOKUP, &args, cred).await?;
        Self::check_status(&mut reply)?;
        procs::LookupReply::unpack_from(&mut reply)
    }

    /// Reads one chunk of up to `count` bytes at `offset`.
    pub async fn read(
        &mut self,
        file: &NfsFh3,
        offset: u64,
        count: u32,
        cred: &Credential,
    ) -> Result<procs::ReadReply> {
        Self::check_handle(file)?;

        let mut args = BytesMut::new();
        procs::Read3Args {
            file: file.clone(),
            offset,
            count,
        }
        .pack_to(&mut args);

        let mut reply = self.call(nfs3::NFSPROC3_READ, &args, cred).await?;
        Self::check_status(&mut reply)?;
        procs::ReadReply::unpack_from(&mut reply)
    }

    /// Reads from `offset` to end-of-file in `chunk`-byte requests,
    /// accumulating into one buffer.  On failure the bytes fetched so far
    /// ride along with the error.
    pub async fn read_to_end(
        &mut self,
        file: &NfsFh3,
        offset: u64,
        chunk: u32,
        cred: &Credential,
    ) -> std::result::Result<Vec<u8>, procs::ReadError> {
        let mut data: Vec<u8> = Vec::new();

        loop {
            let pos = offset + data.len() as u64;
            let reply = match self.read(file, pos, chunk, cred).await {
                Ok(reply) => reply,
                Err(source) => {
                    return Err(procs::ReadError {
                        partial: data,
                        source,
                    })
                }
            };

            if reply.data.is_empty() && !reply.eof {
                return Err(procs::ReadError {
                    partial: data,
                    source: ProtocolError::StalledRead(pos).into(),
                });
            }

            data.extend_from_slice(&reply.data);

            if reply.eof {
                break;
            }
            // a known file size bounds the loop even against a server that
            // never raises eof
            if let Some(attributes) = &reply.attributes {
                if offset + data.len() as u64 >= attributes.size {
                    break;
                }
            }
            debug!(offset = offset + data.len() as u64, "continuing read");
        }

        Ok(data)
    }

    /// Fetches one page of directory entries starting past `cookie`.
    /// `verifier` must be 0 on the first call and the previous page's
    /// verifier afterwards.
    pub async fn readdirplus(
        &mut self,
        dir: &NfsFh3,
        cookie: Cookie3,
        verifier: CookieVerf3,
        cred: &Credential,
    ) -> Result<procs::ReaddirPage> {
        Self::check_handle(dir)?;

        let mut args = BytesMut::new();
        procs::ReaddirPlus3Args {
            dir: dir.clone(),
            cookie,
            verifier,
            dircount: READDIR_DIRCOUNT,
            maxcount: READDIR_MAXCOUNT,
        }
        .pack_to(&mut args);

        let mut reply = self.call(nfs3::NFSPROC3_READDIRPLUS, &args, cred).await?;
        Self::check_status(&mut reply)?;
        procs::ReaddirPage::unpack_from(&mut reply)
    }

    /// Lists the whole directory, following continuation cookies until the
    /// server signals end-of-file.  Every page's entries end up in the
    /// returned list, in server order.
    pub async fn read_dir(
        &mut self,
        dir: &NfsFh3,
        cred: &Credential,
    ) -> Result<Vec<procs::DirEntryPlus>> {
        let mut entries: Vec<procs::DirEntryPlus> = Vec::new();
        let mut cookie: Cookie3 = 0;
        let mut verifier: CookieVerf3 = 0;

        loop {
            let page = self.readdirplus(dir, cookie, verifier, cred).await?;

            if page.entries.is_empty() && !page.eof {
                return Err(ProtocolError::StalledListing(cookie).into());
            }

            if let Some(last) = page.entries.last() {
                cookie = last.cookie;
            }
            verifier = page.verifier;
            entries.extend(page.entries);

            if entries.len() > MAX_DIR_ENTRIES {
                return Err(ProtocolError::ListOverflow(MAX_DIR_ENTRIES).into());
            }
            if page.eof {
                break;
            }
            debug!(cookie, count = entries.len(), "continuing directory listing");
        }

        Ok(entries)
    }
}
