//! Mount protocol client (program 100005, version 3): enumerates a host's
//! exports and obtains the root file handle for an exported path.
use crate::{
    nfs3::NfsFh3,
    result::{Error, Result},
    rpc::{Credential, RpcChannel},
    xdr::{self, Packer, UnpackFrom as _, Unpacker as _},
};
use bytes::BytesMut;
use nfscout_macros::{PackTo, UnpackFrom};
use std::time::Duration;
use tracing::debug;

pub const PROGRAM: u32 = 100005;
pub const VERSION: u32 = 3;

pub const MOUNTPROC3_NULL: u32 = 0;
pub const MOUNTPROC3_MNT: u32 = 1;
pub const MOUNTPROC3_EXPORT: u32 = 5;

pub const MNT3_OK: u32 = 0; /* no error */
pub const MNT3ERR_PERM: u32 = 1; /* Not owner */
pub const MNT3ERR_NOENT: u32 = 2; /* No such file or directory */
pub const MNT3ERR_IO: u32 = 5; /* I/O error */
pub const MNT3ERR_ACCES: u32 = 13; /* Permission denied */
pub const MNT3ERR_NOTDIR: u32 = 20; /* Not a directory */
pub const MNT3ERR_INVAL: u32 = 22; /* Invalid argument */
pub const MNT3ERR_NAMETOOLONG: u32 = 63; /* Filename too long */
pub const MNT3ERR_NOTSUPP: u32 = 10004; /* Operation not supported */
pub const MNT3ERR_SERVERFAULT: u32 = 10006; /* A failure on the server */

/// Successful MNT reply: the root handle of the export plus the
/// authentication flavors the server accepts for it.
#[derive(PackTo, UnpackFrom, Debug, Clone)]
pub struct MountPoint {
    pub handle: NfsFh3,
    pub auth_flavors: Vec<u32>,
}

/// One line of the export table: the exported path and the client
/// identifiers (hosts, netgroups, subnets) allowed to mount it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    pub path: String,
    pub groups: Vec<String>,
}

/// Client for one mount daemon endpoint.
pub struct MountClient {
    chan: RpcChannel,
}

impl MountClient {
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<MountClient> {
        let chan = RpcChannel::connect(host, port, timeout).await?;
        Ok(MountClient { chan })
    }

    pub async fn disconnect(self) -> Result<()> {
        self.chan.disconnect().await
    }

    /// Liveness probe.
    pub async fn null(&mut self, cred: &Credential) -> Result<()> {
        self.chan
            .call(PROGRAM, VERSION, MOUNTPROC3_NULL, &[], cred)
            .await?;
        Ok(())
    }

    /// Mounts `path`, returning its root file handle and the server's
    /// accepted authentication flavors.  A nonzero mount status becomes
    /// `Error::MountAccess`.
    pub async fn mnt(&mut self, path: &str, cred: &Credential) -> Result<MountPoint> {
        let mut args = BytesMut::new();
        args.pack_string(path);

        let mut reply = self
            .chan
            .call(PROGRAM, VERSION, MOUNTPROC3_MNT, &args, cred)
            .await?;

        let status = reply.unpack_uint()?;
        if status != MNT3_OK {
            return Err(Error::MountAccess(status));
        }

        let mount_point = MountPoint::unpack_from(&mut reply)?;
        debug!(path, handle_len = mount_point.handle.data.len(), "mounted");
        Ok(mount_point)
    }

    /// Lists the export table in server order.
    pub async fn export(&mut self) -> Result<Vec<ExportEntry>> {
        let mut reply = self
            .chan
            .call(PROGRAM, VERSION, MOUNTPROC3_EXPORT, &[], &Credential::Null)
            .await?;

        let exports = reply.unpack_list(|buf| {
            let path = String::unpack_from(buf)?;
            let groups = buf.unpack_list(String::unpack_from)?;
            Ok(ExportEntry { path, groups })
        })?;
        debug!(count = exports.len(), "export list");

        Ok(exports)
    }
}
