//! Portmapper client (program 100000, version 2): resolves program to port
//! bindings and enumerates every service registered on a host.
use crate::{
    result::Result,
    rpc::{Credential, RpcChannel},
    xdr::{self, PackTo as _, UnpackFrom as _, Unpacker as _},
};
use bytes::BytesMut;
use nfscout_macros::{PackTo, UnpackFrom};
use std::time::Duration;
use tracing::debug;

/// TCP/UDP Port number for the RPC Port Mapper service and RPC bind
pub const PORT: u16 = 111;

pub const PMAP_PROG: u32 = 100000;
pub const PMAP_VERS: u32 = 2;

pub const PMAPPROC_NULL: u32 = 0;
pub const PMAPPROC_GETPORT: u32 = 3;
pub const PMAPPROC_DUMP: u32 = 4;

pub const IPPROTO_TCP: u32 = 6; /* protocol number for TCP/IP */
pub const IPPROTO_UDP: u32 = 17; /* protocol number for UDP/IP */

/// One registration in the portmapper's table.
#[derive(PackTo, UnpackFrom, Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub prog: u32,
    pub vers: u32,
    pub prot: u32,
    pub port: u32,
}

impl Mapping {
    pub fn protocol(&self) -> Protocol {
        Protocol::from_code(self.prot)
    }
}

/// Transport protocol label for a mapping.  Codes other than TCP and UDP
/// are carried through without interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    Unknown(u32),
}

impl Protocol {
    pub fn from_code(code: u32) -> Protocol {
        match code {
            IPPROTO_TCP => Protocol::Tcp,
            IPPROTO_UDP => Protocol::Udp,
            other => Protocol::Unknown(other),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
            Protocol::Unknown(_) => write!(f, "unknown"),
        }
    }
}

/// Client for one portmapper endpoint.
pub struct PortmapClient {
    chan: RpcChannel,
}

impl PortmapClient {
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<PortmapClient> {
        let chan = RpcChannel::connect(host, port, timeout).await?;
        Ok(PortmapClient { chan })
    }

    pub async fn disconnect(self) -> Result<()> {
        self.chan.disconnect().await
    }

    /// Liveness probe; succeeds iff the service answers the call at all.
    pub async fn null(&mut self) -> Result<()> {
        self.chan
            .call(PMAP_PROG, PMAP_VERS, PMAPPROC_NULL, &[], &Credential::Null)
            .await?;
        Ok(())
    }

    /// Lists every registered mapping, duplicates suppressed, in the order
    /// the server announced them.
    pub async fn dump(&mut self) -> Result<Vec<Mapping>> {
        let mut reply = self
            .chan
            .call(PMAP_PROG, PMAP_VERS, PMAPPROC_DUMP, &[], &Credential::Null)
            .await?;

        let mut mappings: Vec<Mapping> = Vec::new();
        for mapping in reply.unpack_list(Mapping::unpack_from)? {
            if !mappings.contains(&mapping) {
                mappings.push(mapping);
            }
        }
        debug!(count = mappings.len(), "portmap dump");

        Ok(mappings)
    }

    /// Resolves the port of `prog`/`vers` over `prot`.  A port of 0 means
    /// the program is not registered; interpreting that is left to the
    /// caller.
    pub async fn getport(&mut self, prog: u32, vers: u32, prot: u32) -> Result<u32> {
        let mut args = BytesMut::new();
        Mapping {
            prog,
            vers,
            prot,
            port: 0,
        }
        .pack_to(&mut args);

        let mut reply = self
            .chan
            .call(
                PMAP_PROG,
                PMAP_VERS,
                PMAPPROC_GETPORT,
                &args,
                &Credential::Null,
            )
            .await?;

        reply.unpack_uint()
    }
}
