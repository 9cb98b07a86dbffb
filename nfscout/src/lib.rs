//! Client-side ONC RPC transport plus the three protocols layered on it:
//! Portmapper, Mount and NFSv3.  Enumerates a host's RPC services,
//! discovers and mounts exported paths, and browses or reads files without
//! a kernel NFS client.
//!
//! Written for assessment tooling, so every length field arriving from the
//! peer is treated as hostile until it has been bounds-checked.

pub mod mount;
pub mod nfs3;
pub mod portmap;
pub mod result;
pub mod rpc;
pub mod xdr;
