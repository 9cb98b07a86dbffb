use crate::{
    nfs3::{Fattr3, Filename3, NfsFh3},
    xdr::{self},
};
use nfscout_macros::{PackTo, UnpackFrom};

#[derive(PackTo, Debug)]
pub struct Lookup3Args {
    pub dir: NfsFh3,
    pub name: Filename3,
}

/// Decoded LOOKUP reply.
///
/// The wire reply trails off with the directory's own post-op attributes;
/// those are left undecoded.  When the server omits the object attributes
/// the field stays `None`, never a zeroed record.
#[derive(UnpackFrom, Debug, Clone)]
pub struct LookupReply {
    pub handle: NfsFh3,
    pub attributes: Option<Fattr3>,
}
