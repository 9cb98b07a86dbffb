use crate::xdr::{self, PackTo, Packer, UnpackFrom, Unpacker};
use nfscout_macros::{PackTo, UnpackFrom};

pub type Filename3 = String;
pub type FileId3 = u64;
pub type Cookie3 = u64;
// cookieverf3 is technically opaque[8]; held as a u64 and threaded back
// into continuation calls verbatim.
pub type CookieVerf3 = u64;
pub type Uid3 = u32;
pub type Gid3 = u32;
pub type Size3 = u64;
pub type Count3 = u32;
pub type Mode3 = u32;
pub type Offset3 = u64;

/// File type from the attribute record.  Only the three types the browsing
/// operations care about get names; anything else is carried through
/// untouched.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FileType3 {
    Reg,
    Dir,
    Lnk,
    Other(u32),
}

impl FileType3 {
    pub const fn code(&self) -> u32 {
        match self {
            FileType3::Reg => 1,
            FileType3::Dir => 2,
            FileType3::Lnk => 5,
            FileType3::Other(n) => *n,
        }
    }
}

impl<B: Packer> PackTo<B> for FileType3 {
    fn pack_to(&self, buf: &mut B) {
        buf.pack_uint(self.code());
    }
}

impl<B: Unpacker> UnpackFrom<B> for FileType3 {
    fn unpack_from(buf: &mut B) -> xdr::Result<Self> {
        Ok(match buf.unpack_uint()? {
            1 => FileType3::Reg,
            2 => FileType3::Dir,
            5 => FileType3::Lnk,
            n => FileType3::Other(n),
        })
    }
}

/// Server-issued opaque file handle; only ever meaningful to the server
/// that produced it.
#[derive(PackTo, UnpackFrom, Debug, Clone, Default, PartialEq, Eq)]
pub struct NfsFh3 {
    pub data: Vec<u8>, // should be opaque<NFS3_FHSIZE>
}

/// Byte length of the fattr3 record on the wire.
pub const FATTR3_SIZE: usize = 84;

/// The attribute fields past `size` (used, rdev, fsid, fileid and the three
/// time stamps) that the browsing operations never consume.
const FATTR3_TAIL: usize = FATTR3_SIZE - 28;

/// The leading fields of the RFC1813 fattr3 record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fattr3 {
    pub file_type: FileType3,
    pub mode: Mode3,
    pub nlink: u32,
    pub uid: Uid3,
    pub gid: Gid3,
    pub size: Size3,
}

impl<B: Packer> PackTo<B> for Fattr3 {
    fn pack_to(&self, buf: &mut B) {
        self.file_type.pack_to(buf);
        buf.pack_uint(self.mode);
        buf.pack_uint(self.nlink);
        buf.pack_uint(self.uid);
        buf.pack_uint(self.gid);
        buf.pack_uhyper(self.size);
        buf.pack_opaque_fixed(&[0; FATTR3_TAIL]);
    }
}

impl<B: Unpacker> UnpackFrom<B> for Fattr3 {
    fn unpack_from(buf: &mut B) -> xdr::Result<Self> {
        let file_type = FileType3::unpack_from(buf)?;
        let mode = buf.unpack_uint()?;
        let nlink = buf.unpack_uint()?;
        let uid = buf.unpack_uint()?;
        let gid = buf.unpack_uint()?;
        let size = buf.unpack_uhyper()?;
        buf.skip(FATTR3_TAIL, "fattr3 tail")?;

        Ok(Fattr3 {
            file_type,
            mode,
            nlink,
            uid,
            gid,
            size,
        })
    }
}
