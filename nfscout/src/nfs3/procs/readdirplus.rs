use crate::{
    nfs3::{Cookie3, CookieVerf3, Count3, Fattr3, FileId3, Filename3, NfsFh3},
    xdr::{self, UnpackFrom, Unpacker},
};
use nfscout_macros::{PackTo, UnpackFrom};

#[derive(PackTo, Debug)]
pub struct ReaddirPlus3Args {
    pub dir: NfsFh3,
    pub cookie: Cookie3,
    pub verifier: CookieVerf3,
    /// Number of directory bytes the client really wants
    pub dircount: Count3,
    /// Maximum size of the reply, attributes included
    pub maxcount: Count3,
}

/// One directory entry as decoded off the wire.  Attributes and the child
/// handle are both optional; servers are free to omit either.
#[derive(UnpackFrom, Debug, Clone, PartialEq, Eq)]
pub struct DirEntryPlus {
    pub file_id: FileId3,
    pub name: Filename3,
    pub cookie: Cookie3,
    pub attributes: Option<Fattr3>,
    pub handle: Option<NfsFh3>,
}

/// One READDIRPLUS page.  `eof == false` means the server has more entries
/// past the last cookie of this page.
#[derive(Debug, Clone)]
pub struct ReaddirPage {
    pub dir_attributes: Option<Fattr3>,
    pub verifier: CookieVerf3,
    pub entries: Vec<DirEntryPlus>,
    pub eof: bool,
}

impl<B: Unpacker> UnpackFrom<B> for ReaddirPage {
    fn unpack_from(buf: &mut B) -> xdr::Result<Self> {
        let dir_attributes = Option::<Fattr3>::unpack_from(buf)?;
        let verifier = buf.unpack_uhyper()?;
        let entries = buf.unpack_list(DirEntryPlus::unpack_from)?;
        let eof = buf.unpack_bool()?;

        Ok(ReaddirPage {
            dir_attributes,
            verifier,
            entries,
            eof,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nfs3::FileType3;
    use crate::xdr::{PackTo, Packer};
    use bytes::BytesMut;

    fn pack_entry(wire: &mut BytesMut, file_id: u64, name: &str, cookie: u64) {
        wire.pack_uhyper(file_id);
        wire.pack_string(name);
        wire.pack_uhyper(cookie);
        wire.pack_bool(true);
        Fattr3 {
            file_type: FileType3::Dir,
            mode: 0o755,
            nlink: 2,
            uid: 0,
            gid: 0,
            size: 4096,
        }
        .pack_to(wire);
        wire.pack_bool(true);
        NfsFh3 {
            data: vec![7; 16],
        }
        .pack_to(wire);
    }

    #[test]
    fn test_page_decode() {
        let mut wire = BytesMut::new();
        wire.pack_bool(false); // directory attributes omitted
        wire.pack_uhyper(0xfeed);
        wire.pack_bool(true);
        pack_entry(&mut wire, 11, ".", 1);
        wire.pack_bool(true);
        pack_entry(&mut wire, 12, "notes.txt", 2);
        wire.pack_bool(false);
        wire.pack_bool(true); // eof

        let mut wire = wire.freeze();
        let page = ReaddirPage::unpack_from(&mut wire).unwrap();
        assert!(page.dir_attributes.is_none());
        assert_eq!(page.verifier, 0xfeed);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[1].name, "notes.txt");
        assert_eq!(page.entries[1].cookie, 2);
        assert_eq!(page.entries[1].handle, Some(NfsFh3 { data: vec![7; 16] }));
        assert!(page.eof);
    }

    #[test]
    fn test_entry_without_attributes_or_handle() {
        let mut wire = BytesMut::new();
        wire.pack_uhyper(99);
        wire.pack_string("stub");
        wire.pack_uhyper(3);
        wire.pack_bool(false);
        wire.pack_bool(false);

        let mut wire = wire.freeze();
        let entry = DirEntryPlus::unpack_from(&mut wire).unwrap();
        assert_eq!(entry.file_id, 99);
        assert!(entry.attributes.is_none());
        assert!(entry.handle.is_none());
    }
}
