//! SWU container writer
//!
//! An SWU package is a cpio archive in the "newc with checksum" format
//! (magic `070702`), the framing SWUpdate streams at install time. The
//! writer emits canonical headers: uid/gid 0, mtime 0, mode 0100644,
//! sequential inode numbers, and 4-byte alignment for both names and
//! data, so identical inputs produce identical containers.
//!
//! Member order is the ordering contract of the whole tool: the manifest
//! first, its signature second (when present), then every artifact in
//! first-seen order.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Magic of the newc-with-checksum cpio variant.
pub const CPIO_MAGIC: &[u8; 6] = b"070702";

const HEADER_LEN: usize = 110;
const TRAILER_NAME: &str = "TRAILER!!!";
const FILE_MODE: u32 = 0o100644;

/// Streaming cpio writer over any `Write` sink.
pub struct SwuWriter<W: Write> {
    out: W,
    next_inode: u32,
}

impl<W: Write> SwuWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, next_inode: 1 }
    }

    /// Append a file from disk under the given archived name.
    pub fn append_path(&mut self, name: &str, path: &Path) -> io::Result<()> {
        let data = fs::read(path)?;
        self.append(name, &data)
    }

    /// Append one member with the given archived name and contents.
    pub fn append(&mut self, name: &str, data: &[u8]) -> io::Result<()> {
        let inode = self.next_inode;
        self.next_inode += 1;
        self.write_member(inode, FILE_MODE, name, data)
    }

    /// Write the trailer and return the underlying sink.
    pub fn finish(mut self) -> io::Result<W> {
        self.write_member(0, 0, TRAILER_NAME, &[])?;
        self.out.flush()?;
        Ok(self.out)
    }

    fn write_member(&mut self, inode: u32, mode: u32, name: &str, data: &[u8]) -> io::Result<()> {
        // namesize counts the terminating NUL
        let namesize = name.len() + 1;

        self.out.write_all(CPIO_MAGIC)?;
        for field in [
            inode,
            mode,
            0, // uid
            0, // gid
            1, // nlink
            0, // mtime
            data.len() as u32,
            0, // devmajor
            0, // devminor
            0, // rdevmajor
            0, // rdevminor
            namesize as u32,
            checksum(data),
        ] {
            write!(self.out, "{field:08X}")?;
        }

        self.out.write_all(name.as_bytes())?;
        self.out.write_all(&[0])?;
        self.out.write_all(pad_for(HEADER_LEN + namesize))?;

        self.out.write_all(data)?;
        self.out.write_all(pad_for(data.len()))?;
        Ok(())
    }
}

/// Byte sum of the member contents, the `070702` check field.
fn checksum(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |sum, b| sum.wrapping_add(*b as u32))
}

fn pad_for(written: usize) -> &'static [u8] {
    const ZEROS: [u8; 3] = [0; 3];
    &ZEROS[..(4 - written % 4) % 4]
}

/// One member read back from a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwuEntry {
    pub name: String,
    pub data: Vec<u8>,
}

/// Parse a container into its members, trailer excluded.
///
/// Used to verify emitted packages; rejects bad magic and checksum
/// mismatches.
pub fn list_entries(bytes: &[u8]) -> io::Result<Vec<SwuEntry>> {
    let mut entries = Vec::new();
    let mut offset = 0;

    loop {
        if offset + HEADER_LEN > bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated cpio header",
            ));
        }
        if &bytes[offset..offset + 6] != CPIO_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "bad cpio magic",
            ));
        }

        let field = |index: usize| -> io::Result<u32> {
            let start = offset + 6 + index * 8;
            let text = std::str::from_utf8(&bytes[start..start + 8])
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "non-ascii header"))?;
            u32::from_str_radix(text, 16)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad header field"))
        };

        let filesize = field(6)? as usize;
        let namesize = field(11)? as usize;
        let check = field(12)?;

        let name_start = offset + HEADER_LEN;
        let name = std::str::from_utf8(&bytes[name_start..name_start + namesize - 1])
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "non-utf8 member name"))?
            .to_string();

        let data_start = name_start + namesize + pad_for(HEADER_LEN + namesize).len();
        let data = bytes[data_start..data_start + filesize].to_vec();

        if name == TRAILER_NAME {
            return Ok(entries);
        }
        if checksum(&data) != check {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("checksum mismatch for {name}"),
            ));
        }

        entries.push(SwuEntry { name, data });
        offset = data_start + filesize + pad_for(filesize).len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = SwuWriter::new(Vec::new());
        for (name, data) in members {
            writer.append(name, data).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_round_trip_preserves_order_and_bytes() {
        let bytes = build(&[
            ("sw-description", b"software: {}"),
            ("rootfs.ext4.zlib", b"\x1f\x8bcompressed"),
            ("u-boot.bin", b"bootloader"),
        ]);

        let entries = list_entries(&bytes).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["sw-description", "rootfs.ext4.zlib", "u-boot.bin"]);
        assert_eq!(entries[2].data, b"bootloader");
    }

    #[test]
    fn test_empty_container_has_only_trailer() {
        let bytes = build(&[]);
        assert!(list_entries(&bytes).unwrap().is_empty());
        assert!(bytes.starts_with(CPIO_MAGIC));
    }

    #[test]
    fn test_members_are_word_aligned() {
        // 5-byte name and 3-byte payload force both padding paths
        let bytes = build(&[("a.bin", b"xyz"), ("bb.bin", b"p")]);
        let entries = list_entries(&bytes).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].data, b"xyz");
        assert_eq!(entries[1].data, b"p");
        assert_eq!(bytes.len() % 4, 0);
    }

    #[test]
    fn test_checksum_is_byte_sum() {
        assert_eq!(checksum(b""), 0);
        assert_eq!(checksum(b"\x01\x02\x03"), 6);
        assert_eq!(checksum(&[0xffu8; 2]), 510);
    }

    #[test]
    fn test_corrupted_data_detected() {
        let mut bytes = build(&[("f", b"hello")]);
        let needle = b"hello";
        let at = bytes
            .windows(needle.len())
            .position(|w| w == needle)
            .unwrap();
        bytes[at] ^= 0xff;

        assert!(list_entries(&bytes).is_err());
    }

    #[test]
    fn test_deterministic_output() {
        let a = build(&[("x", b"1"), ("y", b"2")]);
        let b = build(&[("x", b"1"), ("y", b"2")]);
        assert_eq!(a, b);
    }
}
