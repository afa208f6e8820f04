//! Fixed file header handling.
//!
//! # Structure
//!
//! | Offset | Length | Field            | Description                          |
//! |--------|--------|------------------|--------------------------------------|
//! | 0      | 8      | magic            | `Nemo Fi\0`                          |
//! | 8      | 4      | crc              | Adler-32 over header and sections    |
//! | 12     | 4      | ck_version       | Engine version                       |
//! | 16     | 4      | file_version     | Container format version (7..=9)     |
//! | 20     | 4      | zero             | Reserved, must be 0                  |
//! | 24     | 4      | write_mode       | [`WriteMode`] flags                  |
//! | 28     | 4      | hdr1_pack_size   | Stored size of the header section    |
//! | 32     | 4      | data_pack_size   | Stored size of the data section      |
//! | 36     | 4      | data_unpack_size | Decompressed size of the data section|
//! | 40     | 4      | manager_count    | Manager records in the data section  |
//! | 44     | 4      | object_count     | Object records in the header section |
//! | 48     | 4      | max_id_saved     | Largest object id saved              |
//! | 52     | 4      | product_version  | Product that wrote the file          |
//! | 56     | 4      | product_build    | Product build number                 |
//! | 60     | 4      | hdr1_unpack_size | Decompressed size of the header section |

use crate::cursor::ByteCursor;
use crate::error::{CmoError, Result};
use crate::types::{
    CK_VERSION, CURRENT_FILE_VERSION, FALLBACK_PRODUCT_BUILD, MAX_FILE_VERSION, MIN_FILE_VERSION,
    WriteMode,
};

/// File magic.
pub const MAGIC: [u8; 8] = *b"Nemo Fi\0";

/// Size of the raw header in bytes.
pub const RAW_HEADER_LEN: usize = 64;

/// Product versions at or above this are replaced by the fallback pair.
const MAX_PRODUCT_VERSION: u32 = 12;

/// Header exactly as stored on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawFileHeader {
    pub crc: u32,
    pub ck_version: u32,
    pub file_version: u32,
    pub zero: u32,
    pub write_mode: u32,
    pub hdr1_pack_size: u32,
    pub data_pack_size: u32,
    pub data_unpack_size: u32,
    pub manager_count: u32,
    pub object_count: u32,
    pub max_id_saved: u32,
    pub product_version: u32,
    pub product_build: u32,
    pub hdr1_unpack_size: u32,
}

impl RawFileHeader {
    /// Parse the header at the start of `bytes`.
    ///
    /// Only size and magic are checked here, see [`validate`](Self::validate).
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < RAW_HEADER_LEN {
            return Err(CmoError::invalid_file(format!(
                "{} bytes is smaller than the {RAW_HEADER_LEN} byte header",
                bytes.len()
            )));
        }
        if bytes[..MAGIC.len()] != MAGIC {
            return Err(CmoError::invalid_file("bad magic"));
        }

        let mut cursor = ByteCursor::borrowed(&bytes[..RAW_HEADER_LEN]);
        cursor.skip(MAGIC.len())?;
        Ok(Self {
            crc: cursor.read_u32()?,
            ck_version: cursor.read_u32()?,
            file_version: cursor.read_u32()?,
            zero: cursor.read_u32()?,
            write_mode: cursor.read_u32()?,
            hdr1_pack_size: cursor.read_u32()?,
            data_pack_size: cursor.read_u32()?,
            data_unpack_size: cursor.read_u32()?,
            manager_count: cursor.read_u32()?,
            object_count: cursor.read_u32()?,
            max_id_saved: cursor.read_u32()?,
            product_version: cursor.read_u32()?,
            product_build: cursor.read_u32()?,
            hdr1_unpack_size: cursor.read_u32()?,
        })
    }

    /// Reject a nonzero reserved field and unsupported format versions.
    pub fn validate(&self) -> Result<()> {
        if self.zero != 0 {
            return Err(CmoError::invalid_file(format!(
                "reserved header field is {:#x}",
                self.zero
            )));
        }
        if !(MIN_FILE_VERSION..=MAX_FILE_VERSION).contains(&self.file_version) {
            return Err(CmoError::ObsoleteVersion {
                version: self.file_version,
            });
        }
        Ok(())
    }

    /// Copy with the checksum field zeroed, as hashed by the checksum.
    #[must_use]
    pub fn with_crc_cleared(&self) -> Self {
        Self { crc: 0, ..*self }
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; RAW_HEADER_LEN] {
        let mut out = [0u8; RAW_HEADER_LEN];
        out[..MAGIC.len()].copy_from_slice(&MAGIC);
        let fields = [
            self.crc,
            self.ck_version,
            self.file_version,
            self.zero,
            self.write_mode,
            self.hdr1_pack_size,
            self.data_pack_size,
            self.data_unpack_size,
            self.manager_count,
            self.object_count,
            self.max_id_saved,
            self.product_version,
            self.product_build,
            self.hdr1_unpack_size,
        ];
        for (i, field) in fields.iter().enumerate() {
            let at = MAGIC.len() + i * 4;
            out[at..at + 4].copy_from_slice(&field.to_le_bytes());
        }
        out
    }
}

/// Validated, normalized header summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    pub product_version: u32,
    pub product_build: u32,
    pub write_mode: WriteMode,
    pub file_version: u32,
    pub ck_version: u32,
    /// Size of the whole file in bytes.
    pub file_size: u64,
    pub object_count: u32,
    pub manager_count: u32,
    pub max_id_saved: u32,
    pub crc: u32,
    pub hdr1_pack_size: u32,
    pub hdr1_unpack_size: u32,
    pub data_pack_size: u32,
    pub data_unpack_size: u32,
}

impl Default for FileInfo {
    fn default() -> Self {
        Self {
            product_version: 0,
            product_build: FALLBACK_PRODUCT_BUILD,
            write_mode: WriteMode::UNCOMPRESSED,
            file_version: CURRENT_FILE_VERSION,
            ck_version: CK_VERSION,
            file_size: 0,
            object_count: 0,
            manager_count: 0,
            max_id_saved: 0,
            crc: 0,
            hdr1_pack_size: 0,
            hdr1_unpack_size: 0,
            data_pack_size: 0,
            data_unpack_size: 0,
        }
    }
}

impl FileInfo {
    /// Build from a validated raw header.
    ///
    /// Unknown product versions are replaced by a fallback pair. Versions
    /// before 8 have no separate header section, so its sizes read as 0.
    #[must_use]
    pub fn from_raw(raw: &RawFileHeader, file_size: u64) -> Self {
        let (product_version, product_build) = if raw.product_version >= MAX_PRODUCT_VERSION {
            (0, FALLBACK_PRODUCT_BUILD)
        } else {
            (raw.product_version, raw.product_build)
        };
        let has_header_section = raw.file_version >= 8;
        Self {
            product_version,
            product_build,
            write_mode: WriteMode(raw.write_mode),
            file_version: raw.file_version,
            ck_version: raw.ck_version,
            file_size,
            object_count: raw.object_count,
            manager_count: raw.manager_count,
            max_id_saved: raw.max_id_saved,
            crc: raw.crc,
            hdr1_pack_size: if has_header_section {
                raw.hdr1_pack_size
            } else {
                0
            },
            hdr1_unpack_size: if has_header_section {
                raw.hdr1_unpack_size
            } else {
                0
            },
            data_pack_size: raw.data_pack_size,
            data_unpack_size: raw.data_unpack_size,
        }
    }

    /// Engine version split as `major/minor/build`.
    #[must_use]
    pub fn ck_version_parts(&self) -> (u32, u32, u32) {
        (
            (self.ck_version >> 24) & 0xFF,
            (self.ck_version >> 16) & 0xFF,
            self.ck_version & 0xFFFF,
        )
    }

    /// Product build split into its four bytes, most significant first.
    #[must_use]
    pub fn product_build_parts(&self) -> [u32; 4] {
        [
            (self.product_build >> 24) & 0xFF,
            (self.product_build >> 16) & 0xFF,
            (self.product_build >> 8) & 0xFF,
            self.product_build & 0xFF,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RawFileHeader {
        RawFileHeader {
            crc: 0xDEAD_BEEF,
            ck_version: CK_VERSION,
            file_version: 8,
            write_mode: 8,
            hdr1_pack_size: 12,
            data_pack_size: 20,
            data_unpack_size: 40,
            manager_count: 1,
            object_count: 2,
            max_id_saved: 9,
            product_version: 5,
            product_build: 0x0203_0405,
            hdr1_unpack_size: 24,
            ..RawFileHeader::default()
        }
    }

    #[test]
    fn test_header_bytes_layout() {
        let bytes = sample().to_bytes();
        assert_eq!(&bytes[..8], b"Nemo Fi\0");
        assert_eq!(&bytes[8..12], &0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(&bytes[16..20], &8u32.to_le_bytes());
        assert_eq!(&bytes[60..64], &24u32.to_le_bytes());
        assert_eq!(RawFileHeader::parse(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_parse_rejects_short_and_bad_magic() {
        let bytes = sample().to_bytes();
        assert!(matches!(
            RawFileHeader::parse(&bytes[..63]),
            Err(CmoError::InvalidFile { .. })
        ));
        let mut bad = bytes;
        bad[0] = b'X';
        assert!(matches!(
            RawFileHeader::parse(&bad),
            Err(CmoError::InvalidFile { .. })
        ));
    }

    #[test]
    fn test_validate_versions() {
        for version in [0, 6, 10, 11] {
            let raw = RawFileHeader {
                file_version: version,
                ..sample()
            };
            assert!(matches!(
                raw.validate(),
                Err(CmoError::ObsoleteVersion { version: v }) if v == version
            ));
        }
        for version in 7..=9 {
            let raw = RawFileHeader {
                file_version: version,
                ..sample()
            };
            assert!(raw.validate().is_ok());
        }
        let raw = RawFileHeader {
            zero: 1,
            ..sample()
        };
        assert!(matches!(raw.validate(), Err(CmoError::InvalidFile { .. })));
    }

    #[test]
    fn test_info_normalization() {
        let info = FileInfo::from_raw(&sample(), 100);
        assert_eq!(info.product_version, 5);
        assert_eq!(info.product_build_parts(), [2, 3, 4, 5]);
        assert_eq!(info.ck_version_parts(), (0x13, 0x02, 0x2002));
        assert_eq!(info.hdr1_unpack_size, 24);
        assert!(info.write_mode.contains(WriteMode::WHOLECOMPRESSED));

        let raw = RawFileHeader {
            product_version: 12,
            file_version: 7,
            ..sample()
        };
        let info = FileInfo::from_raw(&raw, 100);
        assert_eq!(info.product_version, 0);
        assert_eq!(info.product_build, FALLBACK_PRODUCT_BUILD);
        assert_eq!(info.hdr1_pack_size, 0);
        assert_eq!(info.hdr1_unpack_size, 0);
    }

    #[test]
    fn test_crc_cleared() {
        let cleared = sample().with_crc_cleared();
        assert_eq!(cleared.crc, 0);
        assert_eq!(cleared.object_count, 2);
    }
}
