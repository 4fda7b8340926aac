//! Build-wide byte order for image tables
//!
//! The byte order is selected once per build and applies to the header, the
//! redirect and offset tables, directory listings, package records and the
//! compressed resource header. Location records are byte-oriented and do not
//! depend on it.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageByteOrder {
    Big,
    Little,
}

impl ImageByteOrder {
    /// Byte order of the running platform
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ImageByteOrder::Big
        } else {
            ImageByteOrder::Little
        }
    }

    pub fn put_u16(self, dest: &mut Vec<u8>, value: u16) {
        let mut buf = [0u8; 2];
        match self {
            ImageByteOrder::Big => BigEndian::write_u16(&mut buf, value),
            ImageByteOrder::Little => LittleEndian::write_u16(&mut buf, value),
        }
        dest.extend_from_slice(&buf);
    }

    pub fn put_u32(self, dest: &mut Vec<u8>, value: u32) {
        let mut buf = [0u8; 4];
        match self {
            ImageByteOrder::Big => BigEndian::write_u32(&mut buf, value),
            ImageByteOrder::Little => LittleEndian::write_u32(&mut buf, value),
        }
        dest.extend_from_slice(&buf);
    }

    pub fn put_i32(self, dest: &mut Vec<u8>, value: i32) {
        self.put_u32(dest, value as u32);
    }

    pub fn put_u64(self, dest: &mut Vec<u8>, value: u64) {
        let mut buf = [0u8; 8];
        match self {
            ImageByteOrder::Big => BigEndian::write_u64(&mut buf, value),
            ImageByteOrder::Little => LittleEndian::write_u64(&mut buf, value),
        }
        dest.extend_from_slice(&buf);
    }

    /// Read a u16 from the start of `bytes`; `None` if too short
    pub fn read_u16(self, bytes: &[u8]) -> Option<u16> {
        let bytes = bytes.get(..2)?;
        Some(match self {
            ImageByteOrder::Big => BigEndian::read_u16(bytes),
            ImageByteOrder::Little => LittleEndian::read_u16(bytes),
        })
    }

    /// Read a u32 from the start of `bytes`; `None` if too short
    pub fn read_u32(self, bytes: &[u8]) -> Option<u32> {
        let bytes = bytes.get(..4)?;
        Some(match self {
            ImageByteOrder::Big => BigEndian::read_u32(bytes),
            ImageByteOrder::Little => LittleEndian::read_u32(bytes),
        })
    }

    pub fn read_i32(self, bytes: &[u8]) -> Option<i32> {
        self.read_u32(bytes).map(|v| v as i32)
    }

    /// Read a u64 from the start of `bytes`; `None` if too short
    pub fn read_u64(self, bytes: &[u8]) -> Option<u64> {
        let bytes = bytes.get(..8)?;
        Some(match self {
            ImageByteOrder::Big => BigEndian::read_u64(bytes),
            ImageByteOrder::Little => LittleEndian::read_u64(bytes),
        })
    }
}

impl Default for ImageByteOrder {
    fn default() -> Self {
        Self::native()
    }
}
