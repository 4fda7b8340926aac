use crate::byte_order::ImageByteOrder;
use crate::error::{ImageError, Result};

pub const MAGIC: u32 = 0xCAFE_DADA;
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;
pub const HEADER_SIZE: usize = 24;

/// Size of one redirect or offset table slot
pub const SLOT_SIZE: usize = 4;

/// Image container header
///
/// The header is the first 24 bytes of the image. Every field is written in
/// the byte order chosen for the build; readers detect that order from the
/// magic number.
///
/// ```text
/// magic u4 | major u2 | minor u2 | resource_count u4
/// table_length u4 | locations_size u4 | strings_size u4
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Magic number: 0xCAFEDADA
    pub magic: u32,

    /// Format version (major)
    pub version_major: u16,

    /// Format version (minor)
    pub version_minor: u16,

    /// Number of real resources; synthetic tree nodes are not counted
    pub resource_count: u32,

    /// Slots in the redirect and offset tables
    pub table_length: u32,

    /// Bytes in the location stream
    pub locations_size: u32,

    /// Bytes in the string table
    pub strings_size: u32,
}

impl Header {
    pub fn new(
        resource_count: u32,
        table_length: u32,
        locations_size: u32,
        strings_size: u32,
    ) -> Self {
        Header {
            magic: MAGIC,
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            resource_count,
            table_length,
            locations_size,
            strings_size,
        }
    }

    /// Validate the header magic and version
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(ImageError::InvalidMagic);
        }

        // Exact match for now
        if self.version_major != VERSION_MAJOR || self.version_minor != VERSION_MINOR {
            return Err(ImageError::UnsupportedVersion {
                major: self.version_major,
                minor: self.version_minor,
            });
        }

        Ok(())
    }

    pub fn redirect_offset(&self) -> usize {
        HEADER_SIZE
    }

    pub fn offsets_offset(&self) -> usize {
        self.redirect_offset() + self.table_length as usize * SLOT_SIZE
    }

    pub fn locations_offset(&self) -> usize {
        self.offsets_offset() + self.table_length as usize * SLOT_SIZE
    }

    pub fn strings_offset(&self) -> usize {
        self.locations_offset() + self.locations_size as usize
    }

    /// Total size of header and index; content starts here
    pub fn index_size(&self) -> usize {
        self.strings_offset() + self.strings_size as usize
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self, order: ImageByteOrder) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);

        order.put_u32(&mut bytes, self.magic);
        order.put_u16(&mut bytes, self.version_major);
        order.put_u16(&mut bytes, self.version_minor);
        order.put_u32(&mut bytes, self.resource_count);
        order.put_u32(&mut bytes, self.table_length);
        order.put_u32(&mut bytes, self.locations_size);
        order.put_u32(&mut bytes, self.strings_size);

        bytes
    }

    /// Deserialize header from bytes
    pub fn from_bytes(bytes: &[u8], order: ImageByteOrder) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ImageError::Truncated("header"));
        }

        let u32_at = |offset: usize| order.read_u32(&bytes[offset..]).unwrap_or_default();
        let u16_at = |offset: usize| order.read_u16(&bytes[offset..]).unwrap_or_default();

        let header = Header {
            magic: u32_at(0),
            version_major: u16_at(4),
            version_minor: u16_at(6),
            resource_count: u32_at(8),
            table_length: u32_at(12),
            locations_size: u32_at(16),
            strings_size: u32_at(20),
        };

        header.validate()?;

        Ok(header)
    }
}

/// Byte order an image was written in, judged by its magic
pub fn detect_byte_order(bytes: &[u8]) -> Result<ImageByteOrder> {
    for order in [ImageByteOrder::Big, ImageByteOrder::Little] {
        match order.read_u32(bytes) {
            Some(MAGIC) => return Ok(order),
            Some(_) => {}
            None => return Err(ImageError::Truncated("header")),
        }
    }
    Err(ImageError::InvalidMagic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_creation() {
        let header = Header::new(3, 5, 40, 60);
        assert_eq!(header.magic, MAGIC);
        assert_eq!(header.version_major, VERSION_MAJOR);
        assert_eq!(header.version_minor, VERSION_MINOR);
        assert!(header.validate().is_ok());
    }

    #[test]
    fn test_invalid_magic() {
        let mut header = Header::new(0, 0, 0, 0);
        header.magic = 0xDEAD_BEEF;
        assert!(matches!(header.validate(), Err(ImageError::InvalidMagic)));
    }

    #[test]
    fn test_invalid_version() {
        let mut header = Header::new(0, 0, 0, 0);
        header.version_major = 99;
        assert!(matches!(
            header.validate(),
            Err(ImageError::UnsupportedVersion { major: 99, .. })
        ));
    }

    #[test]
    fn test_header_serialization() {
        for order in [ImageByteOrder::Big, ImageByteOrder::Little] {
            let header = Header::new(7, 9, 123, 456);
            let bytes = header.to_bytes(order);
            assert_eq!(bytes.len(), HEADER_SIZE);

            assert_eq!(detect_byte_order(&bytes).unwrap(), order);
            let deserialized = Header::from_bytes(&bytes, order).unwrap();
            assert_eq!(deserialized, header);
        }
    }

    #[test]
    fn test_big_endian_magic_bytes() {
        let bytes = Header::new(0, 0, 0, 0).to_bytes(ImageByteOrder::Big);
        assert_eq!(&bytes[..4], &[0xCA, 0xFE, 0xDA, 0xDA]);
    }

    #[test]
    fn test_section_offsets() {
        let header = Header::new(3, 3, 10, 20);
        assert_eq!(header.redirect_offset(), 24);
        assert_eq!(header.offsets_offset(), 36);
        assert_eq!(header.locations_offset(), 48);
        assert_eq!(header.strings_offset(), 58);
        assert_eq!(header.index_size(), 78);
    }

    #[test]
    fn test_truncated_and_foreign_bytes() {
        assert!(matches!(
            Header::from_bytes(&[0u8; 10], ImageByteOrder::Big),
            Err(ImageError::Truncated(_))
        ));
        assert!(matches!(
            detect_byte_order(&[0u8; 24]),
            Err(ImageError::InvalidMagic)
        ));
        assert!(matches!(
            detect_byte_order(&[0xCA]),
            Err(ImageError::Truncated(_))
        ));
    }
}
