//! Location records
//!
//! A location describes where one image entry lives: its name split into
//! module, parent, base and extension (as string table offsets), plus the
//! content offset and the compressed and uncompressed sizes.
//!
//! Each non-zero attribute is written as a header byte `kind << 3 | (len - 1)`
//! followed by `len` big-endian value bytes, the shortest that hold the value.
//! A zero header byte ends the record.

use crate::error::{ImageError, Result};
use crate::strings::{unmasked_hash, StringLookup, StringTable, POSITIVE_MASK};

const MODULES_PREFIX: &str = "/modules/";
const PACKAGES_PREFIX: &str = "/packages/";

/// Attribute kinds of a location record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Attribute {
    End = 0,
    Module = 1,
    Parent = 2,
    Base = 3,
    Extension = 4,
    Offset = 5,
    Compressed = 6,
    Uncompressed = 7,
}

/// Number of attribute kinds, `End` included
pub const ATTRIBUTE_COUNT: usize = 8;

impl Attribute {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Attribute::End),
            1 => Some(Attribute::Module),
            2 => Some(Attribute::Parent),
            3 => Some(Attribute::Base),
            4 => Some(Attribute::Extension),
            5 => Some(Attribute::Offset),
            6 => Some(Attribute::Compressed),
            7 => Some(Attribute::Uncompressed),
            _ => None,
        }
    }
}

/// Components of an entry name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameParts {
    pub module: String,
    pub parent: String,
    pub base: String,
    pub extension: String,
}

impl NameParts {
    /// Split a full entry name.
    ///
    /// `/modules/...` and `/packages/...` keep everything after the prefix as
    /// the base so synthetic tree names never look like module resources.
    pub fn split(full_name: &str) -> Self {
        let mut parts = NameParts::default();

        if let Some(rest) = full_name.strip_prefix(MODULES_PREFIX) {
            parts.module = "modules".to_string();
            parts.base = rest.to_string();
            return parts;
        }
        if let Some(rest) = full_name.strip_prefix(PACKAGES_PREFIX) {
            parts.module = "packages".to_string();
            parts.base = rest.to_string();
            return parts;
        }

        let module_end = match full_name.get(1..).and_then(|s| s.find('/')) {
            Some(index) if full_name.starts_with('/') => index + 1,
            _ => {
                parts.base = full_name.to_string();
                return parts;
            }
        };

        parts.module = full_name[1..module_end].to_string();
        let mut start = module_end + 1;

        if let Some(slash) = full_name.rfind('/') {
            if start < slash {
                parts.parent = full_name[start..slash].to_string();
                start = slash + 1;
            }
        }

        match full_name.rfind('.') {
            Some(dot) if start < dot && dot + 1 < full_name.len() => {
                parts.base = full_name[start..dot].to_string();
                parts.extension = full_name[dot + 1..].to_string();
            }
            _ => parts.base = full_name[start..].to_string(),
        }
        parts
    }

    /// Reassemble the full name
    pub fn full_name(&self) -> String {
        let mut name = String::new();
        if !self.module.is_empty() {
            name.push('/');
            name.push_str(&self.module);
            name.push('/');
        }
        if !self.parent.is_empty() {
            name.push_str(&self.parent);
            name.push('/');
        }
        name.push_str(&self.base);
        if !self.extension.is_empty() {
            name.push('.');
            name.push_str(&self.extension);
        }
        name
    }

    /// Image hash chained over the components; equals the hash of the full name
    pub fn hash(&self, seed: i32) -> i32 {
        let mut hash = seed;
        if !self.module.is_empty() {
            hash = unmasked_hash("/", hash);
            hash = unmasked_hash(&self.module, hash);
            hash = unmasked_hash("/", hash);
        }
        if !self.parent.is_empty() {
            hash = unmasked_hash(&self.parent, hash);
            hash = unmasked_hash("/", hash);
        }
        hash = unmasked_hash(&self.base, hash);
        if !self.extension.is_empty() {
            hash = unmasked_hash(".", hash);
            hash = unmasked_hash(&self.extension, hash);
        }
        hash & POSITIVE_MASK
    }
}

/// Build-side location record
#[derive(Debug, Clone)]
pub struct LocationWriter {
    parts: NameParts,
    attributes: [u64; ATTRIBUTE_COUNT],
    location_offset: Option<u32>,
}

impl LocationWriter {
    /// Create the location of `full_name`, interning its name components
    pub fn new_location(
        full_name: &str,
        strings: &mut StringTable,
        content_offset: u64,
        compressed_size: u64,
        uncompressed_size: u64,
    ) -> Self {
        let parts = NameParts::split(full_name);
        let mut attributes = [0u64; ATTRIBUTE_COUNT];
        attributes[Attribute::Module as usize] = strings.add(&parts.module) as u64;
        attributes[Attribute::Parent as usize] = strings.add(&parts.parent) as u64;
        attributes[Attribute::Base as usize] = strings.add(&parts.base) as u64;
        attributes[Attribute::Extension as usize] = strings.add(&parts.extension) as u64;
        attributes[Attribute::Offset as usize] = content_offset;
        attributes[Attribute::Compressed as usize] = compressed_size;
        attributes[Attribute::Uncompressed as usize] = uncompressed_size;

        LocationWriter {
            parts,
            attributes,
            location_offset: None,
        }
    }

    pub fn parts(&self) -> &NameParts {
        &self.parts
    }

    pub fn full_name(&self) -> String {
        self.parts.full_name()
    }

    pub fn attribute(&self, kind: Attribute) -> u64 {
        self.attributes[kind as usize]
    }

    pub fn content_offset(&self) -> u64 {
        self.attribute(Attribute::Offset)
    }

    pub fn compressed_size(&self) -> u64 {
        self.attribute(Attribute::Compressed)
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.attribute(Attribute::Uncompressed)
    }

    pub fn hash(&self, seed: i32) -> i32 {
        self.parts.hash(seed)
    }

    /// Offset of this record in the location stream, once written
    pub fn location_offset(&self) -> Option<u32> {
        self.location_offset
    }

    /// The encoded attribute stream
    pub fn encoded(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(16);
        for kind in 1..ATTRIBUTE_COUNT {
            put_attribute(&mut bytes, kind as u8, self.attributes[kind]);
        }
        bytes.push(Attribute::End as u8);
        bytes
    }

    /// Append the record to `stream`, remembering where it starts.
    ///
    /// Each record is written exactly once; writing again appends a second
    /// copy and moves the remembered offset.
    pub fn write_to(&mut self, stream: &mut Vec<u8>) -> u32 {
        let offset = stream.len() as u32;
        stream.extend_from_slice(&self.encoded());
        self.location_offset = Some(offset);
        offset
    }
}

fn put_attribute(stream: &mut Vec<u8>, kind: u8, value: u64) {
    if value == 0 {
        return;
    }
    let length = (8 - value.leading_zeros() as usize / 8).max(1);
    stream.push(kind << 3 | (length - 1) as u8);
    for i in (0..length).rev() {
        stream.push((value >> (i * 8)) as u8);
    }
}

/// Decoded location record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageLocation {
    attributes: [u64; ATTRIBUTE_COUNT],
}

impl ImageLocation {
    /// Decode the record starting at the beginning of `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut attributes = [0u64; ATTRIBUTE_COUNT];
        let mut pos = 0;
        loop {
            let header = *bytes
                .get(pos)
                .ok_or(ImageError::Truncated("location record"))?;
            pos += 1;
            let kind = Attribute::from_u8(header >> 3).ok_or_else(|| {
                ImageError::Internal(format!("unknown location attribute {}", header >> 3))
            })?;
            if kind == Attribute::End {
                break;
            }
            let length = (header & 0x07) as usize + 1;
            let value_bytes = bytes
                .get(pos..pos + length)
                .ok_or(ImageError::Truncated("location attribute"))?;
            attributes[kind as usize] = value_bytes
                .iter()
                .fold(0u64, |value, &b| (value << 8) | b as u64);
            pos += length;
        }
        Ok(ImageLocation { attributes })
    }

    pub fn attribute(&self, kind: Attribute) -> u64 {
        self.attributes[kind as usize]
    }

    pub fn content_offset(&self) -> u64 {
        self.attribute(Attribute::Offset)
    }

    pub fn compressed_size(&self) -> u64 {
        self.attribute(Attribute::Compressed)
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.attribute(Attribute::Uncompressed)
    }

    /// Bytes the entry occupies in the content section
    pub fn stored_size(&self) -> u64 {
        if self.compressed_size() != 0 {
            self.compressed_size()
        } else {
            self.uncompressed_size()
        }
    }

    /// Resolve the name components through `strings`
    pub fn parts(&self, strings: &dyn StringLookup) -> Option<NameParts> {
        let text = |kind: Attribute| strings.lookup(self.attribute(kind) as u32);
        Some(NameParts {
            module: text(Attribute::Module)?,
            parent: text(Attribute::Parent)?,
            base: text(Attribute::Base)?,
            extension: text(Attribute::Extension)?,
        })
    }

    pub fn full_name(&self, strings: &dyn StringLookup) -> Option<String> {
        self.parts(strings).map(|parts| parts.full_name())
    }

    /// Whether this record describes `name`
    pub fn verify(&self, name: &str, strings: &dyn StringLookup) -> bool {
        self.full_name(strings).as_deref() == Some(name)
    }
}
