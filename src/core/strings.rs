//! String table and the image hash
//!
//! Strings are stored back to back in modified UTF-8, each followed by a NUL
//! terminator. A string's ID is its byte offset in the table. Offset 0 is the
//! empty string and offset 1 is `"class"`, both reserved at construction.
//!
//! The same byte encoding feeds the image hash, so a path hashes identically
//! whether it is hashed whole or as a chain of its components.

use std::collections::HashMap;

/// Multiplier of the image hash (also its default seed)
pub const HASH_MULTIPLIER: i32 = 0x0100_0193;

/// Mask keeping hashes non-negative
pub const POSITIVE_MASK: i32 = 0x7FFF_FFFF;

/// Seed used for the primary hash of every key
pub const DEFAULT_SEED: i32 = HASH_MULTIPLIER;

/// Encode a string in modified UTF-8.
///
/// NUL becomes `C0 80` and supplementary characters are written as two
/// three-byte surrogate halves, so the encoding never contains a zero byte.
pub fn mutf8_encode(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len());
    for unit in text.encode_utf16() {
        match unit {
            0x0001..=0x007F => bytes.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                bytes.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                bytes.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                bytes.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                bytes.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                bytes.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    bytes
}

/// Decode modified UTF-8; `None` on malformed input
pub fn mutf8_decode(bytes: &[u8]) -> Option<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let c = *bytes.get(i + 1)?;
            if c & 0xC0 != 0x80 {
                return None;
            }
            units.push((((b & 0x1F) as u16) << 6) | (c & 0x3F) as u16);
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let c1 = *bytes.get(i + 1)?;
            let c2 = *bytes.get(i + 2)?;
            if c1 & 0xC0 != 0x80 || c2 & 0xC0 != 0x80 {
                return None;
            }
            units.push(
                (((b & 0x0F) as u16) << 12) | (((c1 & 0x3F) as u16) << 6) | (c2 & 0x3F) as u16,
            );
            i += 3;
        } else {
            return None;
        }
    }
    String::from_utf16(&units).ok()
}

/// Chainable form of the image hash, without the positive mask
pub fn unmasked_hash(text: &str, seed: i32) -> i32 {
    mutf8_encode(text).iter().fold(seed, |hash, &byte| {
        hash.wrapping_mul(HASH_MULTIPLIER) ^ byte as i32
    })
}

/// The image hash of `text` under `seed`, always non-negative
pub fn image_hash(text: &str, seed: i32) -> i32 {
    unmasked_hash(text, seed) & POSITIVE_MASK
}

/// Read the NUL-terminated string starting at `offset` in a raw table
pub fn read_string(table: &[u8], offset: u32) -> Option<String> {
    let start = offset as usize;
    let tail = table.get(start..)?;
    let end = tail.iter().position(|&b| b == 0)?;
    mutf8_decode(&tail[..end])
}

/// Resolves string IDs back to text.
///
/// Implemented by the build-time [`StringTable`] and by the reader's view of a
/// serialized table.
pub trait StringLookup {
    fn lookup(&self, offset: u32) -> Option<String>;
}

/// Interning string table that serializes into the image
#[derive(Debug, Clone)]
pub struct StringTable {
    bytes: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl StringTable {
    pub const EMPTY_OFFSET: u32 = 0;
    pub const CLASS_OFFSET: u32 = 1;

    pub fn new() -> Self {
        let mut table = StringTable {
            bytes: Vec::new(),
            offsets: HashMap::new(),
        };
        table.append("");
        table.append("class");
        table
    }

    fn append(&mut self, text: &str) -> u32 {
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(&mutf8_encode(text));
        self.bytes.push(0);
        self.offsets.insert(text.to_string(), offset);
        offset
    }

    /// Intern `text`, returning its stable offset
    pub fn add(&mut self, text: &str) -> u32 {
        match self.offsets.get(text) {
            Some(&offset) => offset,
            None => self.append(text),
        }
    }

    /// Offset of an already interned string
    pub fn find(&self, text: &str) -> Option<u32> {
        self.offsets.get(text).copied()
    }

    /// Text at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` was not returned by [`StringTable::add`] on this
    /// table. Callers only hold offsets this table handed out.
    pub fn get(&self, offset: u32) -> String {
        match self.try_get(offset) {
            Some(text) => text,
            None => panic!(
                "string offset {} outside string table of {} bytes",
                offset,
                self.bytes.len()
            ),
        }
    }

    pub fn try_get(&self, offset: u32) -> Option<String> {
        read_string(&self.bytes, offset)
    }

    /// Serialized size in bytes
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Number of distinct strings, reserved ones included
    pub fn count(&self) -> usize {
        self.offsets.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StringLookup for StringTable {
    fn lookup(&self, offset: u32) -> Option<String> {
        self.try_get(offset)
    }
}

/// Usage-counting string table for plugin previsits.
///
/// IDs handed out here are private to the previsit pass. After every previsit
/// has run, only strings used more than once are interned into the real
/// table; one-off names are left to be interned lazily.
#[derive(Debug, Default)]
pub struct PrevisitStrings {
    ids: HashMap<String, u32>,
    texts: Vec<String>,
    usage: HashMap<String, usize>,
}

impl PrevisitStrings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one use of `text`
    pub fn add(&mut self, text: &str) -> u32 {
        *self.usage.entry(text.to_string()).or_insert(0) += 1;
        if let Some(&id) = self.ids.get(text) {
            return id;
        }
        let id = self.texts.len() as u32;
        self.ids.insert(text.to_string(), id);
        self.texts.push(text.to_string());
        id
    }

    pub fn get(&self, id: u32) -> Option<&str> {
        self.texts.get(id as usize).map(String::as_str)
    }

    pub fn usage(&self, text: &str) -> usize {
        self.usage.get(text).copied().unwrap_or(0)
    }

    /// Strings used more than once, most used first (ties by text)
    pub fn shared_strings(&self) -> Vec<String> {
        let mut shared: Vec<(&String, usize)> = self
            .usage
            .iter()
            .filter(|(_, &count)| count > 1)
            .map(|(text, &count)| (text, count))
            .collect();
        shared.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        shared.into_iter().map(|(text, _)| text.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_offsets() {
        let table = StringTable::new();
        assert_eq!(table.find(""), Some(StringTable::EMPTY_OFFSET));
        assert_eq!(table.find("class"), Some(StringTable::CLASS_OFFSET));
        assert_eq!(table.get(0), "");
        assert_eq!(table.get(1), "class");
        assert_eq!(table.size(), 7);
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut table = StringTable::new();
        let foo = table.add("foo");
        let bar = table.add("bar");
        assert_eq!(table.add("foo"), foo);
        assert_ne!(foo, bar);
        assert_eq!(table.get(foo), "foo");
        assert_eq!(table.get(bar), "bar");
        assert_eq!(table.add(""), 0);
        assert_eq!(table.add("class"), 1);
    }

    #[test]
    #[should_panic(expected = "outside string table")]
    fn test_get_out_of_range_panics() {
        let table = StringTable::new();
        table.get(10_000);
    }

    #[test]
    fn test_mutf8_nul_and_supplementary() {
        let nul = mutf8_encode("a\0b");
        assert_eq!(nul, [b'a', 0xC0, 0x80, b'b']);
        assert_eq!(mutf8_decode(&nul).as_deref(), Some("a\0b"));

        let emoji = "\u{1F600}";
        let encoded = mutf8_encode(emoji);
        assert_eq!(encoded.len(), 6);
        assert_eq!(mutf8_decode(&encoded).as_deref(), Some(emoji));

        let mut table = StringTable::new();
        let offset = table.add("x\0\u{1F600}é");
        assert_eq!(table.get(offset), "x\0\u{1F600}é");
    }

    #[test]
    fn test_hash_chains_like_concatenation() {
        let whole = image_hash("/java.base/java/lang/Object.class", DEFAULT_SEED);
        let mut chained = DEFAULT_SEED;
        for part in ["/", "java.base", "/", "java/lang", "/", "Object", ".", "class"] {
            chained = unmasked_hash(part, chained);
        }
        assert_eq!(chained & POSITIVE_MASK, whole);
        assert!(whole >= 0);
    }

    #[test]
    fn test_hash_depends_on_seed() {
        assert_ne!(image_hash("abc", DEFAULT_SEED), image_hash("abc", DEFAULT_SEED + 1));
        assert_eq!(image_hash("", 42), 42);
    }

    #[test]
    fn test_previsit_shared_strings() {
        let mut previsit = PrevisitStrings::new();
        let zstd = previsit.add("zstd");
        previsit.add("zstd");
        previsit.add("zstd");
        previsit.add("lz4");
        previsit.add("lz4");
        previsit.add("once");

        assert_eq!(previsit.get(zstd), Some("zstd"));
        assert_eq!(previsit.usage("zstd"), 3);
        assert_eq!(previsit.shared_strings(), vec!["zstd", "lz4"]);
    }
}
