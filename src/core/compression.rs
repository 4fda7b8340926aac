//! Compressed resource content
//!
//! A compressed resource keeps its bytes behind a fixed 29-byte header:
//!
//! ```text
//! magic u4 | compressed_size u8 | uncompressed_size u8
//! decompressor_name u4 | decompressor_config u4 | is_terminal u1
//! ```
//!
//! The two `u4` string fields are offsets into the image string table. A
//! resource may be compressed more than once; each stage wraps the previous
//! one, and `is_terminal` marks the stage whose input was plain bytes.
//!
//! The codec internals come from `lz4_flex` and `zstd`; this module only
//! selects them by name and frames their output.

use crate::byte_order::ImageByteOrder;
use crate::error::{ImageError, Result};
use crate::strings::StringLookup;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

pub const COMPRESSED_MAGIC: u32 = 0xCAFE_FAFA;
pub const COMPRESSED_HEADER_SIZE: usize = 29;

/// Largest expansion any single stage may claim
pub const MAX_STAGE_SIZE: u64 = i32::MAX as u64;

/// Compression method for resource content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMethod {
    /// No compression
    None,
    /// LZ4 block compression (fast, moderate ratio)
    Lz4,
    /// Zstd compression (slower, better ratio)
    Zstd,
}

impl CompressionMethod {
    /// Decompressor name recorded in the compressed header
    pub fn name(&self) -> &'static str {
        match self {
            CompressionMethod::None => "none",
            CompressionMethod::Lz4 => "lz4",
            CompressionMethod::Zstd => "zstd",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(CompressionMethod::None),
            "lz4" => Some(CompressionMethod::Lz4),
            "zstd" => Some(CompressionMethod::Zstd),
            _ => None,
        }
    }
}

/// Compression configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionConfig {
    /// Compression method to use
    pub method: CompressionMethod,

    /// Minimum size to compress (bytes)
    /// Data smaller than this will not be compressed
    pub threshold: usize,

    /// Minimum compression ratio (compressed_size / original_size)
    /// If ratio is worse than this, store uncompressed
    pub min_ratio: f32,

    /// Zstd level; ignored by the other methods
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        CompressionConfig {
            method: CompressionMethod::Lz4,
            threshold: 512,
            min_ratio: 0.9,
            level: 3,
        }
    }
}

impl CompressionConfig {
    /// Create config with no compression
    pub fn none() -> Self {
        CompressionConfig {
            method: CompressionMethod::None,
            threshold: usize::MAX,
            min_ratio: 0.0,
            level: 0,
        }
    }

    /// Create config with LZ4 compression
    pub fn lz4() -> Self {
        CompressionConfig {
            method: CompressionMethod::Lz4,
            ..Default::default()
        }
    }

    /// Create config with Zstd compression
    pub fn zstd() -> Self {
        CompressionConfig {
            method: CompressionMethod::Zstd,
            threshold: 1024, // Zstd overhead is higher
            min_ratio: 0.85,
            level: 3,
        }
    }

    /// Configuration string recorded next to the decompressor name
    pub fn describe(&self) -> String {
        match self.method {
            CompressionMethod::Zstd => format!("level={}", self.level),
            _ => String::new(),
        }
    }
}

/// A named compression codec
pub trait ResourceCodec: Send + Sync {
    fn name(&self) -> &str;

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress `data`, which must expand to exactly `uncompressed_size`
    fn decompress(&self, data: &[u8], uncompressed_size: usize) -> Result<Vec<u8>>;
}

fn codec_error(name: &str, reason: impl std::fmt::Display) -> ImageError {
    ImageError::Codec {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// LZ4 block codec; sizes live in the compressed header
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Codec;

impl ResourceCodec for Lz4Codec {
    fn name(&self) -> &str {
        CompressionMethod::Lz4.name()
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress(data))
    }

    fn decompress(&self, data: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
        lz4_flex::decompress(data, uncompressed_size).map_err(|e| codec_error(self.name(), e))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    level: i32,
}

impl ZstdCodec {
    pub fn new(level: i32) -> Self {
        ZstdCodec { level }
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self::new(3)
    }
}

impl ResourceCodec for ZstdCodec {
    fn name(&self) -> &str {
        CompressionMethod::Zstd.name()
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::bulk::compress(data, self.level).map_err(|e| codec_error(self.name(), e))
    }

    fn decompress(&self, data: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
        zstd::bulk::decompress(data, uncompressed_size).map_err(|e| codec_error(self.name(), e))
    }
}

/// Compress data using the specified method
pub fn compress(data: &[u8], config: &CompressionConfig) -> Result<Vec<u8>> {
    match config.method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Lz4 => Lz4Codec.compress(data),
        CompressionMethod::Zstd => ZstdCodec::new(config.level).compress(data),
    }
}

/// Compress data if beneficial, returns (data, method_used)
pub fn compress_if_beneficial(
    data: &[u8],
    config: &CompressionConfig,
) -> Result<(Vec<u8>, CompressionMethod)> {
    // Skip compression if below threshold
    if data.len() < config.threshold || data.is_empty() {
        return Ok((data.to_vec(), CompressionMethod::None));
    }

    if matches!(config.method, CompressionMethod::None) {
        return Ok((data.to_vec(), CompressionMethod::None));
    }

    let compressed = compress(data, config)?;

    let ratio = compressed.len() as f32 / data.len() as f32;
    if ratio < config.min_ratio {
        Ok((compressed, config.method))
    } else {
        // Compression not worth it, store uncompressed
        Ok((data.to_vec(), CompressionMethod::None))
    }
}

/// Header framing one compression stage of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedResourceHeader {
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub decompressor_name_offset: u32,
    pub decompressor_config_offset: u32,
    pub is_terminal: bool,
}

impl CompressedResourceHeader {
    pub fn to_bytes(&self, order: ImageByteOrder) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(COMPRESSED_HEADER_SIZE);
        order.put_u32(&mut bytes, COMPRESSED_MAGIC);
        order.put_u64(&mut bytes, self.compressed_size);
        order.put_u64(&mut bytes, self.uncompressed_size);
        order.put_u32(&mut bytes, self.decompressor_name_offset);
        order.put_u32(&mut bytes, self.decompressor_config_offset);
        bytes.push(self.is_terminal as u8);
        bytes
    }

    /// Read a header from the start of `content`.
    ///
    /// `None` when the content is too short or does not start with the
    /// compressed magic.
    pub fn read_from(content: &[u8], order: ImageByteOrder) -> Option<Self> {
        if content.len() < COMPRESSED_HEADER_SIZE || order.read_u32(content)? != COMPRESSED_MAGIC {
            return None;
        }
        Some(CompressedResourceHeader {
            compressed_size: order.read_u64(&content[4..])?,
            uncompressed_size: order.read_u64(&content[12..])?,
            decompressor_name_offset: order.read_u32(&content[20..])?,
            decompressor_config_offset: order.read_u32(&content[24..])?,
            is_terminal: content[28] != 0,
        })
    }
}

/// Whether `content` starts with a compressed header
pub fn is_compressed(content: &[u8], order: ImageByteOrder) -> bool {
    CompressedResourceHeader::read_from(content, order).is_some()
}

/// Codecs available for decompression, looked up by recorded name
#[derive(Clone)]
pub struct Decompressor {
    codecs: HashMap<String, Arc<dyn ResourceCodec>>,
}

impl Decompressor {
    /// Decompressor knowing the built-in LZ4 and Zstd codecs
    pub fn new() -> Self {
        let mut decompressor = Decompressor {
            codecs: HashMap::new(),
        };
        decompressor.register(Arc::new(Lz4Codec));
        decompressor.register(Arc::new(ZstdCodec::default()));
        decompressor
    }

    pub fn register(&mut self, codec: Arc<dyn ResourceCodec>) {
        self.codecs.insert(codec.name().to_string(), codec);
    }

    /// Undo every compression stage of `content`.
    ///
    /// Stops after a terminal stage or when no further header is found.
    pub fn decompress_resource(
        &self,
        content: &[u8],
        order: ImageByteOrder,
        strings: &dyn StringLookup,
    ) -> Result<Vec<u8>> {
        self.decompress_bounded(content, order, strings, MAX_STAGE_SIZE)
    }

    /// Like [`Decompressor::decompress_resource`], with the outermost stage
    /// limited to `outer_size` bytes of output.
    ///
    /// Every stage is checked against its limit before the codec allocates,
    /// so a corrupt header fails with a codec error.
    pub fn decompress_bounded(
        &self,
        content: &[u8],
        order: ImageByteOrder,
        strings: &dyn StringLookup,
        outer_size: u64,
    ) -> Result<Vec<u8>> {
        let mut current = content.to_vec();
        let mut limit = outer_size.min(MAX_STAGE_SIZE);
        while let Some(header) = CompressedResourceHeader::read_from(&current, order) {
            let name = strings
                .lookup(header.decompressor_name_offset)
                .ok_or_else(|| {
                    ImageError::Internal(format!(
                        "decompressor name offset {} not in string table",
                        header.decompressor_name_offset
                    ))
                })?;
            let codec = self
                .codecs
                .get(&name)
                .ok_or_else(|| ImageError::UnknownCodec(name.clone()))?;

            let payload = usize::try_from(header.compressed_size)
                .ok()
                .and_then(|size| size.checked_add(COMPRESSED_HEADER_SIZE))
                .and_then(|end| current.get(COMPRESSED_HEADER_SIZE..end))
                .ok_or(ImageError::Truncated("compressed resource"))?;
            let expected = usize::try_from(header.uncompressed_size)
                .ok()
                .filter(|_| header.uncompressed_size <= limit)
                .ok_or_else(|| {
                    codec_error(
                        &name,
                        format!(
                            "stage claims {} bytes, limit is {}",
                            header.uncompressed_size, limit
                        ),
                    )
                })?;
            limit = MAX_STAGE_SIZE;
            let plain = codec.decompress(payload, expected)?;
            if plain.len() != expected {
                return Err(codec_error(
                    &name,
                    format!("expanded to {} bytes, expected {}", plain.len(), expected),
                ));
            }

            current = plain;
            if header.is_terminal {
                break;
            }
        }
        Ok(current)
    }
}

impl Default for Decompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Decompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.codecs.keys().collect();
        names.sort();
        f.debug_struct("Decompressor").field("codecs", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strings::StringTable;

    fn frame(
        payload: &[u8],
        uncompressed: usize,
        name: &str,
        terminal: bool,
        strings: &mut StringTable,
        order: ImageByteOrder,
    ) -> Vec<u8> {
        let header = CompressedResourceHeader {
            compressed_size: payload.len() as u64,
            uncompressed_size: uncompressed as u64,
            decompressor_name_offset: strings.add(name),
            decompressor_config_offset: 0,
            is_terminal: terminal,
        };
        let mut bytes = header.to_bytes(order);
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_method_names() {
        for method in [
            CompressionMethod::None,
            CompressionMethod::Lz4,
            CompressionMethod::Zstd,
        ] {
            assert_eq!(CompressionMethod::from_name(method.name()), Some(method));
        }
        assert_eq!(CompressionMethod::from_name("gzip"), None);
    }

    #[test]
    fn test_lz4_codec() {
        let data = b"Hello, World! ".repeat(100);
        let compressed = Lz4Codec.compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(Lz4Codec.decompress(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn test_zstd_codec() {
        let data = b"Zstandard compression test data! ".repeat(100);
        let codec = ZstdCodec::default();
        let compressed = codec.compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(codec.decompress(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn test_compress_if_beneficial() {
        let config = CompressionConfig::lz4();

        // Small data - should not compress
        let small_data = b"Hello";
        let (result, method) = compress_if_beneficial(small_data, &config).unwrap();
        assert_eq!(method, CompressionMethod::None);
        assert_eq!(result, small_data);

        // Large repetitive data - should compress
        let large_data = b"X".repeat(2000);
        let (result, method) = compress_if_beneficial(&large_data, &config).unwrap();
        assert_eq!(method, CompressionMethod::Lz4);
        assert!(result.len() < large_data.len());
    }

    #[test]
    fn test_compression_config_defaults() {
        let config = CompressionConfig::default();
        assert_eq!(config.method, CompressionMethod::Lz4);
        assert_eq!(config.threshold, 512);
        assert_eq!(config.min_ratio, 0.9);
        assert_eq!(config.describe(), "");

        assert_eq!(CompressionConfig::none().method, CompressionMethod::None);
        assert_eq!(CompressionConfig::zstd().describe(), "level=3");
    }

    #[test]
    fn test_header_layout() {
        for order in [ImageByteOrder::Big, ImageByteOrder::Little] {
            let header = CompressedResourceHeader {
                compressed_size: 12,
                uncompressed_size: 4096,
                decompressor_name_offset: 42,
                decompressor_config_offset: 7,
                is_terminal: true,
            };
            let bytes = header.to_bytes(order);
            assert_eq!(bytes.len(), COMPRESSED_HEADER_SIZE);
            assert_eq!(CompressedResourceHeader::read_from(&bytes, order), Some(header));
            assert!(is_compressed(&bytes, order));
        }
        assert!(!is_compressed(b"plain class bytes that are long enough", ImageByteOrder::Big));
        assert!(!is_compressed(&[0xCA, 0xFE], ImageByteOrder::Big));
    }

    #[test]
    fn test_decompress_chained_stages() {
        let order = ImageByteOrder::Little;
        let mut strings = StringTable::new();
        let original = b"chained compression payload ".repeat(64);

        let inner_payload = Lz4Codec.compress(&original).unwrap();
        let inner = frame(&inner_payload, original.len(), "lz4", true, &mut strings, order);

        let outer_payload = ZstdCodec::default().compress(&inner).unwrap();
        let outer = frame(&outer_payload, inner.len(), "zstd", false, &mut strings, order);

        let decompressor = Decompressor::new();
        let plain = decompressor
            .decompress_resource(&outer, order, &strings)
            .unwrap();
        assert_eq!(plain, original);
    }

    #[test]
    fn test_decompress_plain_content_is_unchanged() {
        let strings = StringTable::new();
        let plain = Decompressor::new()
            .decompress_resource(b"not compressed", ImageByteOrder::Big, &strings)
            .unwrap();
        assert_eq!(plain, b"not compressed");
    }

    #[test]
    fn test_unknown_codec() {
        let order = ImageByteOrder::Big;
        let mut strings = StringTable::new();
        let framed = frame(b"xxxx", 4, "brotli", true, &mut strings, order);
        assert!(matches!(
            Decompressor::new().decompress_resource(&framed, order, &strings),
            Err(ImageError::UnknownCodec(name)) if name == "brotli"
        ));
    }

    #[test]
    fn test_truncated_payload() {
        let order = ImageByteOrder::Big;
        let mut strings = StringTable::new();
        let mut framed = frame(&[1, 2, 3, 4, 5, 6], 100, "lz4", true, &mut strings, order);
        framed.truncate(COMPRESSED_HEADER_SIZE + 2);
        assert!(matches!(
            Decompressor::new().decompress_resource(&framed, order, &strings),
            Err(ImageError::Truncated(_))
        ));
    }

    #[test]
    fn test_oversized_stage_rejected() {
        let order = ImageByteOrder::Big;
        let mut strings = StringTable::new();
        let payload = Lz4Codec.compress(&[3u8; 1500]).unwrap();
        let decompressor = Decompressor::new();

        let huge = frame(&payload, 1 << 40, "lz4", true, &mut strings, order);
        assert!(matches!(
            decompressor.decompress_resource(&huge, order, &strings),
            Err(ImageError::Codec { name, .. }) if name == "lz4"
        ));

        let honest = frame(&payload, 1500, "lz4", true, &mut strings, order);
        assert!(matches!(
            decompressor.decompress_bounded(&honest, order, &strings, 1499),
            Err(ImageError::Codec { .. })
        ));
        assert_eq!(
            decompressor.decompress_bounded(&honest, order, &strings, 1500).unwrap(),
            vec![3u8; 1500]
        );
    }
}
