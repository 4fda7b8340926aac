//! Resource entries and their content

use crate::byte_order::ImageByteOrder;
use crate::compression::CompressedResourceHeader;
use crate::error::Result;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

/// What an entry is, which decides where it ends up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Class files and plain resources; the only kind stored in the image
    ClassOrResource,
    Config,
    HeaderFile,
    LegalNotice,
    ManPage,
    NativeCmd,
    NativeLib,
    /// Files placed at the root of the output
    Top,
}

impl ResourceKind {
    pub fn is_image_content(&self) -> bool {
        matches!(self, ResourceKind::ClassOrResource)
    }
}

/// Opens a fresh stream over lazily read content
pub type ContentOpener = Arc<dyn Fn() -> io::Result<Box<dyn Read + Send>> + Send + Sync>;

/// Entry bytes, either held in memory or opened on demand
#[derive(Clone)]
pub enum ResourceContent {
    Bytes(Arc<[u8]>),
    Lazy(ContentOpener),
}

impl ResourceContent {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        ResourceContent::Bytes(Arc::from(bytes.into()))
    }

    /// Read the full content. Lazy content is opened, drained and dropped.
    pub fn read_all(&self) -> Result<Arc<[u8]>> {
        match self {
            ResourceContent::Bytes(bytes) => Ok(Arc::clone(bytes)),
            ResourceContent::Lazy(open) => {
                let mut stream = open()?;
                let mut buf = Vec::new();
                stream.read_to_end(&mut buf)?;
                Ok(Arc::from(buf))
            }
        }
    }

    /// Bytes already in memory, without touching any stream
    pub fn in_memory(&self) -> Option<&[u8]> {
        match self {
            ResourceContent::Bytes(bytes) => Some(&bytes[..]),
            ResourceContent::Lazy(_) => None,
        }
    }
}

impl fmt::Debug for ResourceContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceContent::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            ResourceContent::Lazy(_) => f.write_str("Lazy"),
        }
    }
}

/// One resource of a module
///
/// Entries are immutable; [`ResourceEntry::copy_with_content`] derives a new
/// entry with the same identity and different bytes.
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    module: String,
    path: String,
    kind: ResourceKind,
    content: ResourceContent,
    length: u64,
    compressed: bool,
}

impl ResourceEntry {
    pub fn new(
        module: impl Into<String>,
        path: impl Into<String>,
        kind: ResourceKind,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        let bytes = bytes.into();
        ResourceEntry {
            module: module.into(),
            path: path.into(),
            kind,
            length: bytes.len() as u64,
            content: ResourceContent::from_bytes(bytes),
            compressed: false,
        }
    }

    /// Entry whose content is read from `open` when first needed
    pub fn from_stream(
        module: impl Into<String>,
        path: impl Into<String>,
        kind: ResourceKind,
        length: u64,
        open: ContentOpener,
    ) -> Self {
        ResourceEntry {
            module: module.into(),
            path: path.into(),
            kind,
            content: ResourceContent::Lazy(open),
            length,
            compressed: false,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Full path, `/<module>/<rest>`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path relative to the module root, without the leading slash
    pub fn module_path(&self) -> &str {
        self.path
            .strip_prefix('/')
            .and_then(|p| p.strip_prefix(self.module.as_str()))
            .and_then(|p| p.strip_prefix('/'))
            .unwrap_or(&self.path)
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn content(&self) -> &ResourceContent {
        &self.content
    }

    /// Length of the content as stored, compressed header included
    pub fn content_length(&self) -> u64 {
        self.length
    }

    pub fn content_bytes(&self) -> Result<Arc<[u8]>> {
        self.content.read_all()
    }

    /// Header of the outermost compression stage, if the entry is compressed
    ///
    /// Plain entries never report a header, whatever their bytes start with.
    pub fn compressed_header(&self, order: ImageByteOrder) -> Option<CompressedResourceHeader> {
        if !self.compressed {
            return None;
        }
        CompressedResourceHeader::read_from(self.content.in_memory()?, order)
    }

    /// Whether the content was framed by a compression stage
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Size of the content before the outermost compression stage
    pub fn original_size(&self, order: ImageByteOrder) -> u64 {
        self.compressed_header(order)
            .map(|header| header.uncompressed_size)
            .unwrap_or(self.length)
    }

    /// Copy the content to `out`, returning the bytes written
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<u64> {
        match &self.content {
            ResourceContent::Bytes(bytes) => {
                out.write_all(bytes)?;
                Ok(bytes.len() as u64)
            }
            ResourceContent::Lazy(open) => {
                let mut stream = open()?;
                Ok(io::copy(&mut stream, out)?)
            }
        }
    }

    /// Same identity, new plain content
    pub fn copy_with_content(&self, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        ResourceEntry {
            module: self.module.clone(),
            path: self.path.clone(),
            kind: self.kind,
            length: bytes.len() as u64,
            content: ResourceContent::from_bytes(bytes),
            compressed: false,
        }
    }

    /// Same identity, content framed by a compression stage
    pub(super) fn copy_with_compressed(&self, framed: Vec<u8>) -> Self {
        ResourceEntry {
            compressed: true,
            ..self.copy_with_content(framed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_entry_accessors() {
        let entry = ResourceEntry::new("m1", "/m1/p/A.class", ResourceKind::ClassOrResource, vec![1, 2, 3]);
        assert_eq!(entry.module(), "m1");
        assert_eq!(entry.path(), "/m1/p/A.class");
        assert_eq!(entry.module_path(), "p/A.class");
        assert_eq!(entry.content_length(), 3);
        assert_eq!(&*entry.content_bytes().unwrap(), &[1, 2, 3]);
        assert!(!entry.is_compressed());
        assert_eq!(entry.original_size(ImageByteOrder::Big), 3);
    }

    #[test]
    fn test_plain_bytes_with_compressed_magic() {
        let order = ImageByteOrder::Big;
        let mut bytes = Vec::new();
        order.put_u32(&mut bytes, crate::compression::COMPRESSED_MAGIC);
        bytes.resize(44, 0);

        let entry = ResourceEntry::new("m1", "/m1/p/Magic.bin", ResourceKind::ClassOrResource, bytes);
        assert!(!entry.is_compressed());
        assert!(entry.compressed_header(order).is_none());
        assert_eq!(entry.original_size(order), 44);

        let framed = entry.copy_with_compressed(entry.content_bytes().unwrap().to_vec());
        assert!(framed.is_compressed());
        assert!(!framed.copy_with_content(vec![1]).is_compressed());
    }

    #[test]
    fn test_lazy_content_opens_on_read() {
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&opened);
        let open: ContentOpener = Arc::new(move || -> io::Result<Box<dyn Read + Send>> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(io::Cursor::new(b"lazy bytes".to_vec())))
        });
        let entry = ResourceEntry::from_stream("m1", "/m1/r.txt", ResourceKind::ClassOrResource, 10, open);

        assert_eq!(opened.load(Ordering::SeqCst), 0);
        assert_eq!(&*entry.content_bytes().unwrap(), b"lazy bytes");

        let mut out = Vec::new();
        assert_eq!(entry.write_to(&mut out).unwrap(), 10);
        assert_eq!(out, b"lazy bytes");
        assert_eq!(opened.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_lazy_open_failure_is_io_error() {
        let open: ContentOpener = Arc::new(|| -> io::Result<Box<dyn Read + Send>> {
            Err(io::Error::new(io::ErrorKind::NotFound, "gone"))
        });
        let entry = ResourceEntry::from_stream("m1", "/m1/r.txt", ResourceKind::Config, 4, open);
        assert!(matches!(
            entry.content_bytes(),
            Err(crate::error::ImageError::Io { .. })
        ));
    }

    #[test]
    fn test_copy_with_content_keeps_identity() {
        let entry = ResourceEntry::new("m1", "/m1/p/A.class", ResourceKind::ClassOrResource, vec![0; 10]);
        let copy = entry.copy_with_content(vec![9; 4]);
        assert_eq!(copy.path(), entry.path());
        assert_eq!(copy.module(), entry.module());
        assert_eq!(copy.kind(), entry.kind());
        assert_eq!(copy.content_length(), 4);
        assert_eq!(entry.content_length(), 10);
    }
}
