//! Archive ingestion through the builder

use modimage::{Archive, ArchiveEntry, ImageBuilder, ImageByteOrder, ImageError, InMemoryArchive, ResourceKind};
use std::io;

/// Delegates to an in-memory archive but fails to close
struct UnclosableArchive {
    inner: InMemoryArchive,
    message: &'static str,
}

impl Archive for UnclosableArchive {
    fn module_name(&self) -> &str {
        self.inner.module_name()
    }

    fn open(&mut self) -> io::Result<()> {
        self.inner.open()
    }

    fn entries(&mut self) -> io::Result<Vec<ArchiveEntry>> {
        self.inner.entries()
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner.close()?;
        Err(io::Error::new(io::ErrorKind::Other, self.message))
    }
}

#[test]
fn test_ingest_and_build() {
    let mut archives: Vec<Box<dyn Archive>> = vec![
        Box::new(
            InMemoryArchive::new("app.core")
                .with_entry("module-info.class", ResourceKind::ClassOrResource, b"descriptor".to_vec())
                .with_entry("app/Main.class", ResourceKind::ClassOrResource, b"main".to_vec()),
        ),
        Box::new(
            InMemoryArchive::new("app.native")
                .with_entry("app/nat/Bridge.class", ResourceKind::ClassOrResource, b"bridge".to_vec())
                .with_entry("lib/libbridge.so", ResourceKind::NativeLib, b"elf".to_vec()),
        ),
    ];

    let mut builder = ImageBuilder::new(ImageByteOrder::Little);
    assert_eq!(builder.ingest_archives(&mut archives).unwrap(), 4);

    let core = builder.pool().module("app.core").unwrap();
    assert_eq!(&*core.descriptor().unwrap().content_bytes().unwrap(), b"descriptor");
    assert!(core.packages().contains("app"));

    let image = builder.build().unwrap();
    assert_eq!(image.resource_count(), 3);
    assert_eq!(image.external_entries().len(), 1);

    let reader = image.reader().unwrap();
    assert_eq!(reader.read_resource("/app.native/app/nat/Bridge.class").unwrap().unwrap(), b"bridge");
    assert_eq!(reader.read_resource("/app.core/module-info.class").unwrap().unwrap(), b"descriptor");
}

#[test]
fn test_close_failures_aggregate() {
    let mut archives: Vec<Box<dyn Archive>> = ["first", "second", "third"]
        .into_iter()
        .enumerate()
        .map(|(i, message)| {
            let module = format!("m{}", i);
            Box::new(UnclosableArchive {
                inner: InMemoryArchive::new(module).with_entry(
                    "p/A.class",
                    ResourceKind::ClassOrResource,
                    vec![i as u8],
                ),
                message,
            }) as Box<dyn Archive>
        })
        .collect();

    let mut builder = ImageBuilder::new(ImageByteOrder::Big);
    match builder.ingest_archives(&mut archives) {
        Err(ImageError::Io { source, suppressed }) => {
            assert_eq!(source.to_string(), "first");
            let rest: Vec<String> = suppressed.iter().map(|e| e.to_string()).collect();
            assert_eq!(rest, ["second", "third"]);
        }
        other => panic!("expected aggregated Io error, got {:?}", other),
    }
}
