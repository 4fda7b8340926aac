#![no_main]
use libfuzzer_sys::fuzz_target;
use modimage::ImageReader;

// Arbitrary bytes must never panic the reader; errors are fine.
fuzz_target!(|data: &[u8]| {
    let reader = match ImageReader::from_bytes(data.to_vec()) {
        Ok(reader) => reader,
        Err(_) => return,
    };

    let names = match reader.entry_names() {
        Ok(names) => names,
        Err(_) => return,
    };

    for name in names.iter().take(64) {
        if let Ok(Some(location)) = reader.find(name) {
            let _ = reader.resource_bytes(&location);
            if location.uncompressed_size() <= 1 << 20 {
                let _ = reader.read_resource(name);
            }
        }
        let _ = reader.list_directory(name);
    }
    let _ = reader.package_modules("p");
});
