use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Resource {path} already present in the pool")]
    DuplicatePath { path: String },

    #[error("Invalid resource pool after plugin {plugin}: {reason}")]
    InvalidTransform { plugin: String, reason: String },

    #[error("Resource {path} not added in expected order (expected {})", .expected.as_deref().unwrap_or("no further resources"))]
    OutOfOrder {
        path: String,
        expected: Option<String>,
    },

    #[error("Package {package} exists in multiple modules: {}", .modules.join(", "))]
    SplitPackage {
        package: String,
        modules: Vec<String>,
    },

    #[error("Perfect hash construction exhausted for {keys} keys (table size reached {table_size})")]
    HashConstructionExhausted { keys: usize, table_size: usize },

    #[error("Malformed resource path skipped: {0}")]
    MalformedPath(String),

    #[error("I/O error: {source} ({} suppressed)", .suppressed.len())]
    Io {
        source: std::io::Error,
        suppressed: Vec<std::io::Error>,
    },

    #[error("Resource pool is read-only")]
    ReadOnlyPool,

    #[error("Invalid resource path: {0}")]
    InvalidPath(String),

    #[error("Invalid module name: {0}")]
    InvalidModuleName(String),

    #[error("Invalid magic number in image header")]
    InvalidMagic,

    #[error("Unsupported image version: {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("Image data truncated: {0}")]
    Truncated(&'static str),

    #[error("Codec {name} failed: {reason}")]
    Codec { name: String, reason: String },

    #[error("Unknown decompressor: {0}")]
    UnknownCodec(String),

    #[error("Plugin {plugin} failed: {reason}")]
    Plugin { plugin: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ImageError {
    /// Attach secondary I/O failures to this error.
    ///
    /// `Io` errors carry them structurally. Any other error keeps its own
    /// identity, so the secondary failures are logged instead.
    pub fn with_suppressed(self, mut secondary: Vec<std::io::Error>) -> Self {
        if secondary.is_empty() {
            return self;
        }
        match self {
            ImageError::Io {
                source,
                mut suppressed,
            } => {
                suppressed.append(&mut secondary);
                ImageError::Io { source, suppressed }
            }
            other => {
                for err in &secondary {
                    tracing::warn!("suppressed I/O failure after {}: {}", other, err);
                }
                other
            }
        }
    }

    /// Fold a list of I/O failures into one error, or `None` when empty.
    pub fn from_io_failures(mut failures: Vec<std::io::Error>) -> Option<Self> {
        if failures.is_empty() {
            return None;
        }
        let source = failures.remove(0);
        Some(ImageError::Io {
            source,
            suppressed: failures,
        })
    }
}

impl From<std::io::Error> for ImageError {
    fn from(source: std::io::Error) -> Self {
        ImageError::Io {
            source,
            suppressed: Vec::new(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ImageError>;
