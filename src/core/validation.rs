//! Validation for module names and resource paths
//!
//! Module names are dot-separated identifiers (`java.base`, `com.example_1`).
//! Two names are reserved because they are the roots of the synthetic tree.
//! Resource paths must sit under their module: `/<module>/<rest>`.

use crate::error::{ImageError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Names that collide with the synthetic `/modules` and `/packages` roots
pub const RESERVED_MODULE_NAMES: [&str; 2] = ["modules", "packages"];

fn module_name_regex() -> Result<&'static Regex> {
    static PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(ModuleName::PATTERN))
        .as_ref()
        .map_err(|e| ImageError::Internal(format!("module name pattern: {}", e)))
}

/// A validated module name
///
/// # Rules
/// - One or more identifiers joined by single dots
/// - Identifiers start with a letter, `_` or `$`, then letters, digits, `_` or `$`
/// - Not one of [`RESERVED_MODULE_NAMES`]
///
/// # Examples
///
/// ```
/// use modimage::validation::ModuleName;
///
/// let name = ModuleName::new("java.base").unwrap();
/// assert_eq!(name.as_str(), "java.base");
///
/// assert!(ModuleName::new("java..base").is_err()); // empty identifier
/// assert!(ModuleName::new("packages").is_err()); // reserved
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleName(String);

impl ModuleName {
    const PATTERN: &'static str = r"^[A-Za-z_$][A-Za-z0-9_$]*(\.[A-Za-z_$][A-Za-z0-9_$]*)*$";

    /// Create a new validated module name
    ///
    /// # Errors
    ///
    /// Returns `InvalidModuleName` if the name doesn't meet the rules above.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::validate_name(&name)?;
        Ok(ModuleName(name))
    }

    fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(ImageError::InvalidModuleName(
                "module name cannot be empty".to_string(),
            ));
        }

        if RESERVED_MODULE_NAMES.contains(&name) {
            return Err(ImageError::InvalidModuleName(format!(
                "'{}' is reserved for the synthetic tree",
                name
            )));
        }

        if !module_name_regex()?.is_match(name) {
            return Err(ImageError::InvalidModuleName(format!(
                "'{}' must be dot-separated identifiers",
                name
            )));
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for ModuleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ModuleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Check that `path` names a resource inside `module`
///
/// # Examples
///
/// ```
/// use modimage::validation::validate_resource_path;
///
/// assert!(validate_resource_path("m1", "/m1/p/A.class").is_ok());
/// assert!(validate_resource_path("m1", "/m2/p/A.class").is_err());
/// assert!(validate_resource_path("m1", "/m1/").is_err());
/// ```
pub fn validate_resource_path(module: &str, path: &str) -> Result<()> {
    let rest = path
        .strip_prefix('/')
        .and_then(|p| p.strip_prefix(module))
        .and_then(|p| p.strip_prefix('/'))
        .ok_or_else(|| {
            ImageError::InvalidPath(format!("{} is not inside module {}", path, module))
        })?;

    if rest.is_empty() || rest.ends_with('/') {
        return Err(ImageError::InvalidPath(format!(
            "{} does not name a resource",
            path
        )));
    }

    if path.contains('\0') {
        return Err(ImageError::InvalidPath(format!(
            "{} contains a NUL character",
            path.escape_default()
        )));
    }

    Ok(())
}

/// Package of a resource path, dotted, when the path is in a named package.
///
/// `META-INF` content and resources directly under the module root belong to
/// no package.
///
/// ```
/// use modimage::validation::package_of;
///
/// assert_eq!(package_of("/m1/com/example/A.class").as_deref(), Some("com.example"));
/// assert_eq!(package_of("/m1/A.class"), None);
/// assert_eq!(package_of("/m1/META-INF/MANIFEST.MF"), None);
/// ```
pub fn package_of(path: &str) -> Option<String> {
    let rest = path.strip_prefix('/')?;
    let (_, in_module) = rest.split_once('/')?;
    let (dir, _) = in_module.rsplit_once('/')?;
    if dir.is_empty() || dir == "META-INF" || dir.starts_with("META-INF/") {
        return None;
    }
    Some(dir.replace('/', "."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_module_names() {
        assert!(ModuleName::new("java.base").is_ok());
        assert!(ModuleName::new("m1").is_ok());
        assert!(ModuleName::new("com.example_app.$impl").is_ok());
        assert!(ModuleName::new("A").is_ok());
    }

    #[test]
    fn test_invalid_module_names() {
        assert!(ModuleName::new("").is_err());
        assert!(ModuleName::new("1abc").is_err());
        assert!(ModuleName::new(".java").is_err());
        assert!(ModuleName::new("java.").is_err());
        assert!(ModuleName::new("java/base").is_err());
        assert!(ModuleName::new("my-module").is_err());
        assert!(matches!(
            ModuleName::new("modules"),
            Err(ImageError::InvalidModuleName(msg)) if msg.contains("reserved")
        ));
    }

    #[test]
    fn test_module_name_display() {
        let name = ModuleName::new("java.base").unwrap();
        assert_eq!(name.to_string(), "java.base");
        assert_eq!(name.as_ref(), "java.base");
        assert_eq!(name.into_string(), "java.base");
    }

    #[test]
    fn test_resource_paths() {
        assert!(validate_resource_path("m1", "/m1/A.class").is_ok());
        assert!(validate_resource_path("java.base", "/java.base/java/lang/Object.class").is_ok());

        assert!(validate_resource_path("m1", "m1/A.class").is_err());
        assert!(validate_resource_path("m1", "/m10/A.class").is_err());
        assert!(validate_resource_path("m1", "/m1").is_err());
        assert!(validate_resource_path("m1", "/m1/p/").is_err());
        assert!(validate_resource_path("m1", "/m1/a\0b").is_err());
    }

    #[test]
    fn test_package_of() {
        assert_eq!(package_of("/m1/p/A.class").as_deref(), Some("p"));
        assert_eq!(package_of("/java.base/java/lang/Object.class").as_deref(), Some("java.lang"));
        assert_eq!(package_of("/m1/module-info.class"), None);
        assert_eq!(package_of("/m1/META-INF/services/x.Y"), None);
        assert_eq!(package_of("/m1"), None);
    }
}
