//! Synthetic `/modules` and `/packages` trees
//!
//! `/modules/<module>/<dir>/...` mirrors every resource path. Each directory
//! becomes an image entry listing the location offsets of its children; a
//! leaf is the resource's own location (its path without `/modules`).
//!
//! `/packages/<package>` records which modules reference a package and
//! whether they hold content in it, as `(is_empty i32, module_name i32)`
//! pairs. A package may be referenced by many modules but owned by one.
//!
//! Nodes live in an arena: index 0 is the root, 1 is `modules`, 2 is
//! `packages`. Locations are added in two passes over the same post-order
//! traversal: the first reserves every location and its content range, the
//! second writes the content once all location offsets are final.
//!
//! Malformed source paths are skipped with a warning, never fatal.

use crate::byte_order::ImageByteOrder;
use crate::error::{ImageError, Result};
use crate::writer::{ImageIndex, ImageWriter};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

const ROOT: usize = 0;
const MODULES: usize = 1;
const PACKAGES: usize = 2;

/// Size of one directory listing slot
const CHILD_SLOT_SIZE: u64 = 4;

/// Size of one package reference record
const REFERENCE_SIZE: u64 = 8;

/// A module referencing a package
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PackageReference {
    pub module: String,
    /// The module has no resources directly in the package
    pub is_empty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeKind {
    Directory,
    Resource,
    Package(Vec<PackageReference>),
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<usize>,
    children: BTreeMap<String, usize>,
    kind: NodeKind,
}

#[derive(Debug, Clone)]
pub struct ResourcesTree {
    nodes: Vec<Node>,
    module_to_packages: BTreeMap<String, BTreeSet<String>>,
    package_to_modules: BTreeMap<String, BTreeSet<String>>,
    malformed: Vec<String>,
    content_start: Option<u64>,
}

impl ResourcesTree {
    /// Build both trees from resource paths (`/<module>/<rest>`).
    ///
    /// Paths are inserted in sorted order whatever order they arrive in, so
    /// when a resource and a directory share a name the resource wins.
    /// Fails only when a package holds content from more than one module.
    pub fn build<I, S>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree = ResourcesTree {
            nodes: Vec::new(),
            module_to_packages: BTreeMap::new(),
            package_to_modules: BTreeMap::new(),
            malformed: Vec::new(),
            content_start: None,
        };
        tree.push(String::new(), None, NodeKind::Directory);
        tree.push("modules".to_string(), Some(ROOT), NodeKind::Directory);

        let sorted: BTreeSet<String> = paths
            .into_iter()
            .map(|path| path.as_ref().to_string())
            .collect();
        for path in &sorted {
            match tree.check_path(path) {
                Some(segments) => {
                    let segments: Vec<String> = segments.iter().map(|s| s.to_string()).collect();
                    tree.insert(&segments);
                }
                None => {
                    warn!("{}", ImageError::MalformedPath(path.clone()));
                    tree.malformed.push(path.clone());
                }
            }
        }

        tree.push("packages".to_string(), Some(ROOT), NodeKind::Directory);
        tree.build_packages()?;

        debug!(
            "resources tree: {} nodes, {} packages, {} malformed paths",
            tree.nodes.len(),
            tree.package_to_modules.len(),
            tree.malformed.len()
        );
        Ok(tree)
    }

    fn push(&mut self, name: String, parent: Option<usize>, kind: NodeKind) -> usize {
        let index = self.nodes.len();
        if let Some(parent) = parent {
            self.nodes[parent].children.insert(name.clone(), index);
        }
        self.nodes.push(Node {
            name,
            parent,
            children: BTreeMap::new(),
            kind,
        });
        index
    }

    /// Segments of a well-formed path, checked against the tree so far
    /// without modifying it
    fn check_path<'p>(&self, path: &'p str) -> Option<Vec<&'p str>> {
        let rest = path.strip_prefix('/')?;
        let segments: Vec<&str> = rest.split('/').collect();
        if segments.len() < 2 || segments.iter().any(|s| s.is_empty()) {
            return None;
        }

        let mut current = MODULES;
        for (i, segment) in segments.iter().enumerate() {
            let last = i == segments.len() - 1;
            match self.nodes[current].children.get(*segment) {
                Some(&child) => {
                    let is_resource = self.nodes[child].kind == NodeKind::Resource;
                    // A leaf must be new; an interior segment must not be a resource.
                    if last || is_resource {
                        return None;
                    }
                    current = child;
                }
                None => return Some(segments),
            }
        }
        Some(segments)
    }

    fn insert(&mut self, segments: &[String]) {
        let module = &segments[0];
        let mut current = MODULES;
        for (i, segment) in segments.iter().enumerate() {
            if let Some(&child) = self.nodes[current].children.get(segment) {
                current = child;
                continue;
            }

            let last = i == segments.len() - 1;
            if last {
                current = self.push(segment.clone(), Some(current), NodeKind::Resource);
                // Resources directly under the module root are in no package.
                if let Some(package) = package_name(&segments[1..i]) {
                    self.module_to_packages
                        .entry(module.clone())
                        .or_default()
                        .insert(package);
                }
            } else {
                current = self.push(segment.clone(), Some(current), NodeKind::Directory);
                if let Some(package) = package_name(&segments[1..=i]) {
                    self.package_to_modules
                        .entry(package)
                        .or_default()
                        .insert(module.clone());
                }
            }
        }
    }

    fn build_packages(&mut self) -> Result<()> {
        let packages: Vec<(String, Vec<PackageReference>)> = self
            .package_to_modules
            .iter()
            .map(|(package, modules)| {
                let owns = |module: &String| {
                    self.module_to_packages
                        .get(module)
                        .is_some_and(|owned| owned.contains(package))
                };
                let mut refs: Vec<PackageReference> = modules
                    .iter()
                    .filter(|m| owns(*m))
                    .map(|m| PackageReference {
                        module: m.clone(),
                        is_empty: false,
                    })
                    .collect();
                refs.extend(modules.iter().filter(|m| !owns(*m)).map(|m| PackageReference {
                    module: m.clone(),
                    is_empty: true,
                }));
                (package.clone(), refs)
            })
            .collect();

        for (package, refs) in packages {
            let owners: Vec<String> = refs
                .iter()
                .filter(|r| !r.is_empty)
                .map(|r| r.module.clone())
                .collect();
            if owners.len() > 1 {
                return Err(ImageError::SplitPackage {
                    package,
                    modules: owners,
                });
            }
            self.push(package, Some(PACKAGES), NodeKind::Package(refs));
        }
        Ok(())
    }

    fn path_of(&self, index: usize) -> String {
        let mut names = Vec::new();
        let mut current = Some(index);
        while let Some(i) = current {
            if i == ROOT {
                break;
            }
            names.push(self.nodes[i].name.as_str());
            current = self.nodes[i].parent;
        }
        names.reverse();
        format!("/{}", names.join("/"))
    }

    /// Image entry name of a node. Resources resolve to their real path.
    fn location_name(&self, index: usize) -> String {
        let path = self.path_of(index);
        match self.nodes[index].kind {
            NodeKind::Resource => path
                .strip_prefix("/modules")
                .map(str::to_string)
                .unwrap_or(path),
            _ => path,
        }
    }

    /// Directory and package nodes in post-order, root excluded
    fn content_order(&self) -> Vec<usize> {
        let mut order = Vec::new();
        let mut stack = vec![(ROOT, false)];
        while let Some((index, expanded)) = stack.pop() {
            if self.nodes[index].kind == NodeKind::Resource {
                continue;
            }
            if expanded {
                if index != ROOT {
                    order.push(index);
                }
                continue;
            }
            stack.push((index, true));
            for &child in self.nodes[index].children.values().rev() {
                stack.push((child, false));
            }
        }
        order
    }

    /// First pass: add a location for every directory and package node.
    ///
    /// Content is laid out from `content_offset` on; returns the offset just
    /// past the tree content.
    pub fn add_locations(&mut self, writer: &mut ImageWriter, content_offset: u64) -> u64 {
        self.content_start = Some(content_offset);
        let mut offset = content_offset;

        for index in self.content_order() {
            let path = self.path_of(index);
            let size = match &self.nodes[index].kind {
                NodeKind::Package(refs) => {
                    for reference in refs {
                        writer.add_string(&reference.module);
                    }
                    refs.len() as u64 * REFERENCE_SIZE
                }
                _ => {
                    let mut resolvable = 0;
                    for &child in self.nodes[index].children.values() {
                        let name = self.location_name(child);
                        if writer.contains(&name) {
                            resolvable += 1;
                        } else {
                            warn!("{} (listed in {})", ImageError::MalformedPath(name), path);
                        }
                    }
                    resolvable * CHILD_SLOT_SIZE
                }
            };
            writer.add_location(&path, offset, 0, size);
            offset += size;
        }
        offset
    }

    /// Second pass: write the content of every node, in the same order as
    /// [`ResourcesTree::add_locations`], using final location offsets.
    pub fn write_content(
        &self,
        index: &ImageIndex,
        order: ImageByteOrder,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let start = self.content_start.ok_or_else(|| {
            ImageError::Internal("tree content written before its locations".to_string())
        })?;
        let base = out.len() as u64;

        for node in self.content_order() {
            let path = self.path_of(node);
            let expected = index.content_offset(&path).ok_or_else(|| {
                ImageError::Internal(format!("no location reserved for {}", path))
            })?;
            let actual = start + (out.len() as u64 - base);
            if expected != actual {
                return Err(ImageError::Internal(format!(
                    "content of {} at {} but reserved at {}",
                    path, actual, expected
                )));
            }

            match &self.nodes[node].kind {
                NodeKind::Package(refs) => {
                    for reference in refs {
                        let module = index.strings().find(&reference.module).ok_or_else(|| {
                            ImageError::Internal(format!("module name {} not interned", reference.module))
                        })?;
                        order.put_i32(out, reference.is_empty as i32);
                        order.put_i32(out, module as i32);
                    }
                }
                _ => {
                    for &child in self.nodes[node].children.values() {
                        let name = self.location_name(child);
                        match index.location_offset(&name) {
                            Some(offset) => order.put_i32(out, offset as i32),
                            None => warn!("{} (listed in {})", ImageError::MalformedPath(name), path),
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Paths skipped while building
    pub fn malformed_paths(&self) -> &[String] {
        &self.malformed
    }

    /// References recorded for `package` (dotted name)
    pub fn package_refs(&self, package: &str) -> Option<&[PackageReference]> {
        let &index = self.nodes[PACKAGES].children.get(package)?;
        match &self.nodes[index].kind {
            NodeKind::Package(refs) => Some(refs),
            _ => None,
        }
    }

    /// Packages holding resources of each module
    pub fn module_to_packages(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.module_to_packages
    }

    /// Modules with a directory for each package
    pub fn package_to_modules(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.package_to_modules
    }

    /// Names of every directory and package entry the tree adds
    pub fn entry_names(&self) -> Vec<String> {
        self.content_order()
            .into_iter()
            .map(|index| self.path_of(index))
            .collect()
    }
}

/// Dotted package for directory segments below a module root
fn package_name(dirs: &[String]) -> Option<String> {
    if dirs.is_empty() || dirs[0] == "META-INF" {
        return None;
    }
    Some(dirs.join("."))
}
