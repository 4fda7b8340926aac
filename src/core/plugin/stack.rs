use super::{Category, Plugin};
use crate::error::{ImageError, Result};
use crate::pool::{ResourcePool, ResourcePoolBuilder};
use crate::strings::{PrevisitStrings, StringTable};
use std::sync::Arc;
use tracing::{debug, info};

/// Ordered plugins with an optional last sorter
///
/// Running the stack:
/// 1. every plugin previsits the original pool; strings used more than once
///    are interned into the build's string table
/// 2. each plugin transforms the previous output into a fresh pool
/// 3. the output of the last sorter freezes the resource order; later stages
///    get pools that reject any `add` out of that order, and no sorter may run
///    after it
#[derive(Debug, Default)]
pub struct PluginStack {
    plugins: Vec<Box<dyn Plugin>>,
    last_sorter: Option<String>,
}

impl PluginStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plugin(mut self, plugin: Box<dyn Plugin>) -> Self {
        self.push(plugin);
        self
    }

    /// Add a plugin after the others of its category
    pub fn push(&mut self, plugin: Box<dyn Plugin>) {
        let position = self
            .plugins
            .iter()
            .position(|p| p.category() > plugin.category())
            .unwrap_or(self.plugins.len());
        self.plugins.insert(position, plugin);
    }

    /// Name the plugin whose output freezes the resource order
    pub fn set_last_sorter(&mut self, name: impl Into<String>) {
        self.last_sorter = Some(name.into());
    }

    pub fn last_sorter(&self) -> Option<&str> {
        self.last_sorter.as_deref()
    }

    /// Plugin names in execution order
    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run every stage over `pool`, interning shared strings into `strings`
    pub fn visit_resources(&self, pool: ResourcePool, strings: &mut StringTable) -> Result<ResourcePool> {
        if let Some(name) = &self.last_sorter {
            if !self.plugins.iter().any(|p| p.name() == name) {
                return Err(ImageError::Config(format!(
                    "last sorter {} is not a configured plugin",
                    name
                )));
            }
        }

        if pool.is_empty() {
            return Ok(pool.into_read_only());
        }

        let mut previsit = PrevisitStrings::new();
        for plugin in &self.plugins {
            plugin
                .previsit(&pool, &mut previsit)
                .map_err(|e| attribute_failure(plugin.as_ref(), e))?;
        }
        let shared = previsit.shared_strings();
        for text in &shared {
            strings.add(text);
        }
        debug!("previsit interned {} shared strings", shared.len());

        let mut current = pool.into_read_only();
        let mut frozen: Option<(Arc<[String]>, String)> = None;

        for plugin in &self.plugins {
            let byte_order = current.byte_order();
            let fresh = match &frozen {
                Some((order, frozen_by)) => {
                    if plugin.category() == Category::Sorter {
                        return Err(ImageError::Config(format!(
                            "sorter {} runs after {} froze the resource order",
                            plugin.name(),
                            frozen_by
                        )));
                    }
                    ResourcePool::ordered(byte_order, Arc::clone(order))
                }
                None => ResourcePool::new(byte_order),
            };

            debug!(
                "plugin {} ({}) on {} resources",
                plugin.name(),
                plugin.category(),
                current.len()
            );
            let mut builder = ResourcePoolBuilder::new(fresh, strings);
            plugin
                .transform(&current, &mut builder)
                .map_err(|e| attribute_failure(plugin.as_ref(), e))?;
            let output = builder.finish();

            if output.is_empty() && !current.is_empty() {
                return Err(ImageError::InvalidTransform {
                    plugin: plugin.name().to_string(),
                    reason: format!("emitted no resources from {}", current.len()),
                });
            }

            if self.last_sorter.as_deref() == Some(plugin.name()) {
                if let Some((_, frozen_by)) = &frozen {
                    return Err(ImageError::Config(format!(
                        "last sorter {} runs after {} already froze the resource order",
                        plugin.name(),
                        frozen_by
                    )));
                }
                let order: Arc<[String]> = output.paths().map(str::to_string).collect();
                debug!("resource order frozen by {} ({} paths)", plugin.name(), order.len());
                frozen = Some((order, plugin.name().to_string()));
            }

            current = output;
        }

        info!(
            "plugin stack done: {} plugins, {} resources",
            self.plugins.len(),
            current.len()
        );
        Ok(current)
    }
}

/// Name the plugin in failures that do not already identify what went wrong.
///
/// Pool contract violations keep their own variant so callers can match on
/// the offending path.
fn attribute_failure(plugin: &dyn Plugin, error: ImageError) -> ImageError {
    match error {
        ImageError::Codec { .. }
        | ImageError::UnknownCodec(_)
        | ImageError::Io { .. }
        | ImageError::Internal(_) => ImageError::Plugin {
            plugin: plugin.name().to_string(),
            reason: error.to_string(),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_order::ImageByteOrder;
    use crate::pool::{ResourceEntry, ResourceKind};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Re-adds entries in a fixed order, recording when it ran
    struct Reorder {
        name: &'static str,
        category: Category,
        order: Vec<&'static str>,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Plugin for Reorder {
        fn name(&self) -> &str {
            self.name
        }

        fn category(&self) -> Category {
            self.category
        }

        fn previsit(&self, _pool: &ResourcePool, strings: &mut PrevisitStrings) -> Result<()> {
            strings.add("shared-by-all");
            strings.add(self.name);
            Ok(())
        }

        fn transform(&self, input: &ResourcePool, output: &mut ResourcePoolBuilder<'_>) -> Result<()> {
            self.log.borrow_mut().push(self.name);
            let paths: Vec<&str> = if self.order.is_empty() {
                input.paths().collect()
            } else {
                self.order.clone()
            };
            for path in paths {
                if let Some(entry) = input.find(path) {
                    output.add(entry.clone())?;
                }
            }
            Ok(())
        }
    }

    struct DropAll;

    impl Plugin for DropAll {
        fn name(&self) -> &str {
            "drop-all"
        }

        fn category(&self) -> Category {
            Category::Filter
        }

        fn transform(&self, _input: &ResourcePool, _output: &mut ResourcePoolBuilder<'_>) -> Result<()> {
            Ok(())
        }
    }

    /// Fails with a codec error in the chosen pass
    struct Broken {
        in_previsit: bool,
    }

    impl Plugin for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn category(&self) -> Category {
            Category::Compressor
        }

        fn previsit(&self, _pool: &ResourcePool, _strings: &mut PrevisitStrings) -> Result<()> {
            if self.in_previsit {
                return Err(ImageError::UnknownCodec("xz".to_string()));
            }
            Ok(())
        }

        fn transform(&self, _input: &ResourcePool, _output: &mut ResourcePoolBuilder<'_>) -> Result<()> {
            Err(ImageError::Codec {
                name: "lz4".to_string(),
                reason: "bad block".to_string(),
            })
        }
    }

    fn pool() -> ResourcePool {
        let mut pool = ResourcePool::new(ImageByteOrder::Big);
        for path in ["/m/a", "/m/b", "/m/c"] {
            pool.add(ResourceEntry::new("m", path, ResourceKind::ClassOrResource, vec![0; 2]))
                .unwrap();
        }
        pool
    }

    fn reorder(
        name: &'static str,
        category: Category,
        order: &[&'static str],
        log: &Rc<RefCell<Vec<&'static str>>>,
    ) -> Box<dyn Plugin> {
        Box::new(Reorder {
            name,
            category,
            order: order.to_vec(),
            log: Rc::clone(log),
        })
    }

    #[test]
    fn test_category_order_is_stable() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let stack = PluginStack::new()
            .with_plugin(reorder("compress-1", Category::Compressor, &[], &log))
            .with_plugin(reorder("filter-1", Category::Filter, &[], &log))
            .with_plugin(reorder("compress-2", Category::Compressor, &[], &log))
            .with_plugin(reorder("sort-1", Category::Sorter, &[], &log))
            .with_plugin(reorder("filter-2", Category::Filter, &[], &log));

        assert_eq!(
            stack.plugin_names(),
            ["filter-1", "filter-2", "sort-1", "compress-1", "compress-2"]
        );

        let mut strings = StringTable::new();
        stack.visit_resources(pool(), &mut strings).unwrap();
        assert_eq!(*log.borrow(), ["filter-1", "filter-2", "sort-1", "compress-1", "compress-2"]);

        // used by every previsit, so interned; plugin names were used once each
        assert!(strings.find("shared-by-all").is_some());
        assert!(strings.find("filter-1").is_none());
    }

    #[test]
    fn test_freeze_accepts_same_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut stack = PluginStack::new()
            .with_plugin(reorder("sorter", Category::Sorter, &["/m/a", "/m/b", "/m/c"], &log))
            .with_plugin(reorder("later", Category::Compressor, &["/m/a", "/m/b", "/m/c"], &log));
        stack.set_last_sorter("sorter");

        let out = stack.visit_resources(pool(), &mut StringTable::new()).unwrap();
        let paths: Vec<&str> = out.paths().collect();
        assert_eq!(paths, ["/m/a", "/m/b", "/m/c"]);
        assert!(out.is_read_only());
    }

    #[test]
    fn test_freeze_rejects_reordering() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut stack = PluginStack::new()
            .with_plugin(reorder("sorter", Category::Sorter, &["/m/a", "/m/b", "/m/c"], &log))
            .with_plugin(reorder("later", Category::Compressor, &["/m/a", "/m/c", "/m/b"], &log));
        stack.set_last_sorter("sorter");

        match stack.visit_resources(pool(), &mut StringTable::new()) {
            Err(ImageError::OutOfOrder { path, expected }) => {
                assert_eq!(path, "/m/c");
                assert_eq!(expected.as_deref(), Some("/m/b"));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_order_free_without_last_sorter() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let stack = PluginStack::new()
            .with_plugin(reorder("sorter", Category::Sorter, &["/m/a", "/m/b", "/m/c"], &log))
            .with_plugin(reorder("later", Category::Compressor, &["/m/c", "/m/b", "/m/a"], &log));
        let out = stack.visit_resources(pool(), &mut StringTable::new()).unwrap();
        let paths: Vec<&str> = out.paths().collect();
        assert_eq!(paths, ["/m/c", "/m/b", "/m/a"]);
    }

    #[test]
    fn test_sorter_after_freeze_is_config_error() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut stack = PluginStack::new()
            .with_plugin(reorder("first", Category::Sorter, &[], &log))
            .with_plugin(reorder("second", Category::Sorter, &[], &log));
        stack.set_last_sorter("first");
        assert!(matches!(
            stack.visit_resources(pool(), &mut StringTable::new()),
            Err(ImageError::Config(_))
        ));
        assert_eq!(*log.borrow(), ["first"]);
    }

    #[test]
    fn test_unknown_last_sorter() {
        let mut stack = PluginStack::new().with_plugin(Box::new(DropAll));
        stack.set_last_sorter("missing");
        assert!(matches!(
            stack.visit_resources(pool(), &mut StringTable::new()),
            Err(ImageError::Config(msg)) if msg.contains("missing")
        ));
    }

    #[test]
    fn test_empty_output_is_invalid() {
        let stack = PluginStack::new().with_plugin(Box::new(DropAll));
        assert!(matches!(
            stack.visit_resources(pool(), &mut StringTable::new()),
            Err(ImageError::InvalidTransform { plugin, .. }) if plugin == "drop-all"
        ));
    }

    #[test]
    fn test_empty_input_passes_through() {
        let stack = PluginStack::new().with_plugin(Box::new(DropAll));
        let out = stack
            .visit_resources(ResourcePool::new(ImageByteOrder::Big), &mut StringTable::new())
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_plugin_failures_name_the_plugin() {
        for in_previsit in [true, false] {
            let stack = PluginStack::new().with_plugin(Box::new(Broken { in_previsit }));
            match stack.visit_resources(pool(), &mut StringTable::new()) {
                Err(ImageError::Plugin { plugin, reason }) => {
                    assert_eq!(plugin, "broken");
                    let cause = if in_previsit { "xz" } else { "bad block" };
                    assert!(reason.contains(cause), "{reason}");
                }
                other => panic!("expected plugin failure, got {other:?}"),
            }
        }
    }
}
