//! Registry: named domain builders and the merged-table cache.

use std::sync::{Arc, OnceLock};

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use super::{catalog, DomainTable, MappingTable};
use crate::model::ImportConfiguration;
use crate::{Error, Result};

/// Produces the tables of one domain. The configuration is passed so a
/// domain can vary with the selected sub-domain (e.g. ATT&CK matrix).
pub type DomainBuilder = Arc<dyn Fn(&ImportConfiguration) -> DomainTable + Send + Sync>;

/// Holds every known domain and caches the merged table per configuration.
pub struct Registry {
    domains: RwLock<HashMap<String, DomainBuilder>>,
    cache: Mutex<TableCache>,
}

/// Merged tables plus the registration generation they were built under.
#[derive(Default)]
struct TableCache {
    generation: u64,
    tables: HashMap<ImportConfiguration, Arc<MappingTable>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            domains: RwLock::new(HashMap::new()),
            cache: Mutex::new(TableCache::default()),
        }
    }

    /// A registry pre-loaded with the builtin domains.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for (name, builder) in catalog::builtin() {
            registry.register(name, builder);
        }
        registry
    }

    /// Process-wide registry with the builtin domains.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::with_builtins)
    }

    /// Register (or replace) a domain. Cached tables are invalidated.
    pub fn register(&self, name: impl Into<String>, builder: DomainBuilder) {
        let name = name.into();
        debug!(domain = %name, "registering mapping domain");
        self.domains.write().insert(name, builder);
        let mut cache = self.cache.lock();
        cache.generation += 1;
        cache.tables.clear();
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.domains.read().contains_key(name)
    }

    /// The merged table for `config`, built on first request.
    pub fn mappings(&self, config: &ImportConfiguration) -> Result<Arc<MappingTable>> {
        let generation = {
            let cache = self.cache.lock();
            if let Some(table) = cache.tables.get(config) {
                return Ok(Arc::clone(table));
            }
            cache.generation
        };
        let table = Arc::new(self.build(config)?);
        let mut cache = self.cache.lock();
        if cache.generation != generation {
            // a domain was registered mid-build; hand the table out uncached
            return Ok(table);
        }
        let entry = cache.tables.entry(config.clone()).or_insert(table);
        Ok(Arc::clone(entry))
    }

    fn build(&self, config: &ImportConfiguration) -> Result<MappingTable> {
        let names: Vec<String> = config.domains().into_iter().map(String::from).collect();
        let builders: Vec<DomainBuilder> = {
            let domains = self.domains.read();
            names
                .iter()
                .map(|name| {
                    domains
                        .get(name)
                        .cloned()
                        .ok_or_else(|| Error::UnknownDomain(name.clone()))
                })
                .collect::<Result<_>>()?
        };

        let mut merged = DomainTable::default();
        for builder in builders {
            merged.merge(builder(config), config.merge_policy)?;
        }
        let table = MappingTable::finalize(names, merged)?;
        info!(domains = ?table.domains(), "built mapping table");
        Ok(table)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.domains.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("Registry").field("domains", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{EmbeddedSpec, ObjectCategory, RelationKind};
    use crate::model::{AttackMatrix, MergePolicy};

    fn extension_domain(field_relation: &'static str) -> DomainBuilder {
        Arc::new(move |_| {
            let mut t = DomainTable::new("acme");
            t.object("x-acme-widget", "acme-widget", ObjectCategory::Sdo)
                .text("name", "name")
                .relations(&["created_by_ref"]);
            t.relation(
                "created_by_ref",
                RelationKind::EmbeddedReference(EmbeddedSpec {
                    relation: field_relation.into(),
                    owner_role: "created".into(),
                    pointed_role: "creator".into(),
                }),
            );
            t
        })
    }

    #[test]
    fn test_cache_returns_same_table() {
        let registry = Registry::with_builtins();
        let config = ImportConfiguration::default();
        let a = registry.mappings(&config).unwrap();
        let b = registry.mappings(&config).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_unknown_domain() {
        let registry = Registry::with_builtins();
        let err = registry
            .mappings(&ImportConfiguration::default().with_extension("nope"))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownDomain(ref n) if n == "nope"));
    }

    #[test]
    fn test_register_extension_domain() {
        let registry = Registry::with_builtins();
        registry.register("acme", extension_domain("created-by"));
        let table = registry
            .mappings(&ImportConfiguration::core_only().with_extension("acme"))
            .unwrap();
        assert!(table.dispatch("x-acme-widget").is_some());
        assert_eq!(table.domains(), &["stix-core".to_string(), "acme".to_string()]);
    }

    #[test]
    fn test_conflicting_extension_domain() {
        let registry = Registry::with_builtins();
        registry.register("acme", extension_domain("made-by"));
        let config = ImportConfiguration::core_only().with_extension("acme");
        assert!(matches!(registry.mappings(&config), Err(Error::MappingConflict { .. })));

        let relaxed = config.with_merge_policy(MergePolicy::LastWriterWins);
        let table = registry.mappings(&relaxed).unwrap();
        assert_eq!(table.relation_by_type("made-by").unwrap().field, "created_by_ref");
    }

    #[test]
    fn test_register_invalidates_cache() {
        let registry = Registry::with_builtins();
        let config = ImportConfiguration::default().with_attack(AttackMatrix::Enterprise);
        let before = registry.mappings(&config).unwrap();
        registry.register("unused", extension_domain("created-by"));
        let after = registry.mappings(&config).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_register_during_build_skips_cache() {
        let registry = Arc::new(Registry::with_builtins());
        let handle = Arc::downgrade(&registry);
        registry.register(
            "acme",
            Arc::new(move |config: &ImportConfiguration| {
                if let Some(registry) = handle.upgrade() {
                    if !registry.is_registered("late") {
                        registry.register("late", extension_domain("created-by"));
                    }
                }
                extension_domain("created-by")(config)
            }),
        );
        let config = ImportConfiguration::core_only().with_extension("acme");

        let raced = registry.mappings(&config).unwrap();
        let settled = registry.mappings(&config).unwrap();
        assert!(!Arc::ptr_eq(&raced, &settled));
        assert!(Arc::ptr_eq(&settled, &registry.mappings(&config).unwrap()));
        assert!(registry.is_registered("late"));
    }
}
