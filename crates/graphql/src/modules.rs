//! Ordered module sets, startup composition, and the resolver table.

use std::{
    collections::{BTreeMap, HashSet, btree_map::Entry},
    sync::Arc,
};

use {
    async_graphql::dynamic::{FieldFuture, ResolverContext},
    modgraph_schema::TypeRegistry,
    tracing::info,
};

use crate::{Error, Result, binding::ServiceModule};

/// A field resolver as the dynamic schema expects it.
pub type ResolverFn = Arc<dyn for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync>;

pub(crate) fn resolver_fn<F>(f: F) -> ResolverFn
where
    F: for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone)]
pub(crate) struct ResolverEntry {
    pub(crate) module: String,
    pub(crate) resolver: ResolverFn,
}

/// `(type, field)` → resolver, filled by every module at startup.
#[derive(Default)]
pub struct ResolverTable {
    entries: BTreeMap<(String, String), ResolverEntry>,
}

impl ResolverTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `resolver` for `type_name.field` on behalf of `module`.
    ///
    /// A field resolves through exactly one module; a second registration
    /// fails with [`Error::ResolverConflict`].
    pub fn register<F>(
        &mut self,
        module: &str,
        type_name: &str,
        field: &str,
        resolver: F,
    ) -> Result<()>
    where
        F: for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static,
    {
        match self.entries.entry((type_name.to_string(), field.to_string())) {
            Entry::Occupied(existing) => Err(Error::ResolverConflict {
                type_name: type_name.to_string(),
                field: field.to_string(),
                first: existing.get().module.clone(),
                second: module.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(ResolverEntry {
                    module: module.to_string(),
                    resolver: resolver_fn(resolver),
                });
                Ok(())
            },
        }
    }

    #[must_use]
    pub fn contains(&self, type_name: &str, field: &str) -> bool {
        self.entries
            .contains_key(&(type_name.to_string(), field.to_string()))
    }

    /// Module that owns `type_name.field`, if any.
    #[must_use]
    pub fn owner(&self, type_name: &str, field: &str) -> Option<&str> {
        self.entries
            .get(&(type_name.to_string(), field.to_string()))
            .map(|e| e.module.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get(&self, type_name: &str, field: &str) -> Option<&ResolverEntry> {
        self.entries
            .get(&(type_name.to_string(), field.to_string()))
    }

    /// Every registered field must exist in `registry`.
    pub fn validate(&self, registry: &TypeRegistry) -> Result<()> {
        for ((type_name, field), entry) in &self.entries {
            if registry.field(type_name, field).is_none() {
                return Err(Error::UnknownField {
                    module: entry.module.clone(),
                    type_name: type_name.clone(),
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }
}

/// The modules served by one schema, in composition order.
#[derive(Default, Clone)]
pub struct ModuleSet {
    modules: Vec<Arc<dyn ServiceModule>>,
}

impl ModuleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, module: Arc<dyn ServiceModule>) -> Self {
        self.push(module);
        self
    }

    pub fn push(&mut self, module: Arc<dyn ServiceModule>) {
        self.modules.push(module);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ServiceModule>> {
        self.modules.iter()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Load every fragment, merge them in module order, and mark every module
    /// registered.
    ///
    /// Nothing is marked registered unless the whole composition succeeds.
    pub fn compose(&self) -> Result<Arc<TypeRegistry>> {
        let mut seen = HashSet::new();
        for module in &self.modules {
            if !seen.insert(module.name()) {
                return Err(Error::DuplicateModule {
                    name: module.name().to_string(),
                });
            }
        }

        let fragments = self
            .modules
            .iter()
            .map(|module| module.schema_fragment())
            .collect::<modgraph_schema::Result<Vec<_>>>()?;
        let registry = modgraph_schema::compose(fragments.iter().map(Arc::as_ref))?;

        for (module, fragment) in self.modules.iter().zip(&fragments) {
            module.mark_registered();
            info!(
                module = module.name(),
                locator = %fragment.locator,
                types = fragment.types.len(),
                extensions = fragment.extensions.len(),
                "module schema composed"
            );
        }
        info!(
            modules = self.modules.len(),
            types = registry.len(),
            "type registry ready"
        );
        Ok(Arc::new(registry))
    }

    /// Collect every module's resolvers.
    pub fn resolvers(&self) -> Result<ResolverTable> {
        let mut table = ResolverTable::new();
        for module in &self.modules {
            Arc::clone(module).register_resolvers(&mut table)?;
        }
        Ok(table)
    }
}
