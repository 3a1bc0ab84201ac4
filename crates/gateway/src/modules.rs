//! Turning configuration into sessions, schema sources, and module checks.

use std::{sync::Arc, time::Duration};

use {
    modgraph_config::{GraphqlConfig, ModgraphConfig, SessionsConfig},
    modgraph_graphql::{
        CoreModule, CoreService, DefaultCoreService, ModuleSet,
        builtin::{CORE_MODULE, CORE_SCHEMA, CORE_SCHEMA_LOCATOR},
    },
    modgraph_schema::{DirSchemaSource, LayeredSchemaSource, SchemaSource, StaticSchemaSource},
    modgraph_service_traits::{
        AuditCheck, AuditSink, Capability, Check, PermissionCheck, PermissionPolicy, RateLimit,
        RateLimitCheck, RequireAuthenticated,
    },
    modgraph_sessions::{ContextResolver, MemorySessionStore, ResolverConfig, SessionStore},
    tracing::{debug, info, warn},
};

fn resolver_config(sessions: &SessionsConfig) -> ResolverConfig {
    ResolverConfig {
        cookie_name: sessions.cookie_name.clone(),
        header_name: sessions.header_name.clone(),
        lookup_timeout: sessions.lookup_timeout(),
    }
}

/// The in-memory session store and the resolver every module shares.
pub fn session_runtime(
    config: &ModgraphConfig,
) -> (Arc<MemorySessionStore>, Arc<ContextResolver>) {
    let store = Arc::new(MemorySessionStore::new(config.sessions.ttl()));
    let lookup: Arc<dyn SessionStore> = store.clone();
    let resolver = Arc::new(ContextResolver::new(
        lookup,
        resolver_config(&config.sessions),
    ));
    (store, resolver)
}

/// `builtin`, overridden file by file from `graphql.schema_dir` when set.
pub fn schema_source(
    graphql: &GraphqlConfig,
    builtin: Arc<dyn SchemaSource>,
) -> Arc<dyn SchemaSource> {
    match &graphql.schema_dir {
        Some(dir) => {
            debug!(dir = %dir.display(), "schema directory overrides built-in schemas");
            Arc::new(
                LayeredSchemaSource::new()
                    .layer(Arc::new(DirSchemaSource::new(dir)))
                    .layer(builtin),
            )
        },
        None => builtin,
    }
}

/// Checks for `module`, in evaluation order: session, permissions, rate
/// limit, audit.
///
/// Fails when `operation_permissions` names an operation not in `operations`.
pub fn module_checks(
    config: &ModgraphConfig,
    module: &str,
    operations: &[&str],
    audit: &Arc<dyn AuditSink>,
) -> anyhow::Result<Vec<Arc<dyn Check>>> {
    let module_config = config.module(module);
    for operation in module_config.operation_permissions.keys() {
        if !operations.contains(&operation.as_str()) {
            anyhow::bail!(
                "modules.{module}.operation_permissions names unknown operation '{operation}' \
                 (known: {})",
                operations.join(", ")
            );
        }
    }
    let mut checks: Vec<Arc<dyn Check>> = Vec::new();

    if module_config.require_session {
        checks.push(Arc::new(RequireAuthenticated));
    }

    let mut policy = PermissionPolicy::new().require_by_default(module_config.permissions.clone());
    for (operation, permissions) in &module_config.operation_permissions {
        policy = policy.require(operation.clone(), permissions.clone());
    }
    if !policy.is_empty() {
        checks.push(Arc::new(PermissionCheck::new(policy)));
    }

    if let Some(limit) = module_config.effective_rate_limit(&config.throttle) {
        checks.push(Arc::new(RateLimitCheck::new(RateLimit {
            max_calls: limit.max_calls,
            window: Duration::from_secs(limit.window_secs),
        })));
    }

    if module_config.audit {
        checks.push(Arc::new(AuditCheck::new(Arc::clone(audit))));
    }

    debug!(
        module,
        checks = ?checks.iter().map(|c| c.name().to_string()).collect::<Vec<_>>(),
        "module checks configured"
    );
    Ok(checks)
}

/// The built-in `core` module, configured from `config`.
pub fn core_module(
    config: &ModgraphConfig,
    resolver: Arc<ContextResolver>,
    audit: &Arc<dyn AuditSink>,
) -> anyhow::Result<CoreModule> {
    let builtin: Arc<dyn SchemaSource> =
        Arc::new(StaticSchemaSource::new().with(CORE_SCHEMA_LOCATOR, CORE_SCHEMA));
    let operations = <dyn CoreService as Capability>::OPERATIONS;
    let checks = module_checks(config, CORE_MODULE, operations, audit)?;
    Ok(CoreModule::with_source(
        Arc::new(DefaultCoreService::default()),
        schema_source(&config.graphql, builtin),
        resolver,
    )
    .with_checks(checks))
}

/// Drop modules whose config section sets `enabled = false`.
pub fn enabled_modules(config: &ModgraphConfig, modules: ModuleSet) -> ModuleSet {
    for name in config.modules.keys() {
        if !modules.names().contains(&name.as_str()) {
            warn!(module = %name, "config section names an unknown module");
        }
    }

    let mut enabled = ModuleSet::new();
    for module in modules.iter() {
        if config.module(module.name()).enabled {
            enabled.push(Arc::clone(module));
        } else {
            info!(module = module.name(), "module disabled by config");
        }
    }
    enabled
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use {
        super::*,
        modgraph_config::{ModuleConfig, RateLimitConfig},
        modgraph_service_traits::TracingAuditSink,
    };

    fn audit() -> Arc<dyn AuditSink> {
        Arc::new(TracingAuditSink)
    }

    const OPERATIONS: &[&str] = &["server_info", "list_connections"];

    fn names(checks: &[Arc<dyn Check>]) -> Vec<String> {
        checks.iter().map(|c| c.name().to_string()).collect()
    }

    #[test]
    fn default_module_has_no_checks() {
        let config = ModgraphConfig::default();
        assert!(module_checks(&config, "core", OPERATIONS, &audit()).unwrap().is_empty());
    }

    #[test]
    fn checks_follow_config_in_order() {
        let mut config = ModgraphConfig::default();
        config.modules.insert("core".into(), ModuleConfig {
            require_session: true,
            permissions: vec!["core:read".into()],
            audit: true,
            rate_limit: Some(RateLimitConfig {
                max_calls: 5,
                window_secs: 1,
            }),
            ..ModuleConfig::default()
        });

        let checks = module_checks(&config, "core", OPERATIONS, &audit()).unwrap();
        assert_eq!(names(&checks), vec![
            RequireAuthenticated.name().to_string(),
            "permissions".to_string(),
            "rate-limit".to_string(),
            "audit".to_string(),
        ]);
    }

    #[test]
    fn operation_permissions_must_name_known_operations() {
        let mut config = ModgraphConfig::default();
        let mut module = ModuleConfig::default();
        module
            .operation_permissions
            .insert("list_conections".into(), vec!["core:read".into()]);
        config.modules.insert("core".into(), module);

        let err = module_checks(&config, "core", OPERATIONS, &audit())
            .err()
            .expect("unknown operation");
        assert!(err.to_string().contains("list_conections"), "{err}");

        let (_, resolver) = session_runtime(&config);
        assert!(core_module(&config, resolver, &audit()).is_err());
    }

    #[test]
    fn core_operations_are_accepted() {
        let mut config = ModgraphConfig::default();
        let mut module = ModuleConfig::default();
        module
            .operation_permissions
            .insert("list_connections".into(), vec!["core:read".into()]);
        config.modules.insert("core".into(), module);

        let (_, resolver) = session_runtime(&config);
        assert!(core_module(&config, resolver, &audit()).is_ok());
    }

    #[test]
    fn global_throttle_applies_without_module_section() {
        let mut config = ModgraphConfig::default();
        config.throttle.enabled = true;
        let checks = module_checks(&config, "users", &[], &audit()).unwrap();
        assert_eq!(checks.len(), 1);
    }

    #[test]
    fn disabled_modules_are_dropped() {
        let mut config = ModgraphConfig::default();
        let (_, resolver) = session_runtime(&config);
        let core = Arc::new(core_module(&config, resolver, &audit()).unwrap());
        config.modules.insert("core".into(), ModuleConfig {
            enabled: false,
            ..ModuleConfig::default()
        });

        let modules = enabled_modules(&config, ModuleSet::new().with(core));
        assert!(modules.is_empty());
    }

    #[test]
    fn schema_dir_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("schema")).unwrap();
        std::fs::write(dir.path().join("schema/core.graphqls"), "type Query { x: Int }").unwrap();

        let graphql = GraphqlConfig {
            schema_dir: Some(dir.path().to_path_buf()),
            ..GraphqlConfig::default()
        };
        let builtin: Arc<dyn SchemaSource> = Arc::new(
            StaticSchemaSource::new()
                .with(CORE_SCHEMA_LOCATOR, CORE_SCHEMA)
                .with("schema/other.graphqls", "type Query { y: Int }"),
        );
        let source = schema_source(&graphql, builtin);

        assert_eq!(
            source.read(CORE_SCHEMA_LOCATOR).unwrap().as_deref(),
            Some("type Query { x: Int }")
        );
        assert!(source.read("schema/other.graphqls").unwrap().is_some());
    }
}
