//! Built-in `core` module: session state, connections, and server info.

use std::sync::Arc;

use {
    async_graphql::dynamic::{FieldFuture, FieldValue, ResolverContext},
    async_trait::async_trait,
    modgraph_schema::{SchemaSource, StaticSchemaSource},
    modgraph_service_traits::{CallContext, Check, ServiceResult, intercepted_service},
    modgraph_sessions::{ConnectionInfo, ContextResolver, Session},
    serde_json::json,
};

use crate::{
    binding::{ModuleBinding, SchemaBinding, ServiceModule},
    context::{GqlFieldContext, json_to_field_value},
    error::{context_error, field_error},
    modules::ResolverTable,
};

pub const CORE_MODULE: &str = "core";
pub const CORE_SCHEMA_LOCATOR: &str = "schema/core.graphqls";
pub const CORE_SCHEMA: &str = include_str!("../schema/core.graphqls");

/// Operations behind the `core` module's fields.
#[async_trait]
pub trait CoreService: Send + Sync {
    async fn session_state(&self, session: &Session) -> ServiceResult;

    async fn list_connections(&self, session: &Session) -> ServiceResult;

    async fn connection_info(&self, connection: &ConnectionInfo) -> ServiceResult;

    async fn server_info(&self) -> ServiceResult;
}

intercepted_service! {
    /// [`CoreService`] behind the module's interceptor.
    pub struct InterceptedCoreService for CoreService as "core" {
        async fn session_state(&self, session: &Session) -> ServiceResult;
        async fn list_connections(&self, session: &Session) -> ServiceResult;
        async fn connection_info(&self, connection: &ConnectionInfo) -> ServiceResult;
        async fn server_info(&self) -> ServiceResult;
    }
}

/// Serves core fields straight from the resolved session.
#[derive(Debug, Clone)]
pub struct DefaultCoreService {
    server_name: String,
    version: String,
}

impl DefaultCoreService {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Default for DefaultCoreService {
    fn default() -> Self {
        Self::new("modgraph")
    }
}

#[async_trait]
impl CoreService for DefaultCoreService {
    async fn session_state(&self, session: &Session) -> ServiceResult {
        let connections = session
            .connections()
            .map(|c| serde_json::to_value(c.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(json!({
            "id": session.id,
            "anonymous": session.is_anonymous(),
            "user": session.user.as_ref().map(|u| json!({
                "userId": u.user_id,
                "permissions": u.permissions,
            })),
            "createdAt": session.created_at,
            "expiresAt": session.expires_at,
            "connections": connections,
        }))
    }

    async fn list_connections(&self, session: &Session) -> ServiceResult {
        let connections = session
            .connections()
            .map(|c| serde_json::to_value(c.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(json!(connections))
    }

    async fn connection_info(&self, connection: &ConnectionInfo) -> ServiceResult {
        Ok(serde_json::to_value(connection)?)
    }

    async fn server_info(&self) -> ServiceResult {
        Ok(json!({
            "name": self.server_name,
            "version": self.version,
        }))
    }
}

/// The `core` module: [`CoreService`] bound to `schema/core.graphqls`.
pub struct CoreModule {
    binding: ModuleBinding<dyn CoreService>,
}

impl CoreModule {
    /// Module using the compiled-in schema.
    pub fn new(service: Arc<dyn CoreService>, resolver: Arc<ContextResolver>) -> Self {
        let source = StaticSchemaSource::new().with(CORE_SCHEMA_LOCATOR, CORE_SCHEMA);
        Self::with_source(service, Arc::new(source), resolver)
    }

    /// Module reading its schema from `source`.
    pub fn with_source(
        service: Arc<dyn CoreService>,
        source: Arc<dyn SchemaSource>,
        resolver: Arc<ContextResolver>,
    ) -> Self {
        Self {
            binding: ModuleBinding::new(
                CORE_MODULE,
                service,
                source,
                CORE_SCHEMA_LOCATOR,
                resolver,
            ),
        }
    }

    #[must_use]
    pub fn with_checks(mut self, checks: impl IntoIterator<Item = Arc<dyn Check>>) -> Self {
        self.binding = self.binding.with_checks(checks);
        self
    }

    #[must_use]
    pub fn binding(&self) -> &ModuleBinding<dyn CoreService> {
        &self.binding
    }
}

impl ServiceModule for CoreModule {
    fn schema_binding(&self) -> &SchemaBinding {
        self.binding.schema()
    }

    fn register_resolvers(self: Arc<Self>, table: &mut ResolverTable) -> crate::Result<()> {
        let module = Arc::clone(&self);
        table.register(CORE_MODULE, "Query", "sessionState", move |ctx| {
            FieldFuture::new(session_state(Arc::clone(&module), ctx))
        })?;

        let module = Arc::clone(&self);
        table.register(CORE_MODULE, "Query", "connections", move |ctx| {
            FieldFuture::new(connections(Arc::clone(&module), ctx))
        })?;

        let module = Arc::clone(&self);
        table.register(CORE_MODULE, "Query", "connection", move |ctx| {
            FieldFuture::new(connection(Arc::clone(&module), ctx))
        })?;

        let module = self;
        table.register(CORE_MODULE, "Query", "serverInfo", move |ctx| {
            FieldFuture::new(server_info(Arc::clone(&module), ctx))
        })
    }
}

type FieldResult<'a> = async_graphql::Result<Option<FieldValue<'a>>>;

/// Resolve the caller's session and a dispatch target bound to it.
async fn session_target(
    module: &CoreModule,
    field: &GqlFieldContext<'_>,
) -> async_graphql::Result<(Arc<Session>, Arc<dyn CoreService>)> {
    let binding = &module.binding;
    let request = binding.request(field).map_err(context_error)?;
    let session = binding
        .resolver()
        .resolve_session(request)
        .await
        .map_err(context_error)?;
    let context = CallContext::for_request(request, Some(Arc::clone(&session)));
    let target = binding.dispatch_target(context);
    Ok((session, target))
}

async fn session_state(module: Arc<CoreModule>, ctx: ResolverContext<'_>) -> FieldResult<'_> {
    let field = GqlFieldContext::new(&ctx);
    let (session, service) = session_target(&module, &field).await?;
    let state = service.session_state(&session).await.map_err(field_error)?;
    json_to_field_value(state)
}

async fn connections(module: Arc<CoreModule>, ctx: ResolverContext<'_>) -> FieldResult<'_> {
    let field = GqlFieldContext::new(&ctx);
    let (session, service) = session_target(&module, &field).await?;
    let list = service.list_connections(&session).await.map_err(field_error)?;
    json_to_field_value(list)
}

async fn connection(module: Arc<CoreModule>, ctx: ResolverContext<'_>) -> FieldResult<'_> {
    let field = GqlFieldContext::new(&ctx);
    let binding = &module.binding;
    let request = binding.request(&field).map_err(context_error)?;
    let (session, connection) = binding.connection(&field).await.map_err(context_error)?;
    let service = binding.dispatch_target(CallContext::for_request(request, Some(session)));
    let info = service.connection_info(&connection).await.map_err(field_error)?;
    json_to_field_value(info)
}

async fn server_info(module: Arc<CoreModule>, ctx: ResolverContext<'_>) -> FieldResult<'_> {
    let field = GqlFieldContext::new(&ctx);
    let binding = &module.binding;
    let request = binding.request(&field).map_err(context_error)?;
    // Answers without a session; checks still see one when it resolves.
    let session = binding.resolver().resolve_session(request).await.ok();
    let service = binding.dispatch_target(CallContext::for_request(request, session));
    let info = service.server_info().await.map_err(field_error)?;
    json_to_field_value(info)
}
