//! Module bindings: one module's implementation, schema fragment, and
//! interception policy.

use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicBool, Ordering},
};

use {
    modgraph_schema::{SchemaSource, TypeFragment},
    modgraph_service_traits::{CallContext, Capability, Check, Interceptor},
    modgraph_sessions::{
        ConnectionInfo, ContextResolver, Error as ContextError, FieldContext, RequestInfo, Session,
    },
    tracing::{debug, info},
};

use crate::modules::ResolverTable;

/// Registration state of a module's schema fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// Constructed; fragment not yet contributed to a registry.
    Unregistered,
    /// Fragment merged into the type registry.
    Registered,
}

/// The capability-independent half of a binding: schema fragment and
/// registration state.
pub struct SchemaBinding {
    name: String,
    locator: String,
    source: Arc<dyn SchemaSource>,
    fragment: OnceLock<Arc<TypeFragment>>,
    registered: AtomicBool,
}

impl SchemaBinding {
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn SchemaSource>,
        locator: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
            source,
            fragment: OnceLock::new(),
            registered: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Load and parse this module's fragment.
    ///
    /// The first successful load is kept; a failure is returned as-is and
    /// the next call reads the source again.
    pub fn schema_fragment(&self) -> modgraph_schema::Result<Arc<TypeFragment>> {
        if let Some(fragment) = self.fragment.get() {
            return Ok(Arc::clone(fragment));
        }
        let loaded = Arc::new(modgraph_schema::load(self.source.as_ref(), &self.locator)?);
        debug!(
            module = %self.name,
            locator = %self.locator,
            types = loaded.types.len(),
            "schema fragment loaded"
        );
        // A concurrent loader may have won; keep whichever landed first.
        Ok(Arc::clone(self.fragment.get_or_init(|| loaded)))
    }

    #[must_use]
    pub fn state(&self) -> BindingState {
        if self.registered.load(Ordering::Acquire) {
            BindingState::Registered
        } else {
            BindingState::Unregistered
        }
    }

    /// Move to [`BindingState::Registered`]. Returns `false` if the binding
    /// was already registered.
    pub fn mark_registered(&self) -> bool {
        let first = self
            .registered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            info!(module = %self.name, locator = %self.locator, "module registered");
        }
        first
    }
}

/// Ties a capability implementation to its schema fragment and checks.
///
/// Resolver code never touches the implementation directly; it asks for a
/// dispatch target, which runs the module's checks before every call.
pub struct ModuleBinding<C: ?Sized + Capability> {
    schema: SchemaBinding,
    implementation: Arc<C>,
    checks: Vec<Arc<dyn Check>>,
    interceptor: OnceLock<Interceptor>,
    resolver: Arc<ContextResolver>,
}

impl<C: ?Sized + Capability> ModuleBinding<C> {
    pub fn new(
        name: impl Into<String>,
        implementation: Arc<C>,
        source: Arc<dyn SchemaSource>,
        locator: impl Into<String>,
        resolver: Arc<ContextResolver>,
    ) -> Self {
        Self {
            schema: SchemaBinding::new(name, source, locator),
            implementation,
            checks: Vec::new(),
            interceptor: OnceLock::new(),
            resolver,
        }
    }

    /// Append a check to the module's default chain.
    #[must_use]
    pub fn with_check(mut self, check: Arc<dyn Check>) -> Self {
        self.checks.push(check);
        self
    }

    #[must_use]
    pub fn with_checks(mut self, checks: impl IntoIterator<Item = Arc<dyn Check>>) -> Self {
        self.checks.extend(checks);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    #[must_use]
    pub fn schema(&self) -> &SchemaBinding {
        &self.schema
    }

    pub fn schema_fragment(&self) -> modgraph_schema::Result<Arc<TypeFragment>> {
        self.schema.schema_fragment()
    }

    #[must_use]
    pub fn state(&self) -> BindingState {
        self.schema.state()
    }

    pub fn mark_registered(&self) -> bool {
        self.schema.mark_registered()
    }

    #[must_use]
    pub fn resolver(&self) -> &Arc<ContextResolver> {
        &self.resolver
    }

    /// Interceptor running the module's default checks, built once.
    pub fn interceptor(&self) -> &Interceptor {
        self.interceptor
            .get_or_init(|| Interceptor::new(C::NAME, self.checks.iter().cloned()))
    }

    /// The implementation wrapped by the default checks, bound to `context`.
    pub fn dispatch_target(&self, context: CallContext) -> Arc<C> {
        C::intercept(
            Arc::clone(&self.implementation),
            self.interceptor().clone(),
            context,
        )
    }

    /// The implementation wrapped by an explicit check chain.
    pub fn dispatch_target_with(
        &self,
        checks: impl IntoIterator<Item = Arc<dyn Check>>,
        context: CallContext,
    ) -> Arc<C> {
        C::intercept(
            Arc::clone(&self.implementation),
            Interceptor::new(C::NAME, checks),
            context,
        )
    }

    // ── Resolver helpers ────────────────────────────────────────────────────

    pub fn request<'f, F>(&self, field: &'f F) -> Result<&'f RequestInfo, ContextError>
    where
        F: FieldContext + ?Sized,
    {
        self.resolver.resolve_request(field)
    }

    pub async fn session<F>(&self, field: &F) -> Result<Arc<Session>, ContextError>
    where
        F: FieldContext + Sync + ?Sized,
    {
        self.resolver.resolve_field_session(field).await
    }

    pub async fn connection<F>(
        &self,
        field: &F,
    ) -> Result<(Arc<Session>, Arc<ConnectionInfo>), ContextError>
    where
        F: FieldContext + Sync + ?Sized,
    {
        self.resolver.resolve_field_connection(field).await
    }

    /// Call context for `field`.
    ///
    /// A request without a session credential, or with an unknown one,
    /// yields a context without a session; checks decide whether that is
    /// acceptable. Every other resolution failure is returned.
    pub async fn call_context<F>(&self, field: &F) -> Result<CallContext, ContextError>
    where
        F: FieldContext + Sync + ?Sized,
    {
        let request = self.resolver.resolve_request(field)?;
        let session = match self.resolver.resolve_session(request).await {
            Ok(session) => Some(session),
            Err(ContextError::SessionNotFound) => None,
            Err(e) => return Err(e),
        };
        Ok(CallContext::for_request(request, session))
    }

    /// Dispatch target bound to the caller of `field`.
    pub async fn service<F>(&self, field: &F) -> Result<Arc<C>, ContextError>
    where
        F: FieldContext + Sync + ?Sized,
    {
        Ok(self.dispatch_target(self.call_context(field).await?))
    }
}

/// A module contributing a schema fragment and field resolvers.
pub trait ServiceModule: Send + Sync {
    fn schema_binding(&self) -> &SchemaBinding;

    /// Register this module's field resolvers.
    fn register_resolvers(self: Arc<Self>, table: &mut ResolverTable) -> crate::Result<()>;

    fn name(&self) -> &str {
        self.schema_binding().name()
    }

    fn schema_fragment(&self) -> modgraph_schema::Result<Arc<TypeFragment>> {
        self.schema_binding().schema_fragment()
    }

    fn state(&self) -> BindingState {
        self.schema_binding().state()
    }

    fn mark_registered(&self) -> bool {
        self.schema_binding().mark_registered()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::sync::{Mutex, atomic::AtomicUsize};

    use {
        super::*,
        async_trait::async_trait,
        modgraph_schema::StaticSchemaSource,
        modgraph_service_traits::{RequireAuthenticated, ServiceResult, intercepted_service},
        modgraph_sessions::{MemorySessionStore, ResolverConfig},
    };

    #[async_trait]
    trait Echo: Send + Sync {
        async fn echo(&self, text: String) -> ServiceResult<String>;
    }

    intercepted_service! {
        struct InterceptedEcho for Echo as "echo" {
            async fn echo(&self, text: String) -> ServiceResult<String>;
        }
    }

    struct EchoImpl;

    #[async_trait]
    impl Echo for EchoImpl {
        async fn echo(&self, text: String) -> ServiceResult<String> {
            Ok(text)
        }
    }

    /// Fails until `fixed` is set, counting reads.
    #[derive(Default)]
    struct FlakySource {
        fixed: Mutex<bool>,
        reads: AtomicUsize,
    }

    impl SchemaSource for FlakySource {
        fn read(&self, _locator: &str) -> modgraph_schema::Result<Option<String>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if *self.fixed.lock().unwrap() {
                Ok(Some("type Query { echo(text: String!): String }".into()))
            } else {
                Ok(None)
            }
        }
    }

    fn resolver() -> Arc<ContextResolver> {
        Arc::new(ContextResolver::new(
            Arc::new(MemorySessionStore::default()),
            ResolverConfig::default(),
        ))
    }

    fn binding(source: Arc<dyn SchemaSource>) -> ModuleBinding<dyn Echo> {
        let implementation: Arc<dyn Echo> = Arc::new(EchoImpl);
        ModuleBinding::new("echo", implementation, source, "schema/echo.graphqls", resolver())
    }

    #[test]
    fn fragment_failures_are_not_cached() {
        let source = Arc::new(FlakySource::default());
        let binding = binding(source.clone());

        let err = binding.schema_fragment().unwrap_err();
        assert!(matches!(err, modgraph_schema::Error::SchemaNotFound { .. }));

        *source.fixed.lock().unwrap() = true;
        let first = binding.schema_fragment().unwrap();
        let second = binding.schema_fragment().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn registration_happens_once() {
        let source =
            StaticSchemaSource::new().with("schema/echo.graphqls", "type Query { x: Int }");
        let binding = binding(Arc::new(source));

        assert_eq!(binding.state(), BindingState::Unregistered);
        assert!(binding.mark_registered());
        assert!(!binding.mark_registered());
        assert_eq!(binding.state(), BindingState::Registered);
    }

    #[tokio::test]
    async fn dispatch_is_valid_in_either_state() {
        let source = StaticSchemaSource::new();
        let binding = binding(Arc::new(source)).with_check(Arc::new(RequireAuthenticated));

        let target = binding.dispatch_target(CallContext::anonymous());
        assert!(target.echo("hi".into()).await.unwrap_err().is_permission_denied());

        let open = binding.dispatch_target_with([], CallContext::anonymous());
        assert_eq!(open.echo("hi".into()).await.unwrap(), "hi");

        binding.mark_registered();
        let open = binding.dispatch_target_with([], CallContext::anonymous());
        assert_eq!(open.echo("again".into()).await.unwrap(), "again");
    }

    #[test]
    fn interceptor_is_memoized() {
        let binding = binding(Arc::new(StaticSchemaSource::new()))
            .with_check(Arc::new(RequireAuthenticated));
        let a = binding.interceptor() as *const Interceptor;
        let b = binding.interceptor() as *const Interceptor;
        assert_eq!(a, b);
        assert_eq!(binding.interceptor().capability(), "echo");
        assert_eq!(binding.interceptor().checks().len(), 1);
    }

    struct Field(Option<RequestInfo>);

    impl FieldContext for Field {
        fn request(&self) -> Option<&RequestInfo> {
            self.0.as_ref()
        }

        fn argument(&self, _name: &str) -> Option<String> {
            None
        }
    }

    fn field_with_session(id: &str) -> Field {
        let mut headers = http::HeaderMap::new();
        headers.insert("x-session-id", id.parse().unwrap());
        Field(Some(RequestInfo::new(headers)))
    }

    fn binding_over(store: Arc<MemorySessionStore>) -> ModuleBinding<dyn Echo> {
        let implementation: Arc<dyn Echo> = Arc::new(EchoImpl);
        let resolver = Arc::new(ContextResolver::new(store, ResolverConfig::default()));
        ModuleBinding::new(
            "echo",
            implementation,
            Arc::new(StaticSchemaSource::new()),
            "schema/echo.graphqls",
            resolver,
        )
        .with_check(Arc::new(RequireAuthenticated))
    }

    #[tokio::test]
    async fn missing_credential_gives_anonymous_context() {
        let binding = binding_over(Arc::new(MemorySessionStore::default()));
        let field = Field(Some(RequestInfo::new(http::HeaderMap::new())));

        let context = binding.call_context(&field).await.unwrap();
        assert!(context.session.is_none());
        let service = binding.service(&field).await.unwrap();
        assert!(service.echo("hi".into()).await.unwrap_err().is_permission_denied());
    }

    #[tokio::test]
    async fn service_is_bound_to_the_callers_session() {
        let store = Arc::new(MemorySessionStore::default());
        store.insert(Session::new("s1").with_user(modgraph_sessions::UserIdentity::new("ann")));
        let binding = binding_over(Arc::clone(&store));
        let field = field_with_session("s1");

        assert_eq!(binding.session(&field).await.unwrap().id, "s1");
        let service = binding.service(&field).await.unwrap();
        assert_eq!(service.echo("hi".into()).await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn expired_session_is_not_treated_as_anonymous() {
        let store = Arc::new(MemorySessionStore::default());
        store.insert(Session::new("old").with_expiry(1));
        let binding = binding_over(store);

        let err = binding
            .call_context(&field_with_session("old"))
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::SessionExpired { .. }));
    }

    #[tokio::test]
    async fn missing_request_is_an_error() {
        let binding = binding_over(Arc::new(MemorySessionStore::default()));
        let err = binding.call_context(&Field(None)).await.unwrap_err();
        assert!(matches!(err, ContextError::RequestUnavailable));
    }
}
