//! End-to-end execution through composed modules.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use {
    async_graphql::{Request, dynamic::FieldFuture},
    async_trait::async_trait,
    http::{HeaderMap, HeaderValue, header},
    modgraph_graphql::{
        BindingState, CoreModule, CoreService, DefaultCoreService, Error, GqlFieldContext,
        ModgraphSchema, ModuleBinding, ModuleSet, ResolverTable, SchemaBinding, ServiceModule,
        build_schema, context_error, field_error, json_to_field_value,
    },
    modgraph_schema::StaticSchemaSource,
    modgraph_service_traits::{
        Check, PermissionCheck, PermissionPolicy, ServiceResult, intercepted_service,
    },
    modgraph_sessions::{
        ConnectionInfo, ContextResolver, MemorySessionStore, RequestInfo, ResolverConfig, Session,
        SessionStore, UserIdentity,
    },
    serde_json::{Value, json},
};

// ── Users module ─────────────────────────────────────────────────────────────

#[async_trait]
trait UserService: Send + Sync {
    async fn me(&self, session: &Session) -> ServiceResult;
}

intercepted_service! {
    struct InterceptedUserService for UserService as "users" {
        async fn me(&self, session: &Session) -> ServiceResult;
    }
}

#[derive(Default)]
struct Users {
    calls: AtomicUsize,
}

#[async_trait]
impl UserService for Users {
    async fn me(&self, session: &Session) -> ServiceResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match &session.user {
            Some(user) => json!({ "userId": user.user_id, "permissions": user.permissions }),
            None => Value::Null,
        })
    }
}

const USERS_SCHEMA: &str = r#"
"Authenticated user."
type User {
  permissions: [String!]!
  userId: ID!
}

extend type Query {
  me: User
}
"#;

struct UsersModule {
    binding: ModuleBinding<dyn UserService>,
}

impl ServiceModule for UsersModule {
    fn schema_binding(&self) -> &SchemaBinding {
        self.binding.schema()
    }

    fn register_resolvers(
        self: Arc<Self>,
        table: &mut ResolverTable,
    ) -> modgraph_graphql::Result<()> {
        let module = self;
        table.register("users", "Query", "me", move |ctx| {
            let module = Arc::clone(&module);
            FieldFuture::new(async move {
                let field = GqlFieldContext::new(&ctx);
                let session = module.binding.session(&field).await.map_err(context_error)?;
                let service = module.binding.service(&field).await.map_err(context_error)?;
                let me = service.me(&session).await.map_err(field_error)?;
                json_to_field_value(me)
            })
        })
    }
}

// ── Counting core service ────────────────────────────────────────────────────

#[derive(Default)]
struct CountingCore {
    inner: DefaultCoreService,
    calls: AtomicUsize,
}

#[async_trait]
impl CoreService for CountingCore {
    async fn session_state(&self, session: &Session) -> ServiceResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.session_state(session).await
    }

    async fn list_connections(&self, session: &Session) -> ServiceResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_connections(session).await
    }

    async fn connection_info(&self, connection: &ConnectionInfo) -> ServiceResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.connection_info(connection).await
    }

    async fn server_info(&self) -> ServiceResult {
        self.inner.server_info().await
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    store: Arc<MemorySessionStore>,
    resolver: Arc<ContextResolver>,
    core: Arc<CountingCore>,
    users: Arc<Users>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemorySessionStore::default());
        let sessions: Arc<dyn SessionStore> = store.clone();
        let resolver = Arc::new(ContextResolver::new(sessions, ResolverConfig::default()));
        Self {
            store,
            resolver,
            core: Arc::new(CountingCore::default()),
            users: Arc::new(Users::default()),
        }
    }

    fn core_module(&self) -> CoreModule {
        CoreModule::new(Arc::clone(&self.core) as Arc<dyn CoreService>, Arc::clone(&self.resolver))
    }

    fn users_module(&self, schema: &'static str) -> UsersModule {
        let source = StaticSchemaSource::new().with("schema/users.graphqls", schema);
        UsersModule {
            binding: ModuleBinding::new(
                "users",
                Arc::clone(&self.users) as Arc<dyn UserService>,
                Arc::new(source),
                "schema/users.graphqls",
                Arc::clone(&self.resolver),
            ),
        }
    }

    fn schema(&self) -> ModgraphSchema {
        let modules = ModuleSet::new()
            .with(Arc::new(self.core_module()))
            .with(Arc::new(self.users_module(USERS_SCHEMA)));
        build_schema(&modules).unwrap()
    }
}

fn request_for(session_id: &str) -> RequestInfo {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::COOKIE,
        HeaderValue::from_str(&format!("modgraph_session={session_id}")).unwrap(),
    );
    RequestInfo::new(headers)
}

async fn run(schema: &ModgraphSchema, query: &str, request: Option<RequestInfo>) -> Value {
    let mut gql = Request::new(query);
    if let Some(request) = request {
        gql = gql.data(request);
    }
    serde_json::to_value(schema.execute(gql).await).unwrap()
}

fn error_codes(response: &Value) -> Vec<String> {
    response["errors"]
        .as_array()
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| e["extensions"]["code"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn modules_sharing_a_type_compose_into_one() {
    let harness = Harness::new();
    let schema = harness.schema();

    let origins = schema.registry().origins("User");
    assert_eq!(origins.len(), 2, "{origins:?}");
    assert_eq!(schema.sdl().matches("type User").count(), 1);

    let session = harness
        .store
        .create(Some(UserIdentity::new("alice").with_permission("read")));
    let response = run(
        &schema,
        "{ me { userId permissions } sessionState { user { userId } } }",
        Some(request_for(&session.id)),
    )
    .await;

    assert!(response["errors"].is_null(), "{response}");
    assert_eq!(response["data"]["me"]["userId"], "alice");
    assert_eq!(response["data"]["me"]["permissions"], json!(["read"]));
    assert_eq!(response["data"]["sessionState"]["user"]["userId"], "alice");
    assert_eq!(harness.users.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.core.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn composition_marks_every_module_registered() {
    let harness = Harness::new();
    let core = Arc::new(harness.core_module());
    let users = Arc::new(harness.users_module(USERS_SCHEMA));
    assert_eq!(core.state(), BindingState::Unregistered);

    let modules = ModuleSet::new()
        .with(Arc::clone(&core) as Arc<dyn ServiceModule>)
        .with(Arc::clone(&users) as Arc<dyn ServiceModule>);
    build_schema(&modules).unwrap();

    assert_eq!(core.state(), BindingState::Registered);
    assert_eq!(users.state(), BindingState::Registered);
}

#[tokio::test]
async fn expired_session_fails_only_session_fields() {
    let harness = Harness::new();
    let schema = harness.schema();
    harness.store.insert(
        Session::new("stale")
            .with_expiry(1)
            .with_connection(ConnectionInfo::new("c1", "Local", "sqlite")),
    );

    let response = run(
        &schema,
        r#"{ connection(connectionId: "c1") { id } serverInfo { name version } }"#,
        Some(request_for("stale")),
    )
    .await;

    assert_eq!(error_codes(&response), vec!["SESSION_EXPIRED"]);
    assert_eq!(response["errors"][0]["path"], json!(["connection"]));
    assert!(response["data"]["connection"].is_null());
    assert_eq!(response["data"]["serverInfo"]["name"], "modgraph");
    assert_eq!(harness.core.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn connection_lookup_is_scoped_to_the_caller() {
    let harness = Harness::new();
    let schema = harness.schema();
    let a = harness.store.create(None);
    let b = harness.store.create(None);
    harness
        .store
        .add_connection(
            &b.id,
            ConnectionInfo::new("b-db", "B's database", "postgres").connected(true),
        )
        .unwrap();

    let query = r#"{ connection(connectionId: "b-db") { id name connected } }"#;

    let response = run(&schema, query, Some(request_for(&a.id))).await;
    assert_eq!(error_codes(&response), vec!["CONNECTION_NOT_FOUND"]);
    assert!(response["data"]["connection"].is_null());

    let response = run(&schema, query, Some(request_for(&b.id))).await;
    assert!(response["errors"].is_null(), "{response}");
    assert_eq!(response["data"]["connection"]["name"], "B's database");
    assert_eq!(response["data"]["connection"]["connected"], true);
}

#[tokio::test]
async fn denied_calls_never_reach_the_service() {
    let harness = Harness::new();
    let policy = PermissionPolicy::new().require("list_connections", ["connections.read"]);
    let core = harness
        .core_module()
        .with_checks([Arc::new(PermissionCheck::new(policy)) as Arc<dyn Check>]);
    let modules = ModuleSet::new().with(Arc::new(core));
    let schema = build_schema(&modules).unwrap();

    let session = harness.store.create(Some(UserIdentity::new("bob")));
    let response = run(
        &schema,
        "{ connections { id } sessionState { id } }",
        Some(request_for(&session.id)),
    )
    .await;

    assert_eq!(error_codes(&response), vec!["PERMISSION_DENIED"]);
    assert!(response["data"]["connections"].is_null());
    assert_eq!(response["data"]["sessionState"]["id"], session.id.as_str());
    // Only sessionState reached the implementation.
    assert_eq!(harness.core.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_credential_is_session_not_found() {
    let harness = Harness::new();
    let schema = harness.schema();

    let response = run(
        &schema,
        "{ sessionState { id } serverInfo { name } }",
        Some(RequestInfo::new(HeaderMap::new())),
    )
    .await;
    assert_eq!(error_codes(&response), vec!["SESSION_NOT_FOUND"]);
    assert_eq!(response["data"]["serverInfo"]["name"], "modgraph");
}

#[tokio::test]
async fn missing_request_is_reported() {
    let harness = Harness::new();
    let schema = harness.schema();

    let response = run(&schema, "{ sessionState { id } }", None).await;
    assert_eq!(error_codes(&response), vec!["REQUEST_UNAVAILABLE"]);
}

#[test]
fn conflicting_type_definitions_abort_startup() {
    let harness = Harness::new();
    let conflicting = r#"
        type User { userId: ID! }
        extend type Query { me: User }
    "#;
    let core = Arc::new(harness.core_module());
    let modules = ModuleSet::new()
        .with(Arc::clone(&core) as Arc<dyn ServiceModule>)
        .with(Arc::new(harness.users_module(conflicting)));

    let err = build_schema(&modules).err().unwrap();
    assert!(
        matches!(
            err,
            Error::Schema(modgraph_schema::Error::DuplicateTypeDefinition { ref name, .. })
                if name == "User"
        ),
        "{err}"
    );
    assert_eq!(core.state(), BindingState::Unregistered);
}

#[test]
fn missing_schema_names_the_locator() {
    let harness = Harness::new();
    let users = UsersModule {
        binding: ModuleBinding::new(
            "users",
            Arc::clone(&harness.users) as Arc<dyn UserService>,
            Arc::new(StaticSchemaSource::new()),
            "schema/users.graphqls",
            Arc::clone(&harness.resolver),
        ),
    };
    let modules = ModuleSet::new()
        .with(Arc::new(harness.core_module()))
        .with(Arc::new(users));

    let err = build_schema(&modules).err().unwrap();
    assert!(err.to_string().contains("schema/users.graphqls"), "{err}");
}

#[test]
fn duplicate_module_names_abort_startup() {
    let harness = Harness::new();
    let modules = ModuleSet::new()
        .with(Arc::new(harness.core_module()))
        .with(Arc::new(
            CoreModule::new(
                Arc::clone(&harness.core) as Arc<dyn CoreService>,
                Arc::clone(&harness.resolver),
            ),
        ));

    assert!(matches!(
        build_schema(&modules).err().unwrap(),
        Error::DuplicateModule { .. }
    ));
}
