//! Composition tests across several module fragments.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeSet;

use modgraph_schema::{
    DirSchemaSource, Error, StaticSchemaSource, TypeFragment, compose, load, parse_fragment,
};

fn fragment(locator: &str, sdl: &str) -> TypeFragment {
    parse_fragment(locator, sdl).expect("fragment should parse")
}

fn names(registry: &modgraph_schema::TypeRegistry) -> BTreeSet<String> {
    registry.type_names().into_iter().map(String::from).collect()
}

#[test]
fn disjoint_fragments_compose_to_their_union() {
    let core = fragment(
        "core.graphqls",
        "type Query { serverInfo: ServerInfo }\ntype ServerInfo { version: String }",
    );
    let users = fragment("users.graphqls", "type User { id: ID! }\nenum Role { ADMIN USER }");
    let conns = fragment("conns.graphqls", "type Connection { id: ID! owner: User }");

    let forward = compose([&core, &users, &conns]).unwrap();
    let backward = compose([&conns, &users, &core]).unwrap();

    let expected: BTreeSet<String> = ["Query", "ServerInfo", "User", "Role", "Connection"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(names(&forward), expected);
    assert_eq!(names(&backward), expected);
}

#[test]
fn differing_duplicate_type_is_rejected() {
    let core = fragment("core.graphqls", "type Query { me: User }\ntype User { id: ID! }");
    let users = fragment("users.graphqls", "type User { id: ID! email: String }");

    let err = compose([&core, &users]).unwrap_err();
    match err {
        Error::DuplicateTypeDefinition {
            name,
            first,
            second,
        } => {
            assert_eq!(name, "User");
            assert_eq!(first, "core.graphqls");
            assert_eq!(second, "users.graphqls");
        },
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn identical_duplicate_type_merges_once() {
    let a = fragment("a.graphqls", "type Query { a: User }\ntype User { id: ID! name: String }");
    let b = fragment("b.graphqls", "type User { name: String id: ID! }");

    let registry = compose([&a, &b]).unwrap();
    assert_eq!(registry.type_names().iter().filter(|n| **n == "User").count(), 1);
    assert_eq!(registry.origins("User"), ["a.graphqls", "b.graphqls"]);
}

#[test]
fn unresolved_field_type_is_rejected() {
    let core = fragment("core.graphqls", "type Query { session: SessionInfo }");
    let err = compose([&core]).unwrap_err();
    match err {
        Error::UnresolvedTypeReference {
            name,
            referenced_by,
        } => {
            assert_eq!(name, "SessionInfo");
            assert!(referenced_by.contains("Query.session"), "{referenced_by}");
        },
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn unresolved_argument_type_is_rejected() {
    let core = fragment("core.graphqls", "type Query { find(filter: Filter): Int }");
    assert!(matches!(
        compose([&core]).unwrap_err(),
        Error::UnresolvedTypeReference { .. }
    ));
}

#[test]
fn extensions_add_fields_from_other_modules() {
    let core = fragment("core.graphqls", "type Query { serverInfo: String }");
    let nav = fragment(
        "navigator.graphqls",
        "extend type Query { navNodeChildren(parentPath: ID!): [String!]! }",
    );
    let sql = fragment(
        "sql.graphqls",
        "extend type Query { sqlDialectInfo(connectionId: ID!): String }",
    );

    // Extension listed before the base definition still applies.
    let registry = compose([&nav, &core, &sql]).unwrap();
    let query = registry.get("Query").unwrap();
    let fields: Vec<&str> = query.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(fields, vec!["serverInfo", "navNodeChildren", "sqlDialectInfo"]);
    assert_eq!(registry.origins("Query").len(), 3);
}

#[test]
fn conflicting_extension_field_is_rejected() {
    let core = fragment("core.graphqls", "type Query { ping: String }");
    let other = fragment("other.graphqls", "extend type Query { ping: Int }");
    assert!(matches!(
        compose([&core, &other]).unwrap_err(),
        Error::DuplicateFieldDefinition { .. }
    ));
}

#[test]
fn extension_of_unknown_type_is_rejected() {
    let core = fragment("core.graphqls", "type Query { ping: String }");
    let other = fragment("other.graphqls", "extend type Mutation { reset: Boolean }");
    assert!(matches!(
        compose([&core, &other]).unwrap_err(),
        Error::UnresolvedTypeReference { .. }
    ));
}

#[test]
fn extension_kind_must_match() {
    let core = fragment("core.graphqls", "type Query { role: Role }\nenum Role { ADMIN }");
    let other = fragment("other.graphqls", "extend type Role { name: String }");
    assert!(matches!(
        compose([&core, &other]).unwrap_err(),
        Error::ExtensionKindMismatch { .. }
    ));
}

#[test]
fn missing_query_root_is_rejected() {
    let users = fragment("users.graphqls", "type User { id: ID! }");
    assert!(matches!(
        compose([&users]).unwrap_err(),
        Error::MissingQueryRoot { .. }
    ));
}

#[test]
fn mutation_root_is_detected() {
    let core = fragment(
        "core.graphqls",
        "type Query { ping: String }\ntype Mutation { touch: Boolean }",
    );
    let registry = compose([&core]).unwrap();
    assert_eq!(registry.query_type(), "Query");
    assert_eq!(registry.mutation_type(), Some("Mutation"));
    assert_eq!(registry.subscription_type(), None);
}

#[test]
fn union_members_must_be_objects() {
    let core = fragment(
        "core.graphqls",
        "type Query { node: Node }\nunion Node = Folder | Role\n\
         type Folder { id: ID }\nenum Role { A }",
    );
    assert!(matches!(
        compose([&core]).unwrap_err(),
        Error::UnresolvedTypeReference { .. }
    ));
}

#[test]
fn composed_sdl_parses_back() {
    let core = fragment(
        "core.graphqls",
        r#"
        "Root query"
        type Query { user(id: ID!, active: Boolean = true): User }
        interface Node { id: ID! }
        type User implements Node { id: ID! roles: [Role!]! }
        enum Role { ADMIN USER }
        input UserFilter { role: Role }
        scalar DateTime
        "#,
    );
    let registry = compose([&core]).unwrap();
    let sdl = registry.to_sdl();

    let reparsed = fragment("composed.graphqls", &sdl);
    let again = compose([&reparsed]).unwrap();
    assert_eq!(names(&registry), names(&again));
    assert!(sdl.contains("active: Boolean = true"), "{sdl}");
}

#[test]
fn missing_resource_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let source = DirSchemaSource::new(dir.path());

    let err = load(&source, "schema/users.graphqls").unwrap_err();
    assert!(matches!(err, Error::SchemaNotFound { .. }));
    assert!(err.to_string().contains("schema/users.graphqls"), "{err}");
}

#[test]
fn dir_source_loads_nested_resource() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("schema")).unwrap();
    std::fs::write(
        dir.path().join("schema/users.graphqls"),
        "type User { id: ID! }",
    )
    .unwrap();

    let source = DirSchemaSource::new(dir.path());
    let fragment = load(&source, "schema/users.graphqls").unwrap();
    assert_eq!(fragment.type_names(), vec!["User"]);
    assert_eq!(fragment.locator, "schema/users.graphqls");
}

#[test]
fn load_is_repeatable() {
    let source = StaticSchemaSource::new().with("core.graphqls", "type Query { ping: String }");
    let a = load(&source, "core.graphqls").unwrap();
    let b = load(&source, "core.graphqls").unwrap();
    assert!(a.types[0].same_body(&b.types[0]));
}

#[test]
fn extension_redeclaring_input_default_is_rejected() {
    let a = fragment(
        "a.graphqls",
        "type Query { find(filter: Filter): Int }\ninput Filter { limit: Int = 5 }",
    );
    let b = fragment("b.graphqls", "extend input Filter { limit: Int = 50 }");
    match compose([&a, &b]).unwrap_err() {
        Error::DuplicateFieldDefinition {
            type_name,
            field,
            locator,
        } => {
            assert_eq!(type_name, "Filter");
            assert_eq!(field, "limit");
            assert_eq!(locator, "b.graphqls");
        },
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn extension_redeclaring_input_type_is_rejected() {
    let a = fragment(
        "a.graphqls",
        "type Query { find(filter: Filter): Int }\ninput Filter { limit: Int }",
    );
    let b = fragment("b.graphqls", "extend input Filter { limit: String }");
    assert!(matches!(
        compose([&a, &b]).unwrap_err(),
        Error::DuplicateFieldDefinition { .. }
    ));
}

#[test]
fn extension_repeating_identical_input_field_merges() {
    let a = fragment(
        "a.graphqls",
        "type Query { find(filter: Filter): Int }\ninput Filter { limit: Int = 5 }",
    );
    let b = fragment("b.graphqls", "extend input Filter { limit: Int = 5 offset: Int }");
    let registry = compose([&a, &b]).unwrap();
    let filter = registry.get("Filter").unwrap();
    match &filter.kind {
        modgraph_schema::TypeDefKind::InputObject { fields } => {
            let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
            assert_eq!(names, vec!["limit", "offset"]);
        },
        other => panic!("unexpected kind: {other:?}"),
    }
}

#[test]
fn extension_changing_argument_default_is_rejected() {
    let core = fragment("core.graphqls", "type Query { users(limit: Int = 10): Int }");
    let other = fragment("other.graphqls", "extend type Query { users(limit: Int = 20): Int }");
    assert!(matches!(
        compose([&core, &other]).unwrap_err(),
        Error::DuplicateFieldDefinition { .. }
    ));
}

#[test]
fn extension_changing_argument_type_is_rejected() {
    let core = fragment("core.graphqls", "type Query { user(id: ID!): String }");
    let other = fragment("other.graphqls", "extend type Query { user(id: Int!): String }");
    assert!(matches!(
        compose([&core, &other]).unwrap_err(),
        Error::DuplicateFieldDefinition { .. }
    ));
}

#[test]
fn extension_adding_argument_is_rejected() {
    let core = fragment("core.graphqls", "type Query { user(id: ID!): String }");
    let other = fragment(
        "other.graphqls",
        "extend type Query { user(id: ID!, active: Boolean): String }",
    );
    assert!(matches!(
        compose([&core, &other]).unwrap_err(),
        Error::DuplicateFieldDefinition { .. }
    ));
}

#[test]
fn descriptions_with_quotes_survive_sdl_printing() {
    let mut core = fragment("core.graphqls", "type Query { ping: String }");
    let text = r#"Says "hi", keeps """triple""" quotes and ends with a quote""#;
    core.types[0].description = Some(text.to_string());

    let registry = compose([&core]).unwrap();
    let reparsed = fragment("composed.graphqls", &registry.to_sdl());
    assert_eq!(reparsed.types[0].description.as_deref(), Some(text));
}
