//! Schema loading and composition for modgraph service modules.
//!
//! Every service module ships one SDL document. At startup the documents are
//! loaded through a [`SchemaSource`] into [`TypeFragment`]s and merged by
//! [`compose`] into a single immutable [`TypeRegistry`]. The registry is then
//! handed to the execution layer and never mutated again.

pub mod compose;
pub mod error;
pub mod loader;
pub mod registry;
pub mod types;

pub use {
    compose::compose,
    error::{Error, Result},
    loader::{
        DirSchemaSource, LayeredSchemaSource, SchemaSource, StaticSchemaSource, load,
        parse_fragment,
    },
    registry::{RootTypes, TypeRegistry},
    types::{FieldDef, InputValueDef, SchemaRoots, TypeDef, TypeDefKind, TypeFragment, TypeRef},
};

/// Scalars every GraphQL schema provides without declaring them.
pub const BUILTIN_SCALARS: &[&str] = &["String", "Int", "Float", "Boolean", "ID"];

/// Whether `name` is one of the [`BUILTIN_SCALARS`].
#[must_use]
pub fn is_builtin_scalar(name: &str) -> bool {
    BUILTIN_SCALARS.contains(&name)
}
