//! GraphQL binding layer for modgraph service modules.
//!
//! Each module is a [`ModuleBinding`]: a capability implementation, the SDL
//! fragment it serves, and the checks every call goes through. A
//! [`ModuleSet`] composes the fragments once at startup and [`build_schema`]
//! turns the merged registry into an executable schema whose fields dispatch
//! to the owning module's resolvers.
//!
//! The gateway crate attaches a [`RequestInfo`](modgraph_sessions::RequestInfo)
//! to every request; resolvers reach the caller's session and connections
//! through the binding's helpers.

pub mod binding;
pub mod builtin;
pub mod context;
pub mod error;
pub mod modules;
pub mod schema;

pub use {
    binding::{BindingState, ModuleBinding, SchemaBinding, ServiceModule},
    builtin::{CoreModule, CoreService, DefaultCoreService},
    context::{GqlFieldContext, json_to_field_value, to_field_value},
    error::{Error, Result, context_error, field_error},
    modules::{ModuleSet, ResolverFn, ResolverTable},
    schema::{ModgraphSchema, build_schema},
};
