//! Executable schema construction from the composed registry.

use std::sync::Arc;

use {
    async_graphql::{
        Request, Response, Value,
        dynamic::{
            Enum, EnumItem, Field, FieldFuture, InputObject, InputValue, Interface,
            InterfaceField, Object, Scalar, Schema, TypeRef as DynTypeRef, Union,
        },
    },
    modgraph_schema::{
        FieldDef, InputValueDef, TypeDef, TypeDefKind, TypeRef, TypeRegistry, is_builtin_scalar,
    },
    tracing::{info, warn},
};

use crate::{
    Error, Result,
    context::to_field_value,
    modules::{ModuleSet, ResolverFn, ResolverTable, resolver_fn},
};

/// An executable schema together with the registry it was built from.
#[derive(Clone)]
pub struct ModgraphSchema {
    schema: Schema,
    registry: Arc<TypeRegistry>,
}

impl ModgraphSchema {
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// SDL of the composed registry.
    #[must_use]
    pub fn sdl(&self) -> String {
        self.registry.to_sdl()
    }

    pub async fn execute(&self, request: impl Into<Request>) -> Response {
        self.schema.execute(request.into()).await
    }
}

/// Compose `modules` and build the executable schema.
///
/// Fields with a module resolver dispatch to it; every other field reads the
/// same-named entry of its parent object.
pub fn build_schema(modules: &ModuleSet) -> Result<ModgraphSchema> {
    let registry = modules.compose()?;
    let resolvers = modules.resolvers()?;
    resolvers.validate(&registry)?;

    if let Some(subscription) = registry.subscription_type() {
        warn!(subscription, "subscription root declared but not executed");
    }

    let mut builder = Schema::build(registry.query_type(), registry.mutation_type(), None);
    for def in registry.types() {
        if is_builtin_scalar(&def.name) || registry.subscription_type() == Some(def.name.as_str()) {
            continue;
        }
        builder = match &def.kind {
            TypeDefKind::Scalar => builder.register(scalar(def)),
            TypeDefKind::Object { implements, fields } => {
                builder.register(object(def, implements, fields, &resolvers))
            },
            TypeDefKind::Interface { implements, fields } => {
                builder.register(interface(def, implements, fields))
            },
            TypeDefKind::Union { members } => builder.register(union(def, members)),
            TypeDefKind::Enum { values } => builder.register(enumeration(def, values)),
            TypeDefKind::InputObject { fields } => builder.register(input_object(def, fields)),
        };
    }

    let schema = builder.finish().map_err(|e| Error::Build {
        message: e.to_string(),
    })?;
    info!(
        modules = modules.len(),
        types = registry.len(),
        resolvers = resolvers.len(),
        "executable schema built"
    );
    Ok(ModgraphSchema { schema, registry })
}

fn type_ref(ty: &TypeRef) -> DynTypeRef {
    match ty {
        TypeRef::Named(name) => DynTypeRef::Named(name.clone().into()),
        TypeRef::List(inner) => DynTypeRef::List(Box::new(type_ref(inner))),
        TypeRef::NonNull(inner) => DynTypeRef::NonNull(Box::new(type_ref(inner))),
    }
}

fn input_value(def: &InputValueDef) -> InputValue {
    let mut value = InputValue::new(def.name.as_str(), type_ref(&def.ty));
    if let Some(description) = &def.description {
        value = value.description(description.as_str());
    }
    if let Some(default) = &def.default_value {
        value = value.default_value(default.clone());
    }
    value
}

fn scalar(def: &TypeDef) -> Scalar {
    let scalar = Scalar::new(def.name.as_str());
    match &def.description {
        Some(description) => scalar.description(description.as_str()),
        None => scalar,
    }
}

fn object(
    def: &TypeDef,
    implements: &[String],
    fields: &[FieldDef],
    resolvers: &ResolverTable,
) -> Object {
    let mut object = Object::new(def.name.as_str());
    if let Some(description) = &def.description {
        object = object.description(description.as_str());
    }
    for interface in implements {
        object = object.implement(interface.as_str());
    }
    for field in fields {
        let resolver = match resolvers.get(&def.name, &field.name) {
            Some(entry) => Arc::clone(&entry.resolver),
            None => parent_field(field.name.clone()),
        };
        let mut dyn_field = Field::new(field.name.as_str(), type_ref(&field.ty), move |ctx| {
            resolver(ctx)
        });
        if let Some(description) = &field.description {
            dyn_field = dyn_field.description(description.as_str());
        }
        for argument in &field.arguments {
            dyn_field = dyn_field.argument(input_value(argument));
        }
        object = object.field(dyn_field);
    }
    object
}

fn interface(def: &TypeDef, implements: &[String], fields: &[FieldDef]) -> Interface {
    let mut interface = Interface::new(def.name.as_str());
    if let Some(description) = &def.description {
        interface = interface.description(description.as_str());
    }
    for parent in implements {
        interface = interface.implement(parent.as_str());
    }
    for field in fields {
        let mut dyn_field = InterfaceField::new(field.name.as_str(), type_ref(&field.ty));
        if let Some(description) = &field.description {
            dyn_field = dyn_field.description(description.as_str());
        }
        for argument in &field.arguments {
            dyn_field = dyn_field.argument(input_value(argument));
        }
        interface = interface.field(dyn_field);
    }
    interface
}

fn union(def: &TypeDef, members: &[String]) -> Union {
    let mut union = Union::new(def.name.as_str());
    if let Some(description) = &def.description {
        union = union.description(description.as_str());
    }
    for member in members {
        union = union.possible_type(member.as_str());
    }
    union
}

fn enumeration(def: &TypeDef, values: &[String]) -> Enum {
    let mut enumeration = Enum::new(def.name.as_str());
    if let Some(description) = &def.description {
        enumeration = enumeration.description(description.as_str());
    }
    for value in values {
        enumeration = enumeration.item(EnumItem::new(value.as_str()));
    }
    enumeration
}

fn input_object(def: &TypeDef, fields: &[InputValueDef]) -> InputObject {
    let mut input = InputObject::new(def.name.as_str());
    if let Some(description) = &def.description {
        input = input.description(description.as_str());
    }
    for field in fields {
        input = input.field(input_value(field));
    }
    input
}

/// Resolver reading `name` from the parent object value.
fn parent_field(name: String) -> ResolverFn {
    resolver_fn(move |ctx| {
        let value = match ctx.parent_value.as_value() {
            Some(Value::Object(map)) => map.get(name.as_str()).cloned(),
            _ => None,
        };
        FieldFuture::new(async move {
            Ok(value.and_then(|value| match value {
                Value::Null => None,
                value => Some(to_field_value(value)),
            }))
        })
    })
}
