//! Bridge between dynamic field resolution and the context resolver.

use {
    async_graphql::{
        Value,
        dynamic::{FieldValue, ResolverContext},
    },
    modgraph_sessions::{FieldContext, RequestInfo},
};

use crate::error::serde_error;

/// A field resolution seen through the [`FieldContext`] interface.
///
/// The gateway attaches [`RequestInfo`] to every GraphQL request as request
/// data; this adapter exposes it together with the field arguments.
#[derive(Clone, Copy)]
pub struct GqlFieldContext<'a> {
    ctx: &'a ResolverContext<'a>,
}

impl<'a> GqlFieldContext<'a> {
    pub fn new(ctx: &'a ResolverContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn inner(&self) -> &'a ResolverContext<'a> {
        self.ctx
    }
}

impl FieldContext for GqlFieldContext<'_> {
    fn request(&self) -> Option<&RequestInfo> {
        self.ctx.ctx.data_opt::<RequestInfo>()
    }

    fn argument(&self, name: &str) -> Option<String> {
        match self.ctx.args.get(name)?.as_value() {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Convert a capability result into a field value.
///
/// `null` becomes an absent value. Objects carrying a `__typename` string
/// are tagged with that concrete type so interface and union fields can
/// resolve them.
pub fn json_to_field_value<'a>(
    json: serde_json::Value,
) -> async_graphql::Result<Option<FieldValue<'a>>> {
    let value = Value::from_json(json).map_err(serde_error)?;
    Ok(match value {
        Value::Null => None,
        value => Some(to_field_value(value)),
    })
}

/// Convert an already-resolved GraphQL value into a field value.
pub fn to_field_value<'a>(value: Value) -> FieldValue<'a> {
    match value {
        Value::List(items) => FieldValue::list(items.into_iter().map(to_field_value)),
        Value::Object(map) => {
            let type_name = match map.get("__typename") {
                Some(Value::String(name)) => Some(name.clone()),
                _ => None,
            };
            let value = FieldValue::value(Value::Object(map));
            match type_name {
                Some(name) => value.with_type(name),
                None => value,
            }
        },
        other => FieldValue::value(other),
    }
}
