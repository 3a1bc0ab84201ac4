//! The composed, immutable type registry.

use std::{collections::HashMap, fmt::Write as _};

use crate::types::{FieldDef, InputValueDef, TypeDef, TypeDefKind};

/// Names of the root operation types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootTypes {
    pub query: String,
    pub mutation: Option<String>,
    pub subscription: Option<String>,
}

/// Merged set of named type definitions.
///
/// Built once by [`compose`](crate::compose) and never mutated afterwards,
/// so it can be shared behind an `Arc` and read without locks.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: Vec<TypeDef>,
    index: HashMap<String, usize>,
    origins: HashMap<String, Vec<String>>,
    roots: RootTypes,
}

impl TypeRegistry {
    pub(crate) fn new(
        types: Vec<TypeDef>,
        origins: HashMap<String, Vec<String>>,
        roots: RootTypes,
    ) -> Self {
        let index = types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        Self {
            types,
            index,
            origins,
            roots,
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.index.get(name).map(|&i| &self.types[i])
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Types in the order they were first defined.
    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.iter()
    }

    #[must_use]
    pub fn type_names(&self) -> Vec<&str> {
        self.types.iter().map(|t| t.name.as_str()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Locators of every fragment that defined or extended `name`.
    #[must_use]
    pub fn origins(&self, name: &str) -> &[String] {
        self.origins.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    #[must_use]
    pub fn roots(&self) -> &RootTypes {
        &self.roots
    }

    #[must_use]
    pub fn query_type(&self) -> &str {
        &self.roots.query
    }

    #[must_use]
    pub fn mutation_type(&self) -> Option<&str> {
        self.roots.mutation.as_deref()
    }

    #[must_use]
    pub fn subscription_type(&self) -> Option<&str> {
        self.roots.subscription.as_deref()
    }

    /// Look up a field on an object or interface type.
    #[must_use]
    pub fn field(&self, type_name: &str, field: &str) -> Option<&FieldDef> {
        self.get(type_name).and_then(|t| t.field(field))
    }

    /// Render the composed registry as a single SDL document.
    #[must_use]
    pub fn to_sdl(&self) -> String {
        let mut out = String::new();

        let default_roots = self.roots.query == "Query"
            && self.roots.mutation.as_deref().is_none_or(|m| m == "Mutation")
            && self
                .roots
                .subscription
                .as_deref()
                .is_none_or(|s| s == "Subscription");
        if !default_roots {
            out.push_str("schema {\n");
            let _ = writeln!(out, "  query: {}", self.roots.query);
            if let Some(m) = &self.roots.mutation {
                let _ = writeln!(out, "  mutation: {m}");
            }
            if let Some(s) = &self.roots.subscription {
                let _ = writeln!(out, "  subscription: {s}");
            }
            out.push_str("}\n\n");
        }

        for ty in &self.types {
            write_description(&mut out, ty.description.as_deref(), "");
            match &ty.kind {
                TypeDefKind::Scalar => {
                    let _ = writeln!(out, "scalar {}", ty.name);
                },
                TypeDefKind::Object { implements, fields }
                | TypeDefKind::Interface { implements, fields } => {
                    let _ = write!(out, "{} {}", ty.kind.label(), ty.name);
                    if !implements.is_empty() {
                        let _ = write!(out, " implements {}", implements.join(" & "));
                    }
                    out.push_str(" {\n");
                    for field in fields {
                        write_description(&mut out, field.description.as_deref(), "  ");
                        let _ = write!(out, "  {}", field.name);
                        if !field.arguments.is_empty() {
                            let args: Vec<String> =
                                field.arguments.iter().map(input_value_sdl).collect();
                            let _ = write!(out, "({})", args.join(", "));
                        }
                        let _ = writeln!(out, ": {}", field.ty);
                    }
                    out.push_str("}\n");
                },
                TypeDefKind::Union { members } => {
                    let _ = writeln!(out, "union {} = {}", ty.name, members.join(" | "));
                },
                TypeDefKind::Enum { values } => {
                    let _ = writeln!(out, "enum {} {{", ty.name);
                    for value in values {
                        let _ = writeln!(out, "  {value}");
                    }
                    out.push_str("}\n");
                },
                TypeDefKind::InputObject { fields } => {
                    let _ = writeln!(out, "input {} {{", ty.name);
                    for field in fields {
                        let _ = writeln!(out, "  {}", input_value_sdl(field));
                    }
                    out.push_str("}\n");
                },
            }
            out.push('\n');
        }

        out
    }
}

fn input_value_sdl(input: &InputValueDef) -> String {
    match &input.default_value {
        Some(default) => format!("{}: {} = {default}", input.name, input.ty),
        None => format!("{}: {}", input.name, input.ty),
    }
}

fn write_description(out: &mut String, description: Option<&str>, indent: &str) {
    if let Some(text) = description {
        let text = text.replace("\"\"\"", "\\\"\"\"");
        let _ = writeln!(out, "{indent}\"\"\"\n{text}\n{indent}\"\"\"");
    }
}
