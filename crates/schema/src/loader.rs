//! Schema resource lookup and parsing.

use std::{
    collections::{HashMap, HashSet},
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use {
    async_graphql::parser::{
        self,
        types::{
            FieldDefinition, InputValueDefinition, SchemaDefinition, TypeDefinition, TypeKind,
            TypeSystemDefinition,
        },
    },
    tracing::{debug, trace},
};

use crate::{
    Error, Result, is_builtin_scalar,
    types::{FieldDef, InputValueDef, SchemaRoots, TypeDef, TypeDefKind, TypeFragment, TypeRef},
};

/// A place schema resources are read from.
///
/// Implementations return `Ok(None)` when the locator does not name an
/// existing resource; errors are reserved for resources that exist but
/// cannot be read.
pub trait SchemaSource: Send + Sync {
    fn read(&self, locator: &str) -> Result<Option<String>>;
}

impl<T: SchemaSource + ?Sized> SchemaSource for Arc<T> {
    fn read(&self, locator: &str) -> Result<Option<String>> {
        (**self).read(locator)
    }
}

/// Reads schema files relative to a root directory.
#[derive(Debug, Clone)]
pub struct DirSchemaSource {
    root: PathBuf,
}

impl DirSchemaSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SchemaSource for DirSchemaSource {
    fn read(&self, locator: &str) -> Result<Option<String>> {
        let relative = Path::new(locator);
        // Locators are relative resource names; never escape the root.
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            debug!(locator, "rejecting schema locator outside the schema root");
            return Ok(None);
        }

        let path = self.root.join(relative);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(Error::Io {
                locator: locator.to_string(),
                source,
            }),
        }
    }
}

/// Schema documents compiled into the binary, keyed by locator.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaSource {
    resources: HashMap<String, &'static str>,
}

impl StaticSchemaSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, locator: impl Into<String>, sdl: &'static str) -> Self {
        self.insert(locator, sdl);
        self
    }

    pub fn insert(&mut self, locator: impl Into<String>, sdl: &'static str) {
        self.resources.insert(locator.into(), sdl);
    }
}

impl SchemaSource for StaticSchemaSource {
    fn read(&self, locator: &str) -> Result<Option<String>> {
        Ok(self.resources.get(locator).map(|s| (*s).to_string()))
    }
}

/// Tries each source in order and returns the first hit.
///
/// Used to let an on-disk schema directory override the documents compiled
/// into module crates.
#[derive(Default, Clone)]
pub struct LayeredSchemaSource {
    layers: Vec<Arc<dyn SchemaSource>>,
}

impl LayeredSchemaSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn layer(mut self, source: Arc<dyn SchemaSource>) -> Self {
        self.layers.push(source);
        self
    }
}

impl SchemaSource for LayeredSchemaSource {
    fn read(&self, locator: &str) -> Result<Option<String>> {
        for source in &self.layers {
            if let Some(text) = source.read(locator)? {
                return Ok(Some(text));
            }
        }
        Ok(None)
    }
}

/// Load and parse the schema resource named by `locator`.
pub fn load(source: &dyn SchemaSource, locator: &str) -> Result<TypeFragment> {
    let text = source.read(locator)?.ok_or_else(|| Error::SchemaNotFound {
        locator: locator.to_string(),
    })?;
    parse_fragment(locator, &text)
}

/// Parse SDL text into a fragment.
pub fn parse_fragment(locator: &str, sdl: &str) -> Result<TypeFragment> {
    let document = parser::parse_schema(sdl).map_err(|e| Error::parse(locator, e.to_string()))?;

    let mut fragment = TypeFragment {
        locator: locator.to_string(),
        types: Vec::new(),
        extensions: Vec::new(),
        roots: None,
    };
    let mut declared = HashSet::new();

    for definition in document.definitions {
        match definition {
            TypeSystemDefinition::Type(ty) => {
                let ty = ty.node;
                let extend = ty.extend;
                let def = convert_type(locator, ty)?;
                if extend {
                    fragment.extensions.push(def);
                } else if matches!(def.kind, TypeDefKind::Scalar) && is_builtin_scalar(&def.name) {
                    trace!(locator, name = %def.name, "ignoring built-in scalar declaration");
                } else if !declared.insert(def.name.clone()) {
                    return Err(Error::parse(
                        locator,
                        format!("type '{}' is declared twice", def.name),
                    ));
                } else {
                    fragment.types.push(def);
                }
            },
            TypeSystemDefinition::Schema(schema) => {
                let roots = convert_roots(&schema.node);
                match &mut fragment.roots {
                    Some(existing) => merge_roots(locator, existing, roots)?,
                    None => fragment.roots = Some(roots),
                }
            },
            TypeSystemDefinition::Directive(directive) => {
                trace!(locator, name = %directive.node.name.node, "ignoring directive definition");
            },
        }
    }

    debug!(
        locator,
        types = fragment.types.len(),
        extensions = fragment.extensions.len(),
        "parsed schema fragment"
    );
    Ok(fragment)
}

fn convert_roots(schema: &SchemaDefinition) -> SchemaRoots {
    SchemaRoots {
        query: schema.query.as_ref().map(|n| n.node.to_string()),
        mutation: schema.mutation.as_ref().map(|n| n.node.to_string()),
        subscription: schema.subscription.as_ref().map(|n| n.node.to_string()),
    }
}

fn merge_roots(locator: &str, existing: &mut SchemaRoots, other: SchemaRoots) -> Result<()> {
    let slots = [
        ("query", &mut existing.query, other.query),
        ("mutation", &mut existing.mutation, other.mutation),
        ("subscription", &mut existing.subscription, other.subscription),
    ];
    for (operation, slot, value) in slots {
        match (slot.as_deref(), value) {
            (Some(a), Some(b)) if a != b => {
                return Err(Error::ConflictingSchemaRoots {
                    first: format!("{locator} ({operation}: {a})"),
                    second: format!("{locator} ({operation}: {b})"),
                });
            },
            (None, value) => *slot = value,
            _ => {},
        }
    }
    Ok(())
}

fn convert_type(locator: &str, ty: TypeDefinition) -> Result<TypeDef> {
    let name = ty.name.node.to_string();
    let kind = match ty.kind {
        TypeKind::Scalar => TypeDefKind::Scalar,
        TypeKind::Object(object) => TypeDefKind::Object {
            implements: object.implements.iter().map(|n| n.node.to_string()).collect(),
            fields: convert_fields(locator, &name, object.fields.into_iter().map(|f| f.node))?,
        },
        TypeKind::Interface(interface) => TypeDefKind::Interface {
            implements: interface
                .implements
                .iter()
                .map(|n| n.node.to_string())
                .collect(),
            fields: convert_fields(locator, &name, interface.fields.into_iter().map(|f| f.node))?,
        },
        TypeKind::Union(union) => TypeDefKind::Union {
            members: unique_names(
                locator,
                &name,
                union.members.iter().map(|m| m.node.to_string()),
            )?,
        },
        TypeKind::Enum(en) => TypeDefKind::Enum {
            values: unique_names(
                locator,
                &name,
                en.values.iter().map(|v| v.node.value.node.to_string()),
            )?,
        },
        TypeKind::InputObject(input) => TypeDefKind::InputObject {
            fields: convert_inputs(locator, &name, input.fields.into_iter().map(|f| f.node))?,
        },
    };

    Ok(TypeDef {
        name,
        description: ty.description.map(|d| d.node),
        kind,
    })
}

fn convert_fields(
    locator: &str,
    owner: &str,
    fields: impl Iterator<Item = FieldDefinition>,
) -> Result<Vec<FieldDef>> {
    let mut out: Vec<FieldDef> = Vec::new();
    for field in fields {
        let name = field.name.node.to_string();
        if out.iter().any(|f| f.name == name) {
            return Err(Error::parse(
                locator,
                format!("field '{owner}.{name}' is declared twice"),
            ));
        }
        let owner_field = format!("{owner}.{name}");
        out.push(FieldDef {
            arguments: convert_inputs(
                locator,
                &owner_field,
                field.arguments.into_iter().map(|a| a.node),
            )?,
            description: field.description.map(|d| d.node),
            ty: TypeRef::from_parsed(&field.ty.node),
            name,
        });
    }
    Ok(out)
}

fn convert_inputs(
    locator: &str,
    owner: &str,
    inputs: impl Iterator<Item = InputValueDefinition>,
) -> Result<Vec<InputValueDef>> {
    let mut out: Vec<InputValueDef> = Vec::new();
    for input in inputs {
        let name = input.name.node.to_string();
        if out.iter().any(|i| i.name == name) {
            return Err(Error::parse(
                locator,
                format!("input value '{name}' of '{owner}' is declared twice"),
            ));
        }
        out.push(InputValueDef {
            name,
            description: input.description.map(|d| d.node),
            ty: TypeRef::from_parsed(&input.ty.node),
            default_value: input.default_value.map(|v| v.node),
        });
    }
    Ok(out)
}

fn unique_names(
    locator: &str,
    owner: &str,
    names: impl Iterator<Item = String>,
) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        if out.contains(&name) {
            return Err(Error::parse(
                locator,
                format!("'{name}' is listed twice in '{owner}'"),
            ));
        }
        out.push(name);
    }
    Ok(out)
}
