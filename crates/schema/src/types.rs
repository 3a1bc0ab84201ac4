//! Position-free model of a parsed schema fragment.
//!
//! The parser output carries source positions, which makes two identical
//! declarations from different files compare unequal. The types here keep
//! only what composition and execution need.

use std::fmt;

use async_graphql::{
    Value,
    parser::types::{BaseType, Type},
};

/// Reference to a type from a field, argument, or input field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    #[must_use]
    pub fn non_null(inner: TypeRef) -> Self {
        Self::NonNull(Box::new(inner))
    }

    #[must_use]
    pub fn list(inner: TypeRef) -> Self {
        Self::List(Box::new(inner))
    }

    /// The innermost named type, stripped of list and non-null wrappers.
    #[must_use]
    pub fn base_name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::List(inner) | Self::NonNull(inner) => inner.base_name(),
        }
    }

    pub(crate) fn from_parsed(ty: &Type) -> Self {
        let base = match &ty.base {
            BaseType::Named(name) => Self::Named(name.to_string()),
            BaseType::List(inner) => Self::list(Self::from_parsed(inner)),
        };
        if ty.nullable {
            base
        } else {
            Self::non_null(base)
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

/// Argument of a field, or field of an input object.
#[derive(Debug, Clone)]
pub struct InputValueDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub default_value: Option<Value>,
}

impl InputValueDef {
    /// Structural equality ignoring the description.
    pub(crate) fn same_shape(&self, other: &Self) -> bool {
        self.name == other.name && self.ty == other.ty && self.default_value == other.default_value
    }
}

/// Output field of an object or interface type.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub arguments: Vec<InputValueDef>,
    pub ty: TypeRef,
}

impl FieldDef {
    /// Structural equality ignoring descriptions and argument order.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        self.name == other.name
            && self.ty == other.ty
            && same_inputs(&self.arguments, &other.arguments)
    }

    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&InputValueDef> {
        self.arguments.iter().find(|a| a.name == name)
    }
}

fn same_inputs(a: &[InputValueDef], b: &[InputValueDef]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|x| b.iter().any(|y| x.name == y.name && x.same_shape(y)))
}

fn same_fields(a: &[FieldDef], b: &[FieldDef]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|x| b.iter().any(|y| x.name == y.name && x.same_shape(y)))
}

fn same_names(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|x| b.contains(x))
}

#[derive(Debug, Clone)]
pub enum TypeDefKind {
    Scalar,
    Object {
        implements: Vec<String>,
        fields: Vec<FieldDef>,
    },
    Interface {
        implements: Vec<String>,
        fields: Vec<FieldDef>,
    },
    Union {
        members: Vec<String>,
    },
    Enum {
        values: Vec<String>,
    },
    InputObject {
        fields: Vec<InputValueDef>,
    },
}

impl TypeDefKind {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Object { .. } => "type",
            Self::Interface { .. } => "interface",
            Self::Union { .. } => "union",
            Self::Enum { .. } => "enum",
            Self::InputObject { .. } => "input",
        }
    }
}

/// One named type definition (or type extension) from a fragment.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    pub description: Option<String>,
    pub kind: TypeDefKind,
}

impl TypeDef {
    /// Compare the bodies of two definitions.
    ///
    /// Descriptions and member order do not participate, so the same type
    /// declared by two modules with reordered fields still merges.
    #[must_use]
    pub fn same_body(&self, other: &Self) -> bool {
        use TypeDefKind as K;

        match (&self.kind, &other.kind) {
            (K::Scalar, K::Scalar) => true,
            (
                K::Object {
                    implements: ia,
                    fields: fa,
                },
                K::Object {
                    implements: ib,
                    fields: fb,
                },
            )
            | (
                K::Interface {
                    implements: ia,
                    fields: fa,
                },
                K::Interface {
                    implements: ib,
                    fields: fb,
                },
            ) => same_names(ia, ib) && same_fields(fa, fb),
            (K::Union { members: a }, K::Union { members: b }) => same_names(a, b),
            (K::Enum { values: a }, K::Enum { values: b }) => same_names(a, b),
            (K::InputObject { fields: a }, K::InputObject { fields: b }) => same_inputs(a, b),
            _ => false,
        }
    }

    /// Output fields of an object or interface type.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        match &self.kind {
            TypeDefKind::Object { fields, .. } | TypeDefKind::Interface { fields, .. } => fields,
            _ => &[],
        }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields().iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(self.kind, TypeDefKind::Object { .. })
    }
}

/// Root operation names declared by a `schema { ... }` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaRoots {
    pub query: Option<String>,
    pub mutation: Option<String>,
    pub subscription: Option<String>,
}

/// The parsed content of one module's schema resource.
#[derive(Debug, Clone)]
pub struct TypeFragment {
    /// Locator the fragment was loaded from, used in error messages.
    pub locator: String,
    pub types: Vec<TypeDef>,
    pub extensions: Vec<TypeDef>,
    pub roots: Option<SchemaRoots>,
}

impl TypeFragment {
    #[must_use]
    pub fn type_names(&self) -> Vec<&str> {
        self.types.iter().map(|t| t.name.as_str()).collect()
    }
}
