use thiserror::Error;

/// Startup errors raised while loading or composing module schemas.
///
/// Every variant is fatal: the server must not start with a registry that
/// failed to compose.
#[derive(Debug, Error)]
pub enum Error {
    #[error("schema resource '{locator}' not found")]
    SchemaNotFound { locator: String },

    #[error("failed to parse schema '{locator}': {message}")]
    SchemaParse { locator: String, message: String },

    #[error("failed to read schema '{locator}': {source}")]
    Io {
        locator: String,
        #[source]
        source: std::io::Error,
    },

    #[error("type '{name}' is defined differently in '{first}' and '{second}'")]
    DuplicateTypeDefinition {
        name: String,
        first: String,
        second: String,
    },

    #[error("field '{type_name}.{field}' is redefined with a different signature in '{locator}'")]
    DuplicateFieldDefinition {
        type_name: String,
        field: String,
        locator: String,
    },

    #[error("type '{name}' referenced by {referenced_by} is not defined")]
    UnresolvedTypeReference { name: String, referenced_by: String },

    #[error("'{locator}' extends '{name}' as {found}, but it is defined as {expected}")]
    ExtensionKindMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
        locator: String,
    },

    #[error("schema root operations are declared differently in '{first}' and '{second}'")]
    ConflictingSchemaRoots { first: String, second: String },

    #[error("root operation type '{name}' is missing or is not an object type")]
    MissingQueryRoot { name: String },
}

impl Error {
    #[must_use]
    pub fn parse(locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaParse {
            locator: locator.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
