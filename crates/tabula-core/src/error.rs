//! Error types for the compile path.
//!
//! Every error below is fatal at the point it is raised: a schema that
//! cannot be fully resolved yields no output, and nothing here is ever
//! downgraded to a warning.

/// Errors raised while resolving a parse tree into a semantic model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SemanticError {
    /// A qualified name referenced a schema that doesn't exist.
    #[error("schema not found: {0}")]
    UnknownSchema(String),

    /// A qualified name referenced a table that doesn't exist.
    #[error("table not found: {schema}.{table}")]
    UnknownTable {
        /// Schema the lookup ran against.
        schema: String,
        /// Table name that failed to resolve.
        table: String,
    },

    /// A field declared neither a type token nor a default the type
    /// could be derived from.
    #[error("type not found for field: {table}.{field}")]
    MissingType {
        /// Owning table.
        table: String,
        /// Field without a derivable type.
        field: String,
    },

    /// The return type of a default function call is not known.
    #[error("return type not known for function: {0}")]
    UnknownFunction(String),

    /// A one-to-many link would reuse a field whose type cannot hold
    /// the referenced primary key.
    #[error("link {from} -> {towards}: incompatible fk/pk field types")]
    IncompatibleLinkTypes {
        /// Table carrying the foreign key.
        from: String,
        /// Referenced table.
        towards: String,
    },

    /// Two entities with the same name in one scope.
    #[error("duplicate {kind} name: {name}")]
    DuplicateName {
        /// Entity kind ("schema", "table", "field").
        kind: &'static str,
        /// The colliding name.
        name: String,
    },
}

/// Any failure on the source-to-model path.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// Malformed source text.
    #[error(transparent)]
    Syntax(#[from] crate::parser::SyntaxError),

    /// The parse tree could not be resolved into a model.
    #[error(transparent)]
    Semantic(#[from] SemanticError),
}

/// Errors raised when a formatter is asked for a feature the selected
/// dialect cannot express.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CapabilityError {
    /// The dialect has no enumerated-type support.
    #[error("{dialect}: enumerated types not supported (field {field})")]
    EnumsUnsupported {
        /// Dialect name.
        dialect: &'static str,
        /// Offending enum field.
        field: String,
    },

    /// The dialect has no inheritance emulation.
    #[error("{dialect}: table inheritance not supported (table {table})")]
    InheritanceUnsupported {
        /// Dialect name.
        dialect: &'static str,
        /// Derived or base table that triggered the error.
        table: String,
    },

    /// The view+rules technique only works for single-field primary keys.
    #[error("inheritance only supported for single field primary key (table {table})")]
    CompositeInheritedKey {
        /// Derived table whose parent has a multi-field primary key.
        table: String,
    },
}
