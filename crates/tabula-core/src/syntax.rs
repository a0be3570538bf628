//! Parse-tree types: the contract between the frontend and the AST builder.
//!
//! The builder consumes only these read-only declarations, so any frontend
//! able to produce them (the bundled parser, or an external one) works.
//! Defaults are pre-classified by the frontend into [`DefaultExpr`]; the
//! builder never re-parses literal text.

/// A possibly schema-qualified table reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    /// Explicit schema prefix, if any. When absent the enclosing schema
    /// is used for resolution.
    pub schema: Option<String>,
    /// Table name.
    pub name: String,
}

impl QualifiedName {
    /// Creates an unqualified name.
    #[must_use]
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    /// Creates a schema-qualified name.
    #[must_use]
    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }
}

/// A default-value expression, classified once at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultExpr {
    /// `= null`
    Null,
    /// `= true` / `= false`
    Boolean(bool),
    /// `= 42` / `= 1.5`
    Number(f64),
    /// `= 'text'` (quotes removed)
    Text(String),
    /// `= f(args)`: function name plus the raw call text.
    Call {
        /// Called function name.
        name: String,
        /// The call expression verbatim, e.g. `now()`.
        raw: String,
    },
}

/// A field declaration inside a table.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    /// Field name.
    pub name: String,
    /// `*` marker.
    pub primary_key: bool,
    /// `!` marker.
    pub unique: bool,
    /// `+` marker.
    pub indexed: bool,
    /// `?` marker (nullable).
    pub optional: bool,
    /// Declared type token, e.g. `varchar(10)` or `enum('a','b')`.
    /// Absent for reference fields and for fields whose type is derived
    /// from their default.
    pub type_token: Option<String>,
    /// `as Alias` display alias (enum types only).
    pub alias: Option<String>,
    /// `-> table` reference target.
    pub reference: Option<QualifiedName>,
    /// `cascade` marker on a reference field.
    pub cascade: bool,
    /// Diagram direction label on a reference field, e.g. `(up)`.
    pub direction: Option<String>,
    /// `= value` default expression.
    pub default: Option<DefaultExpr>,
}

impl FieldDecl {
    /// Creates a plain field declaration with every marker off.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: false,
            unique: false,
            indexed: false,
            optional: false,
            type_token: None,
            alias: None,
            reference: None,
            cascade: false,
            direction: None,
            default: None,
        }
    }
}

/// A table declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDecl {
    /// Table name.
    pub name: String,
    /// `: parent` single-inheritance parent.
    pub parent: Option<QualifiedName>,
    /// Diagram direction label on the parent edge.
    pub parent_label: Option<String>,
    /// Field declarations, in source order.
    pub fields: Vec<FieldDecl>,
}

/// Per-side multiplicity marker of a link declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Multiplicity {
    /// `*` marker.
    Many,
    /// `1` marker.
    One,
    /// No marker; resolution treats the link side conservatively.
    #[default]
    Unspecified,
}

/// A schema-level relationship declaration between two tables.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkDecl {
    /// Left-hand table.
    pub left: QualifiedName,
    /// Right-hand table.
    pub right: QualifiedName,
    /// Left-side multiplicity marker.
    pub left_mult: Multiplicity,
    /// Right-side multiplicity marker.
    pub right_mult: Multiplicity,
    /// Left-side `?` marker.
    pub left_optional: bool,
    /// Right-side `?` marker.
    pub right_optional: bool,
    /// Diagram direction label embedded in the operator.
    pub label: Option<String>,
    /// Trailing `cascade` marker.
    pub cascade: bool,
}

impl LinkDecl {
    /// Creates a link with unmarked sides.
    #[must_use]
    pub fn between(left: QualifiedName, right: QualifiedName) -> Self {
        Self {
            left,
            right,
            left_mult: Multiplicity::Unspecified,
            right_mult: Multiplicity::Unspecified,
            left_optional: false,
            right_optional: false,
            label: None,
            cascade: false,
        }
    }
}

/// A schema declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDecl {
    /// Schema name.
    pub name: String,
    /// Table declarations, in source order.
    pub tables: Vec<TableDecl>,
    /// Link declarations, processed after all tables exist.
    pub links: Vec<LinkDecl>,
}

/// The root of a parse tree.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseDecl {
    /// Database name.
    pub name: String,
    /// `option name = value` pairs.
    pub options: Vec<(String, String)>,
    /// Schema declarations.
    pub schemas: Vec<SchemaDecl>,
}
