//! The semantic model: a normalized, self-consistent relational schema.
//!
//! The whole model is one owned object graph rooted at [`Database`]. Tables
//! live in a single arena and are addressed by [`TableId`], which is what
//! parent links and foreign keys store; the `children` side of the
//! inheritance relation is derived by scanning the arena, never stored.
//!
//! Entities are created once during building (or reverse engineering) and
//! are structurally immutable afterwards, except for two idempotent,
//! append-only effects: primary-key synthesis and index memoization. Both
//! take `&mut Database`, so formatters (which borrow shared) can never
//! trigger them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::SemanticError;
use crate::syntax::QualifiedName;

/// Name suffix of synthesized identity fields.
pub const IDENTITY_SUFFIX: &str = "_id";

/// Stable identifier of a table within its database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId(pub(crate) usize);

/// Stable identifier of a schema within its database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaId(pub(crate) usize);

/// A declared type token, kept verbatim: `serial`, `varchar(10)`,
/// `numeric(8,2)`, `enum('a','b')`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeToken(String);

impl TypeToken {
    /// Wraps a raw type token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token verbatim.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The token up to any argument list: `varchar(10)` → `varchar`.
    #[must_use]
    pub fn base(&self) -> &str {
        match self.0.find('(') {
            Some(pos) => &self.0[..pos],
            None => &self.0,
        }
    }

    /// The parenthesized argument list verbatim, if any:
    /// `varchar(10)` → `(10)`.
    #[must_use]
    pub fn args(&self) -> Option<&str> {
        self.0.find('(').map(|pos| &self.0[pos..])
    }

    /// Whether the token marks an enumerated-literal set.
    #[must_use]
    pub fn is_enum(&self) -> bool {
        self.0.starts_with("enum(")
    }

    /// The literal values of an enum token, unquoted.
    #[must_use]
    pub fn enum_values(&self) -> Vec<&str> {
        if !self.is_enum() {
            return Vec::new();
        }
        self.0["enum(".len()..self.0.len() - usize::from(self.0.ends_with(')'))]
            .split(',')
            .map(|v| v.trim().trim_matches('\''))
            .filter(|v| !v.is_empty())
            .collect()
    }

    /// Whether the token is the auto-increment identity type.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.0 == "serial"
    }

    /// Identity types normalized to their plain integer equivalent, so a
    /// foreign-key field copying a `serial` primary key becomes `int`.
    #[must_use]
    pub fn normalized_identity(&self) -> Self {
        if self.is_identity() {
            Self::new("int")
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A default value, classified exactly once at build time.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// Explicit `null` default.
    Null,
    /// Boolean literal.
    Boolean(bool),
    /// Numeric literal.
    Number(f64),
    /// String literal (unquoted form).
    Text(String),
    /// Function-call expression, kept verbatim: `now()`.
    Call(String),
}

/// A field of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name, unique within its table.
    pub name: String,
    /// Declared type token.
    pub ty: TypeToken,
    /// Part of the table's primary key.
    pub primary_key: bool,
    /// NOT NULL.
    pub non_null: bool,
    /// Single-field uniqueness.
    pub unique: bool,
    /// Carries a plain index.
    pub indexed: bool,
    /// Default value, if declared.
    pub default: Option<DefaultValue>,
    /// Display alias (enum types only).
    pub alias: Option<String>,
}

impl Field {
    /// Creates a non-null field with every flag off.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: TypeToken) -> Self {
        Self {
            name: name.into(),
            ty,
            primary_key: false,
            non_null: true,
            unique: false,
            indexed: false,
            default: None,
            alias: None,
        }
    }

    /// Whether this is a synthesized identity key of `table`:
    /// primary, `serial`, named `<table>_id`.
    #[must_use]
    pub fn is_default_key(&self, table_name: &str) -> bool {
        self.primary_key
            && self.ty.is_identity()
            && self.name == format!("{table_name}{IDENTITY_SUFFIX}")
    }
}

/// A foreign key: an ordered set of fields of one table referencing
/// another table's primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    /// Names of the constrained fields in the owning table, in order.
    pub fields: Vec<String>,
    /// Referenced table.
    pub towards: TableId,
    /// All constrained fields are NOT NULL.
    pub non_null: bool,
    /// The reference is one-to-one.
    pub unique: bool,
    /// ON DELETE CASCADE.
    pub cascade: bool,
    /// Diagram direction hint; rendering only, never compared.
    pub direction: Option<String>,
}

/// An index over an unordered set of fields of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    /// Indexed field names.
    pub fields: BTreeSet<String>,
    /// Uniqueness flag.
    pub unique: bool,
}

/// A table: fields, foreign keys, optional inheritance parent.
#[derive(Debug, Clone)]
pub struct Table {
    /// Table name, unique within its schema.
    pub name: String,
    /// Owning schema.
    pub schema: SchemaId,
    /// Single-inheritance parent.
    pub parent: Option<TableId>,
    /// Diagram direction label of the parent edge.
    pub parent_label: Option<String>,
    /// For synthesized join tables, the two linked sides.
    pub join_sides: Option<(TableId, TableId)>,
    fields: Vec<Field>,
    /// Foreign keys, in creation order.
    pub foreign_keys: Vec<ForeignKey>,
    indexes: Vec<Index>,
}

impl Table {
    fn new(name: String, schema: SchemaId) -> Self {
        Self {
            name,
            schema,
            parent: None,
            parent_label: None,
            join_sides: None,
            fields: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Looks up an own (non-inherited) field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Mutable field lookup, for the builder.
    #[must_use]
    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    /// Appends a field, enforcing name uniqueness.
    pub fn add_field(&mut self, field: Field) -> Result<(), SemanticError> {
        if self.field(&field.name).is_some() {
            return Err(SemanticError::DuplicateName {
                kind: "field",
                name: format!("{}.{}", self.name, field.name),
            });
        }
        self.fields.push(field);
        Ok(())
    }

    /// The table's own primary-key fields, in field order.
    pub fn primary_key_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.primary_key)
    }

    /// Memoizes an index over `fields`. Creation is on demand and
    /// idempotent: one index per distinct field set, repeated calls
    /// return the existing one.
    pub fn get_or_create_index(&mut self, fields: BTreeSet<String>, unique: bool) -> &Index {
        let pos = match self.indexes.iter().position(|i| i.fields == fields) {
            Some(pos) => pos,
            None => {
                self.indexes.push(Index { fields, unique });
                self.indexes.len() - 1
            }
        };
        &self.indexes[pos]
    }

    /// Memoized indexes, in creation order.
    pub fn indexes(&self) -> impl Iterator<Item = &Index> {
        self.indexes.iter()
    }

    /// Foreign keys that constrain the named field.
    pub fn foreign_keys_of<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ForeignKey> {
        self.foreign_keys
            .iter()
            .filter(move |fk| fk.fields.iter().any(|f| f == field))
    }
}

/// A schema: a named set of tables within one database.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Schema name, unique within its database.
    pub name: String,
    tables: Vec<TableId>,
}

/// The root of the semantic model.
#[derive(Debug, Clone)]
pub struct Database {
    /// Database name.
    pub name: String,
    options: BTreeMap<String, String>,
    schemas: Vec<Schema>,
    tables: Vec<Table>,
}

impl Database {
    /// Creates an empty database.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: BTreeMap::new(),
            schemas: Vec::new(),
            tables: Vec::new(),
        }
    }

    /// Sets a database option. Insertion order is irrelevant.
    pub fn set_option(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.options.insert(name.into(), value.into());
    }

    /// Database options, sorted by name.
    pub fn options(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Adds a schema, enforcing name uniqueness.
    pub fn add_schema(&mut self, name: impl Into<String>) -> Result<SchemaId, SemanticError> {
        let name = name.into();
        if self.schema_by_name(&name).is_some() {
            return Err(SemanticError::DuplicateName {
                kind: "schema",
                name,
            });
        }
        self.schemas.push(Schema {
            name,
            tables: Vec::new(),
        });
        Ok(SchemaId(self.schemas.len() - 1))
    }

    /// Schema access.
    #[must_use]
    pub fn schema(&self, id: SchemaId) -> &Schema {
        &self.schemas[id.0]
    }

    /// Schemas with their ids, in insertion order.
    pub fn schemas(&self) -> impl Iterator<Item = (SchemaId, &Schema)> {
        self.schemas.iter().enumerate().map(|(i, s)| (SchemaId(i), s))
    }

    /// Looks a schema up by name.
    #[must_use]
    pub fn schema_by_name(&self, name: &str) -> Option<SchemaId> {
        self.schemas
            .iter()
            .position(|s| s.name == name)
            .map(SchemaId)
    }

    /// Adds a table to a schema, enforcing name uniqueness within it.
    pub fn add_table(
        &mut self,
        schema: SchemaId,
        name: impl Into<String>,
    ) -> Result<TableId, SemanticError> {
        let name = name.into();
        if self.table_by_name(schema, &name).is_some() {
            return Err(SemanticError::DuplicateName {
                kind: "table",
                name: format!("{}.{}", self.schemas[schema.0].name, name),
            });
        }
        self.tables.push(Table::new(name, schema));
        let id = TableId(self.tables.len() - 1);
        self.schemas[schema.0].tables.push(id);
        Ok(id)
    }

    /// Table access.
    #[must_use]
    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id.0]
    }

    /// Mutable table access, for the builder and reverse engineer.
    #[must_use]
    pub fn table_mut(&mut self, id: TableId) -> &mut Table {
        &mut self.tables[id.0]
    }

    /// Ids of a schema's tables, in insertion order.
    #[must_use]
    pub fn tables_in(&self, schema: SchemaId) -> Vec<TableId> {
        self.schemas[schema.0].tables.clone()
    }

    /// All table ids, in creation order.
    pub fn table_ids(&self) -> impl Iterator<Item = TableId> {
        (0..self.tables.len()).map(TableId)
    }

    /// Looks a table up by name within one schema.
    #[must_use]
    pub fn table_by_name(&self, schema: SchemaId, name: &str) -> Option<TableId> {
        self.schemas[schema.0]
            .tables
            .iter()
            .copied()
            .find(|&id| self.tables[id.0].name == name)
    }

    /// Resolves a qualified name against a default schema: an explicit
    /// schema prefix wins, otherwise the enclosing schema is searched.
    pub fn find_table(
        &self,
        default_schema: SchemaId,
        name: &QualifiedName,
    ) -> Result<TableId, SemanticError> {
        let schema = match &name.schema {
            Some(prefix) => self
                .schema_by_name(prefix)
                .ok_or_else(|| SemanticError::UnknownSchema(prefix.clone()))?,
            None => default_schema,
        };
        self.table_by_name(schema, &name.name)
            .ok_or_else(|| SemanticError::UnknownTable {
                schema: self.schemas[schema.0].name.clone(),
                table: name.name.clone(),
            })
    }

    /// Derived reverse index of the inheritance forest: ids of the
    /// tables whose parent is `id`, in arena order.
    #[must_use]
    pub fn children(&self, id: TableId) -> Vec<TableId> {
        (0..self.tables.len())
            .map(TableId)
            .filter(|&t| self.tables[t.0].parent == Some(id))
            .collect()
    }

    /// The root of a table's inheritance chain (itself when parentless).
    #[must_use]
    pub fn inheritance_root(&self, id: TableId) -> TableId {
        let mut current = id;
        while let Some(parent) = self.tables[current.0].parent {
            current = parent;
        }
        current
    }

    /// The resolved primary key of a table: its own primary-key fields,
    /// or the nearest ancestor's. Empty when the whole chain has none.
    #[must_use]
    pub fn primary_key(&self, id: TableId) -> Vec<&Field> {
        let mut current = Some(id);
        while let Some(t) = current {
            let own: Vec<&Field> = self.tables[t.0].primary_key_fields().collect();
            if !own.is_empty() {
                return own;
            }
            current = self.tables[t.0].parent;
        }
        Vec::new()
    }

    /// Like a field lookup, but walking up the inheritance chain.
    #[must_use]
    pub fn inherited_field(&self, id: TableId, name: &str) -> Option<&Field> {
        let mut current = Some(id);
        while let Some(t) = current {
            if let Some(field) = self.tables[t.0].field(name) {
                return Some(field);
            }
            current = self.tables[t.0].parent;
        }
        None
    }

    /// The resolved primary key, synthesizing one when the whole
    /// inheritance chain has none: a `serial` field named `<root>_id`
    /// is appended to the root and becomes the hierarchy's key.
    /// Idempotent; repeated calls never create a second field.
    ///
    /// Fails when the root already declares a plain `<root>_id` field,
    /// which the synthesized key would collide with.
    ///
    /// Returns the key fields as `(name, type)` pairs.
    pub fn get_or_create_primary_key(
        &mut self,
        id: TableId,
    ) -> Result<Vec<(String, TypeToken)>, SemanticError> {
        let existing: Vec<(String, TypeToken)> = self
            .primary_key(id)
            .iter()
            .map(|f| (f.name.clone(), f.ty.clone()))
            .collect();
        if !existing.is_empty() {
            return Ok(existing);
        }
        let root = self.inheritance_root(id);
        let pk_name = format!("{}{IDENTITY_SUFFIX}", self.tables[root.0].name);
        let mut pk = Field::new(pk_name.clone(), TypeToken::new("serial"));
        pk.primary_key = true;
        self.tables[root.0].add_field(pk)?;
        Ok(vec![(pk_name, TypeToken::new("serial"))])
    }

    /// `(schema, table)` display names.
    #[must_use]
    pub fn qualified_name(&self, id: TableId) -> (&str, &str) {
        let table = &self.tables[id.0];
        (&self.schemas[table.schema.0].name, &table.name)
    }

    /// Structural equality: equal schema/table/field/foreign-key/index
    /// sets, ignoring declaration order and display-only direction
    /// hints. This is what round-trip tooling compares.
    #[must_use]
    pub fn equivalent(&self, other: &Database) -> bool {
        self.fingerprint() == other.fingerprint()
    }

    fn fingerprint(&self) -> BTreeSet<String> {
        let mut set = BTreeSet::new();
        for (k, v) in &self.options {
            set.insert(format!("option/{k}={v}"));
        }
        for table in &self.tables {
            let schema = &self.schemas[table.schema.0].name;
            let prefix = format!("{schema}.{}", table.name);
            set.insert(match table.parent {
                Some(p) => {
                    let (ps, pt) = self.qualified_name(p);
                    format!("{prefix}/parent={ps}.{pt}")
                }
                None => format!("{prefix}/parent="),
            });
            for f in &table.fields {
                set.insert(format!(
                    "{prefix}/field/{} {} pk={} nn={} uq={} ix={} def={:?}",
                    f.name, f.ty, f.primary_key, f.non_null, f.unique, f.indexed, f.default
                ));
            }
            for fk in &table.foreign_keys {
                let mut fields = fk.fields.clone();
                fields.sort();
                let (ts, tt) = self.qualified_name(fk.towards);
                set.insert(format!(
                    "{prefix}/fk/{} -> {ts}.{tt} nn={} uq={} casc={}",
                    fields.join(","),
                    fk.non_null,
                    fk.unique,
                    fk.cascade
                ));
            }
            for index in &table.indexes {
                let fields: Vec<&str> = index.fields.iter().map(String::as_str).collect();
                set.insert(format!(
                    "{prefix}/index/{} uq={}",
                    fields.join(","),
                    index.unique
                ));
            }
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_table_db() -> (Database, TableId) {
        let mut db = Database::new("d");
        let s = db.add_schema("s").unwrap();
        let t = db.add_table(s, "book").unwrap();
        (db, t)
    }

    #[test]
    fn test_synthesizes_identity_primary_key() {
        let (mut db, t) = single_table_db();
        let pk = db.get_or_create_primary_key(t).unwrap();
        assert_eq!(pk, vec![("book_id".into(), TypeToken::new("serial"))]);
        let field = db.table(t).field("book_id").unwrap();
        assert!(field.primary_key);
        assert!(field.is_default_key("book"));
    }

    #[test]
    fn test_primary_key_synthesis_is_idempotent() {
        let (mut db, t) = single_table_db();
        let first = db.get_or_create_primary_key(t).unwrap();
        let second = db.get_or_create_primary_key(t).unwrap();
        assert_eq!(first, second);
        assert_eq!(db.table(t).fields().count(), 1);
    }

    #[test]
    fn test_synthesized_key_cannot_shadow_plain_field() {
        let (mut db, t) = single_table_db();
        db.table_mut(t)
            .add_field(Field::new("book_id", TypeToken::new("int")))
            .unwrap();
        let err = db.get_or_create_primary_key(t).unwrap_err();
        assert!(matches!(
            err,
            SemanticError::DuplicateName { kind: "field", .. }
        ));
        // the table keeps exactly the field it declared
        assert_eq!(db.table(t).fields().count(), 1);
    }

    #[test]
    fn test_explicit_primary_key_wins() {
        let (mut db, t) = single_table_db();
        let mut id = Field::new("isbn", TypeToken::new("varchar(13)"));
        id.primary_key = true;
        db.table_mut(t).add_field(id).unwrap();
        let pk = db.get_or_create_primary_key(t).unwrap();
        assert_eq!(pk.len(), 1);
        assert_eq!(pk[0].0, "isbn");
    }

    #[test]
    fn test_synthesis_lands_on_inheritance_root() {
        let mut db = Database::new("d");
        let s = db.add_schema("s").unwrap();
        let parent = db.add_table(s, "media").unwrap();
        let child = db.add_table(s, "book").unwrap();
        db.table_mut(child).parent = Some(parent);

        let pk = db.get_or_create_primary_key(child).unwrap();
        assert_eq!(pk[0].0, "media_id");
        assert!(db.table(parent).field("media_id").is_some());
        assert!(db.table(child).field("media_id").is_none());
        // the child sees the key through the chain
        assert_eq!(db.primary_key(child)[0].name, "media_id");
    }

    #[test]
    fn test_children_is_a_derived_index() {
        let mut db = Database::new("d");
        let s = db.add_schema("s").unwrap();
        let parent = db.add_table(s, "media").unwrap();
        let book = db.add_table(s, "book").unwrap();
        let film = db.add_table(s, "film").unwrap();
        db.table_mut(book).parent = Some(parent);
        db.table_mut(film).parent = Some(parent);

        assert_eq!(db.children(parent), vec![book, film]);
        assert!(db.children(book).is_empty());
        assert_eq!(db.inheritance_root(film), parent);
    }

    #[test]
    fn test_index_memoization_is_idempotent() {
        let (mut db, t) = single_table_db();
        let fields: BTreeSet<String> = ["title".to_string()].into();
        db.table_mut(t).get_or_create_index(fields.clone(), false);
        db.table_mut(t).get_or_create_index(fields, false);
        assert_eq!(db.table(t).indexes().count(), 1);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let (mut db, t) = single_table_db();
        db.table_mut(t)
            .add_field(Field::new("title", TypeToken::new("varchar")))
            .unwrap();
        let err = db
            .table_mut(t)
            .add_field(Field::new("title", TypeToken::new("text")))
            .unwrap_err();
        assert!(matches!(err, SemanticError::DuplicateName { kind: "field", .. }));
        assert!(db.add_schema("s").is_err());
        let s = db.schema_by_name("s").unwrap();
        assert!(db.add_table(s, "book").is_err());
    }

    #[test]
    fn test_qualified_resolution_prefers_explicit_schema() {
        let mut db = Database::new("d");
        let s1 = db.add_schema("main").unwrap();
        let s2 = db.add_schema("aux").unwrap();
        let local = db.add_table(s1, "user").unwrap();
        let remote = db.add_table(s2, "user").unwrap();

        let unqualified = db.find_table(s1, &QualifiedName::local("user")).unwrap();
        assert_eq!(unqualified, local);
        let qualified = db
            .find_table(s1, &QualifiedName::qualified("aux", "user"))
            .unwrap();
        assert_eq!(qualified, remote);
        assert!(matches!(
            db.find_table(s1, &QualifiedName::qualified("nope", "user")),
            Err(SemanticError::UnknownSchema(_))
        ));
        assert!(matches!(
            db.find_table(s2, &QualifiedName::local("ghost")),
            Err(SemanticError::UnknownTable { .. })
        ));
    }

    #[test]
    fn test_enum_token_helpers() {
        let ty = TypeToken::new("enum('a', 'b','c')");
        assert!(ty.is_enum());
        assert_eq!(ty.enum_values(), vec!["a", "b", "c"]);
        assert_eq!(ty.base(), "enum");

        let ty = TypeToken::new("varchar(10)");
        assert!(!ty.is_enum());
        assert_eq!(ty.base(), "varchar");
        assert_eq!(ty.args(), Some("(10)"));

        assert_eq!(TypeToken::new("serial").normalized_identity().as_str(), "int");
        assert_eq!(TypeToken::new("long").normalized_identity().as_str(), "long");
    }

    #[test]
    fn test_equivalence_ignores_declaration_order() {
        let build = |flip: bool| {
            let mut db = Database::new("d");
            let s = db.add_schema("s").unwrap();
            let t = db.add_table(s, "t").unwrap();
            let names = if flip { ["b", "a"] } else { ["a", "b"] };
            for n in names {
                db.table_mut(t)
                    .add_field(Field::new(n, TypeToken::new("int")))
                    .unwrap();
            }
            db
        };
        assert!(build(false).equivalent(&build(true)));
    }
}
