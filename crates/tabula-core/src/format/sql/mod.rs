//! SQL DDL emission: a shared skeleton with per-dialect capability
//! overrides.
//!
//! [`SqlDialect`] carries default implementations for everything a
//! dialect does not need to customize: identifier transforms, the
//! logical-type map, column/table/constraint rendering and the overall
//! statement ordering. Dialects override the capability flags and the
//! hooks (`define_enum`, `define_inherited_view`, `set_schema`).
//!
//! Output is ASCII, `;`-terminated, and ordered so the statements can
//! run sequentially against an empty target.

pub mod hypersql;
pub mod postgres;

use std::collections::BTreeSet;
use std::fmt::Write;

use crate::error::CapabilityError;
use crate::format::{camel_to_snake, format_number, Formatter};
use crate::model::{
    Database, DefaultValue, Field, ForeignKey, Index, SchemaId, TableId, IDENTITY_SUFFIX,
};

/// Identifier rendering options, shared by all dialects.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlOptions {
    /// Upper-case identifiers after the snake_case transform.
    pub uppercase: bool,
    /// Double-quote generated identifiers.
    pub quoted: bool,
}

/// Function-call defaults rendered as generated stored columns rather
/// than plain defaults.
const GENERATED_FUNCTIONS: &[&str] = &["concat"];

/// One SQL dialect. Everything has a default; a dialect overrides what
/// it must.
pub trait SqlDialect {
    /// Dialect name, for error reporting.
    fn dialect_name(&self) -> &'static str;

    /// Identifier rendering options.
    fn options(&self) -> &SqlOptions;

    /// Whether enumerated-literal types can be emitted.
    fn supports_enums(&self) -> bool {
        false
    }

    /// Whether table inheritance can be emulated.
    fn supports_inheritance(&self) -> bool {
        false
    }

    /// Whether generated constraint and type names are unique per
    /// schema. When false, generated names embed the owning table name
    /// for global uniqueness.
    fn scoped_object_names(&self) -> bool {
        false
    }

    /// Maps a logical type token to the dialect keyword. Unmapped
    /// tokens pass through verbatim.
    fn map_type(&self, token: &str) -> Option<&'static str> {
        Some(match token {
            "datetime" => "timestamp",
            "int" => "integer",
            "long" => "bigint",
            "float" => "real",
            "double" => "double precision",
            _ => return None,
        })
    }

    /// Session schema switch. The base emits nothing.
    fn set_schema(&self, _schema: &str) -> String {
        String::new()
    }

    /// Type definition statements for one enum field.
    fn define_enum(&self, _field: &Field) -> String {
        String::new()
    }

    /// View and write-redirection rules for one derived table.
    fn define_inherited_view(
        &self,
        _db: &Database,
        _table: TableId,
    ) -> Result<String, CapabilityError> {
        Ok(String::new())
    }

    /// snake_case transform plus the optional upper-casing.
    fn ident(&self, name: &str) -> String {
        let snake = camel_to_snake(name);
        if self.options().uppercase {
            snake.to_uppercase()
        } else {
            snake
        }
    }

    /// The identifier quote, or nothing when quoting is off.
    fn q(&self) -> &'static str {
        if self.options().quoted {
            "\""
        } else {
            ""
        }
    }

    /// The physical table name: derived tables materialize as
    /// `base_<table>`.
    fn physical_name(&self, db: &Database, id: TableId) -> String {
        let table = db.table(id);
        let name = self.ident(&table.name);
        if table.parent.is_some() {
            format!("base_{name}")
        } else {
            name
        }
    }

    fn format_database(&self, db: &Database) -> Result<String, CapabilityError> {
        let mut out = format!("-- database {}\n", db.name);
        let mut schemas = Vec::new();
        for (id, _) in db.schemas() {
            schemas.push(self.format_schema(db, id)?);
        }
        out.push_str(&schemas.join("\n"));
        Ok(out)
    }

    fn format_schema(&self, db: &Database, id: SchemaId) -> Result<String, CapabilityError> {
        let q = self.q();
        let name = self.ident(&db.schema(id).name);
        let mut out = format!("\n-- schema {name}\n");
        let _ = writeln!(out, "DROP SCHEMA IF EXISTS {name} CASCADE;");
        let _ = writeln!(out, "CREATE SCHEMA {name};");
        out.push_str(&self.set_schema(&name));

        // one type definition per distinct enum field name
        let mut seen = BTreeSet::new();
        let mut enums = Vec::new();
        for t in db.tables_in(id) {
            for field in db.table(t).fields() {
                if !field.ty.is_enum() {
                    continue;
                }
                if !self.supports_enums() {
                    return Err(CapabilityError::EnumsUnsupported {
                        dialect: self.dialect_name(),
                        field: field.name.clone(),
                    });
                }
                if seen.insert(field.name.clone()) {
                    enums.push(self.define_enum(field));
                }
            }
        }
        out.push_str(&enums.join("\n"));
        out.push('\n');

        let mut tables = Vec::new();
        for t in db.tables_in(id) {
            tables.push(self.format_table(db, t)?);
        }
        out.push_str(&tables.join("\n"));

        for t in db.tables_in(id) {
            for fk in &db.table(t).foreign_keys {
                out.push_str(&self.format_foreign_key(db, t, fk));
            }
        }

        // the implicit child-to-parent key behind the emulation
        for t in db.tables_in(id) {
            let Some(parent) = db.table(t).parent else {
                continue;
            };
            let fields = db.primary_key(parent).iter().map(|f| f.name.clone()).collect();
            let fk = ForeignKey {
                fields,
                towards: parent,
                non_null: true,
                unique: true,
                cascade: true,
                direction: None,
            };
            out.push_str(&self.format_foreign_key(db, t, &fk));
            out.push('\n');
        }

        for t in db.tables_in(id) {
            let table_name = self.physical_name(db, t);
            for index in db.table(t).indexes() {
                out.push_str(&self.format_index(q, &table_name, index));
            }
        }
        Ok(out)
    }

    fn format_table(&self, db: &Database, id: TableId) -> Result<String, CapabilityError> {
        let table = db.table(id);
        let q = self.q();
        if (table.parent.is_some() || !db.children(id).is_empty()) && !self.supports_inheritance() {
            return Err(CapabilityError::InheritanceUnsupported {
                dialect: self.dialect_name(),
                table: table.name.clone(),
            });
        }
        let name = self.physical_name(db, id);
        let mut out = format!("CREATE TABLE {q}{name}{q} (");

        let mut columns: Vec<String> = Vec::new();
        for field in table.primary_key_fields() {
            columns.push(self.format_column(field));
        }
        if let Some(parent) = table.parent {
            // the derived table stores its own copy of the key
            for field in db.primary_key(parent) {
                columns.push(self.format_column(field));
            }
        }
        for field in table.fields().filter(|f| !f.primary_key) {
            columns.push(self.format_column(field));
        }
        if !db.children(id).is_empty() {
            columns.push("  class varchar(30)".to_string());
        }

        let pk: Vec<&Field> = match table.parent {
            Some(parent) => db.primary_key(parent),
            None => table.primary_key_fields().collect(),
        };
        if !pk.is_empty() {
            let names: Vec<String> = pk.iter().map(|f| self.ident(&f.name)).collect();
            columns.push(format!("  PRIMARY KEY ({})", names.join(",")));
        }

        for column in &columns {
            let _ = write!(out, "\n{column},");
        }
        if out.ends_with(',') {
            out.pop();
        }
        out.push_str("\n);\n\n");

        if table.parent.is_some() {
            out.push_str(&self.define_inherited_view(db, id)?);
        }
        Ok(out)
    }

    fn format_column(&self, field: &Field) -> String {
        let mut out = format!("  {}", self.ident(&field.name));
        if field.ty.is_enum() {
            let _ = write!(out, " enum_{}", self.ident(&field.name));
        } else {
            let token = field.ty.as_str();
            let _ = write!(out, " {}", self.map_type(token).unwrap_or(token));
        }
        if field.non_null {
            out.push_str(" NOT NULL");
        }
        if field.unique && !field.primary_key {
            out.push_str(" UNIQUE");
        }
        match &field.default {
            None => {}
            Some(DefaultValue::Null) => out.push_str(" DEFAULT NULL"),
            Some(DefaultValue::Boolean(b)) => {
                let _ = write!(out, " DEFAULT {b}");
            }
            Some(DefaultValue::Number(n)) => {
                let _ = write!(out, " DEFAULT {}", format_number(*n));
            }
            Some(DefaultValue::Text(s)) => {
                // a parenthesized string is taken as an expression
                if s.contains('(') && s.contains(')') {
                    let _ = write!(out, " DEFAULT {s}");
                } else {
                    let _ = write!(out, " DEFAULT '{s}'");
                }
            }
            Some(DefaultValue::Call(raw)) => {
                let callee = raw.split('(').next().unwrap_or("");
                if GENERATED_FUNCTIONS.contains(&callee) {
                    let _ = write!(out, " GENERATED ALWAYS AS ({raw}) STORED");
                } else {
                    let _ = write!(out, " DEFAULT {raw}");
                }
            }
        }
        out
    }

    fn format_foreign_key(&self, db: &Database, from: TableId, fk: &ForeignKey) -> String {
        let Some(first) = fk.fields.first() else {
            return String::new();
        };
        let q = self.q();
        let src = db.table(from);
        let src_name = self.physical_name(db, from);

        let local = self.ident(strip_identity_suffix(first));
        let constraint = if self.scoped_object_names() {
            local
        } else {
            format!("{}_{local}", self.ident(&src.name))
        };

        let fields: Vec<String> = fk.fields.iter().map(|f| self.ident(f)).collect();
        let mut out = format!(
            "ALTER TABLE {q}{src_name}{q} ADD CONSTRAINT {q}{constraint}{q} FOREIGN KEY ({}) REFERENCES ",
            fields.join(",")
        );

        let dst = db.table(fk.towards);
        if dst.schema != src.schema {
            let _ = write!(out, "{q}{}{q}.", self.ident(&db.schema(dst.schema).name));
        }
        let dst_name = self.physical_name(db, fk.towards);
        let pk: Vec<String> = db
            .primary_key(fk.towards)
            .iter()
            .map(|f| self.ident(&f.name))
            .collect();
        let _ = write!(out, "{q}{dst_name}{q} ({})", pk.join(","));
        if fk.cascade {
            out.push_str(" ON DELETE CASCADE");
        }
        out.push_str(";\n");
        out
    }

    fn format_index(&self, q: &str, table_name: &str, index: &Index) -> String {
        let fields: Vec<String> = index.fields.iter().map(|f| self.ident(f)).collect();
        let unique = if index.unique { "UNIQUE " } else { "" };
        format!(
            "CREATE {unique}INDEX {q}{table_name}_{}_idx{q} ON {q}{table_name}{q} ({});\n",
            fields.join("_"),
            fields.join(",")
        )
    }
}

/// `media_id` to `media`; names without the suffix pass through.
fn strip_identity_suffix(name: &str) -> &str {
    match name.strip_suffix(IDENTITY_SUFFIX) {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => name,
    }
}

impl<D: SqlDialect> Formatter for D {
    fn format(&self, db: &Database) -> Result<String, CapabilityError> {
        self.format_database(db)
    }
}
