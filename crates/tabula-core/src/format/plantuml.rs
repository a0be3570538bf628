//! Diagram notation: one class per table, creole-decorated field names
//! (bold primary keys, italic nullable fields), relationship edges with
//! multiplicity, cascade and direction glyphs.

use std::fmt::Write;

use crate::error::CapabilityError;
use crate::format::Formatter;
use crate::model::{Database, Field, ForeignKey, Table, TableId, IDENTITY_SUFFIX};

const BOLD: &str = "**";
const ITALIC: &str = "//";

/// PlantUML class-diagram formatter.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlantUmlFormatter;

impl Formatter for PlantUmlFormatter {
    fn format(&self, db: &Database) -> Result<String, CapabilityError> {
        Ok(render(db))
    }
}

fn render(db: &Database) -> String {
    let mut out = format!("@startuml\n'' Database {}\n", db.name);

    let packages: Vec<String> = db
        .schemas()
        .map(|(id, schema)| {
            let mut pkg = format!("package {} {{\n", schema.name);
            let tables: Vec<String> = db
                .tables_in(id)
                .into_iter()
                .filter(|&t| db.table(t).join_sides.is_none())
                .map(|t| render_table(db, t))
                .collect();
            pkg.push_str(&tables.join("\n"));
            pkg.push_str("}\n");
            pkg
        })
        .collect();
    out.push_str(&packages.join("\n"));

    for id in db.table_ids() {
        for fk in &db.table(id).foreign_keys {
            render_edge(db, id, fk, &mut out);
        }
    }

    out.push_str(" hide methods\n@enduml\n");
    out
}

fn render_table(db: &Database, id: TableId) -> String {
    let table = db.table(id);
    let mut out = format!("  class {}", table.name);

    let fields: Vec<&Field> = table
        .fields()
        .filter(|f| !f.is_default_key(&table.name) && !is_implicit_link_field(db, table, f))
        .collect();
    if !fields.is_empty() {
        out.push_str(" {");
        for field in fields {
            out.push('\n');
            out.push_str("    {field} ");
            render_field(field, &mut out);
        }
        out.push_str("\n  }");
    }
    out.push('\n');

    if let Some(parent) = table.parent {
        let label = table.parent_label.as_deref().unwrap_or("");
        let _ = writeln!(
            out,
            "  {} -{label}-|> {}",
            table.name,
            db.table(parent).name
        );
    }
    out
}

fn render_field(field: &Field, out: &mut String) {
    if !field.non_null {
        out.push_str(ITALIC);
    } else if field.primary_key {
        out.push_str(BOLD);
    }
    out.push_str(&field.name);
    if field.primary_key && field.non_null {
        out.push_str(BOLD);
    }
    if field.ty.is_enum() {
        let _ = write!(out, " {}", field.ty.enum_values().join("|"));
    } else {
        let _ = write!(out, " {}", field.ty);
    }
    if !field.non_null {
        out.push_str(ITALIC);
    }
}

fn render_edge(db: &Database, from: TableId, fk: &ForeignKey, out: &mut String) {
    let table = db.table(from);
    let line = if fk.non_null { '-' } else { '.' };
    let label = fk.direction.as_deref().unwrap_or("");

    if let Some((left, right)) = table.join_sides {
        // one edge per join table, drawn from its first side
        if fk.towards == left {
            let _ = writeln!(
                out,
                "  {} }}{line}{label}{line}{{ {}",
                db.table(left).name,
                db.table(right).name
            );
        }
        return;
    }

    let _ = write!(out, "  {} ", table.name);
    if !fk.unique {
        out.push('}');
    }
    let _ = write!(out, "{line}{label}{line}> {}", db.table(fk.towards).name);
    if is_named_link(db, table, fk) {
        if let Some(name) = fk.fields.first() {
            let role = name.strip_suffix(IDENTITY_SUFFIX).unwrap_or(name);
            if role != db.table(fk.towards).name {
                let _ = write!(out, " : {role}");
            }
        }
    }
    out.push('\n');
}

/// An implicit link field is an exact single-field copy of the target's
/// primary key; it is elided from the class body since the edge already
/// carries the information.
fn is_implicit_link_field(db: &Database, table: &Table, field: &Field) -> bool {
    let fks: Vec<&ForeignKey> = table.foreign_keys_of(&field.name).collect();
    let [fk] = fks.as_slice() else {
        return false;
    };
    if fk.fields.len() != 1 {
        return false;
    }
    let pk = db.primary_key(fk.towards);
    let Some(pk) = pk.first() else {
        return false;
    };
    field.name == pk.name && (field.ty == pk.ty || field.ty.as_str() == "int")
}

/// Whether the edge deserves a role label: the key field is not a plain
/// copy of the target's primary key.
fn is_named_link(db: &Database, table: &Table, fk: &ForeignKey) -> bool {
    let [name] = fk.fields.as_slice() else {
        return false;
    };
    let Some(field) = table.field(name) else {
        return false;
    };
    let pk = db.primary_key(fk.towards);
    let Some(pk) = pk.first() else {
        return false;
    };
    field.ty != pk.ty && field.ty.as_str() != "int"
        || field.default.is_some()
        || field.name != pk.name
}
