//! Canonical notation: pretty-printed re-serialization in the input
//! language. Feeding the output back through parse and build yields an
//! equivalent model, which is what round-trip tooling relies on.

use std::fmt::Write;

use crate::error::CapabilityError;
use crate::format::{format_number, Formatter};
use crate::model::{Database, DefaultValue, Field, ForeignKey, Table, TableId};

/// Formatter for the schema description language itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn format(&self, db: &Database) -> Result<String, CapabilityError> {
        Ok(render(db))
    }
}

fn render(db: &Database) -> String {
    let mut out = format!("database {} {{\n", db.name);
    for (name, value) in db.options() {
        let _ = writeln!(out, "  option {name} = {value}");
    }
    for (id, schema) in db.schemas() {
        let _ = writeln!(out, "  schema {} {{", schema.name);
        for table in db.tables_in(id) {
            render_table(db, table, &mut out);
        }
        out.push_str("  }\n");
    }
    out.push_str("}\n");
    out
}

fn render_table(db: &Database, id: TableId, out: &mut String) {
    let table = db.table(id);
    let _ = write!(out, "    table {}", table.name);
    if let Some(parent) = table.parent {
        let (parent_schema, parent_name) = db.qualified_name(parent);
        out.push_str(" : ");
        if parent_schema != db.schema(table.schema).name {
            let _ = write!(out, "{parent_schema}.");
        }
        out.push_str(parent_name);
        if let Some(label) = &table.parent_label {
            let _ = write!(out, " ({label})");
        }
    }
    out.push_str(" {\n");
    for field in table.fields() {
        render_field(db, table, field, out);
    }
    out.push_str("    }\n");
}

fn render_field(db: &Database, table: &Table, field: &Field, out: &mut String) {
    out.push_str("      ");
    if field.primary_key {
        out.push('*');
    } else if field.unique {
        out.push('!');
    } else if field.indexed {
        out.push('+');
    }
    out.push_str(&field.name);

    match single_field_key(table, &field.name) {
        Some(fk) => {
            out.push_str(" -> ");
            if let Some(label) = &fk.direction {
                let _ = write!(out, "({label}) ");
            }
            let (target_schema, target_name) = db.qualified_name(fk.towards);
            if target_schema != db.schema(table.schema).name {
                let _ = write!(out, "{target_schema}.");
            }
            out.push_str(target_name);
            if !field.non_null {
                out.push('?');
            }
            if fk.cascade {
                out.push_str(" cascade");
            }
        }
        None => {
            let _ = write!(out, " {}", field.ty);
            if !field.non_null {
                out.push('?');
            }
            if let Some(alias) = &field.alias {
                let _ = write!(out, " as {alias}");
            }
            if let Some(default) = &field.default {
                let _ = write!(out, " = {}", render_default(default));
            }
        }
    }
    out.push('\n');
}

/// The foreign key a field re-serializes as a reference, if any.
fn single_field_key<'a>(table: &'a Table, field: &'a str) -> Option<&'a ForeignKey> {
    table.foreign_keys_of(field).find(|fk| fk.fields.len() == 1)
}

fn render_default(default: &DefaultValue) -> String {
    match default {
        DefaultValue::Null => "null".to_string(),
        DefaultValue::Boolean(b) => b.to_string(),
        DefaultValue::Number(n) => format_number(*n),
        DefaultValue::Text(s) => format!("'{s}'"),
        DefaultValue::Call(raw) => raw.clone(),
    }
}
