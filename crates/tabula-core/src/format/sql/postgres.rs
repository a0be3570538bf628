//! PostgreSQL dialect: native enum types with an implicit varchar cast,
//! and inheritance emulated with a base table, a reconstructing view
//! and write-redirecting rules.

use std::fmt::Write;

use crate::error::CapabilityError;
use crate::format::sql::{SqlDialect, SqlOptions};
use crate::model::{Database, Field, TableId};

/// The PostgreSQL formatter.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect {
    options: SqlOptions,
}

impl PostgresDialect {
    /// Creates the dialect with the given identifier options.
    #[must_use]
    pub const fn new(options: SqlOptions) -> Self {
        Self { options }
    }
}

impl SqlDialect for PostgresDialect {
    fn dialect_name(&self) -> &'static str {
        "postgresql"
    }

    fn options(&self) -> &SqlOptions {
        &self.options
    }

    fn supports_enums(&self) -> bool {
        true
    }

    fn supports_inheritance(&self) -> bool {
        true
    }

    fn scoped_object_names(&self) -> bool {
        true
    }

    fn map_type(&self, token: &str) -> Option<&'static str> {
        Some(match token {
            "datetime" => "timestamp",
            "int" => "integer",
            "long" => "bigint",
            "float" => "real",
            "double" => "double precision",
            "blob" => "bytea",
            _ => return None,
        })
    }

    fn set_schema(&self, schema: &str) -> String {
        format!("SET search_path TO {schema};\n")
    }

    fn define_enum(&self, field: &Field) -> String {
        let q = self.q();
        let name = self.ident(&format!("enum_{}", field.name));
        format!(
            "CREATE TYPE {q}{name}{q} AS ENUM {args};\nCREATE CAST (varchar AS {q}{name}{q}) WITH INOUT AS IMPLICIT;",
            args = field.ty.args().unwrap_or("()")
        )
    }

    fn define_inherited_view(
        &self,
        db: &Database,
        id: TableId,
    ) -> Result<String, CapabilityError> {
        let table = db.table(id);
        let Some(parent_id) = table.parent else {
            return Ok(String::new());
        };
        let parent = db.table(parent_id);
        let q = self.q();

        let pk_fields = db.primary_key(parent_id);
        let [pk] = pk_fields.as_slice() else {
            return Err(CapabilityError::CompositeInheritedKey {
                table: table.name.clone(),
            });
        };
        let pk_name = self.ident(&pk.name);

        let view = self.ident(&table.name);
        let base = format!("base_{view}");
        let parent_name = format!("{q}{}{q}", self.ident(&parent.name));
        let qualified_parent = if table.schema == parent.schema {
            parent_name.clone()
        } else {
            format!("{q}{}{q}.{parent_name}", self.ident(&db.schema(parent.schema).name))
        };

        let parent_cols: Vec<String> = parent
            .fields()
            .filter(|f| !f.primary_key)
            .map(|f| self.ident(&f.name))
            .collect();
        let child_cols: Vec<String> = table.fields().map(|f| self.ident(&f.name)).collect();

        // the view reassembles one logical row from the two tables
        let mut out = format!("CREATE VIEW {q}{view}{q} AS\n  SELECT\n    ");
        let _ = write!(out, "{parent_name}.{pk_name}");
        if !parent_cols.is_empty() {
            let _ = write!(out, ",{}", parent_cols.join(","));
        }
        out.push_str(",class");
        if !child_cols.is_empty() {
            let _ = write!(out, ",\n    {}", child_cols.join(","));
        }
        let _ = write!(
            out,
            "\n  FROM {q}{base}{q} JOIN {qualified_parent} ON {parent_name}.{pk_name} = {q}{base}{q}.{pk_name};\n\n"
        );

        let parent_values: Vec<String> = parent
            .fields()
            .filter(|f| !f.primary_key)
            .map(|f| format!("NEW.{}", self.ident(&f.name)))
            .collect();
        let child_values: Vec<String> = table
            .fields()
            .map(|f| format!("NEW.{}", self.ident(&f.name)))
            .collect();

        let _ = writeln!(
            out,
            "CREATE RULE {q}insert_{view}{q} AS ON INSERT TO {q}{view}{q} DO INSTEAD ("
        );
        let mut parent_ins_cols = vec![pk_name.clone()];
        parent_ins_cols.extend(parent_cols.iter().cloned());
        parent_ins_cols.push("class".to_string());
        let mut base_ins_cols = vec![pk_name.clone()];
        base_ins_cols.extend(child_cols.iter().cloned());

        if pk.ty.is_identity() {
            let mut seq = format!("{}_{pk_name}_seq", self.ident(&parent.name));
            if table.schema != parent.schema {
                seq = format!("{q}{}{q}.{seq}", self.ident(&db.schema(parent.schema).name));
            }
            let mut values = vec![format!("COALESCE(NEW.{pk_name},NEXTVAL('{seq}'))")];
            values.extend(parent_values.iter().cloned());
            values.push(format!("'{view}'"));
            let _ = write!(
                out,
                "  INSERT INTO {qualified_parent} ({})\n    VALUES ({})\n",
                parent_ins_cols.join(","),
                values.join(",")
            );
            let _ = write!(out, "  RETURNING {qualified_parent}.*");
            for field in table.fields() {
                let _ = write!(out, ",{}", self.null_cast(field));
            }
            out.push_str(";\n");
            let _ = writeln!(
                out,
                "  SELECT SETVAL('{seq}', (SELECT MAX({pk_name}) FROM {qualified_parent})) {pk_name};"
            );
            let mut values = vec![format!("CURRVAL('{seq}')")];
            values.extend(child_values.iter().cloned());
            let _ = write!(
                out,
                "  INSERT INTO {q}{base}{q} ({})\n    VALUES ({});\n",
                base_ins_cols.join(","),
                values.join(",")
            );
        } else {
            let mut values = vec![format!("NEW.{pk_name}")];
            values.extend(parent_values.iter().cloned());
            values.push(format!("'{view}'"));
            let _ = write!(
                out,
                "  INSERT INTO {qualified_parent} ({})\n    VALUES ({});\n",
                parent_ins_cols.join(","),
                values.join(",")
            );
            let mut values = vec![format!("NEW.{pk_name}")];
            values.extend(child_values.iter().cloned());
            let _ = write!(
                out,
                "  INSERT INTO {q}{base}{q} ({})\n    VALUES ({});\n",
                base_ins_cols.join(","),
                values.join(",")
            );
        }
        out.push_str(");\n");

        let parent_assigns: Vec<String> = parent_cols
            .iter()
            .map(|c| format!("{c} = NEW.{c}"))
            .collect();
        let child_assigns: Vec<String> = child_cols
            .iter()
            .map(|c| format!("{c} = NEW.{c}"))
            .collect();
        let _ = writeln!(
            out,
            "CREATE RULE {q}update_{view}{q} AS ON UPDATE TO {q}{view}{q} DO INSTEAD ("
        );
        if !parent_assigns.is_empty() {
            let _ = write!(
                out,
                "  UPDATE {qualified_parent}\n    SET {}\n    WHERE {pk_name} = NEW.{pk_name}\n  RETURNING NEW.*;\n",
                parent_assigns.join(",")
            );
        }
        if !child_assigns.is_empty() {
            let _ = write!(
                out,
                "  UPDATE {q}{base}{q}\n    SET {}\n    WHERE {pk_name} = NEW.{pk_name};\n",
                child_assigns.join(",")
            );
        }
        out.push_str(");\n");

        let _ = writeln!(
            out,
            "CREATE RULE {q}delete_{view}{q} AS ON DELETE TO {q}{view}{q} DO INSTEAD ("
        );
        // the base row goes away through the cascading key
        let _ = write!(
            out,
            "  DELETE FROM {qualified_parent} WHERE {pk_name} = OLD.{pk_name};\n);\n\n"
        );
        Ok(out)
    }
}

impl PostgresDialect {
    /// A typed null for padding the insert rule's RETURNING row with
    /// the child-only columns.
    fn null_cast(&self, field: &Field) -> String {
        let ty = field.ty.as_str();
        if ty.starts_with("varchar") {
            "null::varchar".to_string()
        } else if field.ty.is_enum() {
            format!("null::enum_{}", self.ident(&field.name))
        } else {
            let mapped = match ty {
                "float" => "real",
                "double" => "float",
                "int" => "integer",
                other => other,
            };
            format!("null::{mapped}")
        }
    }
}
