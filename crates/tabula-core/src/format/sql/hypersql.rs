//! HyperSQL dialect: no enum types, no inheritance emulation, and
//! globally unique generated names.

use crate::format::sql::{SqlDialect, SqlOptions};

/// The HyperSQL (HSQLDB) formatter.
#[derive(Debug, Default, Clone, Copy)]
pub struct HyperSqlDialect {
    options: SqlOptions,
}

impl HyperSqlDialect {
    /// Creates the dialect with the given identifier options.
    #[must_use]
    pub const fn new(options: SqlOptions) -> Self {
        Self { options }
    }
}

impl SqlDialect for HyperSqlDialect {
    fn dialect_name(&self) -> &'static str {
        "hypersql"
    }

    fn options(&self) -> &SqlOptions {
        &self.options
    }

    fn map_type(&self, token: &str) -> Option<&'static str> {
        Some(match token {
            "datetime" => "timestamp",
            "int" => "integer",
            "long" => "bigint",
            "float" => "real",
            "double" => "double precision",
            "blob" => "longvarbinary",
            "text" | "clob" => "longvarchar",
            _ => return None,
        })
    }

    fn set_schema(&self, schema: &str) -> String {
        format!("SET SCHEMA {schema};\n")
    }
}
