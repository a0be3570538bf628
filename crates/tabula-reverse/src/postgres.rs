//! PostgreSQL metadata provider, over one `sqlx` connection.
//!
//! Reads `information_schema` where it is sufficient and drops to
//! `pg_catalog` for what it hides (unique indexes, enum values).

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{Connection, PgConnection};
use tracing::debug;

use crate::error::ReverseError;
use crate::filter::{PostgresReverseFilter, ReverseFilter};
use crate::provider::{ColumnInfo, ForeignKeyColumn, IndexColumn, MetadataProvider};

/// Live PostgreSQL catalog access.
pub struct PostgresProvider {
    conn: PgConnection,
    filter: PostgresReverseFilter,
}

/// Views count as tables: the inheritance emulation presents each
/// derived table as a view over its base table.
const LIST_TABLES: &str = "SELECT table_name FROM information_schema.tables
     WHERE table_schema = $1 AND table_type IN ('BASE TABLE', 'VIEW')
     ORDER BY table_name";

impl PostgresProvider {
    /// Connects and preloads the enum value map, so user-defined enum
    /// types can be expanded without a per-column round trip.
    pub async fn connect(url: &str) -> Result<Self, ReverseError> {
        let mut conn = PgConnection::connect(url)
            .await
            .map_err(ReverseError::Connectivity)?;

        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT t.typname, e.enumlabel
             FROM pg_type t JOIN pg_enum e ON e.enumtypid = t.oid
             ORDER BY t.typname, e.enumsortorder",
        )
        .fetch_all(&mut conn)
        .await
        .map_err(ReverseError::query)?;

        let mut enums: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (ty, label) in rows {
            enums.entry(ty).or_default().push(label);
        }
        debug!(enums = enums.len(), "connected to postgres catalog");

        Ok(Self {
            conn,
            filter: PostgresReverseFilter::new(enums),
        })
    }

    /// Maps a vendor type to its logical token. `USER-DEFINED` resolves
    /// through `udt_name`, which the filter then expands if it is an
    /// enum type.
    fn logical_type(
        data_type: &str,
        udt_name: &str,
        max_length: Option<i32>,
        precision: Option<i32>,
        scale: Option<i32>,
    ) -> Option<String> {
        let token = match data_type {
            "integer" => "int".to_string(),
            "bigint" => "long".to_string(),
            "smallint" => "short".to_string(),
            "real" => "float".to_string(),
            "double precision" => "double".to_string(),
            "timestamp without time zone" | "timestamp with time zone" => "datetime".to_string(),
            "bytea" => "blob".to_string(),
            "character varying" => match max_length {
                Some(n) => format!("varchar({n})"),
                None => "varchar".to_string(),
            },
            "numeric" => match (precision, scale) {
                (Some(p), Some(s)) => format!("numeric({p},{s})"),
                _ => "numeric".to_string(),
            },
            "text" | "uuid" | "date" | "boolean" => data_type.to_string(),
            "USER-DEFINED" => udt_name.to_string(),
            _ => return None,
        };
        Some(token)
    }
}

#[async_trait]
impl MetadataProvider for PostgresProvider {
    async fn schemas(&mut self) -> Result<Vec<String>, ReverseError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT schema_name FROM information_schema.schemata
             WHERE schema_name NOT IN ('information_schema', 'pg_catalog', 'pg_toast')
             ORDER BY schema_name",
        )
        .fetch_all(&mut self.conn)
        .await
        .map_err(ReverseError::query)?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn tables(&mut self, schema: &str) -> Result<Vec<String>, ReverseError> {
        let rows: Vec<(String,)> = sqlx::query_as(LIST_TABLES)
            .bind(schema)
            .fetch_all(&mut self.conn)
            .await
            .map_err(ReverseError::query)?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn columns(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnInfo>, ReverseError> {
        let rows: Vec<(
            String,
            String,
            String,
            String,
            Option<String>,
            Option<i32>,
            Option<i32>,
            Option<i32>,
            String,
            Option<String>,
        )> = sqlx::query_as(
            "SELECT column_name, data_type, udt_name, is_nullable, column_default,
                    character_maximum_length, numeric_precision, numeric_scale,
                    is_generated, generation_expression
             FROM information_schema.columns
             WHERE table_schema = $1 AND table_name = $2
             ORDER BY ordinal_position",
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&mut self.conn)
        .await
        .map_err(ReverseError::query)?;

        let mut columns = Vec::with_capacity(rows.len());
        for (name, data_type, udt_name, nullable, default, max_len, prec, scale, generated, expr) in
            rows
        {
            let ty = Self::logical_type(&data_type, &udt_name, max_len, prec, scale).ok_or_else(
                || ReverseError::UnmappedType {
                    table: table.to_string(),
                    column: name.clone(),
                    ty: data_type.clone(),
                },
            )?;
            let generated = generated == "ALWAYS";
            // a generated column keeps its expression as the default,
            // so the computed value survives re-formatting
            let default = if generated { expr } else { default };
            let (ty, default) = self.filter.filter_type(&name, ty, default);
            columns.push(ColumnInfo {
                name,
                non_null: nullable == "NO" || ty == "serial",
                ty,
                default,
                generated,
            });
        }
        Ok(columns)
    }

    async fn primary_key_columns(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<String>, ReverseError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT kcu.column_name
             FROM information_schema.table_constraints tc
             JOIN information_schema.key_column_usage kcu
               ON kcu.constraint_name = tc.constraint_name
              AND kcu.constraint_schema = tc.constraint_schema
             WHERE tc.table_schema = $1 AND tc.table_name = $2
               AND tc.constraint_type = 'PRIMARY KEY'
             ORDER BY kcu.ordinal_position",
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&mut self.conn)
        .await
        .map_err(ReverseError::query)?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn unique_index_columns(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<IndexColumn>, ReverseError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT ic.relname, a.attname
             FROM pg_index i
             JOIN pg_class c ON c.oid = i.indrelid
             JOIN pg_class ic ON ic.oid = i.indexrelid
             JOIN pg_namespace n ON n.oid = c.relnamespace
             JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = ANY (i.indkey)
             WHERE n.nspname = $1 AND c.relname = $2
               AND i.indisunique AND NOT i.indisprimary
             ORDER BY ic.relname, a.attnum",
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&mut self.conn)
        .await
        .map_err(ReverseError::query)?;
        Ok(rows
            .into_iter()
            .map(|(index, column)| IndexColumn { index, column })
            .collect())
    }

    async fn foreign_key_columns(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ForeignKeyColumn>, ReverseError> {
        let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT tc.constraint_name, kcu.column_name,
                    ccu.table_schema, ccu.table_name, rc.delete_rule
             FROM information_schema.table_constraints tc
             JOIN information_schema.key_column_usage kcu
               ON kcu.constraint_name = tc.constraint_name
              AND kcu.constraint_schema = tc.constraint_schema
             JOIN information_schema.constraint_column_usage ccu
               ON ccu.constraint_name = tc.constraint_name
              AND ccu.constraint_schema = tc.constraint_schema
             JOIN information_schema.referential_constraints rc
               ON rc.constraint_name = tc.constraint_name
              AND rc.constraint_schema = tc.constraint_schema
             WHERE tc.table_schema = $1 AND tc.table_name = $2
               AND tc.constraint_type = 'FOREIGN KEY'
             ORDER BY tc.constraint_name, kcu.ordinal_position",
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&mut self.conn)
        .await
        .map_err(ReverseError::query)?;
        Ok(rows
            .into_iter()
            .map(
                |(constraint, column, towards_schema, towards_table, delete_rule)| {
                    ForeignKeyColumn {
                        constraint,
                        column,
                        towards_schema,
                        towards_table,
                        cascade: delete_rule == "CASCADE",
                    }
                },
            )
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_type_mapping() {
        let t = |dt: &str| PostgresProvider::logical_type(dt, "", None, None, None);
        assert_eq!(t("integer").as_deref(), Some("int"));
        assert_eq!(t("bigint").as_deref(), Some("long"));
        assert_eq!(t("double precision").as_deref(), Some("double"));
        assert_eq!(t("timestamp without time zone").as_deref(), Some("datetime"));
        assert_eq!(t("bytea").as_deref(), Some("blob"));
        assert_eq!(t("money"), None);
    }

    #[test]
    fn test_parameterized_types_keep_arguments() {
        assert_eq!(
            PostgresProvider::logical_type("character varying", "", Some(30), None, None)
                .as_deref(),
            Some("varchar(30)")
        );
        assert_eq!(
            PostgresProvider::logical_type("numeric", "", None, Some(8), Some(2)).as_deref(),
            Some("numeric(8,2)")
        );
    }

    #[test]
    fn test_table_listing_covers_views() {
        assert!(LIST_TABLES.contains("'BASE TABLE'"));
        assert!(LIST_TABLES.contains("'VIEW'"));
    }

    #[test]
    fn test_user_defined_resolves_through_udt_name() {
        assert_eq!(
            PostgresProvider::logical_type("USER-DEFINED", "enum_mode", None, None, None)
                .as_deref(),
            Some("enum_mode")
        );
    }
}
