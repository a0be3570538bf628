//! The narrow interface the reverse engineer introspects through.
//!
//! A provider wraps one live connection and answers a strictly
//! sequential series of metadata questions; each call drains its result
//! fully before returning. What counts as a "schema" is provider
//! business (some vendors expose catalogs instead).

use async_trait::async_trait;

use crate::error::ReverseError;

/// One column, as reported by the catalog after vendor filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Logical type token, e.g. `varchar(30)` or `serial`.
    pub ty: String,
    /// NOT NULL.
    pub non_null: bool,
    /// Raw default expression, if any.
    pub default: Option<String>,
    /// Generated or auto-increment column.
    pub generated: bool,
}

/// One row of a unique index listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    /// Index name.
    pub index: String,
    /// Member column name.
    pub column: String,
}

/// One column of a foreign-key constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyColumn {
    /// Constraint name; multi-column keys share it.
    pub constraint: String,
    /// Constrained column in the owning table.
    pub column: String,
    /// Referenced schema.
    pub towards_schema: String,
    /// Referenced table.
    pub towards_table: String,
    /// ON DELETE CASCADE.
    pub cascade: bool,
}

/// Catalog metadata access for one database vendor.
#[async_trait]
pub trait MetadataProvider {
    /// User schemas, system objects excluded.
    async fn schemas(&mut self) -> Result<Vec<String>, ReverseError>;

    /// Tables and views of one schema, system objects excluded.
    async fn tables(&mut self, schema: &str) -> Result<Vec<String>, ReverseError>;

    /// Columns of one table, in ordinal position order.
    async fn columns(&mut self, schema: &str, table: &str)
        -> Result<Vec<ColumnInfo>, ReverseError>;

    /// Primary-key column names of one table.
    async fn primary_key_columns(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<String>, ReverseError>;

    /// `(index, column)` pairs of the table's unique indexes, primary
    /// key excluded.
    async fn unique_index_columns(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<IndexColumn>, ReverseError>;

    /// Foreign-key constraint columns of one table.
    async fn foreign_key_columns(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ForeignKeyColumn>, ReverseError>;
}
