//! The reverse engineer: walks catalog metadata through a provider and
//! rebuilds a semantic model equivalent to what the AST builder would
//! have produced from source text.

use std::collections::{BTreeMap, BTreeSet};

use tabula_core::model::{Database, DefaultValue, Field, ForeignKey, TableId, TypeToken};
use tracing::debug;

use crate::error::ReverseError;
use crate::provider::{ForeignKeyColumn, MetadataProvider};

/// Rebuilds one database model through a metadata provider.
pub struct ReverseEngineer<P> {
    provider: P,
    name: String,
}

impl<P: MetadataProvider> ReverseEngineer<P> {
    /// Creates an engineer for the named database.
    pub fn new(provider: P, name: impl Into<String>) -> Self {
        Self {
            provider,
            name: name.into(),
        }
    }

    /// Runs the full introspection protocol. Queries are strictly
    /// sequential; foreign keys are read last so cross-schema targets
    /// resolve.
    pub async fn process(mut self) -> Result<Database, ReverseError> {
        let mut db = Database::new(&self.name);

        let schemas = self.provider.schemas().await?;
        debug!(schemas = schemas.len(), "reversing catalog");
        for schema_name in &schemas {
            let schema = db.add_schema(schema_name)?;
            for table_name in self.provider.tables(schema_name).await? {
                let table = db.add_table(schema, &table_name)?;
                self.reverse_table(&mut db, table, schema_name, &table_name)
                    .await?;
            }
        }

        for schema_name in &schemas {
            let schema = match db.schema_by_name(schema_name) {
                Some(id) => id,
                None => continue,
            };
            for table in db.tables_in(schema) {
                let table_name = db.table(table).name.clone();
                self.reverse_foreign_keys(&mut db, table, schema_name, &table_name)
                    .await?;
            }
        }
        Ok(db)
    }

    async fn reverse_table(
        &mut self,
        db: &mut Database,
        id: TableId,
        schema: &str,
        table: &str,
    ) -> Result<(), ReverseError> {
        let keys: BTreeSet<String> = self
            .provider
            .primary_key_columns(schema, table)
            .await?
            .into_iter()
            .collect();

        // a column is unique only when it sits under exactly one
        // unique-index name; a second index over it cancels the flag
        let mut index_names: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for row in self.provider.unique_index_columns(schema, table).await? {
            index_names.entry(row.column).or_default().insert(row.index);
        }
        let unique: BTreeSet<&String> = index_names
            .iter()
            .filter(|(_, names)| names.len() == 1)
            .map(|(column, _)| column)
            .collect();

        for column in self.provider.columns(schema, table).await? {
            let mut field = Field::new(&column.name, TypeToken::new(column.ty));
            field.primary_key = keys.contains(&column.name);
            field.non_null = column.non_null;
            field.unique = unique.contains(&column.name);
            field.default = column.default.as_deref().map(classify_default);
            db.table_mut(id).add_field(field)?;
        }
        Ok(())
    }

    async fn reverse_foreign_keys(
        &mut self,
        db: &mut Database,
        id: TableId,
        schema: &str,
        table: &str,
    ) -> Result<(), ReverseError> {
        let rows = self.provider.foreign_key_columns(schema, table).await?;

        // group by constraint name, preserving first-seen order; the
        // cascade flag is read once, from the group's first column
        let mut groups: Vec<(String, Vec<ForeignKeyColumn>)> = Vec::new();
        for row in rows {
            match groups.iter_mut().find(|(name, _)| *name == row.constraint) {
                Some((_, group)) => group.push(row),
                None => groups.push((row.constraint.clone(), vec![row])),
            }
        }

        for (_, group) in groups {
            let first = &group[0];
            let towards_schema = db.schema_by_name(&first.towards_schema).ok_or_else(|| {
                ReverseError::Metadata(format!("could not find schema {}", first.towards_schema))
            })?;
            let towards = db
                .table_by_name(towards_schema, &first.towards_table)
                .ok_or_else(|| {
                    ReverseError::Metadata(format!(
                        "could not find table {}.{}",
                        first.towards_schema, first.towards_table
                    ))
                })?;

            let mut non_null = true;
            let mut any_unique = false;
            let mut fields = Vec::new();
            for row in &group {
                let field = db.table(id).field(&row.column).ok_or_else(|| {
                    ReverseError::Metadata(format!("could not find field {table}.{}", row.column))
                })?;
                non_null &= field.non_null;
                any_unique |= field.unique;
                fields.push(row.column.clone());
            }

            db.table_mut(id).foreign_keys.push(ForeignKey {
                fields,
                towards,
                non_null,
                unique: non_null && any_unique,
                cascade: first.cascade,
                direction: None,
            });
        }
        Ok(())
    }
}

/// Classifies a raw default expression into the model's five-way union.
fn classify_default(raw: &str) -> DefaultValue {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("null") {
        return DefaultValue::Null;
    }
    if raw.eq_ignore_ascii_case("true") {
        return DefaultValue::Boolean(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return DefaultValue::Boolean(false);
    }
    if let Ok(n) = raw.parse::<f64>() {
        return DefaultValue::Number(n);
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return DefaultValue::Text(raw[1..raw.len() - 1].to_string());
    }
    if raw.contains('(') && raw.ends_with(')') {
        return DefaultValue::Call(raw.to_string());
    }
    DefaultValue::Text(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::provider::{ColumnInfo, IndexColumn};

    /// In-memory metadata, keyed by `(schema, table)`.
    #[derive(Default, Clone)]
    struct MockProvider {
        schemas: Vec<String>,
        tables: BTreeMap<String, Vec<String>>,
        columns: BTreeMap<(String, String), Vec<ColumnInfo>>,
        keys: BTreeMap<(String, String), Vec<String>>,
        uniques: BTreeMap<(String, String), Vec<IndexColumn>>,
        foreign_keys: BTreeMap<(String, String), Vec<ForeignKeyColumn>>,
    }

    #[async_trait]
    impl MetadataProvider for MockProvider {
        async fn schemas(&mut self) -> Result<Vec<String>, ReverseError> {
            Ok(self.schemas.clone())
        }

        async fn tables(&mut self, schema: &str) -> Result<Vec<String>, ReverseError> {
            Ok(self.tables.get(schema).cloned().unwrap_or_default())
        }

        async fn columns(
            &mut self,
            schema: &str,
            table: &str,
        ) -> Result<Vec<ColumnInfo>, ReverseError> {
            Ok(self
                .columns
                .get(&(schema.to_string(), table.to_string()))
                .cloned()
                .unwrap_or_default())
        }

        async fn primary_key_columns(
            &mut self,
            schema: &str,
            table: &str,
        ) -> Result<Vec<String>, ReverseError> {
            Ok(self
                .keys
                .get(&(schema.to_string(), table.to_string()))
                .cloned()
                .unwrap_or_default())
        }

        async fn unique_index_columns(
            &mut self,
            schema: &str,
            table: &str,
        ) -> Result<Vec<IndexColumn>, ReverseError> {
            Ok(self
                .uniques
                .get(&(schema.to_string(), table.to_string()))
                .cloned()
                .unwrap_or_default())
        }

        async fn foreign_key_columns(
            &mut self,
            schema: &str,
            table: &str,
        ) -> Result<Vec<ForeignKeyColumn>, ReverseError> {
            Ok(self
                .foreign_keys
                .get(&(schema.to_string(), table.to_string()))
                .cloned()
                .unwrap_or_default())
        }
    }

    fn column(name: &str, ty: &str, non_null: bool) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            ty: ty.to_string(),
            non_null,
            default: None,
            generated: false,
        }
    }

    fn blog_provider() -> MockProvider {
        let mut p = MockProvider {
            schemas: vec!["s".to_string()],
            ..MockProvider::default()
        };
        p.tables.insert(
            "s".to_string(),
            vec!["user".to_string(), "post".to_string()],
        );
        p.columns.insert(
            ("s".to_string(), "user".to_string()),
            vec![
                ColumnInfo {
                    name: "id".to_string(),
                    ty: "serial".to_string(),
                    non_null: true,
                    default: None,
                    generated: true,
                },
                column("email", "varchar(120)", true),
            ],
        );
        p.keys
            .insert(("s".to_string(), "user".to_string()), vec!["id".to_string()]);
        p.uniques.insert(
            ("s".to_string(), "user".to_string()),
            vec![IndexColumn {
                index: "user_email_key".to_string(),
                column: "email".to_string(),
            }],
        );
        p.columns.insert(
            ("s".to_string(), "post".to_string()),
            vec![
                ColumnInfo {
                    name: "id".to_string(),
                    ty: "serial".to_string(),
                    non_null: true,
                    default: None,
                    generated: true,
                },
                column("user_id", "int", true),
                column("body", "varchar(2000)", false),
            ],
        );
        p.keys
            .insert(("s".to_string(), "post".to_string()), vec!["id".to_string()]);
        p.foreign_keys.insert(
            ("s".to_string(), "post".to_string()),
            vec![ForeignKeyColumn {
                constraint: "user".to_string(),
                column: "user_id".to_string(),
                towards_schema: "s".to_string(),
                towards_table: "user".to_string(),
                cascade: true,
            }],
        );
        p
    }

    #[tokio::test]
    async fn test_reverses_tables_fields_and_keys() {
        let db = ReverseEngineer::new(blog_provider(), "blog")
            .process()
            .await
            .unwrap();
        let s = db.schema_by_name("s").unwrap();
        let user = db.table(db.table_by_name(s, "user").unwrap());
        assert!(user.field("id").unwrap().primary_key);
        assert!(user.field("email").unwrap().unique);

        let post = db.table(db.table_by_name(s, "post").unwrap());
        assert!(!post.field("body").unwrap().non_null);
        let fk = &post.foreign_keys[0];
        assert_eq!(fk.fields, vec!["user_id".to_string()]);
        assert!(fk.cascade);
        assert!(fk.non_null);
        assert!(!fk.unique);
    }

    #[tokio::test]
    async fn test_repeated_reversal_is_equivalent() {
        let first = ReverseEngineer::new(blog_provider(), "blog")
            .process()
            .await
            .unwrap();
        // shuffled enumeration order must not change the model
        let mut shuffled = blog_provider();
        shuffled.tables.insert(
            "s".to_string(),
            vec!["post".to_string(), "user".to_string()],
        );
        let second = ReverseEngineer::new(shuffled, "blog").process().await.unwrap();
        assert!(first.equivalent(&second));
    }

    #[tokio::test]
    async fn test_second_unique_index_cancels_uniqueness() {
        let mut p = blog_provider();
        p.uniques
            .get_mut(&("s".to_string(), "user".to_string()))
            .unwrap()
            .push(IndexColumn {
                index: "user_email_other".to_string(),
                column: "email".to_string(),
            });
        let db = ReverseEngineer::new(p, "blog").process().await.unwrap();
        let s = db.schema_by_name("s").unwrap();
        let user = db.table(db.table_by_name(s, "user").unwrap());
        assert!(!user.field("email").unwrap().unique);
    }

    #[tokio::test]
    async fn test_multi_column_constraints_group_by_name() {
        let mut p = blog_provider();
        let post = ("s".to_string(), "post".to_string());
        p.columns
            .get_mut(&post)
            .unwrap()
            .push(column("user_ref", "int", false));
        p.foreign_keys.insert(
            post,
            vec![
                ForeignKeyColumn {
                    constraint: "pair".to_string(),
                    column: "user_id".to_string(),
                    towards_schema: "s".to_string(),
                    towards_table: "user".to_string(),
                    cascade: true,
                },
                ForeignKeyColumn {
                    constraint: "pair".to_string(),
                    column: "user_ref".to_string(),
                    towards_schema: "s".to_string(),
                    towards_table: "user".to_string(),
                    // ignored: cascade comes from the first column
                    cascade: false,
                },
            ],
        );
        let db = ReverseEngineer::new(p, "blog").process().await.unwrap();
        let s = db.schema_by_name("s").unwrap();
        let post = db.table(db.table_by_name(s, "post").unwrap());
        assert_eq!(post.foreign_keys.len(), 1);
        let fk = &post.foreign_keys[0];
        assert_eq!(fk.fields.len(), 2);
        assert!(fk.cascade);
        // one nullable member column makes the whole key nullable
        assert!(!fk.non_null);
    }

    #[tokio::test]
    async fn test_unresolved_target_is_a_metadata_error() {
        let mut p = blog_provider();
        p.foreign_keys.insert(
            ("s".to_string(), "post".to_string()),
            vec![ForeignKeyColumn {
                constraint: "ghost".to_string(),
                column: "user_id".to_string(),
                towards_schema: "s".to_string(),
                towards_table: "ghost".to_string(),
                cascade: false,
            }],
        );
        let err = ReverseEngineer::new(p, "blog").process().await.unwrap_err();
        assert!(matches!(err, ReverseError::Metadata(_)));
    }

    #[test]
    fn test_default_classification() {
        assert_eq!(classify_default("null"), DefaultValue::Null);
        assert_eq!(classify_default("true"), DefaultValue::Boolean(true));
        assert_eq!(classify_default("-3"), DefaultValue::Number(-3.0));
        assert_eq!(
            classify_default("'n/a'"),
            DefaultValue::Text("n/a".to_string())
        );
        assert_eq!(
            classify_default("now()"),
            DefaultValue::Call("now()".to_string())
        );
    }
}
