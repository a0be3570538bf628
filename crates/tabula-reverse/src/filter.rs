//! Vendor filters: rewrite raw `(type, default)` pairs into logical
//! tokens before classification.

use std::collections::BTreeMap;

/// A per-vendor rewrite of raw column metadata.
pub trait ReverseFilter {
    /// Rewrites one column's type token and default expression.
    fn filter_type(
        &self,
        _column: &str,
        ty: String,
        default: Option<String>,
    ) -> (String, Option<String>) {
        (ty, default)
    }
}

/// The identity filter, for vendors needing no rewrite.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFilter;

impl ReverseFilter for NoFilter {}

/// PostgreSQL rewrites: sequence-backed defaults become the `serial`
/// logical type, casts are stripped from default expressions, and
/// user-defined enum type names expand to their value lists.
#[derive(Debug, Default, Clone)]
pub struct PostgresReverseFilter {
    enums: BTreeMap<String, Vec<String>>,
}

impl PostgresReverseFilter {
    /// Creates the filter over a preloaded `pg_enum` value map, keyed
    /// by type name.
    #[must_use]
    pub fn new(enums: BTreeMap<String, Vec<String>>) -> Self {
        Self { enums }
    }
}

impl ReverseFilter for PostgresReverseFilter {
    fn filter_type(
        &self,
        _column: &str,
        ty: String,
        default: Option<String>,
    ) -> (String, Option<String>) {
        if default.as_deref().is_some_and(|d| d.starts_with("nextval(")) {
            return ("serial".to_string(), None);
        }
        let default = default.map(|d| match d.find("::") {
            Some(pos) => d[..pos].to_string(),
            None => d,
        });
        if let Some(values) = self.enums.get(&ty) {
            let list: Vec<String> = values.iter().map(|v| format!("'{v}'")).collect();
            return (format!("enum({})", list.join(",")), default);
        }
        (ty, default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_default_becomes_serial() {
        let filter = PostgresReverseFilter::default();
        let (ty, default) = filter.filter_type(
            "id",
            "int".to_string(),
            Some("nextval('t_id_seq'::regclass)".to_string()),
        );
        assert_eq!(ty, "serial");
        assert_eq!(default, None);
    }

    #[test]
    fn test_cast_is_stripped() {
        let filter = PostgresReverseFilter::default();
        let (ty, default) = filter.filter_type(
            "note",
            "varchar(20)".to_string(),
            Some("'n/a'::character varying".to_string()),
        );
        assert_eq!(ty, "varchar(20)");
        assert_eq!(default.as_deref(), Some("'n/a'"));
    }

    #[test]
    fn test_enum_type_expands_to_values() {
        let enums = BTreeMap::from([(
            "enum_mode".to_string(),
            vec!["human".to_string(), "bot".to_string()],
        )]);
        let filter = PostgresReverseFilter::new(enums);
        let (ty, _) = filter.filter_type("mode", "enum_mode".to_string(), None);
        assert_eq!(ty, "enum('human','bot')");
    }
}
