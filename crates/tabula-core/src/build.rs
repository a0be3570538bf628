//! The AST builder: one walk over the parse tree producing a closed,
//! self-consistent [`Database`].
//!
//! The walk resolves qualified names against the enclosing schema,
//! infers missing primary keys (which can grow referenced tables as a
//! side effect), synthesizes foreign keys for reference fields and
//! schema-level links, and classifies default literals. There is no
//! partial-result mode: the first unresolved name or underivable type
//! aborts the build.

use std::collections::BTreeSet;

use crate::error::SemanticError;
use crate::model::{Database, DefaultValue, Field, ForeignKey, SchemaId, TableId, TypeToken};
use crate::syntax::{
    DatabaseDecl, DefaultExpr, FieldDecl, LinkDecl, Multiplicity, SchemaDecl, TableDecl,
};

/// Builds a semantic model from a parse tree.
pub fn build(decl: &DatabaseDecl) -> Result<Database, SemanticError> {
    let mut db = Database::new(&decl.name);
    for (name, value) in &decl.options {
        db.set_option(name, value);
    }
    for schema_decl in &decl.schemas {
        let schema = db.add_schema(&schema_decl.name)?;
        build_schema(&mut db, schema, schema_decl)?;
    }
    Ok(db)
}

fn build_schema(
    db: &mut Database,
    schema: SchemaId,
    decl: &SchemaDecl,
) -> Result<(), SemanticError> {
    for table_decl in &decl.tables {
        build_table(db, schema, table_decl)?;
    }
    // links are processed after all of the schema's tables exist
    for link in &decl.links {
        build_link(db, schema, link)?;
    }
    Ok(())
}

fn build_table(
    db: &mut Database,
    schema: SchemaId,
    decl: &TableDecl,
) -> Result<(), SemanticError> {
    let parent = match &decl.parent {
        Some(name) => Some(db.find_table(schema, name)?),
        None => None,
    };
    let table = db.add_table(schema, &decl.name)?;
    db.table_mut(table).parent = parent;
    db.table_mut(table).parent_label = decl.parent_label.clone();

    for field_decl in &decl.fields {
        build_field(db, schema, table, field_decl)?;
    }
    Ok(())
}

fn build_field(
    db: &mut Database,
    schema: SchemaId,
    table: TableId,
    decl: &FieldDecl,
) -> Result<(), SemanticError> {
    if let Some(reference) = &decl.reference {
        // reference field: the type comes from the target's primary key,
        // which is synthesized on demand
        let towards = db.find_table(schema, reference)?;
        let target_pk = db.get_or_create_primary_key(towards)?;
        let ty = target_pk[0].1.normalized_identity();

        let mut field = Field::new(&decl.name, ty);
        field.primary_key = decl.primary_key;
        field.non_null = !decl.optional;
        field.unique = decl.unique;
        field.indexed = decl.indexed;
        db.table_mut(table).add_field(field)?;

        db.table_mut(table).foreign_keys.push(ForeignKey {
            fields: vec![decl.name.clone()],
            towards,
            non_null: !decl.optional,
            unique: decl.unique,
            cascade: decl.cascade,
            direction: decl.direction.clone(),
        });
    } else {
        let default = decl.default.as_ref().map(classify_default);
        let ty = match &decl.type_token {
            Some(token) => TypeToken::new(token.clone()),
            None => infer_type(db, table, decl)?,
        };
        let mut field = Field::new(&decl.name, ty);
        field.primary_key = decl.primary_key;
        field.non_null = !decl.optional;
        field.unique = decl.unique;
        field.indexed = decl.indexed;
        field.default = default;
        field.alias = decl.alias.clone();
        db.table_mut(table).add_field(field)?;
    }

    if decl.indexed {
        let fields: BTreeSet<String> = [decl.name.clone()].into();
        db.table_mut(table).get_or_create_index(fields, false);
    }
    Ok(())
}

/// Classification happens exactly once, here; formatters only ever see
/// the closed five-way union.
fn classify_default(expr: &DefaultExpr) -> DefaultValue {
    match expr {
        DefaultExpr::Null => DefaultValue::Null,
        DefaultExpr::Boolean(b) => DefaultValue::Boolean(*b),
        DefaultExpr::Number(n) => DefaultValue::Number(*n),
        DefaultExpr::Text(s) => DefaultValue::Text(s.clone()),
        DefaultExpr::Call { raw, .. } => DefaultValue::Call(raw.clone()),
    }
}

/// Derives a type for a field declared without one, from its default.
fn infer_type(
    db: &Database,
    table: TableId,
    decl: &FieldDecl,
) -> Result<TypeToken, SemanticError> {
    let token = match &decl.default {
        Some(DefaultExpr::Text(_)) => Some("varchar"),
        Some(DefaultExpr::Boolean(_)) => Some("boolean"),
        Some(DefaultExpr::Call { name, .. }) => Some(function_return_type(name)?),
        _ => None,
    };
    match token {
        Some(token) => Ok(TypeToken::new(token)),
        None => Err(SemanticError::MissingType {
            table: db.table(table).name.clone(),
            field: decl.name.clone(),
        }),
    }
}

fn function_return_type(name: &str) -> Result<&'static str, SemanticError> {
    match name {
        "concat" => Ok("varchar"),
        "uuidv7" => Ok("uuid"),
        _ => Err(SemanticError::UnknownFunction(name.to_string())),
    }
}

fn build_link(db: &mut Database, schema: SchemaId, link: &LinkDecl) -> Result<(), SemanticError> {
    let left = db.find_table(schema, &link.left)?;
    let right = db.find_table(schema, &link.right)?;

    // a side is "many" unless explicitly marked single; unmarked links
    // resolve to many-to-many, the conservative reading
    let left_many = link.left_mult != Multiplicity::One;
    let right_many = link.right_mult != Multiplicity::One;

    if left_many && right_many {
        build_join_table(db, left, right, link)
    } else if left_many || right_many {
        let (many, one, required) = if left_many {
            (left, right, !link.right_optional)
        } else {
            (right, left, !link.left_optional)
        };
        build_many_to_one(db, many, one, required, link)
    } else {
        // one-to-one: a unique, single foreign key on the left side
        build_one_to_one(db, left, right, link)
    }
}

/// Many-to-many: a join table in the left side's schema, holding a copy
/// of each side's primary key and two cascading foreign keys.
fn build_join_table(
    db: &mut Database,
    left: TableId,
    right: TableId,
    link: &LinkDecl,
) -> Result<(), SemanticError> {
    let name = format!("{}_{}", db.table(left).name, db.table(right).name);
    let join_schema = db.table(left).schema;
    let join = db.add_table(join_schema, name)?;
    db.table_mut(join).join_sides = Some((left, right));

    for side in [left, right] {
        let pk = db.get_or_create_primary_key(side)?;
        let mut names = Vec::new();
        for (pk_name, pk_ty) in pk {
            // both sides may key on the same name; the later copy gets
            // the <sideTable><PkName> treatment
            let name = if db.table(join).field(&pk_name).is_none() {
                pk_name
            } else {
                format!(
                    "{}{}",
                    without_capital(&db.table(side).name),
                    with_capital(&pk_name)
                )
            };
            let field = Field::new(&name, pk_ty.normalized_identity());
            db.table_mut(join).add_field(field)?;
            names.push(name);
        }
        db.table_mut(join).foreign_keys.push(ForeignKey {
            fields: names,
            towards: side,
            non_null: true,
            unique: false,
            cascade: true,
            direction: link.label.clone(),
        });
    }
    Ok(())
}

/// One-to-many: the many side reuses or grows one foreign-key field per
/// primary-key field of the one side.
fn build_many_to_one(
    db: &mut Database,
    many: TableId,
    one: TableId,
    required: bool,
    link: &LinkDecl,
) -> Result<(), SemanticError> {
    let pk = db.get_or_create_primary_key(one)?;
    let mut names = Vec::new();
    for (pk_name, pk_ty) in pk {
        let existing = db.inherited_field(many, &pk_name).cloned();
        let name = match existing {
            Some(field) if !field.primary_key => {
                // reuse, provided the types can hold the key
                if field.ty != pk_ty
                    && pk_ty.is_identity()
                    && !matches!(field.ty.as_str(), "int" | "long")
                {
                    return Err(SemanticError::IncompatibleLinkTypes {
                        from: db.table(many).name.clone(),
                        towards: db.table(one).name.clone(),
                    });
                }
                field.name
            }
            collision => {
                // absent, or the name is taken by a primary-key field:
                // create an implicit field, disambiguated as
                // <referencedTable><ReferencedPk>
                let name = if collision.is_none() {
                    pk_name.clone()
                } else {
                    format!(
                        "{}{}",
                        without_capital(&db.table(one).name),
                        with_capital(&pk_name)
                    )
                };
                let mut field = Field::new(&name, pk_ty.normalized_identity());
                field.non_null = required;
                db.table_mut(many).add_field(field)?;
                name
            }
        };
        names.push(name);
    }
    db.table_mut(many).foreign_keys.push(ForeignKey {
        fields: names,
        towards: one,
        non_null: required,
        unique: false,
        cascade: link.cascade,
        direction: link.label.clone(),
    });
    Ok(())
}

/// One-to-one is the many-to-one construction plus uniqueness on both
/// the foreign key and its column.
fn build_one_to_one(
    db: &mut Database,
    left: TableId,
    right: TableId,
    link: &LinkDecl,
) -> Result<(), SemanticError> {
    build_many_to_one(db, left, right, !link.right_optional, link)?;
    let names = match db.table_mut(left).foreign_keys.last_mut() {
        Some(fk) => {
            fk.unique = true;
            fk.fields.clone()
        }
        None => Vec::new(),
    };
    for name in &names {
        if let Some(field) = db.table_mut(left).field_mut(name) {
            field.unique = true;
        }
    }
    Ok(())
}

fn with_capital(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn without_capital(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn compile(src: &str) -> Database {
        build(&parse(src).unwrap()).unwrap()
    }

    #[test]
    fn test_reference_field_synthesizes_foreign_key() {
        let db = compile(
            "database d { schema s { \
             table user { *id serial } \
             table post { *id serial author -> user } } }",
        );
        let s = db.schema_by_name("s").unwrap();
        let post = db.table_by_name(s, "post").unwrap();
        let author = db.table(post).field("author").unwrap();
        // identity pk copied as a plain integer
        assert_eq!(author.ty.as_str(), "int");
        assert!(author.non_null);

        let fk = &db.table(post).foreign_keys[0];
        assert_eq!(fk.fields, vec!["author".to_string()]);
        assert_eq!(db.table(fk.towards).name, "user");
        assert!(!fk.cascade);
    }

    #[test]
    fn test_reference_triggers_primary_key_synthesis() {
        let db = compile(
            "database d { schema s { \
             table tag { label varchar(20) } \
             table post { *id serial tag -> tag } } }",
        );
        let s = db.schema_by_name("s").unwrap();
        let tag = db.table_by_name(s, "tag").unwrap();
        let pk = db.table(tag).field("tag_id").unwrap();
        assert!(pk.primary_key);
        assert!(pk.ty.is_identity());
    }

    #[test]
    fn test_many_to_many_synthesizes_join_table() {
        let db = compile(
            "database d { schema s { \
             table a { *id serial } \
             table b { *id serial } \
             a *--* b } }",
        );
        let s = db.schema_by_name("s").unwrap();
        let join = db.table_by_name(s, "a_b").unwrap();
        let join = db.table(join);
        assert_eq!(join.foreign_keys.len(), 2);
        for fk in &join.foreign_keys {
            assert!(fk.cascade);
            assert!(fk.non_null);
            assert!(!fk.unique);
        }
        // pk copies, identity normalized, second side disambiguated
        assert_eq!(join.field("id").unwrap().ty.as_str(), "int");
        assert_eq!(join.field("bId").unwrap().ty.as_str(), "int");
        // neither side gains a foreign key of its own
        let a = db.table_by_name(s, "a").unwrap();
        let b = db.table_by_name(s, "b").unwrap();
        assert!(db.table(a).foreign_keys.is_empty());
        assert!(db.table(b).foreign_keys.is_empty());
    }

    #[test]
    fn test_unmarked_link_defaults_to_many_to_many() {
        let db = compile(
            "database d { schema s { \
             table a { *id serial } \
             table b { *id serial } \
             a -- b } }",
        );
        let s = db.schema_by_name("s").unwrap();
        assert!(db.table_by_name(s, "a_b").is_some());
    }

    #[test]
    fn test_one_to_many_creates_field_on_many_side() {
        let db = compile(
            "database d { schema s { \
             table user { *id serial } \
             table post { *id serial } \
             post *--1 user } }",
        );
        let s = db.schema_by_name("s").unwrap();
        let post = db.table(db.table_by_name(s, "post").unwrap());
        // the one side's pk name is taken by the many side's own key,
        // so the created field is disambiguated
        let field = post.field("userId").unwrap();
        assert_eq!(field.ty.as_str(), "int");
        assert!(field.non_null);
        let fk = &post.foreign_keys[0];
        assert_eq!(fk.fields, vec!["userId".to_string()]);
        assert!(fk.non_null);
        assert!(!fk.cascade);
        assert!(!fk.unique);
    }

    #[test]
    fn test_one_to_many_without_collision_uses_pk_name() {
        let db = compile(
            "database d { schema s { \
             table user { *id serial } \
             table post { *post_id serial } \
             post *--1 user } }",
        );
        let s = db.schema_by_name("s").unwrap();
        let post = db.table(db.table_by_name(s, "post").unwrap());
        // no name clash, so the pk lands under its own name
        let field = post.field("id").unwrap();
        assert_eq!(field.ty.as_str(), "int");
        assert!(!field.primary_key);
    }

    #[test]
    fn test_one_to_many_optional_side_makes_nullable_fk() {
        let db = compile(
            "database d { schema s { \
             table user { *id serial } \
             table post { *id serial } \
             post *--1? user } }",
        );
        let s = db.schema_by_name("s").unwrap();
        let post = db.table(db.table_by_name(s, "post").unwrap());
        assert!(!post.field("userId").unwrap().non_null);
        assert!(!post.foreign_keys[0].non_null);
    }

    #[test]
    fn test_colliding_fk_field_name_is_disambiguated() {
        // the many side already uses the pk name for its own key
        let db = compile(
            "database d { schema s { \
             table user { *user_id serial } \
             table user_log { *user_id serial } \
             user_log *--1 user } }",
        );
        let s = db.schema_by_name("s").unwrap();
        let log = db.table(db.table_by_name(s, "user_log").unwrap());
        assert!(log.field("userUser_id").is_some());
        assert_eq!(log.foreign_keys[0].fields, vec!["userUser_id".to_string()]);
    }

    #[test]
    fn test_one_to_many_reuses_compatible_field() {
        // reuse keys off the referenced pk's own name
        let db = compile(
            "database d { schema s { \
             table user { *id serial } \
             table post { *post_id serial id int } \
             post *--1 user cascade } }",
        );
        let s = db.schema_by_name("s").unwrap();
        let post = db.table(db.table_by_name(s, "post").unwrap());
        // no second field created
        assert_eq!(post.fields().count(), 2);
        let fk = &post.foreign_keys[0];
        assert_eq!(fk.fields, vec!["id".to_string()]);
        assert!(fk.cascade);
    }

    #[test]
    fn test_incompatible_reused_field_fails() {
        let err = build(
            &parse(
                "database d { schema s { \
                 table user { *id serial } \
                 table post { *post_id serial id varchar(10) } \
                 post *--1 user } }",
            )
            .unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, SemanticError::IncompatibleLinkTypes { .. }));
    }

    #[test]
    fn test_synthesized_key_collision_is_fatal() {
        // referencing a pk-less table that already holds a plain
        // <table>_id field cannot silently double the name
        let err = build(
            &parse(
                "database d { schema s { \
                 table t { t_id int } \
                 table u { r -> t } } }",
            )
            .unwrap(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SemanticError::DuplicateName { kind: "field", .. }
        ));
    }

    #[test]
    fn test_one_to_one_link_is_unique() {
        let db = compile(
            "database d { schema s { \
             table person { *id serial } \
             table passport { *id serial } \
             passport 1--1 person } }",
        );
        let s = db.schema_by_name("s").unwrap();
        let passport = db.table(db.table_by_name(s, "passport").unwrap());
        assert!(passport.foreign_keys[0].unique);
        // pk name taken, so the key field is disambiguated and unique
        assert!(passport.field("personId").unwrap().unique);
    }

    #[test]
    fn test_type_inference_from_defaults() {
        let db = compile(
            "database d { schema s { table t { \
             *id serial \
             note = 'n/a' \
             active = true \
             token = uuidv7() } } }",
        );
        let s = db.schema_by_name("s").unwrap();
        let t = db.table(db.table_by_name(s, "t").unwrap());
        assert_eq!(t.field("note").unwrap().ty.as_str(), "varchar");
        assert_eq!(t.field("active").unwrap().ty.as_str(), "boolean");
        assert_eq!(t.field("token").unwrap().ty.as_str(), "uuid");
    }

    #[test]
    fn test_underivable_type_fails() {
        let err = build(
            &parse("database d { schema s { table t { count = 0 } } }").unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, SemanticError::MissingType { .. }));

        let err = build(
            &parse("database d { schema s { table t { x = mystery() } } }").unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, SemanticError::UnknownFunction(_)));
    }

    #[test]
    fn test_unresolved_names_are_fatal() {
        let err = build(
            &parse("database d { schema s { table t { owner -> ghost } } }").unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, SemanticError::UnknownTable { .. }));

        let err = build(
            &parse("database d { schema s { table t { owner -> nowhere.t } } }").unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, SemanticError::UnknownSchema(_)));
    }

    #[test]
    fn test_cross_schema_parent() {
        let db = compile(
            "database d { \
             schema base { table media { *id serial } } \
             schema lib { table book : base.media { isbn varchar(13) } } }",
        );
        let lib = db.schema_by_name("lib").unwrap();
        let book = db.table_by_name(lib, "book").unwrap();
        let parent = db.table(book).parent.unwrap();
        assert_eq!(db.qualified_name(parent), ("base", "media"));
        // the child's key resolves through the chain
        assert_eq!(db.primary_key(book)[0].name, "id");
    }

    #[test]
    fn test_indexed_field_memoizes_index() {
        let db = compile("database d { schema s { table t { *id serial +name varchar(30) } } }");
        let s = db.schema_by_name("s").unwrap();
        let t = db.table(db.table_by_name(s, "t").unwrap());
        let index = t.indexes().next().unwrap();
        assert!(!index.unique);
        assert!(index.fields.contains("name"));
    }
}
