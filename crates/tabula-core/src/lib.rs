//! # tabula-core
//!
//! A compiler for a concise relational-schema description language.
//!
//! This crate provides:
//! - A hand-written lexer and recursive descent parser for the language
//! - An AST builder resolving the parse tree into a closed semantic model
//!   (primary-key inference, link resolution, inheritance forests)
//! - Formatter backends rendering that model as SQL DDL, PlantUML class
//!   diagrams, or the canonical notation itself
//!
//! ## Compiling a schema
//!
//! ```rust
//! use tabula_core::compile;
//! use tabula_core::format::sql::postgres::PostgresDialect;
//! use tabula_core::format::Formatter;
//!
//! let db = compile(
//!     "database shop {
//!        schema retail {
//!          table customer { *customer_id serial name varchar(100) }
//!          table purchase { placed datetime }
//!          purchase *--1 customer
//!        }
//!      }",
//! )
//! .unwrap();
//!
//! let ddl = PostgresDialect::default().format(&db).unwrap();
//! assert!(ddl.contains("CREATE TABLE customer"));
//! // the link grew a key field on the many side
//! assert!(ddl.contains("FOREIGN KEY (customer_id)"));
//! ```

pub mod build;
pub mod error;
pub mod format;
pub mod lexer;
pub mod model;
pub mod parser;
pub mod syntax;

pub use build::build;
pub use error::{CapabilityError, CompileError, SemanticError};
pub use model::{Database, Field, ForeignKey, Index, Schema, Table, TableId};
pub use parser::{parse, SyntaxError};

/// Parses and resolves source text in one step.
pub fn compile(input: &str) -> Result<Database, CompileError> {
    let decl = parser::parse(input)?;
    Ok(build::build(&decl)?)
}
