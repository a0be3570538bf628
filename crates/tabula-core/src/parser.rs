//! Recursive-descent parser producing the [`crate::syntax`] parse tree.
//!
//! The parser is one of two frontends (the reverse engineer being the
//! other) and stays deliberately dumb: names are not resolved, types are
//! kept as raw tokens, and only default values get classified, as the
//! parse-tree contract requires.

use crate::lexer::{Keyword, Lexer, Span, Token, TokenKind};
use crate::syntax::{
    DatabaseDecl, DefaultExpr, FieldDecl, LinkDecl, Multiplicity, QualifiedName, SchemaDecl,
    TableDecl,
};

/// A syntax error with source location.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at position {}..{}", span.start, span.end)]
pub struct SyntaxError {
    /// Human-readable message.
    pub message: String,
    /// Source range of the offending token.
    pub span: Span,
    /// What the parser expected, if applicable.
    pub expected: Option<String>,
    /// The token actually found.
    pub found: Option<TokenKind>,
}

impl SyntaxError {
    /// Creates an "unexpected token" error.
    #[must_use]
    pub fn unexpected(expected: impl Into<String>, found: TokenKind, span: Span) -> Self {
        let expected: String = expected.into();
        Self {
            message: format!("expected {expected}, found {found}"),
            span,
            expected: Some(expected),
            found: Some(found),
        }
    }
}

/// Parses a complete source text into a database declaration.
pub fn parse(input: &str) -> Result<DatabaseDecl, SyntaxError> {
    Parser::new(input).parse_database()
}

/// Schema language parser.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    /// Creates a parser over the given input.
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token();
        Self { lexer, current }
    }

    fn advance(&mut self) -> Token {
        std::mem::replace(&mut self.current, self.lexer.next_token())
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.current.kind == *kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check_keyword(&self, kw: Keyword) -> bool {
        matches!(self.current.kind, TokenKind::Keyword(k) if k == kw)
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if self.check_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, SyntaxError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(SyntaxError::unexpected(
                what,
                self.current.kind.clone(),
                self.current.span,
            ))
        }
    }

    fn expect_keyword(&mut self, kw: Keyword, what: &str) -> Result<(), SyntaxError> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(SyntaxError::unexpected(
                what,
                self.current.kind.clone(),
                self.current.span,
            ))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String, SyntaxError> {
        match &self.current.kind {
            TokenKind::Identifier(_) => {
                let token = self.advance();
                match token.kind {
                    TokenKind::Identifier(name) => Ok(name),
                    _ => unreachable!(),
                }
            }
            other => Err(SyntaxError::unexpected(
                what,
                other.clone(),
                self.current.span,
            )),
        }
    }

    /// `database name { option* schema* }`
    pub fn parse_database(&mut self) -> Result<DatabaseDecl, SyntaxError> {
        self.expect_keyword(Keyword::Database, "'database'")?;
        let name = self.expect_identifier("database name")?;
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut options = Vec::new();
        while self.eat_keyword(Keyword::Option) {
            let opt_name = self.expect_identifier("option name")?;
            self.expect(&TokenKind::Equals, "'='")?;
            options.push((opt_name, self.parse_option_value()?));
        }

        let mut schemas = Vec::new();
        while self.check_keyword(Keyword::Schema) {
            schemas.push(self.parse_schema()?);
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        self.expect(&TokenKind::Eof, "end of input")?;

        Ok(DatabaseDecl {
            name,
            options,
            schemas,
        })
    }

    /// Option values are kept verbatim (string literals keep quotes).
    fn parse_option_value(&mut self) -> Result<String, SyntaxError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Identifier(_)
            | TokenKind::Number(_)
            | TokenKind::Str(_)
            | TokenKind::Keyword(Keyword::True | Keyword::False) => {
                Ok(self.lexer.source()[token.span.start..token.span.end].to_string())
            }
            other => Err(SyntaxError::unexpected("option value", other, token.span)),
        }
    }

    /// `schema name { (table | link)* }`
    fn parse_schema(&mut self) -> Result<SchemaDecl, SyntaxError> {
        self.expect_keyword(Keyword::Schema, "'schema'")?;
        let name = self.expect_identifier("schema name")?;
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut tables = Vec::new();
        let mut links = Vec::new();
        loop {
            if self.check_keyword(Keyword::Table) {
                tables.push(self.parse_table()?);
            } else if matches!(self.current.kind, TokenKind::Identifier(_)) {
                links.push(self.parse_link()?);
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "'}'")?;

        Ok(SchemaDecl {
            name,
            tables,
            links,
        })
    }

    /// `table name [: parent [(label)]] { field* }`
    fn parse_table(&mut self) -> Result<TableDecl, SyntaxError> {
        self.expect_keyword(Keyword::Table, "'table'")?;
        let name = self.expect_identifier("table name")?;

        let mut parent = None;
        let mut parent_label = None;
        if self.eat(&TokenKind::Colon) {
            parent = Some(self.parse_qualified("parent table name")?);
            parent_label = self.parse_label()?;
        }

        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            fields.push(self.parse_field()?);
        }
        self.expect(&TokenKind::RBrace, "'}'")?;

        Ok(TableDecl {
            name,
            parent,
            parent_label,
            fields,
        })
    }

    /// `[*|!|+]name [type[?] [as Alias]] [-> [(label)] target[?] [cascade]] [= default]`
    fn parse_field(&mut self) -> Result<FieldDecl, SyntaxError> {
        let mut field = FieldDecl::named(String::new());
        if self.eat(&TokenKind::Star) {
            field.primary_key = true;
        } else if self.eat(&TokenKind::Bang) {
            field.unique = true;
        } else if self.eat(&TokenKind::Plus) {
            field.indexed = true;
        }
        field.name = self.expect_identifier("field name")?;

        if self.check(&TokenKind::Arrow) {
            self.advance();
            field.direction = self.parse_label()?;
            field.reference = Some(self.parse_qualified("referenced table name")?);
            field.optional = self.eat(&TokenKind::Question);
            field.cascade = self.eat_keyword(Keyword::Cascade);
        } else {
            if matches!(self.current.kind, TokenKind::Identifier(_)) {
                field.type_token = Some(self.parse_type_token()?);
            }
            field.optional = self.eat(&TokenKind::Question);
            if self.eat_keyword(Keyword::As) {
                field.alias = Some(self.expect_identifier("type alias")?);
            }
            if self.eat(&TokenKind::Equals) {
                field.default = Some(self.parse_default()?);
            }
        }
        Ok(field)
    }

    /// A type token is an identifier plus an optional raw argument list,
    /// kept verbatim: `varchar(10)`, `numeric(8,2)`, `enum('a','b')`.
    fn parse_type_token(&mut self) -> Result<String, SyntaxError> {
        let ident = self.advance();
        let start = ident.span.start;
        let mut end = ident.span.end;
        if self.check(&TokenKind::LParen) {
            end = self.consume_parenthesized()?;
        }
        Ok(self.lexer.source()[start..end].to_string())
    }

    /// Consumes a balanced `( ... )` group, returning its end offset.
    fn consume_parenthesized(&mut self) -> Result<usize, SyntaxError> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut depth = 1usize;
        loop {
            let token = self.advance();
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(token.span.end);
                    }
                }
                TokenKind::Eof => {
                    return Err(SyntaxError::unexpected("')'", TokenKind::Eof, token.span));
                }
                _ => {}
            }
        }
    }

    /// Classifies a default expression into its five variants.
    fn parse_default(&mut self) -> Result<DefaultExpr, SyntaxError> {
        match self.current.kind.clone() {
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(DefaultExpr::Null)
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(DefaultExpr::Boolean(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(DefaultExpr::Boolean(false))
            }
            TokenKind::Number(value) => {
                self.advance();
                Ok(DefaultExpr::Number(value))
            }
            TokenKind::Dash => {
                self.advance();
                match self.current.kind {
                    TokenKind::Number(value) => {
                        self.advance();
                        Ok(DefaultExpr::Number(-value))
                    }
                    ref other => Err(SyntaxError::unexpected(
                        "number",
                        other.clone(),
                        self.current.span,
                    )),
                }
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(DefaultExpr::Text(value))
            }
            TokenKind::Identifier(name) => {
                let ident = self.advance();
                if !self.check(&TokenKind::LParen) {
                    return Err(SyntaxError::unexpected(
                        "default value",
                        TokenKind::Identifier(name),
                        ident.span,
                    ));
                }
                let end = self.consume_parenthesized()?;
                Ok(DefaultExpr::Call {
                    name,
                    raw: self.lexer.source()[ident.span.start..end].to_string(),
                })
            }
            other => Err(SyntaxError::unexpected(
                "default value",
                other,
                self.current.span,
            )),
        }
    }

    /// `left [*|1][?] -[(label)]- [*|1][?] right [cascade]`
    fn parse_link(&mut self) -> Result<LinkDecl, SyntaxError> {
        let left = self.parse_qualified("table name")?;
        let mut link = LinkDecl::between(left, QualifiedName::local(String::new()));

        link.left_mult = self.parse_multiplicity();
        link.left_optional = self.eat(&TokenKind::Question);
        self.expect(&TokenKind::Dash, "'-'")?;
        link.label = self.parse_label()?;
        self.expect(&TokenKind::Dash, "'-'")?;
        link.right_mult = self.parse_multiplicity();
        link.right_optional = self.eat(&TokenKind::Question);
        link.right = self.parse_qualified("table name")?;
        link.cascade = self.eat_keyword(Keyword::Cascade);

        Ok(link)
    }

    fn parse_multiplicity(&mut self) -> Multiplicity {
        if self.eat(&TokenKind::Star) {
            Multiplicity::Many
        } else if matches!(self.current.kind, TokenKind::Number(n) if n == 1.0) {
            self.advance();
            Multiplicity::One
        } else {
            Multiplicity::Unspecified
        }
    }

    /// An optional parenthesized direction label: `(up)`.
    fn parse_label(&mut self) -> Result<Option<String>, SyntaxError> {
        if !self.eat(&TokenKind::LParen) {
            return Ok(None);
        }
        let label = self.expect_identifier("direction label")?;
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(Some(label))
    }

    /// `[schema.]name`
    fn parse_qualified(&mut self, what: &str) -> Result<QualifiedName, SyntaxError> {
        let first = self.expect_identifier(what)?;
        if self.eat(&TokenKind::Dot) {
            let name = self.expect_identifier(what)?;
            Ok(QualifiedName::qualified(first, name))
        } else {
            Ok(QualifiedName::local(first))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_database() {
        let decl = parse("database d { schema s { table t { *id serial name varchar(10) } } }")
            .unwrap();
        assert_eq!(decl.name, "d");
        let table = &decl.schemas[0].tables[0];
        assert_eq!(table.name, "t");
        assert!(table.fields[0].primary_key);
        assert_eq!(table.fields[0].type_token.as_deref(), Some("serial"));
        assert_eq!(table.fields[1].type_token.as_deref(), Some("varchar(10)"));
    }

    #[test]
    fn test_reference_field() {
        let src = "database d { schema s { table u { *id serial } table t { owner -> u? cascade } } }";
        let decl = parse(src).unwrap();
        let field = &decl.schemas[0].tables[1].fields[0];
        assert_eq!(field.reference, Some(QualifiedName::local("u")));
        assert!(field.optional);
        assert!(field.cascade);
        assert!(field.type_token.is_none());
    }

    #[test]
    fn test_qualified_parent_with_label() {
        let src = "database d { schema a { table p { *id serial } } \
                   schema b { table c : a.p (up) { x integer } } }";
        let decl = parse(src).unwrap();
        let table = &decl.schemas[1].tables[0];
        assert_eq!(table.parent, Some(QualifiedName::qualified("a", "p")));
        assert_eq!(table.parent_label.as_deref(), Some("up"));
    }

    #[test]
    fn test_links() {
        let src = "database d { schema s { table a { } table b { } \
                   a *--* b \
                   a 1?-(left)-* b cascade } }";
        let decl = parse(src).unwrap();
        let links = &decl.schemas[0].links;
        assert_eq!(links[0].left_mult, Multiplicity::Many);
        assert_eq!(links[0].right_mult, Multiplicity::Many);
        assert!(!links[0].cascade);

        assert_eq!(links[1].left_mult, Multiplicity::One);
        assert!(links[1].left_optional);
        assert_eq!(links[1].label.as_deref(), Some("left"));
        assert_eq!(links[1].right_mult, Multiplicity::Many);
        assert!(links[1].cascade);
    }

    #[test]
    fn test_unmarked_link_sides() {
        let decl = parse("database d { schema s { table a { } table b { } a -- b } }").unwrap();
        let link = &decl.schemas[0].links[0];
        assert_eq!(link.left_mult, Multiplicity::Unspecified);
        assert_eq!(link.right_mult, Multiplicity::Unspecified);
    }

    #[test]
    fn test_default_classification() {
        let src = "database d { schema s { table t { \
                   a boolean = true \
                   b integer = -3 \
                   c varchar(10) = 'x' \
                   d timestamp = now() \
                   e integer? = null } } }";
        let decl = parse(src).unwrap();
        let fields = &decl.schemas[0].tables[0].fields;
        assert_eq!(fields[0].default, Some(DefaultExpr::Boolean(true)));
        assert_eq!(fields[1].default, Some(DefaultExpr::Number(-3.0)));
        assert_eq!(fields[2].default, Some(DefaultExpr::Text("x".into())));
        assert_eq!(
            fields[3].default,
            Some(DefaultExpr::Call {
                name: "now".into(),
                raw: "now()".into()
            })
        );
        assert!(fields[4].optional);
        assert_eq!(fields[4].default, Some(DefaultExpr::Null));
    }

    #[test]
    fn test_enum_alias() {
        let src = "database d { schema s { table t { mode enum('human','bot') as GameMode = 'human' } } }";
        let decl = parse(src).unwrap();
        let field = &decl.schemas[0].tables[0].fields[0];
        assert_eq!(field.type_token.as_deref(), Some("enum('human','bot')"));
        assert_eq!(field.alias.as_deref(), Some("GameMode"));
        assert_eq!(field.default, Some(DefaultExpr::Text("human".into())));
    }

    #[test]
    fn test_options_kept_verbatim() {
        let decl = parse("database d { option owner = 'admin' option version = 2 }").unwrap();
        assert_eq!(
            decl.options,
            vec![
                ("owner".to_string(), "'admin'".to_string()),
                ("version".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn test_syntax_error_carries_location() {
        let err = parse("database d { schema }").unwrap_err();
        assert!(err.expected.is_some());
        assert!(err.span.start > 0);
        assert!(err.to_string().contains("schema name"));
    }
}
