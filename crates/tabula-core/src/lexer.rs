//! Tokenizer for the schema description language.

use std::fmt;

/// A byte range in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Creates a new span.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Reserved words of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Database,
    Schema,
    Table,
    Option,
    Cascade,
    As,
    Null,
    True,
    False,
}

impl Keyword {
    /// Looks up a keyword, case-sensitively.
    #[must_use]
    pub fn lookup(text: &str) -> Option<Self> {
        Some(match text {
            "database" => Self::Database,
            "schema" => Self::Schema,
            "table" => Self::Table,
            "option" => Self::Option,
            "cascade" => Self::Cascade,
            "as" => Self::As,
            "null" => Self::Null,
            "true" => Self::True,
            "false" => Self::False,
            _ => return None,
        })
    }
}

/// A lexical token kind.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier.
    Identifier(String),
    /// Reserved word.
    Keyword(Keyword),
    /// Numeric literal.
    Number(f64),
    /// Single-quoted string literal, quotes removed.
    Str(String),
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `:`
    Colon,
    /// `=`
    Equals,
    /// `?`
    Question,
    /// `*`
    Star,
    /// `!`
    Bang,
    /// `+`
    Plus,
    /// `-`
    Dash,
    /// `->`
    Arrow,
    /// End of input.
    Eof,
    /// Lexical error with a message.
    Error(String),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(name) => write!(f, "identifier '{name}'"),
            Self::Keyword(kw) => write!(f, "keyword '{kw:?}'"),
            Self::Number(n) => write!(f, "number {n}"),
            Self::Str(s) => write!(f, "string '{s}'"),
            Self::LBrace => f.write_str("'{'"),
            Self::RBrace => f.write_str("'}'"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::Comma => f.write_str("','"),
            Self::Dot => f.write_str("'.'"),
            Self::Colon => f.write_str("':'"),
            Self::Equals => f.write_str("'='"),
            Self::Question => f.write_str("'?'"),
            Self::Star => f.write_str("'*'"),
            Self::Bang => f.write_str("'!'"),
            Self::Plus => f.write_str("'+'"),
            Self::Dash => f.write_str("'-'"),
            Self::Arrow => f.write_str("'->'"),
            Self::Eof => f.write_str("end of input"),
            Self::Error(msg) => write!(f, "invalid input ({msg})"),
        }
    }
}

/// A token with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The token kind.
    pub kind: TokenKind,
    /// The source range it covers.
    pub span: Span,
}

impl Token {
    /// Creates a new token.
    #[must_use]
    pub const fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// A lexer over schema description source text.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    start: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    #[must_use]
    pub const fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            start: 0,
        }
    }

    /// The full source text, for raw-slice extraction by spans.
    #[must_use]
    pub const fn source(&self) -> &'a str {
        self.input
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Skips whitespace, `//` line comments and `/* */` block comments.
    /// Line comments use `//` because `--` is the link operator.
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.advance();
            }
            if self.peek() == Some('/') && self.peek_next() == Some('/') {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.advance();
                }
                continue;
            }
            if self.peek() == Some('/') && self.peek_next() == Some('*') {
                self.advance();
                self.advance();
                loop {
                    match self.advance() {
                        Some('*') if self.peek() == Some('/') => {
                            self.advance();
                            break;
                        }
                        None => break,
                        _ => {}
                    }
                }
                continue;
            }
            break;
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, Span::new(self.start, self.pos))
    }

    fn scan_identifier(&mut self) -> Token {
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let text = &self.input[self.start..self.pos];
        match Keyword::lookup(text) {
            Some(kw) => self.make_token(TokenKind::Keyword(kw)),
            None => self.make_token(TokenKind::Identifier(text.to_string())),
        }
    }

    fn scan_number(&mut self) -> Token {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        let text = &self.input[self.start..self.pos];
        match text.parse::<f64>() {
            Ok(value) => self.make_token(TokenKind::Number(value)),
            Err(_) => self.make_token(TokenKind::Error(format!("invalid number: {text}"))),
        }
    }

    fn scan_string(&mut self) -> Token {
        self.advance(); // opening quote
        let content_start = self.pos;
        loop {
            match self.peek() {
                Some('\'') => break,
                Some(_) => {
                    self.advance();
                }
                None => {
                    return self.make_token(TokenKind::Error(
                        "unterminated string literal".to_string(),
                    ));
                }
            }
        }
        let content = self.input[content_start..self.pos].to_string();
        self.advance(); // closing quote
        self.make_token(TokenKind::Str(content))
    }

    /// Scans the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();
        self.start = self.pos;

        let Some(c) = self.peek() else {
            return self.make_token(TokenKind::Eof);
        };

        if c.is_alphabetic() || c == '_' {
            return self.scan_identifier();
        }
        if c.is_ascii_digit() {
            return self.scan_number();
        }
        if c == '\'' {
            return self.scan_string();
        }

        self.advance();
        let kind = match c {
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ':' => TokenKind::Colon,
            '=' => TokenKind::Equals,
            '?' => TokenKind::Question,
            '*' => TokenKind::Star,
            '!' => TokenKind::Bang,
            '+' => TokenKind::Plus,
            '-' => {
                if self.peek() == Some('>') {
                    self.advance();
                    TokenKind::Arrow
                } else {
                    TokenKind::Dash
                }
            }
            _ => TokenKind::Error(format!("unexpected character: {c}")),
        };
        self.make_token(kind)
    }
}
