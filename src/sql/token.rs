//! SQL tokens - the atomic units of compiled query text.
//!
//! Every token serializes to a fixed string; the only dynamic content is
//! identifiers (which must have passed the identifier grammar upstream) and
//! numbered parameter placeholders. There is deliberately no literal token:
//! caller-supplied values travel in the bound parameter list, never in text.

/// A SQL output token.
///
/// Adding a new variant forces exhaustive handling in `serialize`.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // === Keywords ===
    Select,
    From,
    Where,
    And,
    As,
    On,
    Join,
    Inner,
    Left,
    Right,
    Full,
    Outer,
    Cross,
    GroupBy,
    OrderBy,
    Asc,
    Desc,
    In,
    /// Case-insensitive match; SQLite's LIKE is case-insensitive for ASCII,
    /// so this renders as LIKE on the warehouse.
    ILike,

    // === Punctuation ===
    Comma,
    Dot,
    LParen,
    RParen,

    // === Operators ===
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,

    // === Whitespace / formatting ===
    Space,
    Newline,
    Indent(usize),

    // === Dynamic content ===
    /// Simple identifier (alias, column, output key).
    Ident(String),
    /// Qualified identifier: schema.name.
    QualifiedIdent { schema: String, name: String },
    /// Function name, rendered uppercase.
    FunctionName(String),
    /// Positional parameter placeholder, rendered `$n` (1-based).
    Param(usize),
}

fn quote_ident(name: &str) -> String {
    // Identifiers are grammar-checked before they get here; quoting keeps
    // them inert even against future keyword collisions.
    format!("\"{}\"", name)
}

impl Token {
    /// Serialize this token to its SQL spelling.
    pub fn serialize(&self) -> String {
        match self {
            Token::Select => "SELECT".into(),
            Token::From => "FROM".into(),
            Token::Where => "WHERE".into(),
            Token::And => "AND".into(),
            Token::As => "AS".into(),
            Token::On => "ON".into(),
            Token::Join => "JOIN".into(),
            Token::Inner => "INNER".into(),
            Token::Left => "LEFT".into(),
            Token::Right => "RIGHT".into(),
            Token::Full => "FULL".into(),
            Token::Outer => "OUTER".into(),
            Token::Cross => "CROSS".into(),
            Token::GroupBy => "GROUP BY".into(),
            Token::OrderBy => "ORDER BY".into(),
            Token::Asc => "ASC".into(),
            Token::Desc => "DESC".into(),
            Token::In => "IN".into(),
            Token::ILike => "LIKE".into(),

            Token::Comma => ",".into(),
            Token::Dot => ".".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),

            Token::Eq => "=".into(),
            Token::Ne => "!=".into(),
            Token::Lt => "<".into(),
            Token::Gt => ">".into(),
            Token::Lte => "<=".into(),
            Token::Gte => ">=".into(),

            Token::Space => " ".into(),
            Token::Newline => "\n".into(),
            Token::Indent(n) => "  ".repeat(*n),

            Token::Ident(name) => quote_ident(name),
            Token::QualifiedIdent { schema, name } => {
                format!("{}.{}", quote_ident(schema), quote_ident(name))
            }
            Token::FunctionName(name) => name.to_uppercase(),
            Token::Param(n) => format!("${}", n),
        }
    }
}

/// A stream of tokens serialized into query text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    pub fn new() -> Self {
        Self { tokens: vec![] }
    }

    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    /// Serialize all tokens to a SQL string.
    pub fn serialize(&self) -> String {
        self.tokens.iter().map(Token::serialize).collect()
    }

    // Convenience methods for common tokens
    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }
    pub fn newline(&mut self) -> &mut Self {
        self.push(Token::Newline)
    }
    pub fn indent(&mut self, n: usize) -> &mut Self {
        self.push(Token::Indent(n))
    }
    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }
    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }
    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }
}
