use std::collections::HashMap;
use std::fmt::Display;

use once_cell::sync::Lazy;

use crate::source::Location;

/// Every token kind the scanner can produce, including the newline token
/// used as a statement terminator and a placeholder for scan errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Eof,

    // Symbols
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftSquare,
    RightSquare,

    Plus,
    PlusEq,
    Minus,
    MinusEq,
    Star,
    StarEq,
    Slash,
    SlashEq,
    Percent,
    PercentEq,
    Caret,
    CaretEq,

    Comma,
    Semicolon,
    Newline,

    Amp,
    AmpAmp,
    AmpEq,
    AmpAmpEq,
    Bar,
    BarBar,
    BarEq,
    BarBarEq,
    Bang,
    BangEq,
    Eq,
    EqEq,
    Gt,
    Ge,
    Lt,
    Le,
    Dot,
    DotDot,
    TripleDot,
    Arrow,
    DoubleArrow,
    Colon,
    ColonColon,

    // Literals
    Ident,
    Str,
    Int,
    Float,
    Char,
    Bool,
    Nil,

    // Keywords
    And,
    Or,
    Not,
    If,
    Else,
    Loop,
    While,
    For,
    In,
    Break,
    Continue,
    Return,
    Yield,
    Var,
    Const,
    Fun,
    Oper,
    Struct,
    Enum,
    Type,
    Interface,
    Using,
    Namespace,
    Static,
    Global,
    SelfKw,
    As,
    Typeof,
    Is,
    Alloc,
    Dealloc,
    Extern,

    /// Placeholder kind for malformed input; only used to carry a location.
    Unknown,
}

/// Reserved words, plus the identifier-shaped literals (`true`, `false`,
/// `nil`, `inf`, `NaN`) which scan as literal tokens.
pub static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("and", TokenKind::And);
    m.insert("or", TokenKind::Or);
    m.insert("not", TokenKind::Not);
    m.insert("if", TokenKind::If);
    m.insert("else", TokenKind::Else);
    m.insert("loop", TokenKind::Loop);
    m.insert("while", TokenKind::While);
    m.insert("for", TokenKind::For);
    m.insert("in", TokenKind::In);
    m.insert("break", TokenKind::Break);
    m.insert("continue", TokenKind::Continue);
    m.insert("return", TokenKind::Return);
    m.insert("yield", TokenKind::Yield);
    m.insert("var", TokenKind::Var);
    m.insert("const", TokenKind::Const);
    m.insert("fun", TokenKind::Fun);
    m.insert("oper", TokenKind::Oper);
    m.insert("struct", TokenKind::Struct);
    m.insert("enum", TokenKind::Enum);
    m.insert("type", TokenKind::Type);
    m.insert("interface", TokenKind::Interface);
    m.insert("using", TokenKind::Using);
    m.insert("namespace", TokenKind::Namespace);
    m.insert("static", TokenKind::Static);
    m.insert("global", TokenKind::Global);
    m.insert("self", TokenKind::SelfKw);
    m.insert("as", TokenKind::As);
    m.insert("typeof", TokenKind::Typeof);
    m.insert("is", TokenKind::Is);
    m.insert("alloc", TokenKind::Alloc);
    m.insert("dealloc", TokenKind::Dealloc);
    m.insert("extern", TokenKind::Extern);
    m.insert("true", TokenKind::Bool);
    m.insert("false", TokenKind::Bool);
    m.insert("nil", TokenKind::Nil);
    m.insert("inf", TokenKind::Float);
    m.insert("NaN", TokenKind::Float);
    m
});

/// The literal value attached to numeric, boolean, character and string
/// tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(char),
    Str(String),
}

impl Display for LiteralValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiteralValue::Int(v) => write!(f, "{v}"),
            LiteralValue::Float(v) => write!(f, "{v}"),
            LiteralValue::Bool(v) => write!(f, "{v}"),
            LiteralValue::Char(v) => write!(f, "'{v}'"),
            LiteralValue::Str(v) => write!(f, "\"{v}\""),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub literal: Option<LiteralValue>,
    pub location: Location,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: String, literal: Option<LiteralValue>, location: Location) -> Self {
        Self {
            kind,
            lexeme,
            literal,
            location,
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.literal {
            Some(value) => write!(f, "{:?} {:?} {value}", self.kind, self.lexeme),
            None => write!(f, "{:?} {:?}", self.kind, self.lexeme),
        }
    }
}
