//! Lexical analysis.
//!
//! The scanner walks a source buffer one byte at a time and produces the
//! token stream for the parser. Newlines are tokens in their own right
//! (statement terminators); whether they are meaningful is decided later by
//! the parser's grouping stack. On malformed input the scanner records a
//! diagnostic with a synthesized placeholder token for the span and keeps
//! scanning, so a single pass reports every lexical error in a file.

mod token;

pub use token::*;

use crate::diagnostics::{DiagnosticSink, ErrorCode};
use crate::source::{FileId, Location};

pub struct Scanner<'a> {
    sink: &'a mut DiagnosticSink,
    tokens: Vec<Token>,

    // Per-file scan state.
    file: FileId,
    bytes: Vec<u8>,
    line: usize,
    line_index: usize,
    start: usize,
    current: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(sink: &'a mut DiagnosticSink) -> Self {
        Self {
            sink,
            tokens: Vec::new(),
            file: FileId(0),
            bytes: Vec::new(),
            line: 1,
            line_index: 0,
            start: 0,
            current: 0,
        }
    }

    /// Scan a whole file, appending its tokens to the stream.
    pub fn scan_file(&mut self, file: FileId, source: &str) {
        self.file = file;
        self.bytes = source.as_bytes().to_vec();
        self.line = 1;
        self.line_index = 0;
        self.start = 0;
        self.current = 0;

        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token();
        }
    }

    /// Finish scanning: append the single end-of-stream token and hand the
    /// token list over.
    pub fn into_tokens(mut self) -> Vec<Token> {
        self.start = self.current;
        self.add_token(TokenKind::Eof, None);
        self.tokens
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.bytes.len()
    }

    fn advance(&mut self) -> u8 {
        if self.is_at_end() {
            return 0;
        }
        self.current += 1;
        self.bytes[self.current - 1]
    }

    fn peek(&self) -> u8 {
        self.bytes.get(self.current).copied().unwrap_or(0)
    }

    fn peek_next(&self, lookahead: usize) -> u8 {
        self.bytes.get(self.current + lookahead).copied().unwrap_or(0)
    }

    fn matches(&mut self, expected: u8) -> bool {
        if self.peek() != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn make_location(&self) -> Location {
        Location::new(
            self.file,
            self.line,
            self.start.saturating_sub(self.line_index),
            (self.current - self.start).max(1),
            self.line_index,
        )
    }

    fn make_token(&self, kind: TokenKind, literal: Option<LiteralValue>) -> Token {
        let lexeme = String::from_utf8_lossy(&self.bytes[self.start..self.current]).into_owned();
        Token::new(kind, lexeme, literal, self.make_location())
    }

    fn add_token(&mut self, kind: TokenKind, literal: Option<LiteralValue>) {
        let token = self.make_token(kind, literal);
        self.tokens.push(token);
    }

    /// Record an error for the current span. A placeholder token is
    /// synthesized for its location but never enters the stream.
    fn error(&mut self, code: ErrorCode, message: &str) {
        let placeholder = self.make_token(TokenKind::Unknown, None);
        self.sink.error(placeholder.location, code, message);
    }

    fn is_digit(c: u8, base: u32) -> bool {
        match base {
            2 => matches!(c, b'0' | b'1'),
            8 => matches!(c, b'0'..=b'7'),
            10 => c.is_ascii_digit(),
            16 => c.is_ascii_hexdigit(),
            _ => false,
        }
    }

    fn is_alpha(c: u8) -> bool {
        c.is_ascii_alphabetic() || c == b'_'
    }

    fn is_alpha_numeric(c: u8) -> bool {
        Self::is_alpha(c) || c.is_ascii_digit()
    }

    fn scan_token(&mut self) {
        let c = self.advance();
        match c {
            b'(' => self.add_token(TokenKind::LeftParen, None),
            b')' => self.add_token(TokenKind::RightParen, None),
            b'{' => self.add_token(TokenKind::LeftBrace, None),
            b'}' => self.add_token(TokenKind::RightBrace, None),
            b'[' => self.add_token(TokenKind::LeftSquare, None),
            b']' => self.add_token(TokenKind::RightSquare, None),
            b'+' => {
                let kind = if self.matches(b'=') { TokenKind::PlusEq } else { TokenKind::Plus };
                self.add_token(kind, None);
            }
            b'-' => {
                if self.matches(b'=') {
                    self.add_token(TokenKind::MinusEq, None);
                } else if self.matches(b'>') {
                    self.add_token(TokenKind::Arrow, None);
                } else {
                    self.add_token(TokenKind::Minus, None);
                }
            }
            b'%' => {
                let kind = if self.matches(b'=') { TokenKind::PercentEq } else { TokenKind::Percent };
                self.add_token(kind, None);
            }
            b'^' => {
                let kind = if self.matches(b'=') { TokenKind::CaretEq } else { TokenKind::Caret };
                self.add_token(kind, None);
            }
            b'*' => {
                // Any of '*', '*=', or a stray '*/'.
                if self.matches(b'=') {
                    self.add_token(TokenKind::StarEq, None);
                } else if self.matches(b'/') {
                    self.error(
                        ErrorCode::ClosingUnopenedComment,
                        "Closing comment '*/' without opening '/*'.",
                    );
                } else {
                    self.add_token(TokenKind::Star, None);
                }
            }
            b'/' => {
                // Any of '/', '/=', '//', '/*'.
                if self.matches(b'=') {
                    self.add_token(TokenKind::SlashEq, None);
                } else if self.matches(b'/') {
                    self.single_line_comment();
                } else if self.matches(b'*') {
                    self.multi_line_comment();
                } else {
                    self.add_token(TokenKind::Slash, None);
                }
            }
            b',' => self.add_token(TokenKind::Comma, None),
            b'\'' => self.char_literal(),
            b'"' => self.string_literal(),
            b'\n' => {
                self.add_token(TokenKind::Newline, None);
                self.line += 1;
                self.line_index = self.current;
            }
            b'\\' => {
                // Line continuation; only valid directly before a newline.
                if self.matches(b'\n') {
                    self.line += 1;
                    self.line_index = self.current;
                } else if !self.is_at_end() {
                    self.error(ErrorCode::NoLfAfterBackslash, "Expected newline after backslash.");
                }
            }
            b';' => self.add_token(TokenKind::Semicolon, None),
            b'&' => {
                if self.matches(b'&') {
                    let kind = if self.matches(b'=') { TokenKind::AmpAmpEq } else { TokenKind::AmpAmp };
                    self.add_token(kind, None);
                } else if self.matches(b'=') {
                    self.add_token(TokenKind::AmpEq, None);
                } else {
                    self.add_token(TokenKind::Amp, None);
                }
            }
            b'|' => {
                if self.matches(b'|') {
                    let kind = if self.matches(b'=') { TokenKind::BarBarEq } else { TokenKind::BarBar };
                    self.add_token(kind, None);
                } else if self.matches(b'=') {
                    self.add_token(TokenKind::BarEq, None);
                } else {
                    self.add_token(TokenKind::Bar, None);
                }
            }
            b'!' => {
                let kind = if self.matches(b'=') { TokenKind::BangEq } else { TokenKind::Bang };
                self.add_token(kind, None);
            }
            b'=' => {
                if self.matches(b'=') {
                    self.add_token(TokenKind::EqEq, None);
                } else if self.matches(b'>') {
                    self.add_token(TokenKind::DoubleArrow, None);
                } else {
                    self.add_token(TokenKind::Eq, None);
                }
            }
            b'>' => {
                let kind = if self.matches(b'=') { TokenKind::Ge } else { TokenKind::Gt };
                self.add_token(kind, None);
            }
            b'<' => {
                let kind = if self.matches(b'=') { TokenKind::Le } else { TokenKind::Lt };
                self.add_token(kind, None);
            }
            b'.' => {
                // '.', '..', '...', or a float like '.5'.
                if self.matches(b'.') {
                    let kind = if self.matches(b'.') { TokenKind::TripleDot } else { TokenKind::DotDot };
                    self.add_token(kind, None);
                } else if Self::is_digit(self.peek(), 10) {
                    self.numeric_literal();
                } else {
                    self.add_token(TokenKind::Dot, None);
                }
            }
            b':' => {
                let kind = if self.matches(b':') { TokenKind::ColonColon } else { TokenKind::Colon };
                self.add_token(kind, None);
            }
            b' ' | b'\r' | b'\t' => {}
            _ => {
                if Self::is_digit(c, 10) {
                    self.numeric_literal();
                } else if Self::is_alpha(c) {
                    self.identifier();
                } else {
                    self.error(ErrorCode::UnexpectedChar, "Unexpected character.");
                }
            }
        }
    }

    fn single_line_comment(&mut self) {
        while !self.is_at_end() && self.peek() != b'\n' {
            self.advance();
        }
    }

    fn multi_line_comment(&mut self) {
        while !self.is_at_end() {
            if self.peek() == b'*' && self.peek_next(1) == b'/' {
                self.advance();
                self.advance();
                return;
            }
            if self.peek() == b'\n' {
                self.line += 1;
                self.line_index = self.current + 1;
            }
            self.advance();
        }
        self.error(ErrorCode::UnclosedComment, "Comment was not closed at the end of the file.");
    }

    fn read_escape_sequence(&mut self) -> u8 {
        self.advance(); // the backslash
        let c = self.advance();
        match c {
            b'b' => 0x08,
            b'f' => 0x0c,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'0' => 0,
            b'\\' => b'\\',
            b'\'' => b'\'',
            b'"' => b'"',
            b'%' => b'%',
            b'{' => b'{',
            _ => {
                self.error(ErrorCode::IllegalEscSeq, "Illegal escape sequence.");
                c
            }
        }
    }

    fn char_literal(&mut self) {
        if self.is_at_end() || self.peek() == b'\n' {
            self.error(
                ErrorCode::UnclosedChar,
                "Character literal was not closed after the first character.",
            );
            return;
        }
        if self.peek() == b'\'' {
            self.advance();
            self.error(ErrorCode::EmptyChar, "Empty character literal found.");
            return;
        }

        let value = if self.peek() == b'\\' {
            self.read_escape_sequence()
        } else {
            self.advance()
        };
        if !self.matches(b'\'') {
            self.error(
                ErrorCode::UnclosedChar,
                "Character literal was not closed after the first character.",
            );
            return;
        }
        self.add_token(TokenKind::Char, Some(LiteralValue::Char(value as char)));
    }

    fn string_literal(&mut self) {
        let mut is_multi_line = false;
        let mut literal = Vec::new();

        if self.peek() == b'"' && self.peek_next(1) == b'"' {
            self.advance();
            self.advance();
            is_multi_line = true;
        }
        loop {
            if is_multi_line && self.is_at_end() {
                self.error(
                    ErrorCode::UnclosedMultiLineString,
                    "Multi-line string literal was not closed at the end of the file.",
                );
                return;
            }
            if !is_multi_line && (self.is_at_end() || self.peek() == b'\n') {
                self.error(
                    ErrorCode::UnclosedString,
                    "Single-line string literal was not closed at the end of the line.",
                );
                return;
            }
            if is_multi_line && self.peek() == b'"' && self.peek_next(1) == b'"' && self.peek_next(2) == b'"' {
                self.advance();
                self.advance();
                self.advance();
                break;
            }
            if !is_multi_line && self.peek() == b'"' {
                self.advance();
                break;
            }
            if self.peek() == b'\\' {
                let c = self.read_escape_sequence();
                literal.push(c);
            } else {
                if self.peek() == b'\n' {
                    self.line += 1;
                    self.line_index = self.current + 1;
                }
                let c = self.advance();
                literal.push(c);
            }
        }
        let value = String::from_utf8_lossy(&literal).into_owned();
        self.add_token(TokenKind::Str, Some(LiteralValue::Str(value)));
    }

    fn numeric_literal(&mut self) {
        // Accepted forms: decimal, 0b/0o/0x integers, floats with optional
        // exponent, underscore separators, and floats without a leading or
        // trailing zero ('.5', '5.'). A decimal point is rejected in
        // non-decimal bases and exponents must have digits.
        let first_digit = self.bytes[self.current - 1];
        let mut num_string = String::new();
        num_string.push(first_digit as char);
        let mut is_float = first_digit == b'.';
        let mut base = 10u32;

        if first_digit == b'0' {
            if self.peek() == b'x' {
                self.advance();
                base = 16;
            } else if self.peek() == b'b' {
                self.advance();
                base = 2;
            } else if self.peek() == b'o' {
                self.advance();
                base = 8;
            }
        }

        while Self::is_digit(self.peek(), base) || self.peek() == b'_' || self.peek() == b'.' {
            if self.peek() == b'_' {
                self.advance();
            } else if self.peek() == b'.' {
                // Not a decimal point if this is the start of a range operator.
                if self.peek_next(1) == b'.' {
                    break;
                }
                if is_float {
                    self.error(ErrorCode::MultipleDecimalPoints, "Multiple decimal points in a number.");
                    return;
                } else if base != 10 {
                    self.error(ErrorCode::NonDecimalFloat, "Floating point numbers must be in base 10.");
                    return;
                } else {
                    is_float = true;
                    num_string.push(self.advance() as char);
                }
            } else {
                num_string.push(self.advance() as char);
            }
        }

        if base == 10 && (self.peek() == b'e' || self.peek() == b'E') {
            // Exponential notation always makes the number a float.
            is_float = true;
            num_string.push(self.advance() as char);
            if self.peek() == b'+' || self.peek() == b'-' {
                num_string.push(self.advance() as char);
            }
            if !Self::is_digit(self.peek(), 10) {
                self.error(
                    ErrorCode::NoDigitsInExponent,
                    "Exponential notation must have at least one digit in the exponent.",
                );
                return;
            }
            while Self::is_digit(self.peek(), 10) || self.peek() == b'_' {
                if self.peek() != b'_' {
                    num_string.push(self.advance() as char);
                } else {
                    self.advance();
                }
            }
        }

        // Numbers must be followed by a space, a newline, or a
        // non-alphanumeric character.
        if Self::is_alpha_numeric(self.peek()) {
            self.error(
                ErrorCode::NonDigitInNumber,
                "Numbers should be followed by a space, a newline, or a non-alphanumeric character.",
            );
            return;
        }

        if is_float {
            match num_string.parse::<f64>() {
                Ok(num) if num.is_finite() => self.add_token(TokenKind::Float, Some(LiteralValue::Float(num))),
                Ok(_) => self.error(ErrorCode::FloatTooLarge, "Floating point number is too large."),
                Err(_) => self.error(
                    ErrorCode::Conversion,
                    "An unknown error occurred while parsing a floating point number.",
                ),
            }
        } else {
            // The base prefix was consumed without entering num_string, so
            // the remaining digits parse directly in the detected base.
            match i64::from_str_radix(&num_string, base) {
                Ok(num) => self.add_token(TokenKind::Int, Some(LiteralValue::Int(num))),
                Err(_) => self.error(ErrorCode::IntTooLarge, "Integer is too large."),
            }
        }
    }

    fn identifier(&mut self) {
        while Self::is_alpha_numeric(self.peek()) {
            self.advance();
        }
        let text = String::from_utf8_lossy(&self.bytes[self.start..self.current]).into_owned();
        match KEYWORDS.get(text.as_str()) {
            None => self.add_token(TokenKind::Ident, None),
            Some(TokenKind::Bool) => {
                let value = text == "true";
                self.add_token(TokenKind::Bool, Some(LiteralValue::Bool(value)));
            }
            Some(TokenKind::Nil) => self.add_token(TokenKind::Nil, None),
            Some(TokenKind::Float) => {
                let value = if text == "inf" { f64::INFINITY } else { f64::NAN };
                self.add_token(TokenKind::Float, Some(LiteralValue::Float(value)));
            }
            Some(kind) => self.add_token(*kind, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::source::SourceRegistry;

    fn scan(source: &str) -> (Vec<Token>, Vec<ErrorCode>) {
        let mut registry = SourceRegistry::new();
        let id = registry.add_source("test.fl", source);
        let text = registry.file(id).text.clone();
        let mut sink = DiagnosticSink::muted(Rc::new(registry));
        let mut scanner = Scanner::new(&mut sink);
        scanner.scan_file(id, &text);
        let tokens = scanner.into_tokens();
        (tokens, sink.error_codes())
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        scan(source).0.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_scan_declaration() {
        assert_eq!(
            kinds("var x: i32 = 5"),
            vec![
                TokenKind::Var,
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::Ident,
                TokenKind::Eq,
                TokenKind::Int,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_scan_operators() {
        assert_eq!(
            kinds("+= -> => :: .. ... &&= ||="),
            vec![
                TokenKind::PlusEq,
                TokenKind::Arrow,
                TokenKind::DoubleArrow,
                TokenKind::ColonColon,
                TokenKind::DotDot,
                TokenKind::TripleDot,
                TokenKind::AmpAmpEq,
                TokenKind::BarBarEq,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_scan_number_bases() {
        let (tokens, errors) = scan("255 0xff 0b11111111 0o377 1_000");
        assert!(errors.is_empty());
        let values: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t.literal {
                Some(LiteralValue::Int(v)) => Some(v),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![255, 255, 255, 255, 1000]);
    }

    #[test]
    fn test_scan_floats() {
        let (tokens, errors) = scan("3.5 .5 1e3 1.5e-2 inf");
        assert!(errors.is_empty());
        let values: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t.literal {
                Some(LiteralValue::Float(v)) => Some(v),
                _ => None,
            })
            .collect();
        assert_eq!(values[..4], [3.5, 0.5, 1000.0, 0.015]);
        assert!(values[4].is_infinite());
    }

    #[test]
    fn test_float_too_large() {
        let (_, errors) = scan("1E1000");
        assert_eq!(errors, vec![ErrorCode::FloatTooLarge]);
    }

    #[test]
    fn test_int_too_large() {
        let (_, errors) = scan("99999999999999999999999999");
        assert_eq!(errors, vec![ErrorCode::IntTooLarge]);
    }

    #[test]
    fn test_empty_char() {
        let (_, errors) = scan("''");
        assert_eq!(errors, vec![ErrorCode::EmptyChar]);
    }

    #[test]
    fn test_char_escapes() {
        let (tokens, errors) = scan(r"'\n' '\\' '\0'");
        assert!(errors.is_empty());
        let values: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t.literal {
                Some(LiteralValue::Char(v)) => Some(v),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec!['\n', '\\', '\0']);
    }

    #[test]
    fn test_strings() {
        let (tokens, errors) = scan("\"hello\\n\" \"\"\"multi\nline\"\"\"");
        assert!(errors.is_empty());
        let values: Vec<_> = tokens
            .iter()
            .filter_map(|t| match &t.literal {
                Some(LiteralValue::Str(v)) => Some(v.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec!["hello\n".to_string(), "multi\nline".to_string()]);
    }

    #[test]
    fn test_unclosed_string() {
        let (_, errors) = scan("\"oops\nvar x = 1");
        assert_eq!(errors, vec![ErrorCode::UnclosedString]);
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            kinds("1 // comment\n2 /* multi\nline */ 3"),
            vec![
                TokenKind::Int,
                TokenKind::Newline,
                TokenKind::Int,
                TokenKind::Int,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unopened_comment_close() {
        let (_, errors) = scan("*/");
        assert_eq!(errors, vec![ErrorCode::ClosingUnopenedComment]);
    }

    #[test]
    fn test_line_continuation() {
        assert_eq!(
            kinds("1 \\\n2"),
            vec![TokenKind::Int, TokenKind::Int, TokenKind::Eof]
        );
    }

    #[test]
    fn test_non_decimal_float_rejected() {
        let (_, errors) = scan("0x1.5");
        assert_eq!(errors, vec![ErrorCode::NonDecimalFloat]);
    }

    #[test]
    fn test_exponent_without_digits() {
        let (_, errors) = scan("1.5e");
        assert_eq!(errors, vec![ErrorCode::NoDigitsInExponent]);
    }

    #[test]
    fn test_location_covers_lexeme() {
        let source = "var answer = 42\n";
        let (tokens, _) = scan(source);
        for token in tokens.iter().filter(|t| t.kind != TokenKind::Eof) {
            let loc = token.location;
            let start = loc.line_index + loc.column;
            assert_eq!(&source[start..start + token.lexeme.len()], token.lexeme);
        }
    }

    #[test]
    fn test_range_after_int() {
        assert_eq!(
            kinds("0..10"),
            vec![TokenKind::Int, TokenKind::DotDot, TokenKind::Int, TokenKind::Eof]
        );
    }
}
