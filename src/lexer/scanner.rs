//! Lexer/Scanner for Xray source code.
//!
//! Identifiers and keywords are ASCII-only; the scanner does not attempt
//! Unicode-aware identifier classification.

use crate::error::LexError;
use crate::lexer::token::{Token, TokenKind};
use crate::span::Span;

/// The lexer transforms source text into a stream of tokens.
pub struct Scanner<'a> {
    source: &'a [u8],
    current: usize,
    line: u32,
    column: u32,
    start: usize,
    start_line: u32,
    start_column: u32,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source: source.as_bytes(),
            current: 0,
            line: 1,
            column: 1,
            start: 0,
            start_line: 1,
            start_column: 1,
        }
    }

    /// Scan the entire source into a token stream, ending with `Eof`.
    pub fn scan_tokens(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.scan_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        Ok(tokens)
    }

    fn scan_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace_and_comments()?;
        self.start = self.current;
        self.start_line = self.line;
        self.start_column = self.column;

        let Some(c) = self.advance() else {
            return Ok(Token::eof(self.current, self.line, self.column));
        };

        match c {
            b'(' => Ok(self.make(TokenKind::LeftParen)),
            b')' => Ok(self.make(TokenKind::RightParen)),
            b'{' => Ok(self.make(TokenKind::LeftBrace)),
            b'}' => Ok(self.make(TokenKind::RightBrace)),
            b'[' => Ok(self.make(TokenKind::LeftBracket)),
            b']' => Ok(self.make(TokenKind::RightBracket)),
            b',' => Ok(self.make(TokenKind::Comma)),
            b';' => Ok(self.make(TokenKind::Semicolon)),
            b'+' => Ok(self.make(TokenKind::Plus)),
            b'-' => Ok(self.make(TokenKind::Minus)),
            b'*' => Ok(self.make(TokenKind::Star)),
            b'/' => Ok(self.make(TokenKind::Slash)),
            b'%' => Ok(self.make(TokenKind::Percent)),
            b'!' => {
                if self.match_char(b'=') {
                    Ok(self.make(TokenKind::BangEqual))
                } else {
                    Ok(self.make(TokenKind::Bang))
                }
            }
            b'=' => {
                if self.match_char(b'=') {
                    Ok(self.make(TokenKind::EqualEqual))
                } else {
                    Ok(self.make(TokenKind::Equal))
                }
            }
            b'<' => {
                if self.match_char(b'=') {
                    Ok(self.make(TokenKind::LessEqual))
                } else {
                    Ok(self.make(TokenKind::Less))
                }
            }
            b'>' => {
                if self.match_char(b'=') {
                    Ok(self.make(TokenKind::GreaterEqual))
                } else {
                    Ok(self.make(TokenKind::Greater))
                }
            }
            b'&' => {
                if self.match_char(b'&') {
                    Ok(self.make(TokenKind::AndAnd))
                } else {
                    Err(LexError::UnexpectedChar('&', self.span()))
                }
            }
            b'|' => {
                if self.match_char(b'|') {
                    Ok(self.make(TokenKind::OrOr))
                } else {
                    Err(LexError::UnexpectedChar('|', self.span()))
                }
            }
            b'"' => self.scan_string(),
            c if c.is_ascii_digit() => self.scan_number(),
            c if is_ident_start(c) => Ok(self.scan_identifier()),
            c => Err(LexError::UnexpectedChar(c as char, self.span())),
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') => {
                    self.advance();
                }
                Some(b'\n') => {
                    self.advance();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while self.peek().is_some() && self.peek() != Some(b'\n') {
                        self.advance();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start_line = self.line;
                    self.advance();
                    self.advance();
                    loop {
                        match self.peek() {
                            None => {
                                return Err(LexError::UnterminatedComment(Span::new(
                                    self.start,
                                    self.current,
                                    start_line,
                                    self.start_column,
                                )))
                            }
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            Some(_) => {
                                self.advance();
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn scan_string(&mut self) -> Result<Token, LexError> {
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(LexError::UnterminatedString(self.span())),
                Some(b'"') => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    let escaped = match self.advance() {
                        Some(b'n') => b'\n',
                        Some(b't') => b'\t',
                        Some(b'r') => b'\r',
                        Some(b'"') => b'"',
                        Some(b'\\') => b'\\',
                        Some(other) => other,
                        None => return Err(LexError::UnterminatedString(self.span())),
                    };
                    value.push(escaped as char);
                }
                Some(_) => {
                    let c = self.advance().unwrap();
                    value.push(c as char);
                }
            }
        }
        Ok(self.make(TokenKind::StringLiteral(value)))
    }

    fn scan_number(&mut self) -> Result<Token, LexError> {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let text = std::str::from_utf8(&self.source[self.start..self.current]).unwrap();
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| LexError::InvalidNumber(text.to_string(), self.span()))?;
            Ok(self.make(TokenKind::FloatLiteral(value)))
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| LexError::InvalidNumber(text.to_string(), self.span()))?;
            Ok(self.make(TokenKind::IntLiteral(value)))
        }
    }

    fn scan_identifier(&mut self) -> Token {
        while self.peek().is_some_and(is_ident_continue) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.source[self.start..self.current]).unwrap();
        let kind = TokenKind::keyword(text).unwrap_or_else(|| TokenKind::Identifier(text.to_string()));
        self.make(kind)
    }

    // ===== Low-level character access =====

    fn advance(&mut self) -> Option<u8> {
        let c = *self.source.get(self.current)?;
        self.current += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.current).copied()
    }

    fn peek_at(&self, n: usize) -> Option<u8> {
        self.source.get(self.current + n).copied()
    }

    fn match_char(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn span(&self) -> Span {
        Span::new(self.start, self.current, self.start_line, self.start_column)
    }

    fn make(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.span())
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Scanner::new(src)
            .scan_tokens()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn scans_arithmetic() {
        assert_eq!(
            kinds("1 + 2 * 3"),
            vec![
                TokenKind::IntLiteral(1),
                TokenKind::Plus,
                TokenKind::IntLiteral(2),
                TokenKind::Star,
                TokenKind::IntLiteral(3),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn scans_keywords_and_identifiers() {
        assert_eq!(
            kinds("let x = fib"),
            vec![
                TokenKind::Let,
                TokenKind::Identifier("x".into()),
                TokenKind::Equal,
                TokenKind::Identifier("fib".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_comments() {
        assert_eq!(
            kinds("1 // comment\n/* block */ 2"),
            vec![TokenKind::IntLiteral(1), TokenKind::IntLiteral(2), TokenKind::Eof]
        );
    }

    #[test]
    fn scans_float() {
        assert_eq!(kinds("3.14"), vec![TokenKind::FloatLiteral(3.14), TokenKind::Eof]);
    }

    #[test]
    fn unterminated_string_errors() {
        assert!(Scanner::new("\"abc").scan_tokens().is_err());
    }
}
