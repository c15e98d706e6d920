//! Tokenizer for predicate source text.

use std::fmt;

use crate::expression::error::CompileError;

/// Kinds of token produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Str(String),
    Number { value: f64, raw: String },
    True,
    False,
    And,
    Or,
    Not,
    In,
    Contains,
    Matches,
    Is,
    Empty,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "identifier {name:?}"),
            TokenKind::Str(s) => write!(f, "string {s:?}"),
            TokenKind::Number { raw, .. } => write!(f, "number {raw}"),
            TokenKind::True => f.write_str("'true'"),
            TokenKind::False => f.write_str("'false'"),
            TokenKind::And => f.write_str("'and'"),
            TokenKind::Or => f.write_str("'or'"),
            TokenKind::Not => f.write_str("'not'"),
            TokenKind::In => f.write_str("'in'"),
            TokenKind::Contains => f.write_str("'contains'"),
            TokenKind::Matches => f.write_str("'matches'"),
            TokenKind::Is => f.write_str("'is'"),
            TokenKind::Empty => f.write_str("'empty'"),
            TokenKind::Eq => f.write_str("'=='"),
            TokenKind::Ne => f.write_str("'!='"),
            TokenKind::Lt => f.write_str("'<'"),
            TokenKind::Le => f.write_str("'<='"),
            TokenKind::Gt => f.write_str("'>'"),
            TokenKind::Ge => f.write_str("'>='"),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
            TokenKind::LBracket => f.write_str("'['"),
            TokenKind::RBracket => f.write_str("']'"),
            TokenKind::Dot => f.write_str("'.'"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

/// Split `source` into tokens, terminated by a single [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
    let mut lexer = Lexer {
        source,
        chars: source.char_indices().peekable(),
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

struct Lexer<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn run(&mut self) -> Result<(), CompileError> {
        while let Some(&(pos, c)) = self.chars.peek() {
            match c {
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '(' => self.single(TokenKind::LParen, pos),
                ')' => self.single(TokenKind::RParen, pos),
                '[' => self.single(TokenKind::LBracket, pos),
                ']' => self.single(TokenKind::RBracket, pos),
                '.' => self.single(TokenKind::Dot, pos),
                '=' => {
                    self.chars.next();
                    self.expect_next('=', pos, '=')?;
                    self.push(TokenKind::Eq, pos);
                }
                '!' => {
                    self.chars.next();
                    if self.eat('=') {
                        self.push(TokenKind::Ne, pos);
                    } else {
                        self.push(TokenKind::Not, pos);
                    }
                }
                '<' => {
                    self.chars.next();
                    let kind = if self.eat('=') { TokenKind::Le } else { TokenKind::Lt };
                    self.push(kind, pos);
                }
                '>' => {
                    self.chars.next();
                    let kind = if self.eat('=') { TokenKind::Ge } else { TokenKind::Gt };
                    self.push(kind, pos);
                }
                '&' => {
                    self.chars.next();
                    self.expect_next('&', pos, '&')?;
                    self.push(TokenKind::And, pos);
                }
                '|' => {
                    self.chars.next();
                    self.expect_next('|', pos, '|')?;
                    self.push(TokenKind::Or, pos);
                }
                '"' => self.quoted(pos)?,
                '`' => self.raw(pos)?,
                c if c.is_ascii_digit() || c == '-' => self.number(pos)?,
                c if c.is_alphabetic() || c == '_' => self.word(pos),
                other => return Err(CompileError::UnexpectedChar { found: other, pos }),
            }
        }
        self.push(TokenKind::Eof, self.source.len());
        Ok(())
    }

    fn push(&mut self, kind: TokenKind, pos: usize) {
        self.tokens.push(Token { kind, pos });
    }

    fn single(&mut self, kind: TokenKind, pos: usize) {
        self.chars.next();
        self.push(kind, pos);
    }

    fn eat(&mut self, expected: char) -> bool {
        match self.chars.peek() {
            Some(&(_, c)) if c == expected => {
                self.chars.next();
                true
            }
            _ => false,
        }
    }

    /// Consume the second character of a two-character operator.
    fn expect_next(&mut self, expected: char, start: usize, first: char) -> Result<(), CompileError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(CompileError::UnexpectedChar { found: first, pos: start })
        }
    }

    fn quoted(&mut self, start: usize) -> Result<(), CompileError> {
        self.chars.next();
        let mut value = String::new();
        loop {
            match self.chars.next() {
                None => return Err(CompileError::UnterminatedString { pos: start }),
                Some((_, '"')) => break,
                Some((pos, '\\')) => match self.chars.next() {
                    Some((_, '"')) => value.push('"'),
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, other)) => return Err(CompileError::InvalidEscape { found: other, pos }),
                    None => return Err(CompileError::UnterminatedString { pos: start }),
                },
                Some((_, c)) => value.push(c),
            }
        }
        self.push(TokenKind::Str(value), start);
        Ok(())
    }

    /// Backtick strings take their content verbatim.
    fn raw(&mut self, start: usize) -> Result<(), CompileError> {
        self.chars.next();
        let mut value = String::new();
        loop {
            match self.chars.next() {
                None => return Err(CompileError::UnterminatedString { pos: start }),
                Some((_, '`')) => break,
                Some((_, c)) => value.push(c),
            }
        }
        self.push(TokenKind::Str(value), start);
        Ok(())
    }

    fn number(&mut self, start: usize) -> Result<(), CompileError> {
        // After a dot the number is a selector index such as `.0`, never a fraction.
        let index_only = matches!(self.tokens.last(), Some(Token { kind: TokenKind::Dot, .. }));
        let mut end = start;
        let mut seen_dot = false;
        while let Some(&(pos, c)) = self.chars.peek() {
            let accept = c.is_ascii_digit()
                || (pos == start && c == '-')
                || (c == '.' && !index_only && !seen_dot && self.digit_at(pos + 1));
            if !accept {
                break;
            }
            seen_dot |= c == '.';
            end = pos + c.len_utf8();
            self.chars.next();
        }
        let raw = &self.source[start..end];
        let value = raw.parse::<f64>().map_err(|_| CompileError::InvalidNumber {
            text: raw.to_string(),
            pos: start,
        })?;
        self.push(
            TokenKind::Number {
                value,
                raw: raw.to_string(),
            },
            start,
        );
        Ok(())
    }

    fn digit_at(&self, pos: usize) -> bool {
        self.source
            .get(pos..)
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| c.is_ascii_digit())
    }

    fn word(&mut self, start: usize) {
        let mut end = start;
        while let Some(&(pos, c)) = self.chars.peek() {
            if !(c.is_alphanumeric() || c == '_') {
                break;
            }
            end = pos + c.len_utf8();
            self.chars.next();
        }
        let word = &self.source[start..end];
        let kind = match word {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "in" => TokenKind::In,
            "contains" => TokenKind::Contains,
            "matches" => TokenKind::Matches,
            "is" => TokenKind::Is,
            "empty" => TokenKind::Empty,
            _ => TokenKind::Ident(word.to_string()),
        };
        self.push(kind, start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_selector_with_bracket_index() {
        assert_eq!(
            kinds(r#"Header["Foo"][0] == "bar""#),
            vec![
                TokenKind::Ident("Header".into()),
                TokenKind::LBracket,
                TokenKind::Str("Foo".into()),
                TokenKind::RBracket,
                TokenKind::LBracket,
                TokenKind::Number { value: 0.0, raw: "0".into() },
                TokenKind::RBracket,
                TokenKind::Eq,
                TokenKind::Str("bar".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_dotted_index_is_not_a_fraction() {
        let tokens = kinds("Header[`Foo`].0 == `bar`");
        assert_eq!(tokens[4], TokenKind::Dot);
        assert_eq!(tokens[5], TokenKind::Number { value: 0.0, raw: "0".into() });
        assert_eq!(tokens[7], TokenKind::Str("bar".into()));
    }

    #[test]
    fn test_numbers_and_operators() {
        assert_eq!(
            kinds("ContentLength >= -1.5 && !x || y != 2"),
            vec![
                TokenKind::Ident("ContentLength".into()),
                TokenKind::Ge,
                TokenKind::Number { value: -1.5, raw: "-1.5".into() },
                TokenKind::And,
                TokenKind::Not,
                TokenKind::Ident("x".into()),
                TokenKind::Or,
                TokenKind::Ident("y".into()),
                TokenKind::Ne,
                TokenKind::Number { value: 2.0, raw: "2".into() },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_escapes() {
        assert_eq!(kinds(r#""a\"b\\c""#)[0], TokenKind::Str("a\"b\\c".into()));
        assert!(matches!(
            tokenize(r#""bad\q""#),
            Err(CompileError::InvalidEscape { found: 'q', .. })
        ));
    }

    #[test]
    fn test_lexical_errors() {
        assert!(matches!(tokenize("\"open"), Err(CompileError::UnterminatedString { pos: 0 })));
        assert!(matches!(tokenize("a = b"), Err(CompileError::UnexpectedChar { found: '=', pos: 2 })));
        assert!(matches!(tokenize("a & b"), Err(CompileError::UnexpectedChar { found: '&', .. })));
        assert!(matches!(tokenize("Path == @"), Err(CompileError::UnexpectedChar { found: '@', .. })));
        assert!(matches!(tokenize("- 1"), Err(CompileError::InvalidNumber { .. })));
    }
}
