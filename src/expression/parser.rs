//! Recursive-descent parser from tokens to a checked [`Expr`].
//!
//! # Design Decisions
//! - Operator/field compatibility is checked here, not at request time
//! - Nesting depth is capped so hostile input cannot exhaust the stack
//! - Regexes are compiled once with a size limit

use regex::RegexBuilder;

use crate::expression::accessor::{Accessor, FieldKind, Segment};
use crate::expression::ast::{CompareOp, Expr, Literal};
use crate::expression::error::CompileError;
use crate::expression::lexer::{Token, TokenKind};

/// Maximum nesting of parentheses and negations.
pub const MAX_DEPTH: usize = 64;

/// Compiled size limit handed to the regex engine.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

static EOF: TokenKind = TokenKind::Eof;

/// Parse a token stream produced by [`tokenize`](crate::expression::lexer::tokenize).
pub fn parse(tokens: Vec<Token>) -> Result<Expr, CompileError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    if parser.peek() == &TokenKind::Eof {
        return Err(CompileError::Empty);
    }
    let expr = parser.parse_or()?;
    match parser.peek() {
        TokenKind::Eof => Ok(expr),
        _ => Err(parser.unexpected("end of input")),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        // The stream always ends with Eof, so clamp to it.
        let index = (self.pos + offset).min(self.tokens.len().saturating_sub(1));
        self.tokens
            .get(index)
            .map(|t| &t.kind)
            .unwrap_or(&EOF)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn current_pos(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |t| t.pos)
    }

    fn unexpected(&self, expected: &'static str) -> CompileError {
        CompileError::UnexpectedToken {
            expected,
            found: self.peek().to_string(),
            pos: self.current_pos(),
        }
    }

    fn enter(&mut self) -> Result<(), CompileError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CompileError::TooDeep { max: MAX_DEPTH });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == &TokenKind::Or {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_unary()?;
        while self.peek() == &TokenKind::And {
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        if self.peek() == &TokenKind::Not {
            self.advance();
            self.enter()?;
            let inner = self.parse_unary()?;
            self.leave();
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        match self.peek() {
            TokenKind::LParen => {
                self.advance();
                self.enter()?;
                let inner = self.parse_or()?;
                self.leave();
                if self.advance() != TokenKind::RParen {
                    self.pos -= 1;
                    return Err(self.unexpected("')'"));
                }
                Ok(inner)
            }
            TokenKind::True | TokenKind::False if !self.literal_starts_condition() => {
                let value = self.advance() == TokenKind::True;
                Ok(Expr::Const(value))
            }
            TokenKind::Str(_) | TokenKind::Number { .. } | TokenKind::True | TokenKind::False => {
                self.parse_literal_condition()
            }
            TokenKind::Ident(_) => self.parse_selector_condition(),
            _ => Err(self.unexpected("expression")),
        }
    }

    /// A boolean literal followed by an operator is an operand, not a constant.
    fn literal_starts_condition(&self) -> bool {
        compare_op(self.peek_at(1)).is_some()
            || self.peek_at(1) == &TokenKind::In
            || (self.peek_at(1) == &TokenKind::Not && self.peek_at(2) == &TokenKind::In)
    }

    fn parse_selector_condition(&mut self) -> Result<Expr, CompileError> {
        let field = self.parse_selector()?;
        if let Some(op) = compare_op(self.peek()) {
            self.advance();
            let literal = self.parse_literal()?;
            return compare(field, op, literal);
        }
        match self.peek().clone() {
            TokenKind::Contains => {
                self.advance();
                self.contains(field, false)
            }
            TokenKind::Matches => {
                self.advance();
                self.matches(field, false)
            }
            TokenKind::Not => {
                self.advance();
                match self.advance() {
                    TokenKind::Contains => self.contains(field, true),
                    TokenKind::Matches => self.matches(field, true),
                    _ => {
                        self.pos -= 1;
                        Err(self.unexpected("'contains' or 'matches'"))
                    }
                }
            }
            TokenKind::Is => {
                self.advance();
                let negated = if self.peek() == &TokenKind::Not {
                    self.advance();
                    true
                } else {
                    false
                };
                if self.advance() != TokenKind::Empty {
                    self.pos -= 1;
                    return Err(self.unexpected("'empty'"));
                }
                Ok(Expr::IsEmpty { field, negated })
            }
            _ => Err(self.unexpected("operator")),
        }
    }

    fn parse_literal_condition(&mut self) -> Result<Expr, CompileError> {
        let literal = self.parse_literal()?;
        if let Some(op) = compare_op(self.peek()) {
            self.advance();
            let field = self.parse_selector()?;
            return compare(field, op.flipped(), literal);
        }
        match self.peek().clone() {
            TokenKind::In => {
                self.advance();
                let field = self.parse_selector()?;
                membership(field, literal, false)
            }
            TokenKind::Not if self.peek_at(1) == &TokenKind::In => {
                self.advance();
                self.advance();
                let field = self.parse_selector()?;
                membership(field, literal, true)
            }
            _ => Err(self.unexpected("comparison operator or 'in'")),
        }
    }

    fn parse_selector(&mut self) -> Result<Accessor, CompileError> {
        let mut segments = match self.advance() {
            TokenKind::Ident(name) => vec![Segment::Name(name)],
            _ => {
                self.pos -= 1;
                return Err(self.unexpected("field selector"));
            }
        };

        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    match self.advance() {
                        TokenKind::Ident(name) => segments.push(Segment::Name(name)),
                        TokenKind::Number { raw, .. } => {
                            let index = self.index(&raw)?;
                            segments.push(Segment::Index(index));
                        }
                        _ => {
                            self.pos -= 1;
                            return Err(self.unexpected("field name or index"));
                        }
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    match self.advance() {
                        TokenKind::Str(key) => segments.push(Segment::Key(key)),
                        TokenKind::Number { raw, .. } => {
                            let index = self.index(&raw)?;
                            segments.push(Segment::Index(index));
                        }
                        _ => {
                            self.pos -= 1;
                            return Err(self.unexpected("string key or index"));
                        }
                    }
                    if self.advance() != TokenKind::RBracket {
                        self.pos -= 1;
                        return Err(self.unexpected("']'"));
                    }
                }
                _ => break,
            }
        }

        Accessor::resolve(&segments)
    }

    fn index(&self, raw: &str) -> Result<usize, CompileError> {
        raw.parse::<usize>().map_err(|_| CompileError::UnexpectedToken {
            expected: "non-negative integer index",
            found: raw.to_string(),
            pos: self.tokens.get(self.pos.saturating_sub(1)).map_or(0, |t| t.pos),
        })
    }

    fn parse_literal(&mut self) -> Result<Literal, CompileError> {
        match self.advance() {
            TokenKind::Str(s) => Ok(Literal::Str(s)),
            TokenKind::Number { value, .. } => Ok(Literal::Number(value)),
            TokenKind::True => Ok(Literal::Bool(true)),
            TokenKind::False => Ok(Literal::Bool(false)),
            _ => {
                self.pos -= 1;
                Err(self.unexpected("literal"))
            }
        }
    }

    fn contains(&mut self, field: Accessor, negated: bool) -> Result<Expr, CompileError> {
        let literal = self.parse_literal()?;
        membership(field, literal, negated)
    }

    fn matches(&mut self, field: Accessor, negated: bool) -> Result<Expr, CompileError> {
        let operator = if negated { "not matches" } else { "matches" };
        let pattern = match self.parse_literal()? {
            Literal::Str(pattern) => pattern,
            _ => return Err(unsupported(operator, &field, "pattern must be a string")),
        };
        if field.kind() != FieldKind::Text {
            return Err(unsupported(operator, &field, "only text fields can be matched"));
        }
        let pattern = RegexBuilder::new(&pattern)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|e| CompileError::InvalidRegex {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
        Ok(Expr::Matches {
            field,
            pattern,
            negated,
        })
    }
}

fn compare_op(kind: &TokenKind) -> Option<CompareOp> {
    match kind {
        TokenKind::Eq => Some(CompareOp::Eq),
        TokenKind::Ne => Some(CompareOp::Ne),
        TokenKind::Lt => Some(CompareOp::Lt),
        TokenKind::Le => Some(CompareOp::Le),
        TokenKind::Gt => Some(CompareOp::Gt),
        TokenKind::Ge => Some(CompareOp::Ge),
        _ => None,
    }
}

fn unsupported(operator: &str, field: &Accessor, reason: &'static str) -> CompileError {
    CompileError::UnsupportedOperator {
        operator: operator.to_string(),
        field: field.to_string(),
        reason,
    }
}

fn compare(field: Accessor, op: CompareOp, literal: Literal) -> Result<Expr, CompileError> {
    let operator = op.to_string();
    let literal = match (field.kind(), literal) {
        (FieldKind::List, _) => {
            return Err(unsupported(
                &operator,
                &field,
                "multi-valued field needs an index, or use contains/in",
            ))
        }
        (_, Literal::Bool(_)) if op.is_ordering() => {
            return Err(unsupported(&operator, &field, "booleans are not ordered"))
        }
        (FieldKind::Number, Literal::Str(text)) => match text.trim().parse::<f64>() {
            Ok(value) => Literal::Number(value),
            Err(_) => {
                return Err(unsupported(&operator, &field, "numeric field needs a numeric literal"))
            }
        },
        (FieldKind::Number, Literal::Bool(_)) => {
            return Err(unsupported(&operator, &field, "numeric field needs a numeric literal"))
        }
        (_, literal) => literal,
    };
    Ok(Expr::Compare { field, op, literal })
}

fn membership(field: Accessor, literal: Literal, negated: bool) -> Result<Expr, CompileError> {
    let operator = if negated { "not contains" } else { "contains" };
    let needle = match literal {
        Literal::Str(needle) => needle,
        _ => return Err(unsupported(operator, &field, "needle must be a string")),
    };
    if field.kind() == FieldKind::Number {
        return Err(unsupported(operator, &field, "numeric fields have no members"));
    }
    Ok(Expr::Contains {
        field,
        needle,
        negated,
    })
}
