//! Pratt expression parsing.

use crate::ast::expr::{BinOp, Expr, UnaryOp};
use crate::error::ParseError;
use crate::lexer::TokenKind;
use crate::span::Span;

use super::core::{ParseResult, Parser};
use super::precedence::{get_precedence, Precedence};

impl Parser {
    pub(crate) fn expression(&mut self) -> ParseResult<Expr> {
        self.parse_precedence(Precedence::Assignment)
    }

    fn parse_precedence(&mut self, min_prec: Precedence) -> ParseResult<Expr> {
        let mut left = self.unary()?;

        loop {
            let prec = get_precedence(&self.peek().kind);
            if prec < min_prec || prec == Precedence::None {
                break;
            }

            if self.check(&TokenKind::Equal) {
                left = self.finish_assignment(left)?;
                continue;
            }

            left = self.infix(left, prec)?;
        }

        Ok(left)
    }

    fn infix(&mut self, left: Expr, prec: Precedence) -> ParseResult<Expr> {
        match &self.peek().kind {
            TokenKind::LeftParen => self.finish_call(left),
            TokenKind::LeftBracket => self.finish_index(left),
            _ => {
                let op_token = self.advance();
                let op = binop_for(&op_token.kind).ok_or_else(|| {
                    ParseError::general("expected binary operator", op_token.span)
                })?;
                let right = self.parse_precedence(prec.next())?;
                let span = join(left.span(), right.span());
                Ok(Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                    span,
                })
            }
        }
    }

    fn finish_assignment(&mut self, target: Expr) -> ParseResult<Expr> {
        let eq_span = self.current_span();
        self.advance(); // consume '='
        let value = self.parse_precedence(Precedence::Assignment)?;
        let span = join(target.span(), value.span());
        match target {
            Expr::Variable(name, _) => Ok(Expr::Assign {
                name,
                value: Box::new(value),
                span,
            }),
            Expr::Index { object, index, .. } => Ok(Expr::IndexAssign {
                object,
                index,
                value: Box::new(value),
                span,
            }),
            _ => Err(ParseError::InvalidAssignmentTarget(eq_span)),
        }
    }

    fn finish_call(&mut self, callee: Expr) -> ParseResult<Expr> {
        self.advance(); // consume '('
        let mut args = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                args.push(self.expression()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let end = self.expect(&TokenKind::RightParen)?;
        let span = join(callee.span(), end.span);
        Ok(Expr::Call {
            callee: Box::new(callee),
            args,
            span,
        })
    }

    fn finish_index(&mut self, object: Expr) -> ParseResult<Expr> {
        self.advance(); // consume '['
        let index = self.expression()?;
        let end = self.expect(&TokenKind::RightBracket)?;
        let span = join(object.span(), end.span);
        Ok(Expr::Index {
            object: Box::new(object),
            index: Box::new(index),
            span,
        })
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        match &self.peek().kind {
            TokenKind::Minus => {
                let start = self.advance().span;
                let operand = self.unary()?;
                let span = join(start, operand.span());
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                    span,
                })
            }
            TokenKind::Bang => {
                let start = self.advance().span;
                let operand = self.unary()?;
                let span = join(start, operand.span());
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                    span,
                })
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let token = self.advance();
        match token.kind {
            TokenKind::IntLiteral(n) => Ok(Expr::Int(n, token.span)),
            TokenKind::FloatLiteral(n) => Ok(Expr::Float(n, token.span)),
            TokenKind::StringLiteral(s) => Ok(Expr::Str(s, token.span)),
            TokenKind::True => Ok(Expr::Bool(true, token.span)),
            TokenKind::False => Ok(Expr::Bool(false, token.span)),
            TokenKind::Null => Ok(Expr::Null(token.span)),
            TokenKind::Identifier(name) => Ok(Expr::Variable(name, token.span)),
            TokenKind::LeftParen => {
                let expr = self.expression()?;
                self.expect(&TokenKind::RightParen)?;
                Ok(expr)
            }
            TokenKind::LeftBracket => self.finish_array(token.span),
            other => Err(ParseError::general(
                format!("unexpected token '{}' in expression", other),
                token.span,
            )),
        }
    }

    fn finish_array(&mut self, start: Span) -> ParseResult<Expr> {
        let mut elements = Vec::new();
        if !self.check(&TokenKind::RightBracket) {
            loop {
                elements.push(self.expression()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let end = self.expect(&TokenKind::RightBracket)?;
        Ok(Expr::Array {
            elements,
            span: join(start, end.span),
        })
    }
}

fn binop_for(kind: &TokenKind) -> Option<BinOp> {
    Some(match kind {
        TokenKind::Plus => BinOp::Add,
        TokenKind::Minus => BinOp::Sub,
        TokenKind::Star => BinOp::Mul,
        TokenKind::Slash => BinOp::Div,
        TokenKind::Percent => BinOp::Mod,
        TokenKind::EqualEqual => BinOp::Eq,
        TokenKind::BangEqual => BinOp::NotEq,
        TokenKind::Less => BinOp::Less,
        TokenKind::LessEqual => BinOp::LessEq,
        TokenKind::Greater => BinOp::Greater,
        TokenKind::GreaterEqual => BinOp::GreaterEq,
        TokenKind::AndAnd => BinOp::And,
        TokenKind::OrOr => BinOp::Or,
        _ => return None,
    })
}

fn join(a: Span, b: Span) -> Span {
    Span::new(a.start, b.end, a.line, a.column)
}
