//! Recursive-descent parser for condition expressions.
//!
//! Precedence, loosest first: `or`, `and`, comparison, primary.

use super::lexer::{Token, TokenKind};
use super::{ConditionCompiler, Expr};
use crate::error::{ConditionError, SyntaxError};

pub(crate) struct Parser<'a> {
    source: &'a str,
    tokens: &'a [Token],
    position: usize,
    compiler: &'a ConditionCompiler,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(source: &'a str, tokens: &'a [Token], compiler: &'a ConditionCompiler) -> Self {
        Self {
            source,
            tokens,
            position: 0,
            compiler,
        }
    }

    /// Parse a complete expression; leftover tokens are an error.
    pub(crate) fn parse(mut self) -> Result<Expr, ConditionError> {
        let expr = self.parse_or()?;
        if let Some(token) = self.peek() {
            return Err(self.syntax(SyntaxError::UnexpectedToken {
                position: token.position,
                found: token.text.clone(),
            }));
        }
        Ok(expr)
    }

    fn syntax(&self, source: SyntaxError) -> ConditionError {
        ConditionError::Syntax {
            expr: self.source.to_string(),
            source,
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.position);
        self.position += 1;
        token
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut node = self.parse_and()?;
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Or)) {
            self.advance();
            let right = self.parse_and()?;
            node = Expr::Or(Box::new(node), Box::new(right));
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut node = self.parse_comparison()?;
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::And)) {
            self.advance();
            let right = self.parse_comparison()?;
            node = Expr::And(Box::new(node), Box::new(right));
        }
        Ok(node)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ConditionError> {
        let mut node = self.parse_primary()?;
        while let Some(TokenKind::Op(op)) = self.peek().map(|t| &t.kind) {
            let op = *op;
            self.advance();
            let right = self.parse_primary()?;
            node = Expr::Compare(Box::new(node), op, Box::new(right));
        }
        Ok(node)
    }

    fn parse_primary(&mut self) -> Result<Expr, ConditionError> {
        let Some(token) = self.advance() else {
            return Err(self.syntax(SyntaxError::UnexpectedEnd));
        };
        match &token.kind {
            TokenKind::LParen => {
                let node = self.parse_or()?;
                match self.peek() {
                    Some(Token { kind: TokenKind::RParen, .. }) => {
                        self.advance();
                        Ok(node)
                    }
                    _ => Err(self.syntax(SyntaxError::MissingClosingParen {
                        position: token.position,
                    })),
                }
            }
            TokenKind::Number(value) => Ok(Expr::Numeric(*value)),
            TokenKind::Sim(phrase) => self
                .compiler
                .similarity_leaf(self.source, phrase)
                .map(Expr::Similarity),
            TokenKind::Sent(label) => Ok(Expr::Sentiment(label.clone())),
            TokenKind::Fact(name) => Ok(Expr::Fact(name.clone())),
            TokenKind::And | TokenKind::Or | TokenKind::Op(_) | TokenKind::RParen => {
                Err(self.syntax(SyntaxError::UnexpectedToken {
                    position: token.position,
                    found: token.text.clone(),
                }))
            }
        }
    }
}
