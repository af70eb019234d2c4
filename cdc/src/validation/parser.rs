use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::validation::ast::{CompareOp, Expr, Literal};
use crate::validation::lexer::{Token, tokenize};

/// Parses a rule expression.
///
/// Precedence from loosest to tightest: `OR`, `AND`, `NOT`, then comparisons, `IS [NOT] NULL`
/// and `[NOT] IN (...)`.
pub fn parse_expression(input: &str) -> CdcResult<Expr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        bail!(
            ErrorKind::InvalidRule,
            "Invalid rule syntax",
            "The rule expression is empty"
        );
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        input,
    };
    let expr = parser.parse_or()?;

    if let Some(token) = parser.peek() {
        bail!(
            ErrorKind::InvalidRule,
            "Invalid rule syntax",
            format!("Unexpected token {token:?} after the end of '{input}'")
        );
    }

    Ok(expr)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    input: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            return true;
        }

        false
    }

    fn expect(&mut self, expected: Token) -> CdcResult<()> {
        if self.eat(&expected) {
            return Ok(());
        }

        bail!(
            ErrorKind::InvalidRule,
            "Invalid rule syntax",
            format!(
                "Expected {expected:?} but found {:?} in '{}'",
                self.peek(),
                self.input
            )
        );
    }

    fn parse_or(&mut self) -> CdcResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> CdcResult<Expr> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_not(&mut self) -> CdcResult<Expr> {
        if self.eat(&Token::Not) {
            let expr = self.parse_not()?;
            return Ok(Expr::Not(Box::new(expr)));
        }

        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> CdcResult<Expr> {
        let left = self.parse_operand()?;

        let op = match self.peek() {
            Some(Token::Eq) => Some(CompareOp::Eq),
            Some(Token::NotEq) => Some(CompareOp::NotEq),
            Some(Token::Lt) => Some(CompareOp::Lt),
            Some(Token::LtEq) => Some(CompareOp::LtEq),
            Some(Token::Gt) => Some(CompareOp::Gt),
            Some(Token::GtEq) => Some(CompareOp::GtEq),
            _ => None,
        };

        if let Some(op) = op {
            self.pos += 1;
            let right = self.parse_operand()?;
            return Ok(Expr::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }

        if self.eat(&Token::Is) {
            let negated = self.eat(&Token::Not);
            self.expect(Token::Null)?;
            return Ok(Expr::IsNull {
                expr: Box::new(left),
                negated,
            });
        }

        // `NOT` directly after an operand can only introduce `NOT IN`.
        let negated = self.peek() == Some(&Token::Not)
            && self.tokens.get(self.pos + 1) == Some(&Token::In);
        if negated {
            self.pos += 1;
        }

        if self.eat(&Token::In) {
            self.expect(Token::LParen)?;
            let mut list = vec![self.parse_literal()?];
            while self.eat(&Token::Comma) {
                list.push(self.parse_literal()?);
            }
            self.expect(Token::RParen)?;

            return Ok(Expr::InList {
                expr: Box::new(left),
                list,
                negated,
            });
        }

        Ok(left)
    }

    fn parse_operand(&mut self) -> CdcResult<Expr> {
        match self.peek() {
            Some(Token::LParen) => {
                self.pos += 1;
                let expr = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(Expr::Column(name))
            }
            _ => Ok(Expr::Literal(self.parse_literal()?)),
        }
    }

    fn parse_literal(&mut self) -> CdcResult<Literal> {
        let literal = match self.next() {
            Some(Token::Null) => Literal::Null,
            Some(Token::True) => Literal::Bool(true),
            Some(Token::False) => Literal::Bool(false),
            Some(Token::Int(value)) => Literal::Int(value),
            Some(Token::Float(value)) => Literal::Float(value),
            Some(Token::Str(value)) => Literal::Str(value),
            Some(Token::Minus) => match self.next() {
                Some(Token::Int(value)) => Literal::Int(-value),
                Some(Token::Float(value)) => Literal::Float(-value),
                other => {
                    bail!(
                        ErrorKind::InvalidRule,
                        "Invalid rule syntax",
                        format!("Expected a number after '-' but found {other:?} in '{}'", self.input)
                    );
                }
            },
            other => {
                bail!(
                    ErrorKind::InvalidRule,
                    "Invalid rule syntax",
                    format!("Expected a value but found {other:?} in '{}'", self.input)
                );
            }
        };

        Ok(literal)
    }
}
