//! Recursive-descent parser for sandbox expressions.
//!
//! The grammar is a small expression language: literals, member access,
//! calls, arrow functions with expression bodies, unary/binary/logical
//! operators and the conditional operator. There are no statements, no
//! assignment, and no way to name anything outside the builtin set.

use std::rc::Rc;

use super::lexer::{tokenize, Spanned, TemplateChunk, Token};
use super::SandboxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePiece {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Named(String),
    Computed(Box<Expr>),
}

/// Arrow function: parameter names and an expression body.
#[derive(Debug, PartialEq)]
pub struct ArrowFn {
    pub params: Vec<String>,
    pub body: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Template(Vec<TemplatePiece>),
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Member {
        object: Box<Expr>,
        property: Property,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        optional: bool,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Arrow(Rc<ArrowFn>),
}

/// Parse a complete expression. Trailing semicolons are ignored.
pub fn parse_expression(source: &str, max_depth: usize) -> Result<Expr, SandboxError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        max_depth,
    };
    let expr = parser.expression()?;
    while parser.eat(&Token::Semicolon) {}
    if parser.peek() != &Token::Eof {
        return Err(parser.unexpected());
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        self.tokens
            .get(self.pos + ahead)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), SandboxError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> SandboxError {
        let offset = self.tokens.get(self.pos).map(|s| s.offset).unwrap_or(0);
        SandboxError::Syntax(format!(
            "Unexpected token {:?} at offset {}",
            self.peek(),
            offset
        ))
    }

    fn enter(&mut self) -> Result<(), SandboxError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(SandboxError::LimitExceeded(format!(
                "expression nesting deeper than {}",
                self.max_depth
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn expression(&mut self) -> Result<Expr, SandboxError> {
        self.enter()?;
        let result = self.conditional();
        self.leave();
        result
    }

    fn conditional(&mut self) -> Result<Expr, SandboxError> {
        if let Some(arrow) = self.try_arrow()? {
            return Ok(arrow);
        }
        let test = self.nullish()?;
        if !self.eat(&Token::Question) {
            return Ok(test);
        }
        let consequent = self.expression()?;
        self.expect(&Token::Colon)?;
        let alternate = self.expression()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    /// `x => ...`, `(a, b) => ...`, `() => ...`
    fn try_arrow(&mut self) -> Result<Option<Expr>, SandboxError> {
        let params = match (self.peek(), self.peek_at(1)) {
            (Token::Ident(name), Token::Arrow) => {
                let name = name.clone();
                self.pos += 2;
                vec![name]
            }
            (Token::LParen, _) => match self.arrow_param_list() {
                Some((params, consumed)) => {
                    self.pos += consumed;
                    params
                }
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
        let body = self.expression()?;
        Ok(Some(Expr::Arrow(Rc::new(ArrowFn { params, body }))))
    }

    /// Look ahead for `( ident, ... ) =>` without consuming.
    fn arrow_param_list(&self) -> Option<(Vec<String>, usize)> {
        let mut i = 1;
        let mut params = Vec::new();
        loop {
            match self.peek_at(i) {
                Token::RParen => {
                    i += 1;
                    break;
                }
                Token::Ident(name) => {
                    params.push(name.clone());
                    i += 1;
                    match self.peek_at(i) {
                        Token::Comma => i += 1,
                        Token::RParen => {}
                        _ => return None,
                    }
                }
                _ => return None,
            }
        }
        if self.peek_at(i) == &Token::Arrow {
            Some((params, i + 1))
        } else {
            None
        }
    }

    fn nullish(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.or()?;
        while self.eat(&Token::QuestionQuestion) {
            let right = self.or()?;
            left = logical(LogicalOp::Nullish, left, right);
        }
        Ok(left)
    }

    fn or(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.and()?;
        while self.eat(&Token::OrOr) {
            let right = self.and()?;
            left = logical(LogicalOp::Or, left, right);
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.equality()?;
        while self.eat(&Token::AndAnd) {
            let right = self.equality()?;
            left = logical(LogicalOp::And, left, right);
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.relational()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinaryOp::Eq,
                Token::NotEq => BinaryOp::NotEq,
                Token::EqEqEq => BinaryOp::StrictEq,
                Token::NotEqEq => BinaryOp::StrictNotEq,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.relational()?;
            left = binary(op, left, right);
        }
    }

    fn relational(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.additive()?;
            left = binary(op, left, right);
        }
    }

    fn additive(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.exponent()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.exponent()?;
            left = binary(op, left, right);
        }
    }

    fn exponent(&mut self) -> Result<Expr, SandboxError> {
        let base = self.unary()?;
        if self.eat(&Token::StarStar) {
            self.enter()?;
            let power = self.exponent();
            self.leave();
            return Ok(binary(BinaryOp::Pow, base, power?));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<Expr, SandboxError> {
        let op = match self.peek() {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Plus,
            Token::Ident(name) if name == "typeof" => UnaryOp::TypeOf,
            _ => return self.postfix(),
        };
        self.pos += 1;
        self.enter()?;
        let operand = self.unary();
        self.leave();
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
        })
    }

    fn postfix(&mut self) -> Result<Expr, SandboxError> {
        let mut expr = if matches!(self.peek(), Token::Ident(name) if name == "new") {
            self.pos += 1;
            let callee = self.primary()?;
            let args = if self.peek() == &Token::LParen {
                self.arguments()?
            } else {
                Vec::new()
            };
            Expr::New {
                callee: Box::new(callee),
                args,
            }
        } else {
            self.primary()?
        };

        loop {
            match self.peek() {
                Token::Dot => {
                    self.pos += 1;
                    let name = self.property_name()?;
                    expr = member(expr, Property::Named(name), false);
                }
                Token::QuestionDot => {
                    self.pos += 1;
                    match self.peek() {
                        Token::LParen => {
                            let args = self.arguments()?;
                            expr = call(expr, args, true);
                        }
                        Token::LBracket => {
                            self.pos += 1;
                            let index = self.expression()?;
                            self.expect(&Token::RBracket)?;
                            expr = member(expr, Property::Computed(Box::new(index)), true);
                        }
                        _ => {
                            let name = self.property_name()?;
                            expr = member(expr, Property::Named(name), true);
                        }
                    }
                }
                Token::LBracket => {
                    self.pos += 1;
                    let index = self.expression()?;
                    self.expect(&Token::RBracket)?;
                    expr = member(expr, Property::Computed(Box::new(index)), false);
                }
                Token::LParen => {
                    let args = self.arguments()?;
                    expr = call(expr, args, false);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn property_name(&mut self) -> Result<String, SandboxError> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            _ => {
                self.pos -= 1;
                Err(self.unexpected())
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, SandboxError> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        while self.peek() != &Token::RParen {
            args.push(self.expression()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, SandboxError> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::Literal(Literal::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Literal::Str(s))),
            Token::Template(chunks) => self.template(chunks),
            Token::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Literal(Literal::Bool(true)),
                "false" => Expr::Literal(Literal::Bool(false)),
                "null" => Expr::Literal(Literal::Null),
                "undefined" => Expr::Literal(Literal::Undefined),
                _ => Expr::Ident(name),
            }),
            Token::LParen => {
                let inner = self.expression()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                while self.peek() != &Token::RBracket {
                    items.push(self.expression()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RBracket)?;
                Ok(Expr::Array(items))
            }
            Token::LBrace => self.object(),
            _ => {
                self.pos -= 1;
                Err(self.unexpected())
            }
        }
    }

    fn object(&mut self) -> Result<Expr, SandboxError> {
        let mut entries = Vec::new();
        while self.peek() != &Token::RBrace {
            let key = match self.advance() {
                Token::Ident(name) => name,
                Token::Str(s) => s,
                Token::Number(n) => super::value::format_number(n),
                _ => {
                    self.pos -= 1;
                    return Err(self.unexpected());
                }
            };
            let value = if self.eat(&Token::Colon) {
                self.expression()?
            } else {
                // Shorthand `{ a }`
                Expr::Ident(key.clone())
            };
            entries.push((key, value));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(Expr::Object(entries))
    }

    fn template(&mut self, chunks: Vec<TemplateChunk>) -> Result<Expr, SandboxError> {
        let mut pieces = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            match chunk {
                TemplateChunk::Text(text) => pieces.push(TemplatePiece::Text(text)),
                TemplateChunk::Expr(source) => {
                    let remaining = self.max_depth.saturating_sub(self.depth);
                    pieces.push(TemplatePiece::Expr(parse_expression(&source, remaining)?));
                }
            }
        }
        Ok(Expr::Template(pieces))
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    Expr::Logical {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn member(object: Expr, property: Property, optional: bool) -> Expr {
    Expr::Member {
        object: Box::new(object),
        property,
        optional,
    }
}

fn call(callee: Expr, args: Vec<Expr>, optional: bool) -> Expr {
    Expr::Call {
        callee: Box::new(callee),
        args,
        optional,
    }
}
