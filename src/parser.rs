use crate::{
    ast::{BinOp, Expr, Filter, FuncDef, Token},
    lexer::{LexError, Lexer},
};
use std::mem;

/// Errors produced while parsing a filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Tokenization failure
    Lex(LexError),

    /// Token that does not fit the grammar at this point
    Unexpected { expected: String, found: Token },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Lex(e) => write!(f, "{}", e),
            ParseError::Unexpected { expected, found } => {
                write!(f, "expected {}, got {:?}", expected, found)
            }
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Lex(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError::Lex(e)
    }
}

pub struct Parser {
    lexer: Lexer,
    current_token: Token,
}

impl Parser {
    pub fn new(mut lexer: Lexer) -> Result<Self, ParseError> {
        let current_token = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current_token,
        })
    }

    fn advance(&mut self) -> Result<(), ParseError> {
        self.current_token = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        if mem::discriminant(&self.current_token) != mem::discriminant(&expected) {
            return Err(ParseError::Unexpected {
                expected: format!("{:?}", expected),
                found: self.current_token.clone(),
            });
        }
        self.advance()
    }

    fn check(&self, token: &Token) -> bool {
        mem::discriminant(&self.current_token) == mem::discriminant(token)
    }

    fn expect_identifier(&mut self, context: &str) -> Result<String, ParseError> {
        match &self.current_token {
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(name)
            }
            _ => Err(ParseError::Unexpected {
                expected: context.to_string(),
                found: self.current_token.clone(),
            }),
        }
    }

    /// Parse a complete filter: leading `def` definitions, then the main
    /// expression, then end of input.
    pub fn parse_filter(&mut self) -> Result<Filter, ParseError> {
        let mut defs = vec![];

        while self.check(&Token::Def) {
            defs.push(self.parse_def()?);
        }

        let body = self.parse_pipe()?;
        self.expect(Token::Eof)?;

        Ok(Filter { defs, body })
    }

    /// Parse a single expression with no definitions (used by tests and
    /// the ad-hoc query surface when no `def` prelude is present).
    pub fn parse(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_pipe()?;
        self.expect(Token::Eof)?;
        Ok(expr)
    }

    fn parse_def(&mut self) -> Result<FuncDef, ParseError> {
        self.expect(Token::Def)?;
        let name = self.expect_identifier("definition name after 'def'")?;
        self.expect(Token::Colon)?;
        let body = self.parse_pipe()?;
        self.expect(Token::Semicolon)?;
        Ok(FuncDef { name, body })
    }

    /// Pipelines and `as` bindings. A binding swallows the rest of the
    /// pipeline as its body: `a | b as $x | c` scopes `$x` over `c`.
    fn parse_pipe(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_comma()?;

        if self.check(&Token::As) {
            return self.parse_binding(expr);
        }

        while self.check(&Token::Pipe) {
            self.advance()?;
            let rhs = self.parse_comma()?;

            if self.check(&Token::As) {
                let bind = self.parse_binding(rhs)?;
                return Ok(Expr::Pipe(Box::new(expr), Box::new(bind)));
            }

            expr = Expr::Pipe(Box::new(expr), Box::new(rhs));
        }

        Ok(expr)
    }

    fn parse_binding(&mut self, source: Expr) -> Result<Expr, ParseError> {
        self.expect(Token::As)?;

        let var = match &self.current_token {
            Token::Variable(name) => {
                let name = name.clone();
                self.advance()?;
                name
            }
            _ => {
                return Err(ParseError::Unexpected {
                    expected: "variable after 'as'".to_string(),
                    found: self.current_token.clone(),
                });
            }
        };

        self.expect(Token::Pipe)?;
        let body = self.parse_pipe()?;

        Ok(Expr::Bind {
            source: Box::new(source),
            var,
            body: Box::new(body),
        })
    }

    fn parse_comma(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_alternative()?;

        while self.check(&Token::Comma) {
            self.advance()?;
            let rhs = self.parse_alternative()?;
            expr = Expr::Comma(Box::new(expr), Box::new(rhs));
        }

        Ok(expr)
    }

    fn parse_alternative(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_or()?;

        while self.check(&Token::Alternative) {
            self.advance()?;
            let rhs = self.parse_or()?;
            expr = Expr::BinaryOp {
                op: BinOp::Alternative,
                left: Box::new(expr),
                right: Box::new(rhs),
            };
        }

        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_and()?;

        while self.check(&Token::Or) {
            self.advance()?;
            let rhs = self.parse_and()?;
            expr = Expr::BinaryOp {
                op: BinOp::Or,
                left: Box::new(expr),
                right: Box::new(rhs),
            };
        }

        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_comparison()?;

        while self.check(&Token::And) {
            self.advance()?;
            let rhs = self.parse_comparison()?;
            expr = Expr::BinaryOp {
                op: BinOp::And,
                left: Box::new(expr),
                right: Box::new(rhs),
            };
        }

        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;

        if let Some(op) = match &self.current_token {
            Token::EqEq => Some(BinOp::Equal),
            Token::NotEq => Some(BinOp::NotEqual),
            Token::Lt => Some(BinOp::LessThan),
            Token::Gt => Some(BinOp::GreaterThan),
            Token::LtEq => Some(BinOp::LessEqual),
            Token::GtEq => Some(BinOp::GreaterEqual),
            _ => None,
        } {
            self.advance()?;
            let right = self.parse_additive()?;
            return Ok(Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_postfix()?;

        loop {
            let op = match &self.current_token {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Subtract,
                _ => break,
            };

            self.advance()?;
            let right = self.parse_postfix()?;

            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Postfix suffixes: `.name` chains, `[...]` forms, and `?`.
    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.check(&Token::Dot) {
                self.advance()?;
                let name = self.expect_identifier("field name after '.'")?;
                expr = Expr::Field {
                    target: Box::new(expr),
                    name,
                };
            } else if self.check(&Token::LBracket) {
                self.advance()?;
                expr = self.parse_bracket_suffix(expr)?;
            } else if self.check(&Token::Question) {
                self.advance()?;
                expr = Expr::Try(Box::new(expr));
            } else {
                break;
            }
        }

        Ok(expr)
    }

    /// Inside brackets, after the target: `]` is iteration, a leading `:`
    /// is an end-only slice, otherwise an index which may extend into a
    /// slice.
    fn parse_bracket_suffix(&mut self, target: Expr) -> Result<Expr, ParseError> {
        if self.check(&Token::RBracket) {
            self.advance()?;
            return Ok(Expr::Iterate(Box::new(target)));
        }

        if self.check(&Token::Colon) {
            self.advance()?;
            let end = self.parse_pipe()?;
            self.expect(Token::RBracket)?;
            return Ok(Expr::Slice {
                target: Box::new(target),
                start: None,
                end: Some(Box::new(end)),
            });
        }

        let index = self.parse_pipe()?;

        if self.check(&Token::Colon) {
            self.advance()?;

            if self.check(&Token::RBracket) {
                self.advance()?;
                return Ok(Expr::Slice {
                    target: Box::new(target),
                    start: Some(Box::new(index)),
                    end: None,
                });
            }

            let end = self.parse_pipe()?;
            self.expect(Token::RBracket)?;
            return Ok(Expr::Slice {
                target: Box::new(target),
                start: Some(Box::new(index)),
                end: Some(Box::new(end)),
            });
        }

        self.expect(Token::RBracket)?;
        Ok(Expr::Index {
            target: Box::new(target),
            index: Box::new(index),
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match mem::replace(&mut self.current_token, Token::Eof) {
            // Literals
            Token::Integer(n) => {
                self.advance()?;
                Ok(Expr::Integer(n))
            }
            Token::Float(n) => {
                self.advance()?;
                Ok(Expr::Float(n))
            }
            Token::String(s) => {
                self.advance()?;
                Ok(Expr::String(s))
            }
            Token::Boolean(b) => {
                self.advance()?;
                Ok(Expr::Boolean(b))
            }
            Token::Null => {
                self.advance()?;
                Ok(Expr::Null)
            }

            // References
            Token::Variable(name) => {
                self.advance()?;
                Ok(Expr::Variable(name))
            }

            // Identity or leading field access
            Token::Dot => {
                self.advance()?;
                if let Token::Identifier(_) = &self.current_token {
                    let name = self.expect_identifier("field name")?;
                    Ok(Expr::Field {
                        target: Box::new(Expr::Identity),
                        name,
                    })
                } else {
                    // Bare `.`; any `[...]` suffix attaches via parse_postfix
                    Ok(Expr::Identity)
                }
            }

            Token::LParen => {
                self.advance()?;
                let expr = self.parse_pipe()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }

            // Array construction
            Token::LBracket => {
                self.advance()?;
                if self.check(&Token::RBracket) {
                    self.advance()?;
                    Ok(Expr::Array(None))
                } else {
                    let inner = self.parse_pipe()?;
                    self.expect(Token::RBracket)?;
                    Ok(Expr::Array(Some(Box::new(inner))))
                }
            }

            // Object construction
            Token::LBrace => {
                self.advance()?;
                self.parse_object_literal()
            }

            Token::If => {
                self.advance()?;
                self.parse_if()
            }

            // Unary minus (for negative numbers/negation)
            Token::Minus => {
                self.advance()?;
                let operand = self.parse_postfix()?;
                // Represent as 0 - operand
                Ok(Expr::BinaryOp {
                    op: BinOp::Subtract,
                    left: Box::new(Expr::Integer(0)),
                    right: Box::new(operand),
                })
            }

            // Builtin or user-defined call
            Token::Identifier(name) => {
                self.advance()?;
                let mut args = vec![];

                if self.check(&Token::LParen) {
                    self.advance()?;
                    args.push(self.parse_pipe()?);
                    while self.check(&Token::Semicolon) {
                        self.advance()?;
                        args.push(self.parse_pipe()?);
                    }
                    self.expect(Token::RParen)?;
                }

                Ok(Expr::Call { name, args })
            }

            token => Err(ParseError::Unexpected {
                expected: "expression".to_string(),
                found: token,
            }),
        }
    }

    fn parse_object_literal(&mut self) -> Result<Expr, ParseError> {
        let mut entries = vec![];

        while !self.check(&Token::RBrace) {
            let key = match &self.current_token {
                Token::Identifier(s) | Token::String(s) => s.clone(),
                _ => {
                    return Err(ParseError::Unexpected {
                        expected: "object key".to_string(),
                        found: self.current_token.clone(),
                    });
                }
            };
            self.advance()?;

            // `{name}` is shorthand for `{name: .name}`
            let value = if self.check(&Token::Colon) {
                self.advance()?;
                Some(self.parse_alternative()?)
            } else {
                None
            };

            entries.push((key, value));

            if !self.check(&Token::RBrace) {
                self.expect(Token::Comma)?;
            }
        }

        self.expect(Token::RBrace)?;
        Ok(Expr::Object(entries))
    }

    /// `if` was already consumed; `elif` chains desugar into nested
    /// conditionals.
    fn parse_if(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_pipe()?;
        self.expect(Token::Then)?;
        let then_branch = self.parse_pipe()?;

        let mut elifs = vec![];
        while self.check(&Token::Elif) {
            self.advance()?;
            let c = self.parse_pipe()?;
            self.expect(Token::Then)?;
            let t = self.parse_pipe()?;
            elifs.push((c, t));
        }

        let mut else_branch = if self.check(&Token::Else) {
            self.advance()?;
            Some(Box::new(self.parse_pipe()?))
        } else {
            None
        };

        self.expect(Token::End)?;

        for (c, t) in elifs.into_iter().rev() {
            else_branch = Some(Box::new(Expr::If {
                cond: Box::new(c),
                then_branch: Box::new(t),
                else_branch,
            }));
        }

        Ok(Expr::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch,
        })
    }
}
