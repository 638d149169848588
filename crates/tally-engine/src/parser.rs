use crate::error::{TallyError, TallyResult};

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    /// A column or alias reference. `index` is set for explicit element access like `pt[0]`.
    Leaf {
        name: String,
        index: Option<usize>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equals,
    NotEquals,
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
    And,
    Or,
}

impl Expr {
    /// Names of every column or alias the expression reads, in first-use order.
    pub fn leaf_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Number(_) => {}
            Expr::Leaf { name, .. } => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Call { args, .. } => args.iter().for_each(|arg| arg.collect_leaves(out)),
            Expr::UnaryOp { expr, .. } => expr.collect_leaves(out),
            Expr::BinaryOp { left, right, .. } => {
                left.collect_leaves(out);
                right.collect_leaves(out);
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Identifier(String),
    Number(f64),
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEquals,
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
    AndAnd,
    OrOr,
    Eof,
}

struct Lexer<'a> {
    input: &'a str,
    chars: std::str::Chars<'a>,
    peeked: Option<char>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        let mut chars = input.chars();
        let peeked = chars.next();
        Self {
            input,
            chars,
            peeked,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let current = self.peeked.take();
        self.peeked = self.chars.next();
        current
    }

    fn peek(&self) -> Option<char> {
        self.peeked
    }

    fn take_while<F>(&mut self, mut predicate: F) -> String
    where
        F: FnMut(char) -> bool,
    {
        let mut buf = String::new();
        while let Some(ch) = self.peek() {
            if !predicate(ch) {
                break;
            }
            buf.push(ch);
            self.bump();
        }
        buf
    }

    /// Consumes `second` if it follows, returning `double` in that case and `single` otherwise.
    fn one_or_two(&mut self, second: char, double: Token, single: Token) -> Token {
        self.bump();
        if self.peek() == Some(second) {
            self.bump();
            double
        } else {
            single
        }
    }

    fn next_token(&mut self) -> TallyResult<Token> {
        self.take_while(char::is_whitespace);
        let Some(ch) = self.peek() else {
            return Ok(Token::Eof);
        };

        let simple = match ch {
            ',' => Some(Token::Comma),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            _ => None,
        };
        if let Some(token) = simple {
            self.bump();
            return Ok(token);
        }

        match ch {
            '!' => Ok(self.one_or_two('=', Token::NotEquals, Token::Bang)),
            '<' => Ok(self.one_or_two('=', Token::LessEquals, Token::Less)),
            '>' => Ok(self.one_or_two('=', Token::GreaterEquals, Token::Greater)),
            '=' => {
                self.bump();
                // A lone `=` is accepted as equality.
                if self.peek() == Some('=') {
                    self.bump();
                }
                Ok(Token::EqEq)
            }
            '&' | '|' => {
                self.bump();
                if self.peek() != Some(ch) {
                    return Err(TallyError::Parse(format!(
                        "expected {ch}{ch} in {:?}",
                        self.input
                    )));
                }
                self.bump();
                Ok(if ch == '&' { Token::AndAnd } else { Token::OrOr })
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut literal = self.take_while(|c| c.is_ascii_digit() || c == '.');
                if matches!(self.peek(), Some('e' | 'E')) {
                    let Some(exp) = self.bump() else {
                        debug_assert!(false, "lexer peeked exponent marker but bump returned None");
                        return Err(TallyError::Parse(format!("invalid number {literal:?}")));
                    };
                    literal.push(exp);
                    if matches!(self.peek(), Some('+' | '-')) {
                        if let Some(sign) = self.bump() {
                            literal.push(sign);
                        }
                    }
                    let exponent = self.take_while(|c| c.is_ascii_digit());
                    if exponent.is_empty() {
                        return Err(TallyError::Parse(format!(
                            "invalid number {literal:?} (missing exponent digits)"
                        )));
                    }
                    literal.push_str(&exponent);
                }
                let num: f64 = literal
                    .parse()
                    .map_err(|_| TallyError::Parse(format!("invalid number {literal:?}")))?;
                Ok(Token::Number(num))
            }
            c if is_ident_start(c) => Ok(Token::Identifier(self.take_while(is_ident_part))),
            other => Err(TallyError::Parse(format!(
                "unexpected character {other:?} in {:?}",
                self.input
            ))),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_part(c: char) -> bool {
    // Dotted names address members of nested records (`jet.pt`).
    c.is_alphanumeric() || c == '_' || c == '.'
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: Token,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> TallyResult<Self> {
        let mut lexer = Lexer::new(input);
        let lookahead = lexer.next_token()?;
        Ok(Self { lexer, lookahead })
    }

    fn bump(&mut self) -> TallyResult<Token> {
        let current = std::mem::replace(&mut self.lookahead, Token::Eof);
        self.lookahead = self.lexer.next_token()?;
        Ok(current)
    }

    fn expect(&mut self, token: Token) -> TallyResult<()> {
        if self.lookahead == token {
            self.bump()?;
            Ok(())
        } else {
            Err(TallyError::Parse(format!(
                "expected {token:?}, found {:?}",
                self.lookahead
            )))
        }
    }

    fn parse(&mut self) -> TallyResult<Expr> {
        if self.lookahead == Token::Eof {
            return Err(TallyError::EmptyExpression);
        }
        let expr = self.parse_expr(0)?;
        if self.lookahead != Token::Eof {
            return Err(TallyError::Parse(format!(
                "unexpected token {:?}",
                self.lookahead
            )));
        }
        Ok(expr)
    }

    fn parse_expr(&mut self, min_prec: u8) -> TallyResult<Expr> {
        let mut left = self.parse_prefix()?;
        while let Some((op, prec)) = self.infix_binding_power() {
            if prec < min_prec {
                break;
            }
            self.bump()?;
            let right = self.parse_expr(prec + 1)?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> TallyResult<Expr> {
        match &self.lookahead {
            Token::Minus | Token::Bang => {
                let op = if self.bump()? == Token::Minus {
                    UnaryOp::Negate
                } else {
                    UnaryOp::Not
                };
                let expr = self.parse_expr(PREFIX_PREC)?;
                Ok(Expr::UnaryOp {
                    op,
                    expr: Box::new(expr),
                })
            }
            Token::Plus => {
                self.bump()?;
                self.parse_expr(PREFIX_PREC)
            }
            Token::Number(n) => {
                let n = *n;
                self.bump()?;
                Ok(Expr::Number(n))
            }
            Token::Identifier(_) => self.parse_leaf_or_call(),
            Token::LParen => {
                self.bump()?;
                let inner = self.parse_expr(0)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            other => Err(TallyError::Parse(format!(
                "formula cannot start with {other:?}"
            ))),
        }
    }

    fn parse_leaf_or_call(&mut self) -> TallyResult<Expr> {
        let ident = match self.bump()? {
            Token::Identifier(ident) => ident,
            other => {
                debug_assert!(false, "parse_leaf_or_call called with lookahead={other:?}");
                return Err(TallyError::Parse("expected identifier".into()));
            }
        };

        match self.lookahead {
            Token::LParen => {
                self.bump()?;
                let mut args = Vec::new();
                if self.lookahead != Token::RParen {
                    loop {
                        args.push(self.parse_expr(0)?);
                        if self.lookahead == Token::Comma {
                            self.bump()?;
                            continue;
                        }
                        break;
                    }
                }
                self.expect(Token::RParen)?;
                Ok(Expr::Call { name: ident, args })
            }
            Token::LBracket => {
                self.bump()?;
                let index = match self.bump()? {
                    Token::Number(n) if n >= 0.0 && n.fract() == 0.0 => n as usize,
                    other => {
                        return Err(TallyError::Parse(format!(
                            "expected a non-negative integer index for {ident}, found {other:?}"
                        )))
                    }
                };
                self.expect(Token::RBracket)?;
                Ok(Expr::Leaf {
                    name: ident,
                    index: Some(index),
                })
            }
            _ => Ok(Expr::Leaf {
                name: ident,
                index: None,
            }),
        }
    }

    fn infix_binding_power(&self) -> Option<(BinaryOp, u8)> {
        match self.lookahead {
            Token::OrOr => Some((BinaryOp::Or, 1)),
            Token::AndAnd => Some((BinaryOp::And, 2)),
            Token::EqEq => Some((BinaryOp::Equals, 3)),
            Token::NotEquals => Some((BinaryOp::NotEquals, 3)),
            Token::Less => Some((BinaryOp::Less, 3)),
            Token::LessEquals => Some((BinaryOp::LessEquals, 3)),
            Token::Greater => Some((BinaryOp::Greater, 3)),
            Token::GreaterEquals => Some((BinaryOp::GreaterEquals, 3)),
            Token::Plus => Some((BinaryOp::Add, 4)),
            Token::Minus => Some((BinaryOp::Subtract, 4)),
            Token::Star => Some((BinaryOp::Multiply, 5)),
            Token::Slash => Some((BinaryOp::Divide, 5)),
            Token::Percent => Some((BinaryOp::Modulo, 5)),
            _ => None,
        }
    }
}

const PREFIX_PREC: u8 = 6;

pub fn parse(input: &str) -> TallyResult<Expr> {
    Parser::new(input)?.parse()
}
