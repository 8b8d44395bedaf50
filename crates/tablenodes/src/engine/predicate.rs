//! Row predicates for filter nodes.
//!
//! Grammar:
//!
//! ```text
//! expr    := or
//! or      := and (("||" | "|" | "or") and)*
//! and     := unary (("&&" | "&" | "and") unary)*
//! unary   := ("!" | "not") unary | primary
//! primary := "(" expr ")" | operand (cmp operand)?
//! operand := col("x") | pl.col("x") | ident | number | string | true | false | null
//! cmp     := "==" | "!=" | ">" | ">=" | "<" | "<="
//! ```
//!
//! A comparison involving null is false. A bare operand must be boolean.

use std::cmp::Ordering;
use tablecore::{Cell, DataType, EngineError, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CmpOp {
    fn matches(self, ordering: Ordering) -> bool {
        match self {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::Ne => ordering != Ordering::Equal,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Ge => ordering != Ordering::Less,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Le => ordering != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(Cell),
    Cmp(CmpOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
    Dot,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Column(String),
    Literal(Cell),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Compare(Operand, CmpOp, Operand),
    Value(Operand),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// A parsed predicate, independent of any table.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    expr: Expr,
}

impl Predicate {
    pub fn parse(source: &str) -> Result<Self, EngineError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            source,
        };
        let expr = parser.expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(Self { expr })
    }

    /// Keep the rows for which the predicate holds.
    pub fn filter(&self, table: &Table) -> Result<Table, EngineError> {
        check(&self.expr, table)?;
        let rows: Vec<usize> = (0..table.height())
            .filter(|&row| eval(&self.expr, table, row))
            .collect();
        Ok(table.take(&rows))
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, EngineError> {
    let invalid = |msg: String| EngineError::InvalidPredicate(format!("{}: {}", msg, source));
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '.' if !next.is_some_and(|n| n.is_ascii_digit()) => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Cmp(CmpOp::Eq));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Cmp(CmpOp::Ne));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '>' | '<' => {
                let (op, len) = match (c, next) {
                    ('>', Some('=')) => (CmpOp::Ge, 2),
                    ('>', _) => (CmpOp::Gt, 1),
                    ('<', Some('=')) => (CmpOp::Le, 2),
                    _ => (CmpOp::Lt, 1),
                };
                tokens.push(Token::Cmp(op));
                i += len;
            }
            '&' => {
                tokens.push(Token::And);
                i += if next == Some('&') { 2 } else { 1 };
            }
            '|' => {
                tokens.push(Token::Or);
                i += if next == Some('|') { 2 } else { 1 };
            }
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| invalid("unterminated string".to_string()))?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            c if c.is_ascii_digit()
                || c == '.'
                || (c == '-' && next.is_some_and(|n| n.is_ascii_digit() || n == '.')) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let cell = match text.parse::<i64>() {
                    Ok(n) => Cell::Int(n),
                    Err(_) => text
                        .parse::<f64>()
                        .map(Cell::Float)
                        .map_err(|_| invalid(format!("bad number '{}'", text)))?,
                };
                tokens.push(Token::Number(cell));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(invalid(format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn error(&self, msg: &str) -> EngineError {
        EngineError::InvalidPredicate(format!("{} at token {}: {}", msg, self.pos, self.source))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), EngineError> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            _ => Err(self.error(&format!("expected {:?}", expected))),
        }
    }

    fn expr(&mut self) -> Result<Expr, EngineError> {
        let mut lhs = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, EngineError> {
        let mut lhs = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, EngineError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, EngineError> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.expr()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }

        let lhs = self.operand()?;
        if let Some(Token::Cmp(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.operand()?;
            return Ok(Expr::Compare(lhs, op, rhs));
        }
        Ok(Expr::Value(lhs))
    }

    fn operand(&mut self) -> Result<Operand, EngineError> {
        match self.advance() {
            Some(Token::Number(cell)) => Ok(Operand::Literal(cell)),
            Some(Token::Str(s)) => Ok(Operand::Literal(Cell::Str(s))),
            Some(Token::Ident(word)) => match word.as_str() {
                "true" | "True" => Ok(Operand::Literal(Cell::Bool(true))),
                "false" | "False" => Ok(Operand::Literal(Cell::Bool(false))),
                "null" | "None" => Ok(Operand::Literal(Cell::Null)),
                "pl" if self.peek() == Some(&Token::Dot) => {
                    self.pos += 1;
                    match self.advance() {
                        Some(Token::Ident(f)) if f == "col" => self.column_call(),
                        _ => Err(self.error("expected col after 'pl.'")),
                    }
                }
                "col" if self.peek() == Some(&Token::LParen) => self.column_call(),
                _ => Ok(Operand::Column(word)),
            },
            _ => Err(self.error("expected operand")),
        }
    }

    fn column_call(&mut self) -> Result<Operand, EngineError> {
        self.expect(Token::LParen)?;
        let name = match self.advance() {
            Some(Token::Str(name)) => name,
            _ => return Err(self.error("expected quoted column name")),
        };
        self.expect(Token::RParen)?;
        Ok(Operand::Column(name))
    }
}

fn operand_dtype(operand: &Operand, table: &Table) -> Result<Option<DataType>, EngineError> {
    match operand {
        Operand::Column(name) => table
            .column(name)
            .map(|c| Some(c.dtype))
            .ok_or_else(|| EngineError::ColumnNotFound(name.clone())),
        Operand::Literal(cell) => Ok(cell.dtype()),
    }
}

fn comparable(a: DataType, b: DataType) -> bool {
    let numeric = |t| matches!(t, DataType::Int | DataType::Float);
    a == b || (numeric(a) && numeric(b))
}

/// Resolve columns and check operand types against `table`.
fn check(expr: &Expr, table: &Table) -> Result<(), EngineError> {
    match expr {
        Expr::Compare(lhs, _, rhs) => {
            let left = operand_dtype(lhs, table)?;
            let right = operand_dtype(rhs, table)?;
            match (left, right) {
                (Some(a), Some(b)) if !comparable(a, b) => Err(EngineError::TypeMismatch {
                    left: a.to_string(),
                    right: b.to_string(),
                }),
                _ => Ok(()),
            }
        }
        Expr::Value(operand) => match operand_dtype(operand, table)? {
            Some(DataType::Bool) | None => Ok(()),
            Some(other) => Err(EngineError::TypeMismatch {
                left: other.to_string(),
                right: DataType::Bool.to_string(),
            }),
        },
        Expr::Not(inner) => check(inner, table),
        Expr::And(a, b) | Expr::Or(a, b) => {
            check(a, table)?;
            check(b, table)
        }
    }
}

fn value<'a>(operand: &'a Operand, table: &'a Table, row: usize) -> &'a Cell {
    match operand {
        Operand::Literal(cell) => cell,
        Operand::Column(name) => table
            .column(name)
            .map(|c| &c.values[row])
            .unwrap_or(&Cell::Null),
    }
}

fn eval(expr: &Expr, table: &Table, row: usize) -> bool {
    match expr {
        Expr::Compare(lhs, op, rhs) => value(lhs, table, row)
            .compare(value(rhs, table, row))
            .is_some_and(|ordering| op.matches(ordering)),
        Expr::Value(operand) => value(operand, table, row).as_bool().unwrap_or(false),
        Expr::Not(inner) => !eval(inner, table, row),
        Expr::And(a, b) => eval(a, table, row) && eval(b, table, row),
        Expr::Or(a, b) => eval(a, table, row) || eval(b, table, row),
    }
}
