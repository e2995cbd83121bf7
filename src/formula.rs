//! Resistance-to-voltage conversion formula.
//!
//! The circuit formula is operator-supplied text. It is parsed once into a
//! small arithmetic AST and evaluated with a single variable bound to the
//! resistance. No other names resolve and no code is executed.
//!
//! Grammar:
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := unary (('*' | '/') unary)*
//! unary  := ('+' | '-') unary | power
//! power  := atom ('**' unary)?
//! atom   := number | 'r' | 'resistance' | '(' expr ')'
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Names accepted for the resistance variable.
pub const RESISTANCE_VARIABLES: [&str; 2] = ["r", "resistance"];

/// Rounds a voltage to the 3 decimal places the instrument is commanded with.
///
/// Rounds the exact binary value, ties to even, the same digits `{:.3}`
/// prints.
pub fn round_voltage(voltage: f64) -> f64 {
    let rounded = format!("{:.3}", voltage).parse().unwrap_or(voltage);
    // Collapse -0.0 so the command never reads "-0.000".
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    /// The expression text is blank.
    #[error("expression is empty")]
    Empty,
    /// A character that is not part of the grammar.
    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },
    /// A numeric literal that does not parse as a float.
    #[error("invalid number '{literal}' at position {position}")]
    InvalidNumber { literal: String, position: usize },
    /// A name other than the resistance variable.
    #[error("unknown variable '{name}' at position {position}, only 'r' or 'resistance' may be used")]
    UnknownVariable { name: String, position: usize },
    /// A token in a place the grammar does not allow it.
    #[error("unexpected '{found}' at position {position}")]
    UnexpectedToken { found: String, position: usize },
    /// The expression stopped before it was complete.
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("division by zero")]
    DivisionByZero,
    /// Evaluation produced infinity or NaN.
    #[error("expression evaluated to a non-finite value ({0})")]
    NonFinite(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Resistance,
    Negate(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, resistance: f64) -> Result<f64, FormulaError> {
        match self {
            Expr::Number(value) => Ok(*value),
            Expr::Resistance => Ok(resistance),
            Expr::Negate(inner) => Ok(-inner.eval(resistance)?),
            Expr::Binary(op, lhs, rhs) => {
                let lhs = lhs.eval(resistance)?;
                let rhs = rhs.eval(resistance)?;
                match op {
                    BinaryOp::Add => Ok(lhs + rhs),
                    BinaryOp::Sub => Ok(lhs - rhs),
                    BinaryOp::Mul => Ok(lhs * rhs),
                    BinaryOp::Div if rhs == 0.0 => Err(FormulaError::DivisionByZero),
                    BinaryOp::Div => Ok(lhs / rhs),
                    BinaryOp::Pow => Ok(lhs.powf(rhs)),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Power,
    LParen,
    RParen,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(value) => write!(f, "{}", value),
            TokenKind::Ident(name) => f.write_str(name),
            TokenKind::Plus => f.write_str("+"),
            TokenKind::Minus => f.write_str("-"),
            TokenKind::Star => f.write_str("*"),
            TokenKind::Slash => f.write_str("/"),
            TokenKind::Power => f.write_str("**"),
            TokenKind::LParen => f.write_str("("),
            TokenKind::RParen => f.write_str(")"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn tokenize(source: &str) -> Result<Vec<Token>, FormulaError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        let c = bytes[pos] as char;

        let kind = match c {
            c if c.is_ascii_whitespace() => {
                pos += 1;
                continue;
            }
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' if bytes.get(pos + 1) == Some(&b'*') => {
                pos += 1;
                TokenKind::Power
            }
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            c if c.is_ascii_digit() || c == '.' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                    pos += 1;
                }
                // Exponent suffix, e.g. 1e-3 or 2.5E4.
                if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
                    let mut end = pos + 1;
                    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
                        end += 1;
                    }
                    if end < bytes.len() && bytes[end].is_ascii_digit() {
                        while end < bytes.len() && bytes[end].is_ascii_digit() {
                            end += 1;
                        }
                        pos = end;
                    }
                }
                let literal = &source[start..pos];
                let value = literal.parse::<f64>().map_err(|_| FormulaError::InvalidNumber {
                    literal: literal.to_owned(),
                    position: start,
                })?;
                tokens.push(Token {
                    kind: TokenKind::Number(value),
                    position: start,
                });
                continue;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(source[start..pos].to_owned()),
                    position: start,
                });
                continue;
            }
            _ => {
                // Report the full character, not a stray UTF-8 byte.
                let ch = source[start..].chars().next().unwrap_or(c);
                return Err(FormulaError::UnexpectedCharacter {
                    ch,
                    position: start,
                });
            }
        };

        pos += 1;
        tokens.push(Token {
            kind,
            position: start,
        });
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expr(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        match self.peek() {
            Some(TokenKind::Minus) => {
                self.pos += 1;
                Ok(Expr::Negate(Box::new(self.unary()?)))
            }
            Some(TokenKind::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.atom()?;
        if self.peek() == Some(&TokenKind::Power) {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, FormulaError> {
        let token = self.next().ok_or(FormulaError::UnexpectedEnd)?;
        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Number(value)),
            TokenKind::Ident(name) => {
                if RESISTANCE_VARIABLES.contains(&name.as_str()) {
                    Ok(Expr::Resistance)
                } else {
                    Err(FormulaError::UnknownVariable {
                        name,
                        position: token.position,
                    })
                }
            }
            TokenKind::LParen => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(inner),
                    Some(other) => Err(FormulaError::UnexpectedToken {
                        found: other.kind.to_string(),
                        position: other.position,
                    }),
                    None => Err(FormulaError::UnexpectedEnd),
                }
            }
            other => Err(FormulaError::UnexpectedToken {
                found: other.to_string(),
                position: token.position,
            }),
        }
    }
}

/// A parsed circuit formula mapping resistance to voltage.
#[derive(Debug, Clone, PartialEq)]
pub struct VoltageFormula {
    source: String,
    root: Expr,
}

impl VoltageFormula {
    /// Parses `source` into an evaluable formula.
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(FormulaError::Empty);
        }

        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.expr()?;
        if let Some(trailing) = parser.next() {
            return Err(FormulaError::UnexpectedToken {
                found: trailing.kind.to_string(),
                position: trailing.position,
            });
        }

        Ok(Self {
            source: source.trim().to_owned(),
            root,
        })
    }

    /// Evaluates the formula for `resistance`, rounded to 3 decimals.
    pub fn evaluate(&self, resistance: f64) -> Result<f64, FormulaError> {
        let voltage = self.root.eval(resistance)?;
        if !voltage.is_finite() {
            return Err(FormulaError::NonFinite(voltage));
        }
        Ok(round_voltage(voltage))
    }

    /// The expression text as configured.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl FromStr for VoltageFormula {
    type Err = FormulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VoltageFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
