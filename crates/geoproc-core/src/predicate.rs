//! Filter expressions over feature properties.
//!
//! An expression is compiled once into a [`Predicate`] tree and then tested
//! against every feature. Supported syntax:
//!
//! ```text
//! expr    := or
//! or      := and ("or" and)*
//! and     := not ("and" not)*
//! not     := "not" not | compare
//! compare := operand (("==" | "!=" | "<" | "<=" | ">" | ">=") operand
//!                    | "not"? "in" "[" literal ("," literal)* "]")?
//! operand := number | 'string' | "string" | true | false | null
//!          | identifier | props['name'] | "(" operand ")"
//! ```
//!
//! A parenthesized expression on the left of `compare` groups a whole
//! predicate unless it holds a single operand, as in `(lanes) == 4`.
//!
//! A bare operand is tested for truthiness: `null`, `false`, `0`, `""` and
//! empty arrays or objects are false.

use std::cmp::Ordering;
use std::fmt;

use geoproc_core_common::Feature;
use serde_json::Value;

use crate::error::{TransformError, ValidationError};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Op(CompareOp),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        })
    }
}

/// A value an expression can produce before it is tested.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Property(String),
}

impl Operand {
    fn resolve<'a>(&'a self, feature: &'a Feature) -> &'a Value {
        match self {
            Self::Literal(value) => value,
            Self::Property(name) => feature.property(name).unwrap_or(&Value::Null),
        }
    }
}

/// Compiled filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Or(Box<Predicate>, Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Compare(Operand, CompareOp, Operand),
    In(Operand, Vec<Value>),
    Truthy(Operand),
}

impl Predicate {
    /// Compiles an expression.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidExpression`] for malformed input.
    pub fn compile(expression: &str) -> Result<Self, ValidationError> {
        let invalid = |message: String| ValidationError::InvalidExpression {
            expression: expression.to_string(),
            message,
        };
        let tokens = tokenize(expression).map_err(invalid)?;
        let mut parser = Parser { tokens, pos: 0 };
        let predicate = parser.or().map_err(invalid)?;
        if let Some(token) = parser.peek() {
            return Err(invalid(format!("unexpected {token:?} after expression")));
        }
        Ok(predicate)
    }

    /// Tests a feature against the expression.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::Predicate`] when values of incompatible
    /// kinds are ordered against each other.
    pub fn test(&self, feature: &Feature) -> Result<bool, TransformError> {
        match self {
            Self::Or(a, b) => Ok(a.test(feature)? || b.test(feature)?),
            Self::And(a, b) => Ok(a.test(feature)? && b.test(feature)?),
            Self::Not(inner) => Ok(!inner.test(feature)?),
            Self::Truthy(operand) => Ok(truthy(operand.resolve(feature))),
            Self::In(operand, values) => {
                let value = operand.resolve(feature);
                Ok(values.iter().any(|candidate| loose_eq(value, candidate)))
            },
            Self::Compare(left, op, right) => {
                compare(left.resolve(feature), *op, right.resolve(feature))
            },
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

// Numbers compare by value so that `1 == 1.0`.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> Result<bool, TransformError> {
    let ordering = || {
        let ordering = match (left, right) {
            (Value::Number(a), Value::Number(b)) => a
                .as_f64()
                .zip(b.as_f64())
                .and_then(|(a, b)| a.partial_cmp(&b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        };
        ordering.ok_or_else(|| TransformError::Predicate {
            message: format!("cannot compare {left} {op} {right}"),
        })
    };

    Ok(match op {
        CompareOp::Eq => loose_eq(left, right),
        CompareOp::Ne => !loose_eq(left, right),
        CompareOp::Lt => ordering()? == Ordering::Less,
        CompareOp::Le => ordering()? != Ordering::Greater,
        CompareOp::Gt => ordering()? == Ordering::Greater,
        CompareOp::Ge => ordering()? != Ordering::Less,
    })
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            },
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            },
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            },
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            },
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            },
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (op, width) = match (c, next) {
                    ('=', Some('=')) => (CompareOp::Eq, 2),
                    ('!', Some('=')) => (CompareOp::Ne, 2),
                    ('<', Some('=')) => (CompareOp::Le, 2),
                    ('>', Some('=')) => (CompareOp::Ge, 2),
                    ('<', _) => (CompareOp::Lt, 1),
                    ('>', _) => (CompareOp::Gt, 1),
                    _ => return Err(format!("unexpected '{c}' at offset {i}")),
                };
                tokens.push(Token::Op(op));
                i += width;
            },
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string".to_string()),
                        Some('\\') => {
                            if let Some(escaped) = chars.get(i + 1) {
                                text.push(*escaped);
                            }
                            i += 2;
                        },
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        },
                        Some(ch) => {
                            text.push(*ch);
                            i += 1;
                        },
                    }
                }
                tokens.push(Token::Str(text));
            },
            c if c.is_ascii_digit() || c == '.' || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || matches!(chars[i], '.' | 'e' | 'E')
                        || (matches!(chars[i], '+' | '-') && matches!(chars[i - 1], 'e' | 'E')))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{text}'"))?;
                tokens.push(Token::Number(number));
            },
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            },
            other => return Err(format!("unexpected '{other}' at offset {i}")),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(id)) if id == word)
    }

    fn keyword_at(&self, offset: usize, word: &str) -> bool {
        matches!(self.tokens.get(self.pos + offset), Some(Token::Ident(id)) if id == word)
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        match self.advance() {
            Some(token) if &token == expected => Ok(()),
            Some(token) => Err(format!("expected {expected:?}, found {token:?}")),
            None => Err(format!("expected {expected:?}, found end of expression")),
        }
    }

    fn or(&mut self) -> Result<Predicate, String> {
        let mut left = self.and()?;
        while self.keyword("or") {
            self.pos += 1;
            let right = self.and()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Predicate, String> {
        let mut left = self.not()?;
        while self.keyword("and") {
            self.pos += 1;
            let right = self.not()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Predicate, String> {
        if self.keyword("not") {
            self.pos += 1;
            return Ok(Predicate::Not(Box::new(self.not()?)));
        }
        self.compare()
    }

    fn compare(&mut self) -> Result<Predicate, String> {
        let left = if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.or()?;
            self.expect(&Token::RParen)?;
            match inner {
                Predicate::Truthy(operand) => operand,
                grouped => return Ok(grouped),
            }
        } else {
            self.operand()?
        };
        if let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.operand()?;
            return Ok(Predicate::Compare(left, op, right));
        }
        if self.keyword("in") {
            self.pos += 1;
            return Ok(Predicate::In(left, self.list()?));
        }
        if self.keyword("not") && self.keyword_at(1, "in") {
            self.pos += 2;
            return Ok(Predicate::Not(Box::new(Predicate::In(left, self.list()?))));
        }
        Ok(Predicate::Truthy(left))
    }

    fn list(&mut self) -> Result<Vec<Value>, String> {
        self.expect(&Token::LBracket)?;
        let mut values = Vec::new();
        if self.peek() == Some(&Token::RBracket) {
            self.pos += 1;
            return Ok(values);
        }
        loop {
            match self.operand()? {
                Operand::Literal(value) => values.push(value),
                Operand::Property(name) => {
                    return Err(format!("list items must be literals, found '{name}'"));
                },
            }
            match self.advance() {
                Some(Token::Comma) => {},
                Some(Token::RBracket) => return Ok(values),
                Some(token) => return Err(format!("expected ',' or ']', found {token:?}")),
                None => return Err("unterminated list".to_string()),
            }
        }
    }

    fn operand(&mut self) -> Result<Operand, String> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Operand::Literal(
                serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number),
            )),
            Some(Token::Str(s)) => Ok(Operand::Literal(Value::String(s))),
            Some(Token::Ident(id)) => match id.as_str() {
                "true" | "True" => Ok(Operand::Literal(Value::Bool(true))),
                "false" | "False" => Ok(Operand::Literal(Value::Bool(false))),
                "null" | "None" => Ok(Operand::Literal(Value::Null)),
                "and" | "or" | "not" | "in" => Err(format!("unexpected keyword '{id}'")),
                "props" if self.peek() == Some(&Token::LBracket) => {
                    self.pos += 1;
                    let Some(Token::Str(name)) = self.advance() else {
                        return Err("props[...] takes a quoted property name".to_string());
                    };
                    self.expect(&Token::RBracket)?;
                    Ok(Operand::Property(name))
                },
                _ => Ok(Operand::Property(id)),
            },
            Some(Token::LParen) => {
                let inner = self.operand()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            },
            Some(token) => Err(format!("unexpected {token:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;

    fn feature() -> Feature {
        Feature::new(Point::new(0.0, 0.0))
            .with_property("name", "Main Street")
            .with_property("lanes", 4)
            .with_property("speed", 50.5)
            .with_property("paved", true)
            .with_property("note", "")
    }

    fn eval(expression: &str) -> bool {
        Predicate::compile(expression)
            .unwrap()
            .test(&feature())
            .unwrap()
    }

    #[test]
    fn comparisons() {
        assert!(eval("lanes == 4"));
        assert!(eval("lanes == 4.0"));
        assert!(eval("lanes >= 4 and speed < 60"));
        assert!(eval("name != 'Side Street'"));
        assert!(eval("props['name'] == \"Main Street\""));
        assert!(!eval("lanes > 4"));
    }

    #[test]
    fn boolean_structure() {
        assert!(eval("lanes > 10 or paved"));
        assert!(eval("not (lanes > 10)"));
        assert!(!eval("not paved"));
        assert!(eval("(lanes == 4 or lanes == 2) and paved == true"));
    }

    #[test]
    fn parenthesized_operands() {
        assert!(eval("(lanes) == 4"));
        assert!(eval("lanes == (4)"));
        assert!(eval("((name)) != 'Side Street'"));
        assert!(eval("(paved)"));
        assert!(eval("(lanes) in [4]"));
        assert!(Predicate::compile("(lanes > 1) == true").is_err());
    }

    #[test]
    fn truthiness() {
        assert!(eval("name"));
        assert!(!eval("note"));
        assert!(!eval("missing"));
        assert!(eval("missing == null"));
    }

    #[test]
    fn membership() {
        assert!(eval("lanes in [2, 4, 6]"));
        assert!(eval("name not in ['Side Street']"));
        assert!(!eval("name in []"));
    }

    #[test]
    fn ordering_mixed_kinds_is_a_transform_error() {
        let predicate = Predicate::compile("name > 3").unwrap();
        let err = predicate.test(&feature()).unwrap_err();
        assert!(matches!(err, TransformError::Predicate { .. }));
    }

    #[test]
    fn malformed_expressions_fail_to_compile() {
        for expression in ["lanes ==", "(lanes == 4", "lanes = 4", "'open", "lanes in [x]", "a b"] {
            let err = Predicate::compile(expression).unwrap_err();
            assert!(
                matches!(err, ValidationError::InvalidExpression { .. }),
                "{expression}: {err:?}"
            );
        }
    }

    #[test]
    fn negative_and_exponent_numbers() {
        assert!(eval("-1 < lanes"));
        assert!(eval("speed < 1e3"));
    }
}
