use serde_json::Value;
use std::iter::Peekable;
use std::vec::IntoIter;

use crate::error::{AppError, AppResult};
pub use crate::parser::filter_operator::FilterOperator;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Quoted(String),
    Word(String),
}

/// Parses a SCIM filter expression (RFC 7644 section 3.4.2.2).
///
/// Precedence from loosest to tightest: `or`, `and`, `not`, then attribute
/// expressions and parenthesised groups. Keywords and operators are
/// case-insensitive; attribute names are kept verbatim.
pub fn parse_filter(filter_str: &str) -> AppResult<FilterOperator> {
    let tokens = tokenize(filter_str)?;
    if tokens.is_empty() {
        return Err(AppError::FilterParse("Empty filter".to_string()));
    }

    let mut parser = Parser {
        tokens: tokens.into_iter().peekable(),
    };
    let filter = parser.or_expr()?;
    match parser.tokens.next() {
        None => Ok(filter),
        Some(token) => Err(AppError::FilterParse(format!(
            "Unexpected {} in filter: {}",
            describe(&token),
            filter_str
        ))),
    }
}

fn tokenize(input: &str) -> AppResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some(escaped) => text.push(escaped),
                            None => break,
                        },
                        '"' => {
                            closed = true;
                            break;
                        }
                        other => text.push(other),
                    }
                }
                if !closed {
                    return Err(AppError::FilterParse(format!(
                        "Unterminated string in filter: {input}"
                    )));
                }
                tokens.push(Token::Quoted(text));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '"') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }

    Ok(tokens)
}

fn describe(token: &Token) -> String {
    match token {
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::LBracket => "'['".to_string(),
        Token::RBracket => "']'".to_string(),
        Token::Quoted(text) => format!("string \"{text}\""),
        Token::Word(word) => format!("'{word}'"),
    }
}

struct Parser {
    tokens: Peekable<IntoIter<Token>>,
}

impl Parser {
    fn next_is_keyword(&mut self, keyword: &str) -> bool {
        matches!(self.tokens.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn expect(&mut self, expected: Token) -> AppResult<()> {
        match self.tokens.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(AppError::FilterParse(format!(
                "Expected {} but found {}",
                describe(&expected),
                describe(&token)
            ))),
            None => Err(AppError::FilterParse(format!(
                "Expected {} but the filter ended",
                describe(&expected)
            ))),
        }
    }

    fn or_expr(&mut self) -> AppResult<FilterOperator> {
        let mut left = self.and_expr()?;
        while self.next_is_keyword("or") {
            self.tokens.next();
            let right = self.and_expr()?;
            left = FilterOperator::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> AppResult<FilterOperator> {
        let mut left = self.unary()?;
        while self.next_is_keyword("and") {
            self.tokens.next();
            let right = self.unary()?;
            left = FilterOperator::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> AppResult<FilterOperator> {
        if self.next_is_keyword("not") {
            self.tokens.next();
            let inner = self.unary()?;
            return Ok(FilterOperator::Not(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> AppResult<FilterOperator> {
        match self.tokens.next() {
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Word(attr)) => self.attribute_expr(attr),
            Some(token) => Err(AppError::FilterParse(format!(
                "Expected an attribute but found {}",
                describe(&token)
            ))),
            None => Err(AppError::FilterParse(
                "Expected an attribute but the filter ended".to_string(),
            )),
        }
    }

    fn attribute_expr(&mut self, attr: String) -> AppResult<FilterOperator> {
        if matches!(self.tokens.peek(), Some(Token::LBracket)) {
            self.tokens.next();
            let inner = self.or_expr()?;
            self.expect(Token::RBracket)?;
            return Ok(FilterOperator::Complex(attr, Box::new(inner)));
        }

        let op = match self.tokens.next() {
            Some(Token::Word(op)) => op.to_ascii_lowercase(),
            Some(token) => {
                return Err(AppError::FilterParse(format!(
                    "Expected an operator after '{attr}' but found {}",
                    describe(&token)
                )))
            }
            None => {
                return Err(AppError::FilterParse(format!(
                    "Expected an operator after '{attr}'"
                )))
            }
        };

        if op == "pr" {
            return Ok(FilterOperator::Present(attr));
        }

        let constructor: fn(String, Value) -> FilterOperator = match op.as_str() {
            "eq" => FilterOperator::Equal,
            "ne" => FilterOperator::NotEqual,
            "co" => FilterOperator::Contains,
            "sw" => FilterOperator::StartsWith,
            "ew" => FilterOperator::EndsWith,
            "gt" => FilterOperator::GreaterThan,
            "ge" => FilterOperator::GreaterThanOrEqual,
            "lt" => FilterOperator::LessThan,
            "le" => FilterOperator::LessThanOrEqual,
            _ => {
                return Err(AppError::FilterParse(format!(
                    "Unknown operator '{op}' after '{attr}'"
                )))
            }
        };

        let value = match self.tokens.next() {
            Some(Token::Quoted(text)) => Value::String(text),
            Some(Token::Word(word)) => parse_bare_value(&word),
            _ => {
                return Err(AppError::FilterParse(format!(
                    "Missing comparison value for '{attr} {op}'"
                )))
            }
        };

        Ok(constructor(attr, value))
    }
}

/// Unquoted comparison value: `true`, `false`, `null`, numbers, and any
/// other word as a plain string.
fn parse_bare_value(word: &str) -> Value {
    match word {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => {
            if let Ok(num) = word.parse::<i64>() {
                return Value::from(num);
            }
            word.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(word.to_string()))
        }
    }
}
