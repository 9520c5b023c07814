//! Restricted arithmetic expressions: the bottom layer of the rate and
//! formula mini-language. Tokenizer plus recursive-descent parser over
//! numbers, `+ - * /`, unary minus, parentheses, comparison operators,
//! and a whitelist of math functions. No identifiers, no dynamic code.
//!
//! Comparison results are numeric: 1.0 for true, 0.0 for false. Errors
//! surface as [`ExprError`]; the `eval` layer above swallows them into
//! its documented fallbacks.

use std::fmt;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("unexpected token {0} at position {1}")]
    UnexpectedToken(String, usize),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{0}' expects {1} argument(s), got {2}")]
    WrongArity(String, usize, usize),
    #[error("malformed number '{0}'")]
    BadNumber(String),
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Ident(s) => write!(f, "{s}"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::Le => write!(f, "<="),
            Token::Ge => write!(f, ">="),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(_, c)) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut text = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n: f64 = text.parse().map_err(|_| ExprError::BadNumber(text))?;
                tokens.push(Token::Number(n));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let mut text = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(text));
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '<' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '=' => {
                chars.next();
                // Accept both `==` and a bare `=` as equality.
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                }
                tokens.push(Token::EqEq);
            }
            '!' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        tokens.push(Token::NotEq);
                    }
                    _ => return Err(ExprError::UnexpectedChar('!')),
                }
            }
            other => return Err(ExprError::UnexpectedChar(other)),
        }
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser / evaluator
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, want: Token) -> Result<(), ExprError> {
        match self.next() {
            Some(t) if t == want => Ok(()),
            Some(t) => Err(ExprError::UnexpectedToken(t.to_string(), self.pos - 1)),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    // cmp <- add (op add)?
    fn comparison(&mut self) -> Result<f64, ExprError> {
        let left = self.additive()?;
        let op = match self.peek() {
            Some(Token::Lt) => Token::Lt,
            Some(Token::Gt) => Token::Gt,
            Some(Token::Le) => Token::Le,
            Some(Token::Ge) => Token::Ge,
            Some(Token::EqEq) => Token::EqEq,
            Some(Token::NotEq) => Token::NotEq,
            _ => return Ok(left),
        };
        self.next();
        let right = self.additive()?;
        let truth = match op {
            Token::Lt => left < right,
            Token::Gt => left > right,
            Token::Le => left <= right,
            Token::Ge => left >= right,
            Token::EqEq => left == right,
            Token::NotEq => left != right,
            _ => unreachable!(),
        };
        Ok(if truth { 1.0 } else { 0.0 })
    }

    // add <- mul ((+|-) mul)*
    fn additive(&mut self) -> Result<f64, ExprError> {
        let mut acc = self.multiplicative()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.next();
                    acc += self.multiplicative()?;
                }
                Some(Token::Minus) => {
                    self.next();
                    acc -= self.multiplicative()?;
                }
                _ => return Ok(acc),
            }
        }
    }

    // mul <- unary ((*|/) unary)*
    fn multiplicative(&mut self) -> Result<f64, ExprError> {
        let mut acc = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.next();
                    acc *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.next();
                    // IEEE division; /0 yields inf, handled upstream by
                    // the finite-truthiness rule.
                    acc /= self.unary()?;
                }
                _ => return Ok(acc),
            }
        }
    }

    // unary <- -unary | primary
    fn unary(&mut self) -> Result<f64, ExprError> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.next();
            return Ok(-self.unary()?);
        }
        self.primary()
    }

    // primary <- number | func(args) | (expr)
    fn primary(&mut self) -> Result<f64, ExprError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let v = self.comparison()?;
                self.expect(Token::RParen)?;
                Ok(v)
            }
            Some(Token::Ident(name)) => self.call(name),
            Some(t) => Err(ExprError::UnexpectedToken(t.to_string(), self.pos - 1)),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn call(&mut self, name: String) -> Result<f64, ExprError> {
        self.expect(Token::LParen)
            .map_err(|_| ExprError::UnknownFunction(name.clone()))?;
        let mut args = Vec::new();
        if !matches!(self.peek(), Some(Token::RParen)) {
            loop {
                args.push(self.comparison()?);
                match self.next() {
                    Some(Token::Comma) => continue,
                    Some(Token::RParen) => break,
                    Some(t) => {
                        return Err(ExprError::UnexpectedToken(t.to_string(), self.pos - 1));
                    }
                    None => return Err(ExprError::UnexpectedEnd),
                }
            }
        } else {
            self.next();
        }
        apply(&name, &args)
    }
}

fn apply(name: &str, args: &[f64]) -> Result<f64, ExprError> {
    let unary = |f: fn(f64) -> f64| -> Result<f64, ExprError> {
        if args.len() == 1 {
            Ok(f(args[0]))
        } else {
            Err(ExprError::WrongArity(name.to_string(), 1, args.len()))
        }
    };
    match name {
        "round" => unary(f64::round),
        "floor" => unary(f64::floor),
        "ceil" => unary(f64::ceil),
        "abs" => unary(f64::abs),
        "min" => {
            if args.is_empty() {
                Err(ExprError::WrongArity(name.to_string(), 2, 0))
            } else {
                Ok(args.iter().copied().fold(f64::INFINITY, f64::min))
            }
        }
        "max" => {
            if args.is_empty() {
                Err(ExprError::WrongArity(name.to_string(), 2, 0))
            } else {
                Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max))
            }
        }
        other => Err(ExprError::UnknownFunction(other.to_string())),
    }
}

/// Evaluate a restricted arithmetic expression.
pub fn evaluate(input: &str) -> Result<f64, ExprError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ExprError::UnexpectedEnd);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.comparison()?;
    match parser.next() {
        None => Ok(value),
        Some(t) => Err(ExprError::UnexpectedToken(t.to_string(), parser.pos - 1)),
    }
}
