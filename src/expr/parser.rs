//! A stock Pratt-style expression parser (spec.md §4.2 "Evaluation engine"): numeric
//! arithmetic, comparisons, boolean connectives with short-circuit, ternary, function
//! call, index, and member access.

use crate::error::{Stage, StreamSqlError};
use crate::expr::ast::{BinOp, Expr, UnaryOp};

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Sym(&'static str),
    Eof,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    src: &'a str,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { chars: src.char_indices().peekable(), src }
    }

    fn tokenize(mut self) -> crate::error::Result<Vec<Tok>> {
        let mut out = Vec::new();
        loop {
            self.skip_ws();
            let Some(&(start, c)) = self.chars.peek() else {
                out.push(Tok::Eof);
                break;
            };
            if c.is_ascii_digit() || (c == '.' && self.peek_is_digit_after_dot()) {
                out.push(self.lex_number());
            } else if c == '\'' || c == '"' {
                out.push(self.lex_string(c)?);
            } else if c.is_alphabetic() || c == '_' {
                out.push(self.lex_ident());
            } else {
                out.push(self.lex_symbol(start)?);
            }
        }
        Ok(out)
    }

    fn peek_is_digit_after_dot(&self) -> bool {
        let mut it = self.chars.clone();
        it.next();
        matches!(it.peek(), Some((_, d)) if d.is_ascii_digit())
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn lex_number(&mut self) -> Tok {
        let start = self.chars.peek().unwrap().0;
        let mut end = start;
        let mut is_float = false;
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                end = i + c.len_utf8();
                self.chars.next();
            } else if c == '.' && !is_float {
                is_float = true;
                end = i + c.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        let text = &self.src[start..end];
        if is_float {
            Tok::Float(text.parse().unwrap_or(0.0))
        } else {
            Tok::Int(text.parse().unwrap_or(0))
        }
    }

    fn lex_string(&mut self, quote: char) -> crate::error::Result<Tok> {
        self.chars.next(); // consume opening quote
        let mut s = String::new();
        loop {
            match self.chars.next() {
                Some((_, '\\')) => {
                    if let Some((_, next)) = self.chars.next() {
                        s.push(match next {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                    }
                }
                Some((_, c)) if c == quote => return Ok(Tok::Str(s)),
                Some((_, c)) => s.push(c),
                None => {
                    return Err(StreamSqlError::syntax(Stage::Parse, "unterminated string literal"))
                }
            }
        }
    }

    fn lex_ident(&mut self) -> Tok {
        let start = self.chars.peek().unwrap().0;
        let mut end = start;
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                end = i + c.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        let text = &self.src[start..end];
        match text.to_uppercase().as_str() {
            "AND" => Tok::Sym("&&"),
            "OR" => Tok::Sym("||"),
            "NOT" => Tok::Sym("!"),
            "TRUE" => Tok::Ident("true".to_string()),
            "FALSE" => Tok::Ident("false".to_string()),
            "NULL" => Tok::Ident("null".to_string()),
            _ => Tok::Ident(text.to_string()),
        }
    }

    fn lex_symbol(&mut self, start: usize) -> crate::error::Result<Tok> {
        let two: String = {
            let mut it = self.chars.clone();
            let a = it.next().map(|(_, c)| c);
            let b = it.next().map(|(_, c)| c);
            match (a, b) {
                (Some(a), Some(b)) => format!("{a}{b}"),
                (Some(a), None) => a.to_string(),
                _ => String::new(),
            }
        };
        let sym2 = match two.as_str() {
            "==" | "!=" | "<=" | ">=" | "&&" | "||" => Some(two.clone()),
            _ => None,
        };
        if let Some(s) = sym2 {
            self.chars.next();
            self.chars.next();
            let leaked: &'static str = match s.as_str() {
                "==" => "==",
                "!=" => "!=",
                "<=" => "<=",
                ">=" => ">=",
                "&&" => "&&",
                "||" => "||",
                _ => unreachable!(),
            };
            return Ok(Tok::Sym(leaked));
        }
        let c = self.src[start..].chars().next().unwrap();
        self.chars.next();
        let leaked: &'static str = match c {
            '+' => "+",
            '-' => "-",
            '*' => "*",
            '/' => "/",
            '%' => "%",
            '(' => "(",
            ')' => ")",
            ',' => ",",
            '.' => ".",
            '[' => "[",
            ']' => "]",
            '?' => "?",
            ':' => ":",
            '=' => "=",
            '<' => "<",
            '>' => ">",
            '!' => "!",
            other => {
                return Err(StreamSqlError::syntax(
                    Stage::Parse,
                    format!("unexpected character '{other}'"),
                ))
            }
        };
        Ok(Tok::Sym(leaked))
    }
}

pub struct Parser {
    toks: Vec<Tok>,
    pos: usize,
}

impl Parser {
    pub fn parse(src: &str) -> crate::error::Result<Expr> {
        let toks = Lexer::new(src).tokenize()?;
        let mut p = Parser { toks, pos: 0 };
        let expr = p.parse_ternary()?;
        if p.peek() != &Tok::Eof {
            return Err(StreamSqlError::syntax(Stage::Parse, "trailing tokens after expression"));
        }
        Ok(expr)
    }

    fn peek(&self) -> &Tok {
        &self.toks[self.pos]
    }

    fn advance(&mut self) -> Tok {
        let t = self.toks[self.pos].clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn eat_sym(&mut self, s: &str) -> bool {
        if matches!(self.peek(), Tok::Sym(x) if *x == s) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, s: &str) -> crate::error::Result<()> {
        if self.eat_sym(s) {
            Ok(())
        } else {
            Err(StreamSqlError::syntax(Stage::Parse, format!("expected '{s}'")))
        }
    }

    fn parse_ternary(&mut self) -> crate::error::Result<Expr> {
        let cond = self.parse_or()?;
        if self.eat_sym("?") {
            let then_branch = self.parse_ternary()?;
            self.expect_sym(":")?;
            let else_branch = self.parse_ternary()?;
            Ok(Expr::Ternary(Box::new(cond), Box::new(then_branch), Box::new(else_branch)))
        } else {
            Ok(cond)
        }
    }

    fn parse_or(&mut self) -> crate::error::Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat_sym("||") {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> crate::error::Result<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.eat_sym("&&") {
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> crate::error::Result<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = if self.eat_sym("==") || self.eat_sym("=") {
                BinOp::Eq
            } else if self.eat_sym("!=") {
                BinOp::Ne
            } else {
                break;
            };
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> crate::error::Result<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = if self.eat_sym("<=") {
                BinOp::Le
            } else if self.eat_sym(">=") {
                BinOp::Ge
            } else if self.eat_sym("<") {
                BinOp::Lt
            } else if self.eat_sym(">") {
                BinOp::Gt
            } else {
                break;
            };
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> crate::error::Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = if self.eat_sym("+") {
                BinOp::Add
            } else if self.eat_sym("-") {
                BinOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> crate::error::Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.eat_sym("*") {
                BinOp::Mul
            } else if self.eat_sym("/") {
                BinOp::Div
            } else if self.eat_sym("%") {
                BinOp::Mod
            } else {
                break;
            };
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> crate::error::Result<Expr> {
        if self.eat_sym("-") {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.parse_unary()?)));
        }
        if self.eat_sym("!") {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> crate::error::Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_sym("[") {
                let index = self.parse_ternary()?;
                self.expect_sym("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat_sym(".") {
                match self.advance() {
                    Tok::Ident(name) => expr = Expr::Member(Box::new(expr), name),
                    _ => return Err(StreamSqlError::syntax(Stage::Parse, "expected member name after '.'")),
                }
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> crate::error::Result<Expr> {
        match self.advance() {
            Tok::Int(i) => Ok(Expr::Int(i)),
            Tok::Float(f) => Ok(Expr::Float(f)),
            Tok::Str(s) => Ok(Expr::Str(s)),
            Tok::Ident(name) => {
                if name == "true" {
                    return Ok(Expr::Bool(true));
                }
                if name == "false" {
                    return Ok(Expr::Bool(false));
                }
                if name == "null" {
                    return Ok(Expr::Null);
                }
                if self.eat_sym("(") {
                    let mut args = Vec::new();
                    if !self.eat_sym(")") {
                        loop {
                            args.push(self.parse_ternary()?);
                            if self.eat_sym(",") {
                                continue;
                            }
                            self.expect_sym(")")?;
                            break;
                        }
                    }
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Tok::Sym("(") => {
                let inner = self.parse_ternary()?;
                self.expect_sym(")")?;
                Ok(inner)
            }
            other => Err(StreamSqlError::syntax(Stage::Parse, format!("unexpected token {other:?}"))),
        }
    }
}
