// SPDX-License-Identifier: MIT

//! Recursive-descent parser for expression snippets
//!
//! Accepts an optional run of `const`/`let` declarations, then an optional
//! `return` and a single expression:
//! - `input.length > 5`
//! - `return state.n < 2;`
//! - `const words = input.split(' '); return words.length;`

use super::ast::{BinaryOp, Expression, Literal, LogicalOp, Program, TemplatePart, UnaryOp};
use super::lexer::{tokenize, RawTemplatePart, Token};
use super::{too_deep, MAX_NESTING};
use crate::adk::error::FlowError;

/// Parse a snippet into a program
pub fn parse(source: &str) -> Result<Program, FlowError> {
    let mut parser = Parser::new(tokenize(source)?, 0);
    parser.program()
}

/// Parse a bare expression (used for template interpolations)
pub fn parse_expression(source: &str) -> Result<Expression, FlowError> {
    parse_nested(source, 0)
}

fn parse_nested(source: &str, depth: usize) -> Result<Expression, FlowError> {
    let mut parser = Parser::new(tokenize(source)?, depth);
    let expr = parser.expression()?;
    parser.expect_end()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Nesting of the expression being parsed, bounded by `MAX_NESTING`
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, depth: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            depth,
        }
    }

    /// Check that `extra` more levels stay within the nesting limit
    fn room_for(&self, extra: usize) -> Result<(), FlowError> {
        if self.depth + extra > MAX_NESTING {
            Err(too_deep())
        } else {
            Ok(())
        }
    }

    /// Parse with `extra` more levels of nesting
    fn nested<T>(
        &mut self,
        extra: usize,
        parse: impl FnOnce(&mut Self) -> Result<T, FlowError>,
    ) -> Result<T, FlowError> {
        self.room_for(extra)?;
        self.depth += extra;
        let parsed = parse(self);
        self.depth -= extra;
        parsed
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at_punct(&self, punct: &str) -> bool {
        matches!(self.peek(), Token::Punct(p) if *p == punct)
    }

    fn at_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Ident(w) if w == word)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.at_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.at_keyword(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), FlowError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", punct)))
        }
    }

    fn expect_end(&mut self) -> Result<(), FlowError> {
        while self.eat_punct(";") {}
        match self.peek() {
            Token::Eof => Ok(()),
            _ => Err(self.unexpected("end of expression")),
        }
    }

    fn unexpected(&self, expected: &str) -> FlowError {
        let found = match self.peek() {
            Token::Number(n) => n.to_string(),
            Token::Str(s) => format!("'{}'", s),
            Token::Template(_) => "template literal".to_string(),
            Token::Ident(i) => i.clone(),
            Token::Punct(p) => p.to_string(),
            Token::Eof => "end of input".to_string(),
        };
        FlowError::evaluation(format!("Expected {} but found {}", expected, found))
    }

    fn identifier(&mut self) -> Result<String, FlowError> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            _ => {
                self.pos -= 1;
                Err(self.unexpected("identifier"))
            }
        }
    }

    fn program(&mut self) -> Result<Program, FlowError> {
        let mut declarations = Vec::new();

        loop {
            while self.eat_punct(";") {}
            if self.eat_keyword("const") || self.eat_keyword("let") || self.eat_keyword("var") {
                let name = self.identifier()?;
                self.expect_punct("=").map_err(|_| {
                    FlowError::evaluation(format!(
                        "Declaration of '{}' needs an initializer",
                        name
                    ))
                })?;
                let value = self.expression()?;
                declarations.push((name, value));
                continue;
            }
            break;
        }

        self.eat_keyword("return");
        let body = if matches!(self.peek(), Token::Eof) || self.at_punct(";") {
            Expression::Literal(Literal::Null)
        } else {
            self.expression()?
        };
        self.expect_end()?;

        Ok(Program { declarations, body })
    }

    fn expression(&mut self) -> Result<Expression, FlowError> {
        self.nested(1, Self::conditional)
    }

    fn conditional(&mut self) -> Result<Expression, FlowError> {
        let test = self.logical_or()?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.expression()?;
        self.expect_punct(":")?;
        let alternate = self.expression()?;
        Ok(Expression::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn logical_or(&mut self) -> Result<Expression, FlowError> {
        let mut left = self.logical_and()?;
        let mut chain = 0;
        loop {
            let op = if self.eat_punct("||") || self.eat_keyword("or") {
                LogicalOp::Or
            } else if self.eat_punct("??") {
                LogicalOp::Nullish
            } else {
                return Ok(left);
            };
            chain += 1;
            let right = self.nested(chain, Self::logical_and)?;
            left = Expression::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn logical_and(&mut self) -> Result<Expression, FlowError> {
        let mut left = self.equality()?;
        let mut chain = 0;
        while self.eat_punct("&&") || self.eat_keyword("and") {
            chain += 1;
            let right = self.nested(chain, Self::equality)?;
            left = Expression::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn binary_level(
        &mut self,
        ops: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expression, FlowError>,
    ) -> Result<Expression, FlowError> {
        let mut left = next(self)?;
        let mut chain = 0;
        'outer: loop {
            for (symbol, op) in ops {
                let matched = if symbol.chars().all(char::is_alphabetic) {
                    self.eat_keyword(symbol)
                } else {
                    self.eat_punct(symbol)
                };
                if matched {
                    chain += 1;
                    let right = self.nested(chain, next)?;
                    left = Expression::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    };
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn equality(&mut self) -> Result<Expression, FlowError> {
        self.binary_level(
            &[
                ("===", BinaryOp::StrictEq),
                ("!==", BinaryOp::StrictNotEq),
                ("==", BinaryOp::Eq),
                ("!=", BinaryOp::NotEq),
            ],
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expression, FlowError> {
        self.binary_level(
            &[
                ("<=", BinaryOp::Lte),
                (">=", BinaryOp::Gte),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
                ("contains", BinaryOp::Contains),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expression, FlowError> {
        self.binary_level(
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expression, FlowError> {
        self.binary_level(
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expression, FlowError> {
        let op = if self.eat_punct("!") || self.eat_keyword("not") {
            UnaryOp::Not
        } else if self.eat_punct("-") {
            UnaryOp::Negate
        } else if self.eat_punct("+") {
            UnaryOp::Plus
        } else {
            return self.postfix();
        };
        let operand = self.nested(1, Self::unary)?;
        Ok(Expression::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn postfix(&mut self) -> Result<Expression, FlowError> {
        let mut expr = self.primary()?;
        let mut chain = 0;
        loop {
            let continues = [".", "?.", "[", "("].iter().any(|p| self.at_punct(p));
            if !continues {
                return Ok(expr);
            }
            chain += 1;
            self.room_for(chain)?;
            if self.eat_punct(".") || self.eat_punct("?.") {
                let property = self.identifier()?;
                expr = Expression::Member {
                    object: Box::new(expr),
                    property,
                };
            } else if self.eat_punct("[") {
                let index = self.nested(chain, Self::expression)?;
                self.expect_punct("]")?;
                expr = Expression::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat_punct("(") {
                let args = self.nested(chain, |p| p.list(")"))?;
                expr = Expression::Call {
                    callee: Box::new(expr),
                    args,
                };
            }
        }
    }

    /// Comma-separated expressions up to `close`; trailing comma allowed
    fn list(&mut self, close: &str) -> Result<Vec<Expression>, FlowError> {
        let mut items = Vec::new();
        while !self.eat_punct(close) {
            items.push(self.expression()?);
            if !self.eat_punct(",") {
                self.expect_punct(close)?;
                break;
            }
        }
        Ok(items)
    }

    fn primary(&mut self) -> Result<Expression, FlowError> {
        match self.advance() {
            Token::Number(n) => Ok(Expression::Literal(Literal::Number(n))),
            Token::Str(s) => Ok(Expression::Literal(Literal::String(s))),
            Token::Template(parts) => template(parts, self.depth + 1),
            Token::Ident(word) => Ok(match word.as_str() {
                "true" => Expression::Literal(Literal::Boolean(true)),
                "false" => Expression::Literal(Literal::Boolean(false)),
                "null" | "undefined" => Expression::Literal(Literal::Null),
                _ => Expression::Identifier(word),
            }),
            Token::Punct("(") => {
                let expr = self.expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Token::Punct("[") => Ok(Expression::Array(self.list("]")?)),
            Token::Punct("{") => self.object(),
            _ => {
                self.pos -= 1;
                Err(self.unexpected("expression"))
            }
        }
    }

    fn object(&mut self) -> Result<Expression, FlowError> {
        let mut properties = Vec::new();
        while !self.eat_punct("}") {
            let key = match self.advance() {
                Token::Ident(name) => name,
                Token::Str(s) => s,
                Token::Number(n) => n.to_string(),
                _ => {
                    self.pos -= 1;
                    return Err(self.unexpected("property name"));
                }
            };
            // Shorthand `{ input }`
            let value = if self.eat_punct(":") {
                self.expression()?
            } else {
                Expression::Identifier(key.clone())
            };
            properties.push((key, value));
            if !self.eat_punct(",") {
                self.expect_punct("}")?;
                break;
            }
        }
        Ok(Expression::Object(properties))
    }
}

fn template(parts: Vec<RawTemplatePart>, depth: usize) -> Result<Expression, FlowError> {
    parts
        .into_iter()
        .map(|part| match part {
            RawTemplatePart::Text(text) => Ok(TemplatePart::Text(text)),
            RawTemplatePart::Source(source) => {
                parse_nested(&source, depth).map(TemplatePart::Expr)
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Expression::Template)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Box<Expression> {
        Box::new(Expression::Identifier(name.to_string()))
    }

    fn number(n: f64) -> Box<Expression> {
        Box::new(Expression::Literal(Literal::Number(n)))
    }

    #[test]
    fn test_return_statement() {
        let program = parse("return state.n < 2;").unwrap();
        assert!(program.declarations.is_empty());
        assert_eq!(
            program.body,
            Expression::Binary {
                op: BinaryOp::Lt,
                left: Box::new(Expression::Member {
                    object: ident("state"),
                    property: "n".to_string(),
                }),
                right: number(2.0),
            }
        );
    }

    #[test]
    fn test_bare_expression_equals_return() {
        assert_eq!(
            parse("input.length > 5").unwrap(),
            parse("return input.length > 5").unwrap()
        );
    }

    #[test]
    fn test_precedence() {
        let program = parse("1 + 2 * 3").unwrap();
        assert_eq!(
            program.body,
            Expression::Binary {
                op: BinaryOp::Add,
                left: number(1.0),
                right: Box::new(Expression::Binary {
                    op: BinaryOp::Mul,
                    left: number(2.0),
                    right: number(3.0),
                }),
            }
        );
    }

    #[test]
    fn test_keyword_operators() {
        let program = parse("intent == 'code' and not done or tags contains 'bug'").unwrap();
        match program.body {
            Expression::Logical { op, left, .. } => {
                assert_eq!(op, LogicalOp::Or);
                assert!(matches!(*left, Expression::Logical { op: LogicalOp::And, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_method_call_chain() {
        let program = parse("input.trim().toUpperCase()").unwrap();
        match program.body {
            Expression::Call { callee, args } => {
                assert!(args.is_empty());
                assert!(matches!(*callee, Expression::Member { ref property, .. } if property == "toUpperCase"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_declarations() {
        let program = parse("const words = input.split(' ');\nlet n = words.length;\nreturn n * 2;").unwrap();
        assert_eq!(program.declarations.len(), 2);
        assert_eq!(program.declarations[0].0, "words");
        assert_eq!(program.declarations[1].0, "n");
    }

    #[test]
    fn test_object_and_array_literals() {
        let program = parse("({ text: input, tags: ['a', 'b'], input })").unwrap();
        match program.body {
            Expression::Object(props) => {
                assert_eq!(props.len(), 3);
                assert_eq!(props[2], ("input".to_string(), Expression::Identifier("input".to_string())));
                assert!(matches!(props[1].1, Expression::Array(ref items) if items.len() == 2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_ternary_and_template() {
        let program = parse("input ? `got ${input}` : 'empty'").unwrap();
        match program.body {
            Expression::Conditional { consequent, .. } => {
                assert!(matches!(*consequent, Expression::Template(ref parts) if parts.len() == 2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_snippet_is_null() {
        assert_eq!(parse("").unwrap().body, Expression::Literal(Literal::Null));
        assert_eq!(parse("return;").unwrap().body, Expression::Literal(Literal::Null));
    }

    #[test]
    fn test_nesting_limit() {
        let deep = |n: usize| format!("return {}1{}", "(".repeat(n), ")".repeat(n));
        assert!(parse(&deep(40)).is_ok());

        for source in [
            deep(500),
            format!("{}true", "!".repeat(5000)),
            format!("1{}", " + 1".repeat(5000)),
            format!("input{}", ".a".repeat(5000)),
            format!("{}1{}", "[".repeat(500), "]".repeat(500)),
        ] {
            match parse(&source) {
                Err(FlowError::Evaluation(msg)) => assert!(msg.contains("nested too deeply")),
                other => panic!("expected nesting error, got {:?}", other.map(|_| ())),
            }
        }
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("input >").is_err());
        assert!(parse("(1 + 2").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("const x;").is_err());
    }
}
