// SPDX-License-Identifier: MIT

//! Tokenizer for expression snippets

use crate::adk::error::FlowError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    /// Raw backtick body; interpolations are parsed later
    Template(Vec<RawTemplatePart>),
    Ident(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawTemplatePart {
    Text(String),
    Source(String),
}

/// Punctuators, longest first so `===` wins over `==`
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "??", "?.", "+", "-", "*", "/", "%", "<",
    ">", "!", "(", ")", "[", "]", "{", "}", ".", ",", ":", "?", ";", "=",
];

pub fn tokenize(source: &str) -> Result<Vec<Token>, FlowError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        // Comments
        if c == '/' && chars.get(pos + 1) == Some(&'/') {
            while pos < chars.len() && chars[pos] != '\n' {
                pos += 1;
            }
            continue;
        }
        if c == '/' && chars.get(pos + 1) == Some(&'*') {
            pos += 2;
            while pos < chars.len() && !(chars[pos] == '*' && chars.get(pos + 1) == Some(&'/')) {
                pos += 1;
            }
            if pos >= chars.len() {
                return Err(FlowError::evaluation("Unterminated comment"));
            }
            pos += 2;
            continue;
        }

        if c.is_ascii_digit() {
            let (number, next) = read_number(&chars, pos)?;
            tokens.push(Token::Number(number));
            pos = next;
            continue;
        }

        if c == '\'' || c == '"' {
            let (text, next) = read_string(&chars, pos)?;
            tokens.push(Token::Str(text));
            pos = next;
            continue;
        }

        if c == '`' {
            let (parts, next) = read_template(&chars, pos)?;
            tokens.push(Token::Template(parts));
            pos = next;
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = pos;
            while pos < chars.len()
                && (chars[pos].is_alphanumeric() || chars[pos] == '_' || chars[pos] == '$')
            {
                pos += 1;
            }
            tokens.push(Token::Ident(chars[start..pos].iter().collect()));
            continue;
        }

        let punct = PUNCTUATORS.iter().find(|p| {
            p.chars()
                .enumerate()
                .all(|(i, pc)| chars.get(pos + i) == Some(&pc))
        });
        match punct {
            Some(p) => {
                tokens.push(Token::Punct(p));
                pos += p.len();
            }
            None => {
                return Err(FlowError::evaluation(format!(
                    "Unexpected character '{}' at position {}",
                    c, pos
                )))
            }
        }
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

fn read_number(chars: &[char], start: usize) -> Result<(f64, usize), FlowError> {
    let mut pos = start;
    while pos < chars.len() && chars[pos].is_ascii_digit() {
        pos += 1;
    }
    if chars.get(pos) == Some(&'.') && chars.get(pos + 1).is_some_and(|c| c.is_ascii_digit()) {
        pos += 1;
        while pos < chars.len() && chars[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if matches!(chars.get(pos), Some('e') | Some('E')) {
        let mut exp = pos + 1;
        if matches!(chars.get(exp), Some('+') | Some('-')) {
            exp += 1;
        }
        if chars.get(exp).is_some_and(|c| c.is_ascii_digit()) {
            pos = exp;
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }

    let text: String = chars[start..pos].iter().collect();
    text.parse::<f64>()
        .map(|n| (n, pos))
        .map_err(|_| FlowError::evaluation(format!("Invalid number '{}'", text)))
}

fn escape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        other => other,
    }
}

fn read_string(chars: &[char], start: usize) -> Result<(String, usize), FlowError> {
    let quote = chars[start];
    let mut pos = start + 1;
    let mut text = String::new();

    while pos < chars.len() {
        match chars[pos] {
            '\\' if pos + 1 < chars.len() => {
                text.push(escape(chars[pos + 1]));
                pos += 2;
            }
            c if c == quote => return Ok((text, pos + 1)),
            c => {
                text.push(c);
                pos += 1;
            }
        }
    }

    Err(FlowError::evaluation("Unterminated string literal"))
}

fn read_template(chars: &[char], start: usize) -> Result<(Vec<RawTemplatePart>, usize), FlowError> {
    let mut pos = start + 1;
    let mut parts = Vec::new();
    let mut text = String::new();

    while pos < chars.len() {
        match chars[pos] {
            '\\' if pos + 1 < chars.len() => {
                text.push(escape(chars[pos + 1]));
                pos += 2;
            }
            '`' => {
                if !text.is_empty() {
                    parts.push(RawTemplatePart::Text(text));
                }
                return Ok((parts, pos + 1));
            }
            '$' if chars.get(pos + 1) == Some(&'{') => {
                if !text.is_empty() {
                    parts.push(RawTemplatePart::Text(std::mem::take(&mut text)));
                }
                pos += 2;
                let source_start = pos;
                let mut depth = 1;
                while pos < chars.len() {
                    match chars[pos] {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    pos += 1;
                }
                if pos >= chars.len() {
                    return Err(FlowError::evaluation("Unterminated template interpolation"));
                }
                parts.push(RawTemplatePart::Source(
                    chars[source_start..pos].iter().collect(),
                ));
                pos += 1;
            }
            c => {
                text.push(c);
                pos += 1;
            }
        }
    }

    Err(FlowError::evaluation("Unterminated template literal"))
}
