use crate::bail;
use crate::error::{CdcResult, ErrorKind};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    LParen,
    RParen,
    Comma,
    Minus,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Not,
    Is,
    Null,
    In,
    True,
    False,
}

/// Splits a rule expression into tokens.
///
/// Keywords are case-insensitive. Back-quoted identifiers may contain any character but a
/// back-quote, string literals use single quotes with `''` as the escape for a quote.
pub(crate) fn tokenize(input: &str) -> CdcResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        match c {
            '(' => {
                tokens.push(Token::LParen);
                pos += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                pos += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                pos += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                pos += 1;
            }
            '=' => {
                pos += 1;
                if chars.get(pos) == Some(&'=') {
                    pos += 1;
                }
                tokens.push(Token::Eq);
            }
            '!' => {
                if chars.get(pos + 1) != Some(&'=') {
                    bail!(
                        ErrorKind::InvalidRule,
                        "Invalid rule syntax",
                        format!("Unexpected '!' at position {pos} in '{input}'")
                    );
                }
                tokens.push(Token::NotEq);
                pos += 2;
            }
            '<' => match chars.get(pos + 1) {
                Some('=') => {
                    tokens.push(Token::LtEq);
                    pos += 2;
                }
                Some('>') => {
                    tokens.push(Token::NotEq);
                    pos += 2;
                }
                _ => {
                    tokens.push(Token::Lt);
                    pos += 1;
                }
            },
            '>' => {
                if chars.get(pos + 1) == Some(&'=') {
                    tokens.push(Token::GtEq);
                    pos += 2;
                } else {
                    tokens.push(Token::Gt);
                    pos += 1;
                }
            }
            '\'' => {
                let (value, next) = read_string(&chars, pos, input)?;
                tokens.push(Token::Str(value));
                pos = next;
            }
            '`' => {
                let start = pos + 1;
                let Some(length) = chars[start..].iter().position(|&c| c == '`') else {
                    bail!(
                        ErrorKind::InvalidRule,
                        "Invalid rule syntax",
                        format!("Unterminated quoted identifier in '{input}'")
                    );
                };
                if length == 0 {
                    bail!(
                        ErrorKind::InvalidRule,
                        "Invalid rule syntax",
                        format!("Empty quoted identifier in '{input}'")
                    );
                }
                tokens.push(Token::Ident(chars[start..start + length].iter().collect()));
                pos = start + length + 1;
            }
            c if c.is_ascii_digit() => {
                let (token, next) = read_number(&chars, pos, input)?;
                tokens.push(token);
                pos = next;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = pos;
                while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                    pos += 1;
                }
                let word: String = chars[start..pos].iter().collect();
                tokens.push(keyword_or_ident(word));
            }
            other => {
                bail!(
                    ErrorKind::InvalidRule,
                    "Invalid rule syntax",
                    format!("Unexpected character '{other}' at position {pos} in '{input}'")
                );
            }
        }
    }

    Ok(tokens)
}

fn keyword_or_ident(word: String) -> Token {
    match word.to_ascii_uppercase().as_str() {
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        "IS" => Token::Is,
        "NULL" => Token::Null,
        "IN" => Token::In,
        "TRUE" => Token::True,
        "FALSE" => Token::False,
        _ => Token::Ident(word),
    }
}

fn read_string(chars: &[char], start: usize, input: &str) -> CdcResult<(String, usize)> {
    let mut value = String::new();
    let mut pos = start + 1;

    while pos < chars.len() {
        if chars[pos] == '\'' {
            if chars.get(pos + 1) == Some(&'\'') {
                value.push('\'');
                pos += 2;
                continue;
            }

            return Ok((value, pos + 1));
        }

        value.push(chars[pos]);
        pos += 1;
    }

    bail!(
        ErrorKind::InvalidRule,
        "Invalid rule syntax",
        format!("Unterminated string literal in '{input}'")
    );
}

fn read_number(chars: &[char], start: usize, input: &str) -> CdcResult<(Token, usize)> {
    let mut pos = start;
    let mut is_float = false;

    while pos < chars.len() {
        let c = chars[pos];
        if c.is_ascii_digit() {
            pos += 1;
        } else if c == '.' && !is_float {
            is_float = true;
            pos += 1;
        } else {
            break;
        }
    }

    let text: String = chars[start..pos].iter().collect();
    let token = if is_float {
        text.parse::<f64>().map(Token::Float).ok()
    } else {
        text.parse::<i64>().map(Token::Int).ok()
    };

    match token {
        Some(token) => Ok((token, pos)),
        None => bail!(
            ErrorKind::InvalidRule,
            "Invalid rule syntax",
            format!("Invalid number '{text}' in '{input}'")
        ),
    }
}
