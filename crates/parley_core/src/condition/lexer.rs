use super::CompareOp;
use crate::error::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Number(f64),
    Sim(String),
    Sent(String),
    Fact(String),
    And,
    Or,
    Op(CompareOp),
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token in the source expression.
    pub position: usize,
    pub text: String,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Match `name('...')` at the start of `rest`, returning the argument and
/// the byte length of the whole call. The argument ends at the first `')`
/// and may not span lines.
fn call_literal<'a>(rest: &'a str, name: &str) -> Option<(&'a str, usize)> {
    let body = rest.strip_prefix(name)?.strip_prefix("('")?;
    let end = body.find("')")?;
    let arg = &body[..end];
    if arg.contains('\n') {
        return None;
    }
    Some((arg, name.len() + 2 + end + 2))
}

/// Match a keyword standing on word boundaries on both sides.
fn keyword(expr: &str, pos: usize, word: &str) -> bool {
    let rest = &expr[pos..];
    if !rest.starts_with(word) {
        return false;
    }
    let before_ok = expr[..pos].chars().next_back().map_or(true, |c| !is_word_char(c));
    let after_ok = rest[word.len()..].chars().next().map_or(true, |c| !is_word_char(c));
    before_ok && after_ok
}

/// Number literal: digits, optionally followed by `.` and more digits.
fn number_len(rest: &str) -> usize {
    let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    let tail = &rest[int_len..];
    if let Some(frac) = tail.strip_prefix('.') {
        int_len + 1 + frac.bytes().take_while(u8::is_ascii_digit).count()
    } else {
        int_len
    }
}

const OPERATORS: [(&str, CompareOp); 5] = [
    ("<=", CompareOp::Le),
    (">=", CompareOp::Ge),
    ("==", CompareOp::Eq),
    ("<", CompareOp::Lt),
    (">", CompareOp::Gt),
];

pub(crate) fn tokenize(expr: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while let Some(c) = expr[pos..].chars().next() {
        let rest = &expr[pos..];

        if c.is_whitespace() {
            pos += c.len_utf8();
            continue;
        }

        let (kind, len) = if c.is_ascii_digit() {
            let len = number_len(rest);
            let literal = &rest[..len];
            let value = literal.parse::<f64>().map_err(|_| SyntaxError::InvalidNumber {
                position: pos,
                literal: literal.to_string(),
            })?;
            (TokenKind::Number(value), len)
        } else if let Some((arg, len)) = call_literal(rest, "sim") {
            (TokenKind::Sim(arg.to_string()), len)
        } else if let Some((arg, len)) = call_literal(rest, "sent") {
            (TokenKind::Sent(arg.to_string()), len)
        } else if let Some((arg, len)) = call_literal(rest, "fact") {
            (TokenKind::Fact(arg.to_string()), len)
        } else if keyword(expr, pos, "and") {
            (TokenKind::And, 3)
        } else if keyword(expr, pos, "or") {
            (TokenKind::Or, 2)
        } else if let Some((op_text, op)) = OPERATORS.iter().find(|(t, _)| rest.starts_with(t)) {
            (TokenKind::Op(*op), op_text.len())
        } else if c == '(' {
            (TokenKind::LParen, 1)
        } else if c == ')' {
            (TokenKind::RParen, 1)
        } else {
            return Err(SyntaxError::UnexpectedChar { position: pos, found: c });
        };

        tokens.push(Token {
            kind,
            position: pos,
            text: rest[..len].to_string(),
        });
        pos += len;
    }

    Ok(tokens)
}
