//! Oracle-specific preprocessing.
//!
//! Works on `sqlparser` tokens, so string literals and comments are never
//! touched. The output only feeds the parser; the caller's SQL is kept as
//! written.
//!
//! - `(+)` outer-join markers are removed; the join still parses and its
//!   columns stay visible, only the outer-ness is lost. The marker is kept
//!   as a literal.
//! - `NVL2`, `DECODE`, `ROWNUM`, `ROWID` usages are recorded as literals.
//!   They parse as ordinary functions/identifiers and are handled later.
//!
//! `MINUS` needs no rewrite, `sqlparser` reads it as a set operator.

use sqlparser::{
    dialect::GenericDialect,
    tokenizer::{Location, Token, TokenWithSpan, Tokenizer}
};

use crate::ast::{DialectLiteral, LiteralKind};

pub fn preprocess(sql: &str, literals: &mut Vec<DialectLiteral>) -> String {
    let tokens = match Tokenizer::new(&GenericDialect {}, sql).tokenize_with_location() {
        Ok(tokens) => tokens,
        // the parser reports the same error with its position
        Err(_) => return sql.to_string()
    };
    let code: Vec<&TokenWithSpan> = tokens
        .iter()
        .filter(|t| !matches!(t.token, Token::Whitespace(_)))
        .collect();

    let mut seen_pseudo: Vec<String> = Vec::new();
    let mut markers = Vec::new();
    for (i, tok) in code.iter().enumerate() {
        match &tok.token {
            Token::Word(word) if word.quote_style.is_none() => {
                let name = word.value.to_ascii_uppercase();
                let call = matches!(code.get(i + 1).map(|t| &t.token), Some(Token::LParen));
                match name.as_str() {
                    "ROWNUM" | "ROWID" if !seen_pseudo.contains(&name) => {
                        literals.push(DialectLiteral {
                            kind: LiteralKind::PseudoColumn,
                            text: name.clone()
                        });
                        seen_pseudo.push(name.clone());
                    }
                    "NVL2" | "DECODE" if call => literals.push(DialectLiteral {
                        kind: LiteralKind::Function,
                        text: name.clone()
                    }),
                    _ => {}
                }
            }
            Token::LParen => {
                if let [_, plus, close, ..] = &code[i..]
                    && plus.token == Token::Plus
                    && close.token == Token::RParen
                {
                    markers.push((tok.span.start, close.span.end));
                }
            }
            _ => {}
        }
    }

    if markers.is_empty() {
        return sql.to_string();
    }
    literals.push(DialectLiteral {
        kind: LiteralKind::Function,
        text: "(+)".to_string()
    });

    let mut out = String::with_capacity(sql.len());
    let mut cursor = 0;
    for (start, end) in markers {
        out.push_str(sql[cursor..byte_offset(sql, start)].trim_end());
        cursor = byte_offset(sql, end);
    }
    out.push_str(&sql[cursor..]);
    out
}

/// Byte offset of a 1-based line/column location, counted the way the
/// tokenizer counts (one column per char)
fn byte_offset(sql: &str, location: Location) -> usize {
    let (mut line, mut column) = (1, 1);
    for (offset, ch) in sql.char_indices() {
        if line == location.line && column == location.column {
            return offset;
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    sql.len()
}
