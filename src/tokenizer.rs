//! Search text tokenizer using nom.
//!
//! # Syntax
//!
//! ```text
//! red "light blue" [color] car
//! ─┬─ ──────┬───── ───┬─── ─┬─
//!  │        │         │     └── Bare word
//!  │        │         └── Bracketed tag (exact match, never split)
//!  │        └── Quoted phrase (one token, quotes stripped)
//!  └── Bare word
//! ```
//!
//! Runs on every keystroke, so it never fails: an opening `"` or `[` with
//! no closer is taken as a literal character of a bare word.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::take_until,
    character::complete::char,
    combinator::map,
    sequence::delimited,
};

use crate::ast::SearchToken;

/// Split search text into tokens.
///
/// Pure: the same text always yields the same tokens. Blank text yields
/// none, as do empty `""` and `[]` groups.
pub fn tokenize(text: &str) -> Vec<SearchToken> {
    let mut tokens = Vec::new();
    let mut input = text;

    loop {
        let rest = input.trim_start();
        if rest.is_empty() {
            break;
        }
        match parse_token(rest) {
            Ok((rest, token)) => {
                if !token.text.is_empty() {
                    tokens.push(token);
                }
                input = rest;
            }
            // parse_bare always consumes at least one char
            Err(_) => break,
        }
    }

    tokens
}

fn parse_token(input: &str) -> IResult<&str, SearchToken> {
    alt((parse_quoted, parse_bracketed, parse_bare))(input)
}

/// Parse `"phrase"`. Surrounding whitespace inside the quotes is dropped.
fn parse_quoted(input: &str) -> IResult<&str, SearchToken> {
    map(
        delimited(char('"'), take_until("\""), char('"')),
        |s: &str| SearchToken::quoted(s.trim()),
    )(input)
}

/// Parse `[tag]`. Surrounding whitespace inside the brackets is dropped.
fn parse_bracketed(input: &str) -> IResult<&str, SearchToken> {
    map(
        delimited(char('['), take_until("]"), char(']')),
        |s: &str| SearchToken::bracketed(s.trim()),
    )(input)
}

/// Parse a bare word.
///
/// The first character is always taken, even an unterminated `"` or `[`.
/// The word then ends at whitespace or at the start of a complete group.
fn parse_bare(input: &str) -> IResult<&str, SearchToken> {
    let mut chars = input.char_indices();
    let Some((_, first)) = chars.next() else {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Eof,
        )));
    };

    let mut end = first.len_utf8();
    for (i, c) in chars {
        if c.is_whitespace() || opens_group(&input[i..]) {
            break;
        }
        end = i + c.len_utf8();
    }

    Ok((&input[end..], SearchToken::bare(&input[..end])))
}

fn opens_group(input: &str) -> bool {
    parse_quoted(input).is_ok() || parse_bracketed(input).is_ok()
}
