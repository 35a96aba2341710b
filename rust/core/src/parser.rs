// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STEP/IFC record parser
//!
//! Turns one logical record (`#id = TYPE(args);`) into an [`Entity`].
//! The record header is matched with nom; arguments are split with a
//! depth/string-aware scanner and each raw token is classified into a [`Value`].

use nom::{
    bytes::complete::take_while1,
    character::complete::{char, digit1, multispace0},
    combinator::{map_res, verify},
    sequence::tuple,
    IResult,
};

use crate::entity::{Entity, Value};
use crate::error::{Error, Result};

const QUOTE: u8 = b'\'';

/// Parse entity id digits: 123
fn entity_id(input: &str) -> IResult<&str, u32> {
    map_res(digit1, |s: &str| lexical_core::parse::<u32>(s.as_bytes()))(input)
}

/// Parse type name: IFCWALL, IFCRELDEFINESBYPROPERTIES
fn type_name(input: &str) -> IResult<&str, &str> {
    verify(
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        |s: &str| s.as_bytes()[0].is_ascii_alphabetic(),
    )(input)
}

/// Parse `#<id> = <TYPE> (` and return the id, the type and the text after the opening paren
fn record_header(input: &str) -> IResult<&str, (u32, &str)> {
    let (rest, (_, _, id, _, _, _, name, _, _)) = tuple((
        multispace0,
        char('#'),
        entity_id,
        multispace0,
        char('='),
        multispace0,
        type_name,
        multispace0,
        char('('),
    ))(input)?;
    Ok((rest, (id, name)))
}

/// Parse a complete logical record.
///
/// Example: `#123=IFCWALL('guid',$,#5,(1.,2.),.T.);`
pub fn parse_record(text: &str) -> Result<Entity> {
    let (rest, (id, name)) = record_header(text)
        .map_err(|e| Error::InvalidRecord(format!("malformed record header: {}", e)))?;

    if id == 0 {
        return Err(Error::InvalidRecord("entity id must be positive".to_string()));
    }

    let body = rest
        .trim_end()
        .strip_suffix(';')
        .map(str::trim_end)
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| Error::InvalidRecord("record must end with ');'".to_string()))?;

    Ok(Entity::new(id, name, text, parse_arguments(body)))
}

/// Split an argument list on top-level commas.
///
/// Commas inside nested parentheses or string literals do not split.
/// An empty input yields a single empty argument.
pub fn split_arguments(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if b == QUOTE {
                if bytes.get(i + 1) == Some(&QUOTE) {
                    i += 2;
                    continue;
                }
                in_string = false;
            }
        } else {
            match b {
                QUOTE => in_string = true,
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                b',' if depth == 0 => {
                    parts.push(&text[start..i]);
                    start = i + 1;
                }
                _ => {}
            }
        }
        i += 1;
    }

    parts.push(&text[start..]);
    parts
}

/// Parse an argument list (the text between the outer parentheses)
pub fn parse_arguments(text: &str) -> Vec<Value> {
    split_arguments(text).into_iter().map(classify_token).collect()
}

/// Classify one raw argument token.
///
/// Precedence: quoted string, reference, number, `.T.`/`.F.`/`$`/`*`,
/// nested list, enumeration, typed value, then the raw token as an opaque string.
pub fn classify_token(raw: &str) -> Value {
    let token = raw.trim();

    if let Some(inner) = quoted_inner(token) {
        return Value::String(decode_string(inner));
    }

    if let Some(digits) = token.strip_prefix('#') {
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(id) = lexical_core::parse::<u32>(digits.as_bytes()) {
                return Value::Reference(id);
            }
        }
    }

    if let Some(n) = parse_number(token) {
        return Value::Number(n);
    }

    match token {
        ".T." => return Value::Boolean(true),
        ".F." => return Value::Boolean(false),
        "$" => return Value::Unset,
        "*" => return Value::Omitted,
        _ => {}
    }

    if let Some(inner) = token.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        return Value::NestedList(parse_arguments(inner));
    }

    if let Some(name) = token.strip_prefix('.').and_then(|s| s.strip_suffix('.')) {
        if is_identifier(name) {
            return Value::Enum(name.to_string());
        }
    }

    if let Some(typed) = typed_value(token) {
        return typed;
    }

    Value::String(token.to_string())
}

/// Strict numeric grammar: the whole token must parse and start like a number.
///
/// Rejects `inf`/`nan` spellings and partial tokens such as `1e`.
fn parse_number(token: &str) -> Option<f64> {
    let first = *token.as_bytes().first()?;
    if !(first.is_ascii_digit() || matches!(first, b'-' | b'+' | b'.')) {
        return None;
    }
    if !token.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    fast_float::parse::<f64, _>(token).ok()
}

/// Inner text of a `'...'` literal whose closing quote is the last character
fn quoted_inner(token: &str) -> Option<&str> {
    let inner = token.strip_prefix('\'')?.strip_suffix('\'')?;
    // Reject tokens like 'a'b' where the literal closes before the end
    let bytes = inner.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == QUOTE {
            if bytes.get(i + 1) != Some(&QUOTE) {
                return None;
            }
            i += 2;
        } else {
            i += 1;
        }
    }
    Some(inner)
}

/// Decode the body of a string literal: `''` becomes `'`
pub fn decode_string(inner: &str) -> String {
    if inner.contains("''") {
        inner.replace("''", "'")
    } else {
        inner.to_string()
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Typed value: IFCLABEL('x'), IFCBOOLEAN(.T.), IFCLENGTHMEASURE(2.5)
fn typed_value(token: &str) -> Option<Value> {
    let (rest, name) = type_name(token).ok()?;
    let inner = rest.trim_start().strip_prefix('(')?.strip_suffix(')')?;
    let mut args = parse_arguments(inner);
    let value = if args.len() == 1 {
        args.pop()?
    } else {
        Value::NestedList(args)
    };
    Some(Value::Typed {
        type_name: name.to_string(),
        value: Box::new(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn test_parse_record() {
        let input = "#123=IFCWALL('guid','owner',$,$,'name',$,$,$);";
        let entity = parse_record(input).unwrap();
        assert_eq!(entity.id, 123);
        assert_eq!(entity.type_name, "IFCWALL");
        assert_eq!(entity.arguments.len(), 8);
        assert_eq!(entity.raw_text, input);
        assert_eq!(entity.get_string(0), Some("guid"));
        assert_eq!(entity.get(2), Some(&Value::Unset));
    }

    #[test]
    fn test_parse_record_with_spacing() {
        let entity = parse_record("  #9 = IFCDIRECTION ( (0.,0.,1.) ) ;").unwrap();
        assert_eq!(entity.id, 9);
        assert_eq!(entity.type_name, "IFCDIRECTION");
        assert_eq!(
            entity.arguments,
            vec![Value::NestedList(vec![
                Value::Number(0.0),
                Value::Number(0.0),
                Value::Number(1.0)
            ])]
        );
    }

    #[test]
    fn test_empty_argument_list_yields_one_empty_string() {
        let entity = parse_record("#1=IFCFOO();").unwrap();
        assert_eq!(entity.arguments, vec![s("")]);
    }

    #[test]
    fn test_malformed_records() {
        assert!(parse_record("#1=IFCWALL('a'").is_err());
        assert!(parse_record("#=IFCWALL();").is_err());
        assert!(parse_record("#0=IFCWALL();").is_err());
        assert!(parse_record("IFCWALL();").is_err());
        assert!(parse_record("#5=(1,2);").is_err());
    }

    #[test]
    fn test_split_respects_strings_and_nesting() {
        let parts = split_arguments("'a,b',(1,(2,3)),'it''s, fine',#4");
        assert_eq!(parts, vec!["'a,b'", "(1,(2,3))", "'it''s, fine'", "#4"]);
    }

    #[test]
    fn test_doubled_delimiter_decodes_to_one() {
        assert_eq!(classify_token("'O''Brien'"), s("O'Brien"));
        assert_eq!(classify_token("''''"), s("'"));
        assert_eq!(classify_token("''"), s(""));
    }

    #[test]
    fn test_classification_precedence() {
        assert_eq!(classify_token("'#12'"), s("#12"));
        assert_eq!(classify_token("#12"), Value::Reference(12));
        assert_eq!(classify_token("-3.5E-2"), Value::Number(-0.035));
        assert_eq!(classify_token("0."), Value::Number(0.0));
        assert_eq!(classify_token("007"), Value::Number(7.0));
        assert_eq!(classify_token(".T."), Value::Boolean(true));
        assert_eq!(classify_token(".F."), Value::Boolean(false));
        assert_eq!(classify_token("$"), Value::Unset);
        assert_eq!(classify_token("*"), Value::Omitted);
        assert_eq!(classify_token(".SOLIDWALL."), Value::Enum("SOLIDWALL".to_string()));
    }

    #[test]
    fn test_strict_numeric_grammar() {
        assert_eq!(classify_token("1e"), s("1e"));
        assert_eq!(classify_token("inf"), s("inf"));
        assert_eq!(classify_token("0x1F"), s("0x1F"));
        assert_eq!(classify_token("#12a"), s("#12a"));
    }

    #[test]
    fn test_typed_value() {
        assert_eq!(
            classify_token("IFCLABEL('2HR')"),
            Value::Typed {
                type_name: "IFCLABEL".to_string(),
                value: Box::new(s("2HR")),
            }
        );
        assert_eq!(
            classify_token("IFCBOOLEAN(.T.)").inner(),
            &Value::Boolean(true)
        );
    }

    #[test]
    fn test_round_trip_through_step_text() {
        let inputs = [
            "#1=IFCWALL('3a4T','it''s',$,*,#12,(#1,#2),.T.,.NOTDEFINED.,2.5,-7.0,IFCLABEL('x'));",
            "#2=IFCDIRECTION((0.,0.,1.));",
            "#3=IFCPROPERTYSET('g',#5,'Pset_WallCommon',$,(#6,#7));",
            "#4=IFCEMPTY();",
        ];
        for input in inputs {
            let entity = parse_record(input).unwrap();
            let reparsed = parse_record(&entity.to_step()).unwrap();
            assert_eq!(reparsed.id, entity.id);
            assert_eq!(reparsed.type_name, entity.type_name);
            assert_eq!(reparsed.arguments, entity.arguments, "round trip of {}", input);
        }
    }
}
