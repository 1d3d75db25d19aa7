/* Value trees produced while parsing initializers.
 *
 * A RawValue is the type-agnostic parse of a C initializer: scalars,
 * positional brace lists, and designated entries, exactly as the grammar
 * yields them. A ShapedValue is the result of applying a resolved type to
 * a RawValue: struct fields become a name-keyed mapping, arrays become
 * lists in declaration order, scalars stay scalars.
 */

use indexmap::IndexMap;
use serde_derive::{Deserialize, Serialize};

/* A single scalar produced by the expression evaluator or a literal node.
 * Text carries string/char literals (delimiters preserved) as well as
 * expressions that did not reduce to a compile-time constant. */
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ScalarValue::Int(v) => Some(*v),
            ScalarValue::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /* True when the text is a double-quoted C string literal. */
    pub fn is_string_literal(&self) -> bool {
        matches!(self, ScalarValue::Text(t) if t.len() >= 2 && t.starts_with('"') && t.ends_with('"'))
    }
}

impl std::fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Bool(b) => write!(f, "{}", b),
            ScalarValue::Int(v) => write!(f, "{}", v),
            ScalarValue::Float(v) => write!(f, "{}", v),
            ScalarValue::Text(t) => write!(f, "{}", t),
        }
    }
}

/* Designator of one initializer entry: `.name = ...` or `[index] = ...`. */
#[derive(Debug, Clone, PartialEq)]
pub enum Designator {
    Field(String),
    Index(i64),
}

/* Unshaped initializer data, consumed immediately by shaping. */
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Scalar(ScalarValue),
    List(Vec<RawValue>),
    Designated {
        designator: Designator,
        value: Box<RawValue>,
    },
}

impl RawValue {
    pub fn as_list(&self) -> Option<&[RawValue]> {
        match self {
            RawValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            RawValue::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

/* The final typed value tree attached to a variable record. */
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ShapedValue {
    Scalar(ScalarValue),
    List(Vec<ShapedValue>),
    Record(IndexMap<String, ShapedValue>),
}

impl From<RawValue> for ShapedValue {
    /* Structure-preserving fallback used when no type information is
     * available to shape against. Designated entries become single-key
     * mappings. */
    fn from(raw: RawValue) -> Self {
        match raw {
            RawValue::Scalar(s) => ShapedValue::Scalar(s),
            RawValue::List(items) => {
                ShapedValue::List(items.into_iter().map(ShapedValue::from).collect())
            }
            RawValue::Designated { designator, value } => {
                let key = match designator {
                    Designator::Field(name) => name,
                    Designator::Index(i) => i.to_string(),
                };
                let mut map = IndexMap::new();
                map.insert(key, ShapedValue::from(*value));
                ShapedValue::Record(map)
            }
        }
    }
}

/* Decode the escape sequences of a C string literal body. The input is the
 * literal text with its surrounding double quotes; the result is the byte
 * content as seen by the C compiler, without a trailing NUL. */
pub fn decode_c_string(literal: &str) -> String {
    let body = literal
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(literal);

    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('a') => out.push('\u{07}'),
            Some('b') => out.push('\u{08}'),
            Some('f') => out.push('\u{0c}'),
            Some('v') => out.push('\u{0b}'),
            Some('x') => {
                let mut value = 0u32;
                let mut digits = 0;
                while let Some(d) = chars.peek().and_then(|c| c.to_digit(16)) {
                    value = (value << 4) | d;
                    digits += 1;
                    chars.next();
                }
                if digits > 0 {
                    out.push(char::from_u32(value & 0xff).unwrap_or('\u{fffd}'));
                } else {
                    out.push('x');
                }
            }
            Some(d @ '1'..='7') => {
                let mut value = d.to_digit(8).unwrap_or(0);
                let mut digits = 1;
                while digits < 3 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(n) => {
                            value = (value << 3) | n;
                            digits += 1;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value & 0xff).unwrap_or('\u{fffd}'));
            }
            Some(other) => out.push(other),
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_plain_string() {
        assert_eq!(decode_c_string("\"hi\""), "hi");
    }

    #[test]
    fn decode_escapes() {
        assert_eq!(decode_c_string("\"a\\n\\t\\0\""), "a\n\t\0");
        assert_eq!(decode_c_string("\"\\x41\\102\""), "AB");
        assert_eq!(decode_c_string("\"quote \\\" slash \\\\\""), "quote \" slash \\");
    }

    #[test]
    fn scalar_string_literal_detection() {
        assert!(ScalarValue::Text("\"hi\"".to_string()).is_string_literal());
        assert!(!ScalarValue::Text("'c'".to_string()).is_string_literal());
        assert!(!ScalarValue::Int(3).is_string_literal());
    }

    #[test]
    fn designated_fallback_becomes_single_key_map() {
        let raw = RawValue::Designated {
            designator: Designator::Field("tag".to_string()),
            value: Box::new(RawValue::Scalar(ScalarValue::Int(1))),
        };
        let shaped = ShapedValue::from(raw);
        match shaped {
            ShapedValue::Record(map) => {
                assert_eq!(map.len(), 1);
                assert_eq!(map["tag"], ShapedValue::Scalar(ScalarValue::Int(1)));
            }
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn shaped_value_serializes_untagged() {
        let mut map = IndexMap::new();
        map.insert("x".to_string(), ShapedValue::Scalar(ScalarValue::Int(1)));
        map.insert(
            "ys".to_string(),
            ShapedValue::List(vec![
                ShapedValue::Scalar(ScalarValue::Int(2)),
                ShapedValue::Scalar(ScalarValue::Float(0.5)),
            ]),
        );
        let json = serde_json::to_string(&ShapedValue::Record(map)).unwrap();
        assert_eq!(json, "{\"x\":1,\"ys\":[2,0.5]}");
    }
}
