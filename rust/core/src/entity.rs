// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parsed entity model
//!
//! One [`Entity`] per `#id = TYPE(args);` record, with positional [`Value`] arguments.
//! Entities are immutable once emitted by the parser, so they can be shared
//! across execution units without locking.

use std::fmt::Write as _;

/// Positional argument value of an entity
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    /// String literal: 'text' (escapes already decoded)
    String(String),
    /// Numeric token: 42, 3.5, 1.E-5
    Number(f64),
    /// Boolean literal: .T. / .F.
    Boolean(bool),
    /// Explicit "not applicable": $
    Unset,
    /// Explicit "not provided": *
    Omitted,
    /// Entity reference: #123 (resolved lazily by id)
    Reference(u32),
    /// Compound argument: (a, b, c)
    NestedList(Vec<Value>),
    /// Enumeration literal other than booleans: .SOLIDWALL.
    Enum(String),
    /// Typed wrapper: IFCLABEL('2HR'), IFCBOOLEAN(.T.)
    Typed { type_name: String, value: Box<Value> },
}

impl Value {
    /// Get as entity reference
    #[inline]
    pub fn as_reference(&self) -> Option<u32> {
        match self {
            Value::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Get as string
    #[inline]
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as number
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as enum name (without the surrounding dots)
    #[inline]
    pub fn as_enum(&self) -> Option<&str> {
        match self {
            Value::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// Get as list
    #[inline]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::NestedList(items) => Some(items),
            _ => None,
        }
    }

    /// Unwrap typed wrappers down to the carried value
    pub fn inner(&self) -> &Value {
        match self {
            Value::Typed { value, .. } => value.inner(),
            other => other,
        }
    }

    /// Check if unset/omitted
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Unset | Value::Omitted)
    }

    /// Textual form used for constraint matching.
    ///
    /// Returns `None` for values that carry no scalar text (unset, omitted, lists).
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Enum(e) => Some(e.clone()),
            Value::Reference(id) => Some(format!("#{}", id)),
            Value::Typed { value, .. } => value.as_text(),
            Value::Unset | Value::Omitted | Value::NestedList(_) => None,
        }
    }

    /// Write the STEP token for this value
    pub fn write_step(&self, out: &mut String) {
        match self {
            Value::String(s) => {
                out.push('\'');
                for c in s.chars() {
                    if c == '\'' {
                        out.push('\'');
                    }
                    out.push(c);
                }
                out.push('\'');
            }
            // Debug formatting is the shortest representation that parses back exactly
            Value::Number(n) => {
                let _ = write!(out, "{:?}", n);
            }
            Value::Boolean(true) => out.push_str(".T."),
            Value::Boolean(false) => out.push_str(".F."),
            Value::Unset => out.push('$'),
            Value::Omitted => out.push('*'),
            Value::Reference(id) => {
                let _ = write!(out, "#{}", id);
            }
            Value::NestedList(items) => {
                out.push('(');
                write_values(items, out);
                out.push(')');
            }
            Value::Enum(e) => {
                let _ = write!(out, ".{}.", e);
            }
            Value::Typed { type_name, value } => {
                out.push_str(type_name);
                out.push('(');
                value.write_step(out);
                out.push(')');
            }
        }
    }
}

fn write_values(values: &[Value], out: &mut String) {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        value.write_step(out);
    }
}

/// Entity parsed from one logical record
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Entity {
    pub id: u32,
    pub type_name: String,
    /// Logical record text after line joining
    pub raw_text: String,
    pub arguments: Vec<Value>,
}

impl Entity {
    /// Create new entity
    pub fn new(id: u32, type_name: impl Into<String>, raw_text: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            raw_text: raw_text.into(),
            arguments,
        }
    }

    /// Get argument by position
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.arguments.get(index)
    }

    /// Get entity reference argument
    pub fn get_ref(&self, index: usize) -> Option<u32> {
        self.get(index).and_then(|v| v.as_reference())
    }

    /// Get string argument
    pub fn get_string(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(|v| v.as_string())
    }

    /// Get list argument
    pub fn get_list(&self, index: usize) -> Option<&[Value]> {
        self.get(index).and_then(|v| v.as_list())
    }

    /// Collect the entity references held by a list argument
    pub fn get_ref_list(&self, index: usize) -> Vec<u32> {
        self.get_list(index)
            .map(|items| items.iter().filter_map(Value::as_reference).collect())
            .unwrap_or_default()
    }

    /// Render the record back to STEP text: `#id=TYPE(args);`
    pub fn to_step(&self) -> String {
        let mut out = String::with_capacity(self.raw_text.len().max(16));
        let _ = write!(out, "#{}={}(", self.id, self.type_name);
        write_values(&self.arguments, &mut out);
        out.push_str(");");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_accessors() {
        let entity = Entity::new(
            1,
            "IFCWALL",
            "",
            vec![
                Value::Reference(2),
                Value::String("Wall-001".to_string()),
                Value::NestedList(vec![Value::Reference(3), Value::Unset, Value::Reference(4)]),
            ],
        );

        assert_eq!(entity.get_ref(0), Some(2));
        assert_eq!(entity.get_string(1), Some("Wall-001"));
        assert_eq!(entity.get_ref_list(2), vec![3, 4]);
        assert_eq!(entity.get_ref(5), None);
    }

    #[test]
    fn test_value_text() {
        assert_eq!(Value::Number(30.0).as_text().as_deref(), Some("30"));
        assert_eq!(Value::Number(2.5).as_text().as_deref(), Some("2.5"));
        assert_eq!(Value::Boolean(true).as_text().as_deref(), Some("true"));
        assert_eq!(Value::Unset.as_text(), None);

        let typed = Value::Typed {
            type_name: "IFCLABEL".to_string(),
            value: Box::new(Value::String("2HR".to_string())),
        };
        assert_eq!(typed.as_text().as_deref(), Some("2HR"));
        assert_eq!(typed.inner(), &Value::String("2HR".to_string()));
    }

    #[test]
    fn test_to_step_escapes_quotes() {
        let entity = Entity::new(
            7,
            "IFCLABEL",
            "",
            vec![Value::String("it's".to_string()), Value::Boolean(false), Value::Omitted],
        );
        assert_eq!(entity.to_step(), "#7=IFCLABEL('it''s',.F.,*);");
    }
}
