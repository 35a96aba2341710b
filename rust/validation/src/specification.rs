// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Specification model
//!
//! An IDS specification deserialized from JSON:
//!
//! ```json
//! {
//!   "identifier": "S1",
//!   "name": "Walls carry a fire rating",
//!   "cardinality": "required",
//!   "applicability": [{ "entity": { "name": "IFCWALL" } }],
//!   "requirements": [{
//!     "property": {
//!       "propertySet": "Pset_WallCommon",
//!       "baseName": "FireRating",
//!       "value": { "pattern": "^[0-9]+HR$" }
//!     }
//!   }]
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How many applicable entities a specification expects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// At least one applicable entity, all passing
    #[default]
    Required,
    /// Any number of applicable entities, all passing
    Optional,
    /// No applicable entity may exist
    Prohibited,
}

/// Value or name constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Constraint {
    /// Exact match
    Literal(String),
    /// Regular expression (substring fallback when invalid)
    Pattern {
        pattern: String,
        #[serde(default)]
        flags: String,
    },
}

impl Constraint {
    pub fn literal(value: impl Into<String>) -> Self {
        Constraint::Literal(value.into())
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        Constraint::Pattern {
            pattern: pattern.into(),
            flags: String::new(),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Literal(value) => write!(f, "'{}'", value),
            Constraint::Pattern { pattern, flags } if flags.is_empty() => write!(f, "/{}/", pattern),
            Constraint::Pattern { pattern, flags } => write!(f, "/{}/{}", pattern, flags),
        }
    }
}

/// One atomic condition of an applicability or requirement clause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facet {
    #[serde(rename_all = "camelCase")]
    Entity {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        predefined_type: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Property {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        property_set: Option<Constraint>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_name: Option<Constraint>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Constraint>,
    },
    Attribute {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Constraint>,
    },
}

impl Facet {
    pub fn entity(name: impl Into<String>) -> Self {
        Facet::Entity {
            name: name.into(),
            predefined_type: None,
        }
    }

    pub fn property(property_set: &str, base_name: &str) -> Self {
        Facet::Property {
            property_set: Some(Constraint::literal(property_set)),
            base_name: Some(Constraint::literal(base_name)),
            value: None,
        }
    }

    pub fn attribute(name: impl Into<String>) -> Self {
        Facet::Attribute {
            name: name.into(),
            value: None,
        }
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Facet::Entity {
                name,
                predefined_type: Some(predefined),
            } => write!(f, "Entity {}.{}", name, predefined),
            Facet::Entity { name, .. } => write!(f, "Entity {}", name),
            Facet::Property {
                property_set,
                base_name,
                value,
            } => {
                f.write_str("Property ")?;
                match property_set {
                    Some(set) => write!(f, "{}", set)?,
                    None => f.write_str("*")?,
                }
                f.write_str(".")?;
                match base_name {
                    Some(name) => write!(f, "{}", name)?,
                    None => f.write_str("*")?,
                }
                if let Some(value) = value {
                    write!(f, " = {}", value)?;
                }
                Ok(())
            }
            Facet::Attribute { name, value: None } => write!(f, "Attribute {}", name),
            Facet::Attribute {
                name,
                value: Some(value),
            } => write!(f, "Attribute {} = {}", name, value),
        }
    }
}

/// Declarative rule: applicability filter plus requirement facets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specification {
    #[serde(default)]
    pub identifier: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub cardinality: Cardinality,
    pub applicability: Vec<Facet>,
    #[serde(default)]
    pub requirements: Vec<Facet>,
}

impl Specification {
    /// Reject specifications the engine cannot evaluate meaningfully
    pub fn check(&self) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidSpecification {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.applicability.is_empty() {
            return Err(invalid("applicability must contain at least one facet"));
        }
        for facet in self.applicability.iter().chain(&self.requirements) {
            match facet {
                Facet::Entity { name, .. } if name.is_empty() => {
                    return Err(invalid("entity facet without a name"))
                }
                Facet::Attribute { name, .. } if name.is_empty() => {
                    return Err(invalid("attribute facet without a name"))
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SpecificationInput {
    Document {
        #[serde(default)]
        #[allow(dead_code)]
        title: Option<String>,
        specifications: Vec<Specification>,
    },
    List(Vec<Specification>),
    Single(Box<Specification>),
}

/// Load specifications from JSON.
///
/// Accepts a single specification, an array, or `{ "title", "specifications": [...] }`.
pub fn load_specifications(json: &str) -> Result<Vec<Specification>> {
    let specifications = match serde_json::from_str::<SpecificationInput>(json)? {
        SpecificationInput::Document { specifications, .. } => specifications,
        SpecificationInput::List(list) => list,
        SpecificationInput::Single(spec) => vec![*spec],
    };
    for spec in &specifications {
        spec.check()?;
    }
    tracing::debug!(count = specifications.len(), "Loaded specifications");
    Ok(specifications)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_document() {
        let json = r#"{
            "title": "Fire safety",
            "specifications": [{
                "identifier": "S1",
                "name": "Walls carry a fire rating",
                "applicability": [{ "entity": { "name": "IFCWALL", "predefinedType": "SOLIDWALL" } }],
                "requirements": [
                    { "property": { "propertySet": "Pset_WallCommon", "baseName": "FireRating",
                                    "value": { "pattern": "^[0-9]+hr$", "flags": "i" } } },
                    { "attribute": { "name": "Name" } }
                ]
            }]
        }"#;
        let specs = load_specifications(json).unwrap();
        assert_eq!(specs.len(), 1);

        let spec = &specs[0];
        assert_eq!(spec.cardinality, Cardinality::Required);
        assert_eq!(
            spec.applicability[0],
            Facet::Entity {
                name: "IFCWALL".to_string(),
                predefined_type: Some("SOLIDWALL".to_string()),
            }
        );
        assert_eq!(
            spec.requirements[0],
            Facet::Property {
                property_set: Some(Constraint::literal("Pset_WallCommon")),
                base_name: Some(Constraint::literal("FireRating")),
                value: Some(Constraint::Pattern {
                    pattern: "^[0-9]+hr$".to_string(),
                    flags: "i".to_string(),
                }),
            }
        );
        assert_eq!(spec.requirements[1], Facet::attribute("Name"));
    }

    #[test]
    fn test_load_single_and_list() {
        let single = r#"{ "name": "A", "cardinality": "optional",
                          "applicability": [{ "entity": { "name": "IFCSLAB" } }] }"#;
        let specs = load_specifications(single).unwrap();
        assert_eq!(specs[0].cardinality, Cardinality::Optional);
        assert!(specs[0].requirements.is_empty());

        let list = format!("[{}, {}]", single, single);
        assert_eq!(load_specifications(&list).unwrap().len(), 2);
    }

    #[test]
    fn test_rejects_empty_applicability() {
        let json = r#"{ "name": "Nothing", "applicability": [] }"#;
        assert!(matches!(
            load_specifications(json),
            Err(Error::InvalidSpecification { .. })
        ));
        assert!(matches!(load_specifications("{"), Err(Error::Document(_))));
    }

    #[test]
    fn test_facet_display() {
        assert_eq!(
            Facet::property("Pset_WallCommon", "FireRating").to_string(),
            "Property 'Pset_WallCommon'.'FireRating'"
        );
        let any = Facet::Property {
            property_set: None,
            base_name: None,
            value: None,
        };
        assert_eq!(any.to_string(), "Property *.*");
    }
}
