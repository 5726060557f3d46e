//! Route definition value objects and payload parsing.
//!
//! # Wire Format
//! ```text
//! [
//!   { "id": "users",
//!     "predicates": [{"name": "Path", "args": {"_genkey_0": "/users/**"}}],
//!     "filters": ["StripPrefix=1"],
//!     "uri": "http://127.0.0.1:9000",
//!     "order": 0 }
//! ]
//! ```
//!
//! Predicates and filters accept either the object form or the `Name=a,b`
//! shortcut string. Argument values are read in insertion order.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// A predicate or filter could not be built from its definition.
#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("unknown {kind} `{name}`")]
    Unknown { kind: &'static str, name: String },

    #[error("{name}: {reason}")]
    InvalidArgs { name: String, reason: String },
}

/// The route payload could not be turned into a route set.
#[derive(Debug, Error)]
pub enum ConfigParseError {
    #[error("route payload is empty")]
    Empty,

    #[error("malformed route payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("route at index {index} has an empty id")]
    MissingId { index: usize },

    #[error("route `{id}`: invalid uri `{uri}`: {reason}")]
    InvalidUri {
        id: String,
        uri: String,
        reason: String,
    },

    #[error("route `{id}`: {source}")]
    Component {
        id: String,
        #[source]
        source: ComponentError,
    },
}

/// A named predicate or filter with ordered arguments.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawComponent")]
pub struct ComponentDefinition {
    pub name: String,
    pub args: Map<String, Value>,
}

pub type PredicateDefinition = ComponentDefinition;
pub type FilterDefinition = ComponentDefinition;

impl ComponentDefinition {
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| (generated_key(i), Value::String(v.into())))
            .collect();
        Self {
            name: name.into(),
            args,
        }
    }

    /// Argument values in insertion order, rendered as strings.
    pub fn values(&self) -> Vec<String> {
        self.args
            .values()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    }

    /// Value of a named argument, falling back to a positional one.
    pub fn arg(&self, name: &str, position: usize) -> Option<String> {
        match self.args.get(name) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => self.values().into_iter().nth(position),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawComponent {
    Shortcut(String),
    Full {
        name: String,
        #[serde(default)]
        args: Map<String, Value>,
    },
}

impl From<RawComponent> for ComponentDefinition {
    fn from(raw: RawComponent) -> Self {
        match raw {
            RawComponent::Full { name, args } => Self { name, args },
            RawComponent::Shortcut(text) => match text.split_once('=') {
                Some((name, values)) => Self::new(name.trim(), values.split(',').map(str::trim)),
                None => Self::new(text.trim(), std::iter::empty::<String>()),
            },
        }
    }
}

fn generated_key(index: usize) -> String {
    format!("_genkey_{}", index)
}

/// One routing rule as delivered by the route source.
///
/// Equality covers every field; the diff treats any difference as a change.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RouteDefinition {
    pub id: String,

    #[serde(default)]
    pub predicates: Vec<PredicateDefinition>,

    #[serde(default)]
    pub filters: Vec<FilterDefinition>,

    pub uri: String,

    /// Lower sorts first; ties keep insertion order.
    #[serde(default)]
    pub order: i32,
}

/// Parse a full route payload.
///
/// Duplicate ids are defined behaviour: the last definition wins and takes the
/// position of the first occurrence.
pub fn parse_definitions(content: &str) -> Result<Vec<RouteDefinition>, ConfigParseError> {
    if content.trim().is_empty() {
        return Err(ConfigParseError::Empty);
    }

    let parsed: Vec<RouteDefinition> = serde_json::from_str(content)?;
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(parsed.len());
    let mut definitions: Vec<RouteDefinition> = Vec::with_capacity(parsed.len());

    for (index, mut definition) in parsed.into_iter().enumerate() {
        definition.id = definition.id.trim().to_string();
        if definition.id.is_empty() {
            return Err(ConfigParseError::MissingId { index });
        }

        match positions.get(&definition.id) {
            Some(&pos) => {
                tracing::warn!(route_id = %definition.id, "Duplicate route id in payload, last definition wins");
                definitions[pos] = definition;
            }
            None => {
                positions.insert(definition.id.clone(), definitions.len());
                definitions.push(definition);
            }
        }
    }

    Ok(definitions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_object_and_shortcut_components() {
        let payload = r#"[
            {"id": "users",
             "predicates": [{"name": "Path", "args": {"_genkey_0": "/users/**"}}, "Method=GET,POST"],
             "filters": ["StripPrefix=1"],
             "uri": "http://127.0.0.1:9000",
             "order": -1}
        ]"#;
        let defs = parse_definitions(payload).unwrap();
        assert_eq!(defs.len(), 1);

        let route = &defs[0];
        assert_eq!(route.order, -1);
        assert_eq!(route.predicates[0].values(), vec!["/users/**"]);
        assert_eq!(route.predicates[1].name, "Method");
        assert_eq!(route.predicates[1].values(), vec!["GET", "POST"]);
        assert_eq!(route.filters[0].arg("parts", 0).as_deref(), Some("1"));
    }

    #[test]
    fn order_defaults_to_zero_and_lists_to_empty() {
        let defs = parse_definitions(r#"[{"id": "a", "uri": "http://a"}]"#).unwrap();
        assert_eq!(defs[0].order, 0);
        assert!(defs[0].predicates.is_empty());
        assert!(defs[0].filters.is_empty());
    }

    #[test]
    fn duplicate_ids_last_one_wins() {
        let payload = r#"[
            {"id": "a", "uri": "http://one"},
            {"id": "b", "uri": "http://b"},
            {"id": "a", "uri": "http://two"}
        ]"#;
        let defs = parse_definitions(payload).unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].id, "a");
        assert_eq!(defs[0].uri, "http://two");
    }

    #[test]
    fn truncated_json_is_a_parse_error() {
        let err = parse_definitions(r#"[{"id": "a", "uri": "#).unwrap_err();
        assert!(matches!(err, ConfigParseError::Json(_)));
    }

    #[test]
    fn blank_payload_is_rejected() {
        assert!(matches!(
            parse_definitions("  \n"),
            Err(ConfigParseError::Empty)
        ));
    }

    #[test]
    fn empty_id_is_rejected() {
        let err = parse_definitions(r#"[{"id": " ", "uri": "http://a"}]"#).unwrap_err();
        assert!(matches!(err, ConfigParseError::MissingId { index: 0 }));
    }

    #[test]
    fn numeric_args_render_as_strings() {
        let defs = parse_definitions(
            r#"[{"id": "a", "uri": "http://a", "filters": [{"name": "StripPrefix", "args": {"parts": 2}}]}]"#,
        )
        .unwrap();
        assert_eq!(defs[0].filters[0].arg("parts", 0).as_deref(), Some("2"));
    }
}
