//! Route predicates.
//!
//! # Responsibilities
//! - Match host header (exact or `*.` wildcard, case-insensitive)
//! - Match path patterns (`*` one segment, `**` any subtree, `{var}` one segment)
//! - Match method, header and query parameters
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Host matching is case-insensitive
//! - Path matching is case-sensitive
//! - No predicates = always matches (wildcard)
//! - No regex in the hot path

use axum::body::Body;
use axum::http::{header, Request};

use crate::routing::definition::{ComponentError, PredicateDefinition};

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &Request<Body>) -> bool;
}

/// Build a matcher from its definition.
pub fn compile(definition: &PredicateDefinition) -> Result<Box<dyn Matcher>, ComponentError> {
    let values = definition.values();
    let name = definition.name.as_str();

    let matcher: Box<dyn Matcher> = match name {
        "Path" => Box::new(PathMatcher::new(non_empty(name, split_list(&values))?)),
        "Host" => Box::new(HostMatcher::new(non_empty(name, split_list(&values))?)),
        "Method" => Box::new(MethodMatcher::new(non_empty(name, split_list(&values))?)),
        "Header" => {
            let header = definition
                .arg("header", 0)
                .ok_or_else(|| missing(name, "header name"))?;
            let header = header::HeaderName::from_bytes(header.as_bytes()).map_err(|e| {
                ComponentError::InvalidArgs {
                    name: name.to_string(),
                    reason: e.to_string(),
                }
            })?;
            Box::new(HeaderMatcher {
                header,
                value: definition.arg("regexp", 1),
            })
        }
        "Query" => {
            let param = definition
                .arg("param", 0)
                .ok_or_else(|| missing(name, "param name"))?;
            Box::new(QueryMatcher {
                param,
                value: definition.arg("regexp", 1),
            })
        }
        other => {
            return Err(ComponentError::Unknown {
                kind: "predicate",
                name: other.to_string(),
            })
        }
    };

    Ok(matcher)
}

fn split_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn non_empty(name: &str, values: Vec<String>) -> Result<Vec<String>, ComponentError> {
    if values.is_empty() {
        Err(missing(name, "at least one pattern"))
    } else {
        Ok(values)
    }
}

fn missing(name: &str, what: &str) -> ComponentError {
    ComponentError::InvalidArgs {
        name: name.to_string(),
        reason: format!("missing {}", what),
    }
}

/// Matches the Host header against any of the given patterns.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    patterns: Vec<String>,
}

impl HostMatcher {
    /// Patterns are normalized to lowercase for case-insensitive matching.
    pub fn new(patterns: Vec<String>) -> Self {
        Self {
            patterns: patterns.into_iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    fn host_matches(pattern: &str, host: &str) -> bool {
        match pattern.strip_prefix("**.").or_else(|| pattern.strip_prefix("*.")) {
            Some(suffix) => host.len() > suffix.len() && host.ends_with(&format!(".{}", suffix)),
            None => pattern == host,
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| req.uri().authority().map(|a| a.as_str()));

        let Some(host) = host else {
            return false;
        };
        let host = strip_port(host).to_lowercase();
        self.patterns.iter().any(|p| Self::host_matches(p, &host))
    }
}

/// Drop a trailing `:port`. IPv6 literals keep their brackets, so
/// `[::1]:8080` becomes `[::1]`.
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    host.rsplit_once(':').map(|(h, _)| h).unwrap_or(host)
}

/// Matches the request path against any of the given patterns.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    patterns: Vec<Vec<String>>,
}

impl PathMatcher {
    pub fn new(patterns: Vec<String>) -> Self {
        Self {
            patterns: patterns.iter().map(|p| segments(p)).collect(),
        }
    }
}

impl Matcher for PathMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        let path = segments(req.uri().path());
        let path: Vec<&str> = path.iter().map(String::as_str).collect();
        self.patterns.iter().any(|pattern| {
            let pattern: Vec<&str> = pattern.iter().map(String::as_str).collect();
            match_segments(&pattern, &path)
        })
    }
}

fn segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", rest)) => {
            rest.is_empty() || (0..=path.len()).any(|skip| match_segments(rest, &path[skip..]))
        }
        Some((expected, rest)) => match path.split_first() {
            Some((actual, path_rest)) if segment_matches(expected, actual) => {
                match_segments(rest, path_rest)
            }
            _ => false,
        },
    }
}

fn segment_matches(expected: &str, actual: &str) -> bool {
    expected == "*" || (expected.starts_with('{') && expected.ends_with('}')) || expected == actual
}

/// Matches the request method.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    methods: Vec<String>,
}

impl MethodMatcher {
    pub fn new(methods: Vec<String>) -> Self {
        Self {
            methods: methods.into_iter().map(|m| m.to_uppercase()).collect(),
        }
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.methods.iter().any(|m| m == req.method().as_str())
    }
}

/// Matches presence of a header, optionally with an exact value.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    header: header::HeaderName,
    value: Option<String>,
}

impl Matcher for HeaderMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        let mut values = req.headers().get_all(&self.header).iter();
        match &self.value {
            Some(expected) => values.any(|v| v.to_str().map(|v| v == expected).unwrap_or(false)),
            None => values.next().is_some(),
        }
    }
}

/// Matches presence of a query parameter, optionally with an exact value.
#[derive(Debug, Clone)]
pub struct QueryMatcher {
    param: String,
    value: Option<String>,
}

impl Matcher for QueryMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        let Some(query) = req.uri().query() else {
            return false;
        };
        url::form_urlencoded::parse(query.as_bytes())
            .filter(|(k, _)| *k == self.param)
            .any(|(_, v)| self.value.as_deref().map_or(true, |expected| v == expected))
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug, Default)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.matchers.iter().all(|m| m.matches(req))
    }
}
