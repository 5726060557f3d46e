//! Per-route request/response filters.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::routing::definition::{ComponentError, FilterDefinition};

/// A compiled route filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteFilter {
    /// Drop the first `n` path segments.
    StripPrefix(usize),
    /// Prepend a fixed prefix to the path.
    PrefixPath(String),
    AddRequestHeader(HeaderName, HeaderValue),
    AddResponseHeader(HeaderName, HeaderValue),
}

impl RouteFilter {
    pub fn compile(definition: &FilterDefinition) -> Result<Self, ComponentError> {
        let name = definition.name.as_str();
        let invalid = |reason: String| ComponentError::InvalidArgs {
            name: name.to_string(),
            reason,
        };

        match name {
            "StripPrefix" => {
                let parts = definition
                    .arg("parts", 0)
                    .ok_or_else(|| invalid("missing parts".into()))?;
                let parts = parts
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("parts `{}` is not a count", parts)))?;
                Ok(RouteFilter::StripPrefix(parts))
            }
            "PrefixPath" => {
                let prefix = definition
                    .arg("prefix", 0)
                    .ok_or_else(|| invalid("missing prefix".into()))?;
                if !prefix.starts_with('/') {
                    return Err(invalid(format!("prefix `{}` must start with '/'", prefix)));
                }
                Ok(RouteFilter::PrefixPath(prefix.trim_end_matches('/').to_string()))
            }
            "AddRequestHeader" | "AddResponseHeader" => {
                let header = definition
                    .arg("name", 0)
                    .ok_or_else(|| invalid("missing header name".into()))?;
                let value = definition
                    .arg("value", 1)
                    .ok_or_else(|| invalid("missing header value".into()))?;
                let header = HeaderName::from_bytes(header.as_bytes())
                    .map_err(|e| invalid(e.to_string()))?;
                let value = HeaderValue::from_str(&value).map_err(|e| invalid(e.to_string()))?;
                if name == "AddRequestHeader" {
                    Ok(RouteFilter::AddRequestHeader(header, value))
                } else {
                    Ok(RouteFilter::AddResponseHeader(header, value))
                }
            }
            other => Err(ComponentError::Unknown {
                kind: "filter",
                name: other.to_string(),
            }),
        }
    }

    /// Apply to an outbound request path and headers.
    pub fn apply_request(&self, path: &mut String, headers: &mut HeaderMap) {
        match self {
            RouteFilter::StripPrefix(parts) => *path = strip_prefix(path, *parts),
            RouteFilter::PrefixPath(prefix) => *path = format!("{}{}", prefix, path),
            RouteFilter::AddRequestHeader(name, value) => {
                headers.append(name.clone(), value.clone());
            }
            RouteFilter::AddResponseHeader(..) => {}
        }
    }

    /// Apply to the response headers returned to the client.
    pub fn apply_response(&self, headers: &mut HeaderMap) {
        if let RouteFilter::AddResponseHeader(name, value) = self {
            headers.append(name.clone(), value.clone());
        }
    }
}

fn strip_prefix(path: &str, parts: usize) -> String {
    let rest: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .skip(parts)
        .collect();
    let mut stripped = format!("/{}", rest.join("/"));
    if path.ends_with('/') && !rest.is_empty() {
        stripped.push('/');
    }
    stripped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(name: &str, values: &[&str]) -> RouteFilter {
        RouteFilter::compile(&FilterDefinition::new(name, values.iter().copied())).unwrap()
    }

    #[test]
    fn strip_prefix_drops_segments() {
        let f = filter("StripPrefix", &["1"]);
        let mut headers = HeaderMap::new();

        let mut path = "/provider/sayHi".to_string();
        f.apply_request(&mut path, &mut headers);
        assert_eq!(path, "/sayHi");

        let mut path = "/provider".to_string();
        f.apply_request(&mut path, &mut headers);
        assert_eq!(path, "/");

        let mut path = "/a/b/".to_string();
        f.apply_request(&mut path, &mut headers);
        assert_eq!(path, "/b/");
    }

    #[test]
    fn prefix_path_prepends() {
        let f = filter("PrefixPath", &["/v2/"]);
        let mut path = "/users".to_string();
        f.apply_request(&mut path, &mut HeaderMap::new());
        assert_eq!(path, "/v2/users");
    }

    #[test]
    fn header_filters_target_their_direction() {
        let req = filter("AddRequestHeader", &["X-Gateway", "dyn"]);
        let resp = filter("AddResponseHeader", &["X-Served-By", "gw"]);

        let mut path = "/".to_string();
        let mut request_headers = HeaderMap::new();
        req.apply_request(&mut path, &mut request_headers);
        resp.apply_request(&mut path, &mut request_headers);
        assert_eq!(request_headers["x-gateway"], "dyn");
        assert!(request_headers.get("x-served-by").is_none());

        let mut response_headers = HeaderMap::new();
        req.apply_response(&mut response_headers);
        resp.apply_response(&mut response_headers);
        assert_eq!(response_headers["x-served-by"], "gw");
        assert!(response_headers.get("x-gateway").is_none());
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        let bad = RouteFilter::compile(&FilterDefinition::new("StripPrefix", ["two"]));
        assert!(matches!(bad, Err(ComponentError::InvalidArgs { .. })));

        let unknown = RouteFilter::compile(&FilterDefinition::new("Hystrix", ["cmd"]));
        assert!(matches!(unknown, Err(ComponentError::Unknown { .. })));
    }
}
