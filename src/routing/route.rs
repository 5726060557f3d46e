//! Compiled routes.

use axum::body::Body;
use axum::http::uri::Scheme;
use axum::http::{HeaderMap, Request, Uri};
use url::Url;

use crate::routing::definition::{parse_definitions, ConfigParseError, RouteDefinition};
use crate::routing::filter::RouteFilter;
use crate::routing::matcher::{self, AndMatcher, Matcher};

/// Why a request could not be mapped onto the route target.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("upstream scheme `{0}` is not supported")]
    UnsupportedScheme(String),

    #[error("invalid upstream uri: {0}")]
    InvalidUri(#[from] axum::http::Error),
}

/// A route definition with its predicates and filters compiled.
#[derive(Debug)]
pub struct Route {
    definition: RouteDefinition,
    predicate: AndMatcher,
    filters: Vec<RouteFilter>,
    target: Url,
}

impl Route {
    pub fn compile(definition: RouteDefinition) -> Result<Self, ConfigParseError> {
        let target = Url::parse(&definition.uri).map_err(|e| ConfigParseError::InvalidUri {
            id: definition.id.clone(),
            uri: definition.uri.clone(),
            reason: e.to_string(),
        })?;
        if target.host_str().map_or(true, str::is_empty) {
            return Err(ConfigParseError::InvalidUri {
                id: definition.id.clone(),
                uri: definition.uri.clone(),
                reason: "missing host".to_string(),
            });
        }

        let with_id = |source| ConfigParseError::Component {
            id: definition.id.clone(),
            source,
        };
        let predicates = definition
            .predicates
            .iter()
            .map(matcher::compile)
            .collect::<Result<Vec<_>, _>>()
            .map_err(with_id)?;
        let filters = definition
            .filters
            .iter()
            .map(RouteFilter::compile)
            .collect::<Result<Vec<_>, _>>()
            .map_err(with_id)?;

        Ok(Self {
            predicate: AndMatcher::new(predicates),
            filters,
            target,
            definition,
        })
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn order(&self) -> i32 {
        self.definition.order
    }

    pub fn definition(&self) -> &RouteDefinition {
        &self.definition
    }

    pub fn matches(&self, req: &Request<Body>) -> bool {
        self.predicate.matches(req)
    }

    /// Rewrite the request URI and headers for the upstream target.
    ///
    /// Path filters run in definition order; the query string is preserved.
    pub fn upstream_request(&self, uri: &Uri, headers: &mut HeaderMap) -> Result<Uri, ForwardError> {
        if self.target.scheme() != "http" {
            return Err(ForwardError::UnsupportedScheme(self.target.scheme().to_string()));
        }

        let mut path = uri.path().to_string();
        for filter in &self.filters {
            filter.apply_request(&mut path, headers);
        }
        let path_and_query = match uri.query() {
            Some(query) => format!("{}?{}", path, query),
            None => path,
        };
        let authority = match self.target.port() {
            Some(port) => format!("{}:{}", self.target.host_str().unwrap_or_default(), port),
            None => self.target.host_str().unwrap_or_default().to_string(),
        };

        let uri = Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(authority)
            .path_and_query(path_and_query)
            .build()?;
        Ok(uri)
    }

    pub fn apply_response_filters(&self, headers: &mut HeaderMap) {
        for filter in &self.filters {
            filter.apply_response(headers);
        }
    }
}

/// Parse and compile a route payload. Any invalid route rejects the whole payload.
pub fn compile_payload(content: &str) -> Result<Vec<Route>, ConfigParseError> {
    parse_definitions(content)?
        .into_iter()
        .map(Route::compile)
        .collect()
}
