//! Named routes, forward resolution and reverse URL generation.
//!
//! Report buttons link to pages of the host application by route name, so
//! the host registers its named routes in a [`UrlRouter`]. Routes use the
//! `path()` template syntax: literal segments plus `<name>` or
//! `<type:name>` placeholders, where `type` is one of `int`, `str`, `slug`,
//! `uuid` or `path`. Each template compiles to an anchored regex with one
//! named group per placeholder.
//!
//! ```
//! use std::collections::HashMap;
//! use flex_report_http::urls::UrlRouter;
//!
//! let mut router = UrlRouter::new();
//! router.add("order-detail", "orders/<int:pk>/").unwrap();
//!
//! let m = router.resolve("/orders/42/").unwrap();
//! assert_eq!(m.url_name.as_deref(), Some("order-detail"));
//! assert_eq!(m.kwargs["pk"], "42");
//!
//! let kwargs = HashMap::from([("pk".to_string(), "42".to_string())]);
//! assert_eq!(router.reverse("order-detail", &kwargs).unwrap(), "/orders/42/");
//! ```

use std::collections::HashMap;
use std::fmt::Write as _;

use flex_report_core::{ReportError, ReportResult};
use regex::Regex;

/// The result of resolving a request path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverMatch {
    /// Named keyword arguments extracted from the path.
    pub kwargs: HashMap<String, String>,
    /// The name of the matched route, if any.
    pub url_name: Option<String>,
    /// The matched route template.
    pub route: String,
}

impl ResolverMatch {
    /// Creates a match carrying only a route name.
    pub fn named(url_name: impl Into<String>) -> Self {
        Self {
            url_name: Some(url_name.into()),
            ..Self::default()
        }
    }

    /// Returns the name used to look up views for this match.
    pub fn view_name(&self) -> &str {
        self.url_name.as_deref().unwrap_or(&self.route)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Converter {
    Int,
    Str,
    Slug,
    Uuid,
    Path,
}

impl Converter {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(Self::Int),
            "str" => Some(Self::Str),
            "slug" => Some(Self::Slug),
            "uuid" => Some(Self::Uuid),
            "path" => Some(Self::Path),
            _ => None,
        }
    }

    /// The pattern a path value must match.
    const fn regex(self) -> &'static str {
        match self {
            Self::Int => "[0-9]+",
            Self::Str => "[^/]+",
            Self::Slug => "[-a-zA-Z0-9_]+",
            Self::Uuid => "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}",
            Self::Path => ".+",
        }
    }

    fn anchored(self) -> ReportResult<Regex> {
        Regex::new(&format!("^(?:{})$", self.regex()))
            .map_err(|e| ReportError::ImproperlyConfigured(format!("Invalid converter pattern: {e}")))
    }
}

#[derive(Debug, Clone)]
enum Piece {
    Literal(String),
    Param { name: String, accepts: Regex },
}

#[derive(Debug, Clone)]
struct Route {
    name: String,
    template: String,
    regex: Regex,
    pieces: Vec<Piece>,
}

impl Route {
    fn takes(&self, key: &str) -> bool {
        self.pieces
            .iter()
            .any(|p| matches!(p, Piece::Param { name, .. } if name == key))
    }
}

fn unopened(template: &str) -> ReportError {
    ReportError::ImproperlyConfigured(format!("Unopened angle bracket in route template: {template}"))
}

/// Splits a route template into literal text and `<type:name>`
/// placeholders, and compiles the anchored regex that matches it.
fn parse_route(template: &str) -> ReportResult<(Regex, Vec<Piece>)> {
    let mut pattern = String::from("^");
    let mut pieces = Vec::new();
    let mut remaining = template.trim_start_matches('/');

    while !remaining.is_empty() {
        let Some(start) = remaining.find('<') else {
            if remaining.contains('>') {
                return Err(unopened(template));
            }
            pattern.push_str(&regex::escape(remaining));
            pieces.push(Piece::Literal(remaining.to_string()));
            break;
        };
        let prefix = &remaining[..start];
        if prefix.contains('>') {
            return Err(unopened(template));
        }
        pattern.push_str(&regex::escape(prefix));
        pieces.push(Piece::Literal(prefix.to_string()));

        let end = remaining[start..].find('>').ok_or_else(|| {
            ReportError::ImproperlyConfigured(format!("Unclosed angle bracket in route template: {template}"))
        })? + start;
        let inner = &remaining[start + 1..end];
        let (kind, name) = inner.split_once(':').unwrap_or(("str", inner));
        let converter = Converter::from_name(kind).ok_or_else(|| {
            ReportError::ImproperlyConfigured(format!("Unknown path converter '{kind}' in route '{template}'"))
        })?;
        write!(pattern, "(?P<{name}>{})", converter.regex()).ok();
        pieces.push(Piece::Param {
            name: name.to_string(),
            accepts: converter.anchored()?,
        });
        remaining = &remaining[end + 1..];
    }
    pattern.push('$');

    let regex = Regex::new(&pattern)
        .map_err(|e| ReportError::ImproperlyConfigured(format!("Invalid route '{template}': {e}")))?;
    Ok((regex, pieces))
}

/// A table of named routes.
#[derive(Debug, Clone, Default)]
pub struct UrlRouter {
    routes: Vec<Route>,
}

impl UrlRouter {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a named route.
    ///
    /// # Errors
    ///
    /// Returns `ImproperlyConfigured` for malformed templates.
    pub fn add(&mut self, name: impl Into<String>, template: &str) -> ReportResult<()> {
        let (regex, pieces) = parse_route(template)?;
        let name = name.into();
        tracing::trace!(route = %name, regex = regex.as_str(), "registered route");
        self.routes.push(Route {
            name,
            template: template.to_string(),
            regex,
            pieces,
        });
        Ok(())
    }

    /// Returns `true` if a route with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.routes.iter().any(|r| r.name == name)
    }

    /// Resolves a request path against the registered routes.
    ///
    /// The leading `/` is ignored and the rest must match a route in full.
    /// The first matching route wins.
    pub fn resolve(&self, path: &str) -> Option<ResolverMatch> {
        let path = path.strip_prefix('/').unwrap_or(path);
        self.routes.iter().find_map(|route| {
            let captures = route.regex.captures(path)?;
            let kwargs = route
                .regex
                .capture_names()
                .flatten()
                .filter_map(|name| Some((name.to_string(), captures.name(name)?.as_str().to_string())))
                .collect();
            Some(ResolverMatch {
                kwargs,
                url_name: Some(route.name.clone()),
                route: route.template.clone(),
            })
        })
    }

    /// Generates the path of a named route.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no route has this name, if a placeholder has no
    /// value or a value its converter rejects, or if `kwargs` names something
    /// the route does not take.
    pub fn reverse<S: std::hash::BuildHasher>(
        &self,
        name: &str,
        kwargs: &HashMap<String, String, S>,
    ) -> ReportResult<String> {
        let route = self
            .routes
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| ReportError::NotFound(format!("Reverse for '{name}' not found")))?;
        if let Some(extra) = kwargs.keys().find(|k| !route.takes(k)) {
            return Err(ReportError::NotFound(format!(
                "Reverse for '{name}' does not take the argument '{extra}'"
            )));
        }

        let mut url = String::from("/");
        for piece in &route.pieces {
            match piece {
                Piece::Literal(lit) => url.push_str(lit),
                Piece::Param { name: param, accepts } => {
                    let value = kwargs.get(param).filter(|v| accepts.is_match(v)).ok_or_else(|| {
                        ReportError::NotFound(format!(
                            "Reverse for '{name}' with arguments {kwargs:?} not found",
                            kwargs = kwargs.keys().collect::<Vec<_>>()
                        ))
                    })?;
                    url.push_str(value);
                }
            }
        }
        Ok(url)
    }
}
