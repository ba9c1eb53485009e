//! Shared route table built from plugin contributions

use std::collections::HashMap;
use std::path::PathBuf;

use axum::http::Method;
use serde::Serialize;

use super::manifest::{PublicHandler, RouteHandler, StaticFolder};
use crate::{Error, Result};

/// Path prefix owned by the host's generic REST entry point
pub const RESERVED_PREFIX: &str = "/restapi";

/// Prefixes under which the host mounts its own routers
pub const HOST_PREFIXES: &[&str] = &[RESERVED_PREFIX, "/api"];

/// Exact paths served by the host
pub const HOST_PATHS: &[&str] = &["/health", "/ready"];

/// Owner recorded for routes the host reserves
pub const HOST_OWNER: &str = "host";

/// Values captured from `{name}` segments, inserted as a request extension
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams(pub HashMap<String, String>);

impl RouteParams {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Parsed route path
#[derive(Debug, Clone)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    #[must_use]
    pub fn parse(path: &str) -> Self {
        let segments = split(path)
            .map(|seg| {
                seg.strip_prefix('{')
                    .and_then(|s| s.strip_suffix('}'))
                    .map_or_else(
                        || Segment::Literal(seg.to_string()),
                        |name| Segment::Param(name.to_string()),
                    )
            })
            .collect();
        Self {
            raw: path.to_string(),
            segments,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Shape used for conflict detection; parameter names are erased
    #[must_use]
    pub fn normalized(&self) -> String {
        let mut out = String::new();
        for seg in &self.segments {
            out.push('/');
            match seg {
                Segment::Literal(s) => out.push_str(s),
                Segment::Param(_) => out.push_str("{}"),
            }
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    }

    /// Match a request path, returning captured parameters
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = split(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = HashMap::new();
        for (seg, part) in self.segments.iter().zip(parts) {
            match seg {
                Segment::Literal(s) if s == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(params)
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Whether the host router would answer `path` before the plugin fallback
fn is_reserved(path: &str) -> bool {
    let segments: Vec<&str> = split(path).collect();
    let Some(&first) = segments.first() else {
        return false;
    };
    HOST_PREFIXES.iter().any(|p| p.strip_prefix('/') == Some(first))
        || (segments.len() == 1 && HOST_PATHS.iter().any(|p| p.strip_prefix('/') == Some(first)))
}

/// Normalize a mount prefix to `/a/b` form
fn normalize_prefix(path: &str) -> String {
    let joined: Vec<&str> = split(path).collect();
    format!("/{}", joined.join("/"))
}

/// Public description of a merged route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub method: String,
    pub path: String,
    pub owner: String,
}

/// Public description of a static mount
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountInfo {
    pub path: String,
    pub folder: PathBuf,
    pub owner: String,
}

/// A route matched for an incoming request
#[derive(Clone)]
pub struct RouteMatch {
    pub owner: String,
    pub handler: RouteHandler,
    pub params: RouteParams,
}

/// A static mount matched for an incoming request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountMatch {
    pub owner: String,
    pub folder: PathBuf,
    /// Request path with the mount prefix stripped, always starting with `/`
    pub rest: String,
}

struct RouteEntry {
    method: Method,
    pattern: RoutePattern,
    owner: String,
    handler: RouteHandler,
}

struct MountEntry {
    prefix: String,
    folder: PathBuf,
    owner: String,
}

/// Routes and static mounts, in merge order
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<RouteEntry>,
    mounts: Vec<MountEntry>,
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one handler; the first registrant of a method and path wins
    ///
    /// # Errors
    ///
    /// Returns [`Error::RouteConflict`] naming both contenders
    pub fn insert_route(&mut self, owner: &str, handler: &PublicHandler) -> Result<()> {
        let pattern = RoutePattern::parse(&handler.path);
        let conflict = |holder: &str| Error::RouteConflict {
            method: handler.method.to_string(),
            path: handler.path.clone(),
            owner: holder.to_string(),
            contender: owner.to_string(),
        };

        if is_reserved(&handler.path) {
            return Err(conflict(HOST_OWNER));
        }

        let shape = pattern.normalized();
        if let Some(existing) = self
            .routes
            .iter()
            .find(|r| r.method == handler.method && r.pattern.normalized() == shape)
        {
            return Err(conflict(&existing.owner));
        }

        self.routes.push(RouteEntry {
            method: handler.method.clone(),
            pattern,
            owner: owner.to_string(),
            handler: handler.handler.clone(),
        });
        Ok(())
    }

    /// Mount a static folder; duplicate prefixes are rejected
    ///
    /// # Errors
    ///
    /// Returns [`Error::RouteConflict`] naming both contenders
    pub fn insert_mount(&mut self, owner: &str, folder: &StaticFolder) -> Result<()> {
        let prefix = normalize_prefix(&folder.path);
        let conflict = |holder: &str| Error::RouteConflict {
            method: "STATIC".to_string(),
            path: prefix.clone(),
            owner: holder.to_string(),
            contender: owner.to_string(),
        };

        if is_reserved(&prefix) {
            return Err(conflict(HOST_OWNER));
        }
        if let Some(existing) = self.mounts.iter().find(|m| m.prefix == prefix) {
            return Err(conflict(&existing.owner));
        }

        self.mounts.push(MountEntry {
            prefix,
            folder: folder.static_folder.clone(),
            owner: owner.to_string(),
        });
        Ok(())
    }

    /// Drop every route and mount contributed by `owner`
    pub fn remove_owner(&mut self, owner: &str) -> usize {
        let before = self.routes.len() + self.mounts.len();
        self.routes.retain(|r| r.owner != owner);
        self.mounts.retain(|m| m.owner != owner);
        before - self.routes.len() - self.mounts.len()
    }

    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.routes
            .iter()
            .filter(|r| &r.method == method)
            .find_map(|r| {
                r.pattern.matches(path).map(|params| RouteMatch {
                    owner: r.owner.clone(),
                    handler: r.handler.clone(),
                    params: RouteParams(params),
                })
            })
    }

    /// Longest mount prefix containing `path`
    #[must_use]
    pub fn match_mount(&self, path: &str) -> Option<MountMatch> {
        let request = normalize_prefix(path);
        self.mounts
            .iter()
            .filter_map(|m| {
                let rest = if m.prefix == "/" {
                    request.as_str()
                } else {
                    request.strip_prefix(&m.prefix)?
                };
                (rest.is_empty() || rest.starts_with('/')).then(|| (m, rest))
            })
            .max_by_key(|(m, _)| m.prefix.len())
            .map(|(m, rest)| MountMatch {
                owner: m.owner.clone(),
                folder: m.folder.clone(),
                rest: if rest.is_empty() {
                    "/".to_string()
                } else {
                    rest.to_string()
                },
            })
    }

    #[must_use]
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.routes
            .iter()
            .map(|r| RouteInfo {
                method: r.method.to_string(),
                path: r.pattern.as_str().to_string(),
                owner: r.owner.clone(),
            })
            .collect()
    }

    #[must_use]
    pub fn mounts(&self) -> Vec<MountInfo> {
        self.mounts
            .iter()
            .map(|m| MountInfo {
                path: m.prefix.clone(),
                folder: m.folder.clone(),
                owner: m.owner.clone(),
            })
            .collect()
    }
}
