//! SPA route table
//!
//! Maps navigated URL paths to the page view the single-page app mounts for
//! them. Two tables exist: the original flat table and the nested table that
//! moves the legacy pages under `/test` behind a shared layout. Exactly one is
//! active per process, selected by [`RouteScheme`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Which route table is authoritative for this deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteScheme {
    /// `/`, `/tasks`, `/builder`, `/runner/:taskId?`
    #[default]
    Flat,
    /// New dashboard at `/`, legacy pages under `/test/*`
    Nested,
}

impl RouteScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteScheme::Flat => "flat",
            RouteScheme::Nested => "nested",
        }
    }
}

impl fmt::Display for RouteScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(RouteScheme::Flat),
            "nested" => Ok(RouteScheme::Nested),
            other => Err(Error::InvalidConfig(format!(
                "unknown router scheme '{}' (expected flat or nested)",
                other
            ))),
        }
    }
}

/// Page-level views the SPA can mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum View {
    Home,
    TaskList,
    TaskBuilder,
    AutomationRunner,
    Dashboard,
    LegacyLayout,
    VncTest,
}

impl View {
    pub fn as_str(&self) -> &'static str {
        match self {
            View::Home => "Home",
            View::TaskList => "TaskList",
            View::TaskBuilder => "TaskBuilder",
            View::AutomationRunner => "AutomationRunner",
            View::Dashboard => "Dashboard",
            View::LegacyLayout => "LegacyLayout",
            View::VncTest => "VncTest",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared route, possibly wrapping nested children
#[derive(Debug, Clone)]
pub struct RouteRecord {
    path: String,
    name: Option<String>,
    component: View,
    props: bool,
    children: Vec<RouteRecord>,
}

impl RouteRecord {
    /// Create a record binding `path` to `component`
    pub fn new(path: &str, component: View) -> Self {
        Self {
            path: path.to_string(),
            name: None,
            component,
            props: false,
            children: Vec::new(),
        }
    }

    /// Set the route name
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Forward dynamic segments to the component as props
    pub fn with_props(mut self) -> Self {
        self.props = true;
        self
    }

    /// Nest child routes; the record then acts as a layout wrapper
    pub fn with_children(mut self, children: Vec<RouteRecord>) -> Self {
        self.children = children;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param { name: String, optional: bool },
}

/// A leaf route with its layout chain flattened in
#[derive(Debug, Clone)]
struct CompiledRoute {
    full_path: String,
    name: Option<String>,
    component: View,
    layouts: Vec<View>,
    props: bool,
    segments: Vec<Segment>,
}

/// Listing entry for a leaf route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteEntry {
    pub path: String,
    pub name: Option<String>,
    pub component: View,
    pub layouts: Vec<View>,
    pub props: bool,
}

/// Result of resolving a path against the table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteMatch {
    /// Name of the matched leaf route
    pub name: Option<String>,
    /// Declared pattern of the leaf, parents included
    pub path: String,
    /// Component mounted for the leaf
    pub component: View,
    /// Layout wrappers, outermost first
    pub layouts: Vec<View>,
    /// Decoded dynamic segments present in the path
    pub params: BTreeMap<String, String>,
    /// Inputs handed to the component; empty unless the route forwards props
    pub props: BTreeMap<String, String>,
}

/// Compiled route table
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Compile a table, validating patterns and name uniqueness
    pub fn new(records: Vec<RouteRecord>) -> Result<Self> {
        let mut routes = Vec::new();
        let mut names = HashSet::new();
        for record in &records {
            compile_record(record, "", &[], &[], &mut names, &mut routes)?;
        }
        Ok(Self { routes })
    }

    /// The original flat table
    pub fn flat() -> Self {
        Self::new(vec![
            RouteRecord::new("/", View::Home).named("Home"),
            RouteRecord::new("/tasks", View::TaskList).named("Tasks"),
            RouteRecord::new("/builder", View::TaskBuilder).named("Builder"),
            RouteRecord::new("/runner/:taskId?", View::AutomationRunner)
                .named("Runner")
                .with_props(),
        ])
        .expect("built-in flat route table is valid")
    }

    /// The nested table: new dashboard at `/`, legacy pages under `/test`
    pub fn nested() -> Self {
        Self::new(vec![
            RouteRecord::new("/", View::Dashboard).named("Dashboard"),
            RouteRecord::new("/test", View::LegacyLayout).with_children(vec![
                RouteRecord::new("", View::Home).named("Home"),
                RouteRecord::new("tasks", View::TaskList).named("Tasks"),
                RouteRecord::new("builder", View::TaskBuilder).named("Builder"),
                RouteRecord::new("runner/:taskId?", View::AutomationRunner)
                    .named("Runner")
                    .with_props(),
                RouteRecord::new("vnc", View::VncTest).named("VncTest"),
            ]),
        ])
        .expect("built-in nested route table is valid")
    }

    /// Built-in table for a scheme
    pub fn for_scheme(scheme: RouteScheme) -> Self {
        match scheme {
            RouteScheme::Flat => Self::flat(),
            RouteScheme::Nested => Self::nested(),
        }
    }

    /// Resolve a navigated path to exactly one leaf route
    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        let parts = split_path(path);
        for route in &self.routes {
            let mut params = Vec::new();
            if match_segments(&route.segments, &parts, &mut params) {
                let params: BTreeMap<String, String> = params.into_iter().collect();
                let props = if route.props {
                    params.clone()
                } else {
                    BTreeMap::new()
                };
                return Some(RouteMatch {
                    name: route.name.clone(),
                    path: route.full_path.clone(),
                    component: route.component,
                    layouts: route.layouts.clone(),
                    params,
                    props,
                });
            }
        }
        None
    }

    /// Build the concrete path for a named route
    pub fn href(&self, name: &str, params: &BTreeMap<String, String>) -> Result<String> {
        let route = self
            .routes
            .iter()
            .find(|r| r.name.as_deref() == Some(name))
            .ok_or_else(|| Error::UnknownRoute(name.to_string()))?;

        let mut out = String::new();
        for segment in &route.segments {
            match segment {
                Segment::Static(s) => {
                    out.push('/');
                    out.push_str(s);
                }
                Segment::Param { name: param, optional } => match params.get(param) {
                    Some(value) if !value.is_empty() => {
                        out.push('/');
                        out.push_str(&urlencoding::encode(value));
                    }
                    _ if *optional => {}
                    _ => {
                        return Err(Error::MissingRouteParam {
                            route: name.to_string(),
                            param: param.clone(),
                        })
                    }
                },
            }
        }

        if out.is_empty() {
            out.push('/');
        }
        Ok(out)
    }

    /// Flattened leaf listing in match order
    pub fn entries(&self) -> Vec<RouteEntry> {
        self.routes
            .iter()
            .map(|r| RouteEntry {
                path: r.full_path.clone(),
                name: r.name.clone(),
                component: r.component,
                layouts: r.layouts.clone(),
                props: r.props,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn compile_record(
    record: &RouteRecord,
    parent_path: &str,
    parent_segments: &[Segment],
    layouts: &[View],
    names: &mut HashSet<String>,
    out: &mut Vec<CompiledRoute>,
) -> Result<()> {
    if let Some(name) = &record.name {
        if !names.insert(name.clone()) {
            return Err(Error::DuplicateRouteName(name.clone()));
        }
    }

    // Absolute child paths do not inherit the parent prefix.
    let (full_path, mut segments) = if record.path.starts_with('/') || parent_path.is_empty() {
        (normalize_pattern(&record.path), Vec::new())
    } else {
        (
            join_pattern(parent_path, &record.path),
            parent_segments.to_vec(),
        )
    };
    segments.extend(parse_pattern(&record.path)?);

    let mut seen = HashSet::new();
    for segment in &segments {
        if let Segment::Param { name, .. } = segment {
            if !seen.insert(name.as_str()) {
                return Err(Error::InvalidRoutePattern {
                    pattern: full_path.clone(),
                    reason: format!("param '{}' declared twice", name),
                });
            }
        }
    }

    if record.children.is_empty() {
        out.push(CompiledRoute {
            full_path,
            name: record.name.clone(),
            component: record.component,
            layouts: layouts.to_vec(),
            props: record.props,
            segments,
        });
        return Ok(());
    }

    let mut child_layouts = layouts.to_vec();
    child_layouts.push(record.component);
    for child in &record.children {
        compile_record(child, &full_path, &segments, &child_layouts, names, out)?;
    }
    Ok(())
}

fn parse_pattern(pattern: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    for part in pattern.split('/').filter(|p| !p.is_empty()) {
        if let Some(param) = part.strip_prefix(':') {
            let (name, optional) = match param.strip_suffix('?') {
                Some(name) => (name, true),
                None => (param, false),
            };
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(Error::InvalidRoutePattern {
                    pattern: pattern.to_string(),
                    reason: format!("bad param name in segment '{}'", part),
                });
            }
            segments.push(Segment::Param {
                name: name.to_string(),
                optional,
            });
        } else if part.contains('?') || part.contains(':') {
            return Err(Error::InvalidRoutePattern {
                pattern: pattern.to_string(),
                reason: format!("static segment '{}' contains a param marker", part),
            });
        } else {
            segments.push(Segment::Static(part.to_string()));
        }
    }
    Ok(segments)
}

fn normalize_pattern(pattern: &str) -> String {
    let trimmed = pattern.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn join_pattern(parent: &str, child: &str) -> String {
    let child = child.trim_matches('/');
    if child.is_empty() {
        normalize_pattern(parent)
    } else {
        normalize_pattern(&format!("{}/{}", parent.trim_end_matches('/'), child))
    }
}

/// Split a request path into segments, ignoring query, fragment and empty parts
fn split_path(path: &str) -> Vec<&str> {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    path[..end].split('/').filter(|p| !p.is_empty()).collect()
}

fn match_segments(pattern: &[Segment], parts: &[&str], params: &mut Vec<(String, String)>) -> bool {
    let Some((first, rest)) = pattern.split_first() else {
        return parts.is_empty();
    };

    match first {
        Segment::Static(s) => match parts.split_first() {
            Some((part, remaining)) if part.eq_ignore_ascii_case(s) => {
                match_segments(rest, remaining, params)
            }
            _ => false,
        },
        Segment::Param { name, optional } => {
            if let Some((part, remaining)) = parts.split_first() {
                params.push((name.clone(), decode_segment(part)));
                if match_segments(rest, remaining, params) {
                    return true;
                }
                params.pop();
            }
            *optional && match_segments(rest, parts, params)
        }
    }
}

fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}
