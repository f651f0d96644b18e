//! ROS 2 `.msg` definitions as a schema source.
//!
//! Definitions are found either on a search path laid out like an install
//! prefix (`<root>/share/<pkg>/msg/<Name>.msg` or `<root>/<pkg>/msg/<Name>.msg`)
//! or registered as text, including the concatenated form where dependent
//! definitions follow a `====` separator and a `MSG: pkg/Name` line.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{FieldKind, FieldLayout, ScalarKind, SchemaRegistry, StaticRegistry};
use crate::{Error, Result};

const MAX_NESTING: usize = 32;
const AMENT_PREFIX_PATH: &str = "AMENT_PREFIX_PATH";

#[derive(Debug, Clone, PartialEq, Eq)]
enum TypeRef {
    Scalar(ScalarKind),
    Named(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Single,
    Sequence(Option<usize>),
    Array(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldDecl {
    name: String,
    base: TypeRef,
    shape: Shape,
}

/// Registry resolving layouts from `.msg` definitions.
///
/// Builtin layouts (see [`StaticRegistry::with_builtins`]) take precedence,
/// then registered text, then the search path in order.
#[derive(Debug, Clone)]
pub struct MsgRegistry {
    search_paths: Vec<PathBuf>,
    definitions: HashMap<String, String>,
    builtins: StaticRegistry,
}

impl Default for MsgRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MsgRegistry {
    pub fn new() -> Self {
        Self {
            search_paths: Vec::new(),
            definitions: HashMap::new(),
            builtins: StaticRegistry::with_builtins(),
        }
    }

    /// Registry searching every prefix listed in `AMENT_PREFIX_PATH`.
    pub fn from_env() -> Self {
        let mut registry = Self::new();
        if let Some(prefixes) = std::env::var_os(AMENT_PREFIX_PATH) {
            for prefix in std::env::split_paths(&prefixes) {
                registry.add_search_path(prefix);
            }
        }
        registry
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.add_search_path(path);
        self
    }

    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Register definition text for `type_name`. Concatenated dependency
    /// blocks are split out and registered under their own names.
    pub fn add_definition(&mut self, type_name: &str, text: &str) {
        for (name, body) in split_definitions(&normalize_type_name(type_name, ""), text) {
            self.definitions.entry(name).or_insert(body);
        }
    }

    fn find_text(&self, type_name: &str) -> Result<Option<String>> {
        if let Some(text) = self.definitions.get(type_name) {
            return Ok(Some(text.clone()));
        }
        let (package, name) = split_type_name(type_name);
        for root in &self.search_paths {
            for candidate in [
                root.join("share").join(package).join("msg"),
                root.join(package).join("msg"),
            ] {
                let path = candidate.join(format!("{name}.msg"));
                if let Some(text) = read_optional(&path)? {
                    log::debug!("resolved {type_name} from {}", path.display());
                    return Ok(Some(text));
                }
            }
        }
        Ok(None)
    }

    /// Resolve `type_name`, reusing layouts already built in this pass.
    fn resolve_depth(
        &self,
        type_name: &str,
        depth: usize,
        resolved: &mut HashMap<String, Arc<FieldLayout>>,
    ) -> Result<Arc<FieldLayout>> {
        if let Some(layout) = resolved.get(type_name) {
            return Ok(Arc::clone(layout));
        }
        if depth > MAX_NESTING {
            return Err(Error::InvalidDefinition {
                type_name: type_name.to_string(),
                reason: format!("nesting deeper than {MAX_NESTING} levels"),
            });
        }
        if let Some(layout) = self.builtins.get(type_name) {
            return Ok(layout);
        }
        let text = self.find_text(type_name)?.ok_or_else(|| Error::UnknownType {
            type_name: type_name.to_string(),
        })?;
        let (package, _) = split_type_name(type_name);
        let decls = parse_definition(package, &text).map_err(|reason| Error::InvalidDefinition {
            type_name: type_name.to_string(),
            reason,
        })?;

        let mut layout = FieldLayout::new(type_name);
        for decl in decls {
            let element = match decl.base {
                TypeRef::Scalar(kind) => FieldKind::Scalar(kind),
                TypeRef::Named(nested) => {
                    FieldKind::Nested(self.resolve_depth(&nested, depth + 1, resolved)?)
                }
            };
            let kind = match decl.shape {
                Shape::Single => element,
                Shape::Sequence(None) => FieldKind::sequence(element),
                Shape::Sequence(Some(bound)) => FieldKind::bounded_sequence(element, bound),
                Shape::Array(len) => FieldKind::array(element, len),
            };
            layout = layout.field(decl.name, kind);
        }
        let layout = Arc::new(layout);
        resolved.insert(type_name.to_string(), Arc::clone(&layout));
        Ok(layout)
    }
}

impl SchemaRegistry for MsgRegistry {
    fn resolve(&self, type_name: &str) -> Result<Arc<FieldLayout>> {
        self.resolve_depth(&normalize_type_name(type_name, ""), 0, &mut HashMap::new())
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// `pkg/msg/Name` -> (`pkg`, `Name`).
fn split_type_name(type_name: &str) -> (&str, &str) {
    let package = type_name.split('/').next().unwrap_or_default();
    let name = type_name.rsplit('/').next().unwrap_or(type_name);
    (package, name)
}

/// Expand `pkg/Name` and bare `Name` references to `pkg/msg/Name`.
fn normalize_type_name(raw: &str, package: &str) -> String {
    let parts: Vec<&str> = raw.split('/').collect();
    match parts.as_slice() {
        [name] => match *name {
            "Header" => "std_msgs/msg/Header".to_string(),
            "time" => "builtin_interfaces/msg/Time".to_string(),
            "duration" => "builtin_interfaces/msg/Duration".to_string(),
            _ => format!("{package}/msg/{name}"),
        },
        [pkg, name] => format!("{pkg}/msg/{name}"),
        _ => raw.to_string(),
    }
}

fn split_definitions(root: &str, text: &str) -> Vec<(String, String)> {
    let mut blocks = Vec::new();
    let mut current = root.to_string();
    let mut body = String::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.len() >= 3 && trimmed.chars().all(|c| c == '=') {
            blocks.push((std::mem::take(&mut current), std::mem::take(&mut body)));
            continue;
        }
        if let Some(name) = trimmed.strip_prefix("MSG:") {
            current = normalize_type_name(name.trim(), "");
            continue;
        }
        body.push_str(line);
        body.push('\n');
    }
    blocks.push((current, body));
    blocks.retain(|(name, _)| !name.is_empty());
    blocks
}

fn strip_comment(line: &str) -> &str {
    let mut quote = None;
    for (idx, ch) in line.char_indices() {
        match (quote, ch) {
            (None, '#') => return &line[..idx],
            (None, '"' | '\'') => quote = Some(ch),
            (Some(open), c) if c == open => quote = None,
            _ => {}
        }
    }
    line
}

fn parse_definition(package: &str, text: &str) -> std::result::Result<Vec<FieldDecl>, String> {
    let mut fields = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        let (type_token, rest) = line
            .split_once(char::is_whitespace)
            .ok_or_else(|| format!("line {}: missing field name", lineno + 1))?;
        let rest = rest.trim_start();
        let name_end = rest
            .find(|c: char| c.is_whitespace() || c == '=')
            .unwrap_or(rest.len());
        let name = &rest[..name_end];
        if rest[name_end..].trim_start().starts_with('=') {
            // constant
            continue;
        }
        if !is_identifier(name) {
            return Err(format!("line {}: invalid field name {name:?}", lineno + 1));
        }
        let (base, shape) =
            parse_type_token(type_token, package).map_err(|e| format!("line {}: {e}", lineno + 1))?;
        fields.push(FieldDecl {
            name: name.to_string(),
            base,
            shape,
        });
    }
    Ok(fields)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_type_token(token: &str, package: &str) -> std::result::Result<(TypeRef, Shape), String> {
    let (base, shape) = match token.find('[') {
        Some(open) => {
            let inner = token[open + 1..]
                .strip_suffix(']')
                .ok_or_else(|| format!("unterminated array type {token:?}"))?;
            let shape = if inner.is_empty() {
                Shape::Sequence(None)
            } else if let Some(bound) = inner.strip_prefix("<=") {
                Shape::Sequence(Some(parse_len(bound, token)?))
            } else {
                Shape::Array(parse_len(inner, token)?)
            };
            (&token[..open], shape)
        }
        None => (token, Shape::Single),
    };
    // string<=N carries its bound in the type; the wire form is unchanged.
    let base = match base.split_once("<=") {
        Some((prefix @ ("string" | "wstring"), bound)) => {
            parse_len(bound, token)?;
            prefix
        }
        Some(_) => return Err(format!("bound on non-string type {token:?}")),
        None => base,
    };
    if base.is_empty() {
        return Err(format!("empty type in {token:?}"));
    }
    let base = match ScalarKind::from_name(base) {
        Some(kind) => TypeRef::Scalar(kind),
        None => TypeRef::Named(normalize_type_name(base, package)),
    };
    Ok((base, shape))
}

fn parse_len(text: &str, token: &str) -> std::result::Result<usize, String> {
    text.trim()
        .parse()
        .map_err(|_| format!("invalid length in {token:?}"))
}
