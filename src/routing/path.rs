//! Path template compilation.
//!
//! # Responsibilities
//! - Parse `{name}`, `{name:regex}`, `{name?}` and legacy `:name` / `:name?` placeholders
//! - Produce one anchored regex plus the ordered parameter names
//! - Let per-parameter constraints (`where`) override inline ones
//! - Generate URLs back from a template
//!
//! # Design Decisions
//! - Optional parameters own their leading separator: `/x/{y?}` matches `/x` and `/x/5`
//! - Optional parameters must occupy a whole segment
//! - Paths are matched without their trailing slash, so the root `/` is matched
//!   as the empty string and `^$` is its exact-match pattern
//! - Placeholder braces nest, so `{year:\d{4}}` keeps its quantifier

use std::collections::HashMap;

use regex::Regex;
use serde_json::{Map, Value};

use crate::routing::error::RouteError;

/// Constraint applied to parameters without an explicit pattern.
pub const DEFAULT_CONSTRAINT: &str = "[^/]+";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Param {
        name: String,
        pattern: Option<String>,
        optional: bool,
    },
}

type Segment = Vec<Piece>;

/// A route template compiled into a matcher.
#[derive(Debug, Clone)]
pub struct CompiledPath {
    template: String,
    regex: Regex,
    params: Vec<String>,
    constraints: HashMap<String, String>,
    segments: Vec<Segment>,
}

impl CompiledPath {
    /// Compile `template`. Entries in `wheres` take precedence over inline constraints.
    pub fn compile(
        template: &str,
        wheres: &HashMap<String, String>,
    ) -> Result<Self, RouteError> {
        let template = normalize_path(template);
        let segments = split_segments(&template)
            .into_iter()
            .map(|raw| parse_segment(&template, raw))
            .collect::<Result<Vec<_>, _>>()?;

        let mut params = Vec::new();
        let mut constraints = HashMap::new();
        let mut pattern = String::from("^");

        for segment in &segments {
            if let [Piece::Param {
                name,
                pattern: inline,
                optional: true,
            }] = segment.as_slice()
            {
                let constraint = resolve_constraint(name, inline.as_deref(), wheres);
                pattern.push_str(&format!("(?:/(?P<{name}>{constraint}))?"));
                register(&template, name, constraint, &mut params, &mut constraints)?;
                continue;
            }

            pattern.push('/');
            for piece in segment {
                match piece {
                    Piece::Literal(text) => pattern.push_str(&regex::escape(text)),
                    Piece::Param {
                        name,
                        pattern: inline,
                        ..
                    } => {
                        let constraint = resolve_constraint(name, inline.as_deref(), wheres);
                        pattern.push_str(&format!("(?P<{name}>{constraint})"));
                        register(&template, name, constraint, &mut params, &mut constraints)?;
                    }
                }
            }
        }
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|source| RouteError::InvalidPattern {
            template: template.clone(),
            source,
        })?;

        Ok(Self {
            template,
            regex,
            params,
            constraints,
            segments,
        })
    }

    /// The normalized template this matcher was built from.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The compiled regular expression.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Parameter names in template order.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Effective constraint per parameter.
    pub fn constraints(&self) -> &HashMap<String, String> {
        &self.constraints
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(&match_key(path))
    }

    /// Extract parameters from `path`. Absent optional parameters yield `None`.
    pub fn captures(&self, path: &str) -> Option<Vec<(String, Option<String>)>> {
        let key = match_key(path);
        let caps = self.regex.captures(&key)?;
        Some(
            self.params
                .iter()
                .map(|name| (name.clone(), caps.name(name).map(|m| m.as_str().to_string())))
                .collect(),
        )
    }

    /// Build a concrete path by substituting `values` into the template.
    pub fn url(&self, values: &Map<String, Value>) -> Result<String, RouteError> {
        let mut out = String::new();

        for segment in &self.segments {
            if let [Piece::Param {
                name,
                optional: true,
                ..
            }] = segment.as_slice()
            {
                if let Some(value) = lookup(values, name) {
                    self.check(name, &value)?;
                    out.push('/');
                    out.push_str(&value);
                }
                continue;
            }

            out.push('/');
            for piece in segment {
                match piece {
                    Piece::Literal(text) => out.push_str(text),
                    Piece::Param { name, .. } => {
                        let value = lookup(values, name).ok_or_else(|| RouteError::MissingParam {
                            route: self.template.clone(),
                            param: name.clone(),
                        })?;
                        self.check(name, &value)?;
                        out.push_str(&value);
                    }
                }
            }
        }

        if out.is_empty() {
            out.push('/');
        }
        Ok(out)
    }

    // The value must satisfy the parameter's constraint on its own, anchored.
    fn check(&self, name: &str, value: &str) -> Result<(), RouteError> {
        let constraint = self
            .constraints
            .get(name)
            .map_or(DEFAULT_CONSTRAINT, String::as_str);
        let anchored = Regex::new(&format!("^(?:{constraint})$")).map_err(|source| {
            RouteError::InvalidPattern {
                template: self.template.clone(),
                source,
            }
        })?;
        if anchored.is_match(value) {
            Ok(())
        } else {
            Err(RouteError::ConstraintViolation {
                route: self.template.clone(),
                param: name.to_string(),
                value: value.to_string(),
            })
        }
    }
}

/// Normalize a path: leading slash, no trailing slash (except for the root).
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn match_key(path: &str) -> String {
    let normalized = normalize_path(path);
    if normalized == "/" {
        String::new()
    } else {
        normalized
    }
}

fn lookup(values: &Map<String, Value>, name: &str) -> Option<String> {
    match values.get(name)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn resolve_constraint<'a>(
    name: &str,
    inline: Option<&'a str>,
    wheres: &'a HashMap<String, String>,
) -> &'a str {
    wheres
        .get(name)
        .map(String::as_str)
        .or(inline)
        .unwrap_or(DEFAULT_CONSTRAINT)
}

fn register(
    template: &str,
    name: &str,
    constraint: &str,
    params: &mut Vec<String>,
    constraints: &mut HashMap<String, String>,
) -> Result<(), RouteError> {
    if params.iter().any(|p| p == name) {
        return Err(RouteError::DuplicateParam {
            name: name.to_string(),
            template: template.to_string(),
        });
    }
    params.push(name.to_string());
    constraints.insert(name.to_string(), constraint.to_string());
    Ok(())
}

/// Split on `/` outside of placeholder braces, dropping empty segments.
fn split_segments(template: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, b) in template.bytes().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b'/' if depth == 0 => {
                if i > start {
                    segments.push(&template[start..i]);
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < template.len() {
        segments.push(&template[start..]);
    }
    segments
}

fn parse_segment(template: &str, raw: &str) -> Result<Segment, RouteError> {
    // Legacy `:name` / `:name?` syntax always spans the whole segment.
    if let Some(rest) = raw.strip_prefix(':') {
        let (name, optional) = match rest.strip_suffix('?') {
            Some(name) => (name, true),
            None => (rest, false),
        };
        validate_name(name)?;
        return Ok(vec![Piece::Param {
            name: name.to_string(),
            pattern: None,
            optional,
        }]);
    }

    let chars: Vec<char> = raw.chars().collect();
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '{' => {
                let start = i + 1;
                let mut depth = 1;
                let mut end = start;
                while end < chars.len() {
                    match chars[end] {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    end += 1;
                }
                if depth != 0 {
                    return Err(invalid(template, "unclosed `{`"));
                }
                if !literal.is_empty() {
                    pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                }
                let inner: String = chars[start..end].iter().collect();
                pieces.push(parse_placeholder(template, &inner)?);
                i = end + 1;
            }
            '}' => return Err(invalid(template, "unmatched `}`")),
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }
    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }

    let has_optional = pieces
        .iter()
        .any(|p| matches!(p, Piece::Param { optional: true, .. }));
    if has_optional && pieces.len() > 1 {
        return Err(invalid(
            template,
            "optional parameters must occupy a whole segment",
        ));
    }
    Ok(pieces)
}

fn parse_placeholder(template: &str, inner: &str) -> Result<Piece, RouteError> {
    let (head, pattern) = match inner.split_once(':') {
        Some((_, "")) => return Err(invalid(template, "empty parameter constraint")),
        Some((name, pattern)) => (name, Some(pattern.to_string())),
        None => (inner, None),
    };
    let (name, optional) = match head.strip_suffix('?') {
        Some(name) => (name, true),
        None => (head, false),
    };
    validate_name(name)?;
    Ok(Piece::Param {
        name: name.to_string(),
        pattern,
        optional,
    })
}

fn validate_name(name: &str) -> Result<(), RouteError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(RouteError::InvalidParamName(name.to_string()))
    }
}

fn invalid(template: &str, reason: &str) -> RouteError {
    RouteError::InvalidTemplate {
        template: template.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(template: &str) -> CompiledPath {
        CompiledPath::compile(template, &HashMap::new()).unwrap()
    }

    fn captured(path: &CompiledPath, input: &str) -> Vec<(String, Option<String>)> {
        path.captures(input).unwrap()
    }

    #[test]
    fn test_root_is_exact() {
        let root = compile("/");
        assert!(root.is_match("/"));
        assert!(root.is_match(""));
        assert!(!root.is_match("/x"));
        assert!(root.params().is_empty());
    }

    #[test]
    fn test_placeholder_syntaxes_are_equivalent() {
        let braces = compile("/users/{id}");
        let constrained = compile(r"/users/{id:\d+}");
        let legacy = compile("/users/:id");

        for path in ["/users/1", "/users/42", "/users/42/", "/users", "/users/7/posts", "/posts/7"] {
            assert_eq!(braces.is_match(path), legacy.is_match(path), "{path}");
            assert_eq!(braces.is_match(path), constrained.is_match(path), "{path}");
        }
        assert_eq!(braces.params(), legacy.params());
        assert_eq!(braces.params(), constrained.params());
        assert_eq!(constrained.constraints()["id"], r"\d+");
        assert_eq!(legacy.constraints()["id"], DEFAULT_CONSTRAINT);
    }

    #[test]
    fn test_optional_parameter_owns_its_slash() {
        for template in ["/x/{y?}", "/x/:y?"] {
            let path = compile(template);
            assert_eq!(captured(&path, "/x"), vec![("y".to_string(), None)]);
            assert_eq!(
                captured(&path, "/x/5"),
                vec![("y".to_string(), Some("5".to_string()))]
            );
            assert!(!path.is_match("/x/5/6"));
        }
    }

    #[test]
    fn test_optional_only_template_matches_root() {
        let path = compile("/{page?}");
        assert!(path.is_match("/"));
        assert!(path.is_match("/about"));
    }

    #[test]
    fn test_where_overrides_inline_constraint() {
        let mut wheres = HashMap::new();
        wheres.insert("id".to_string(), "[a-z]+".to_string());
        let path = CompiledPath::compile(r"/users/{id:\d+}", &wheres).unwrap();
        assert!(path.is_match("/users/abc"));
        assert!(!path.is_match("/users/42"));
    }

    #[test]
    fn test_nested_braces_in_constraint() {
        let path = compile(r"/archive/{year:\d{4}}/{slug}");
        assert_eq!(
            captured(&path, "/archive/2024/hello"),
            vec![
                ("year".to_string(), Some("2024".to_string())),
                ("slug".to_string(), Some("hello".to_string())),
            ]
        );
        assert!(!path.is_match("/archive/24/hello"));
    }

    #[test]
    fn test_constraint_may_contain_slash() {
        let path = compile("/files/{rest:.+}");
        assert_eq!(
            captured(&path, "/files/a/b/c.txt"),
            vec![("rest".to_string(), Some("a/b/c.txt".to_string()))]
        );
    }

    #[test]
    fn test_mixed_segment() {
        let path = compile("/files/{name}.{ext:[a-z]+}");
        assert_eq!(
            captured(&path, "/files/report.pdf"),
            vec![
                ("name".to_string(), Some("report".to_string())),
                ("ext".to_string(), Some("pdf".to_string())),
            ]
        );
        assert!(!path.is_match("/files/report"));
    }

    #[test]
    fn test_literals_are_escaped() {
        let path = compile("/v1.0/items");
        assert!(path.is_match("/v1.0/items"));
        assert!(!path.is_match("/v1x0/items"));
    }

    #[test]
    fn test_invalid_templates() {
        assert!(matches!(
            CompiledPath::compile("/users/{id", &HashMap::new()),
            Err(RouteError::InvalidTemplate { .. })
        ));
        assert!(matches!(
            CompiledPath::compile("/users/id}", &HashMap::new()),
            Err(RouteError::InvalidTemplate { .. })
        ));
        assert!(matches!(
            CompiledPath::compile("/users/{1d}", &HashMap::new()),
            Err(RouteError::InvalidParamName(_))
        ));
        assert!(matches!(
            CompiledPath::compile("/a/{id}/b/{id}", &HashMap::new()),
            Err(RouteError::DuplicateParam { .. })
        ));
        assert!(matches!(
            CompiledPath::compile("/a/x{id?}", &HashMap::new()),
            Err(RouteError::InvalidTemplate { .. })
        ));
        assert!(matches!(
            CompiledPath::compile("/a/{id:(}", &HashMap::new()),
            Err(RouteError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_url_generation() {
        let path = compile("/shops/{shop}/products/{id?}");
        let mut values = Map::new();
        values.insert("shop".into(), Value::from("north"));
        assert_eq!(path.url(&values).unwrap(), "/shops/north/products");

        values.insert("id".into(), Value::from(12));
        assert_eq!(path.url(&values).unwrap(), "/shops/north/products/12");

        values.remove("shop");
        assert!(matches!(
            path.url(&values),
            Err(RouteError::MissingParam { .. })
        ));

        assert_eq!(compile("/").url(&Map::new()).unwrap(), "/");
    }

    #[test]
    fn test_url_respects_constraints() {
        let path = compile("/items/{id:\\d+}/{slug?}");
        let mut values = Map::new();
        values.insert("id".into(), Value::from("abc"));
        assert!(matches!(
            path.url(&values),
            Err(RouteError::ConstraintViolation { ref param, .. }) if param == "id"
        ));

        values.insert("id".into(), Value::from(7));
        values.insert("slug".into(), Value::from("a/b"));
        assert!(matches!(
            path.url(&values),
            Err(RouteError::ConstraintViolation { ref param, .. }) if param == "slug"
        ));

        values.insert("slug".into(), Value::from("lamp"));
        let url = path.url(&values).unwrap();
        assert_eq!(url, "/items/7/lamp");
        assert!(path.is_match(&url));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("users/"), "/users");
        assert_eq!(normalize_path("/users//"), "/users");
    }
}
