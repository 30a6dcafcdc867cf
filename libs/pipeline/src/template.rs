//! Sandboxed template evaluation
//!
//! Step configs may embed `{{ … }}` expressions evaluated against the
//! context's template root. The function table is closed: `uuidv4`, `now`,
//! `lower`, `default`, `json`, plus the `index` accessor for names that are
//! not valid path segments (hyphens). Templates have no file or environment
//! access.
//!
//! `{{ .field }}` selects from the root, `{{ .steps.<name>.<field> }}` from
//! prior step outputs, and stages chain with `|`:
//! `{{ .name | lower }}`. A template that is one expression with no
//! surrounding text keeps the selected value's JSON type; mixed text renders
//! to a string.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::TemplateError;

/// Whether a config string needs template evaluation
#[must_use]
pub fn is_template(input: &str) -> bool {
    input.contains("{{")
}

/// Truthiness for conditionals and `default`: null, false, zero, empty
/// strings, and empty containers are falsy.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

// =============================================================================
// Parsed Template
// =============================================================================

/// A parsed template, reusable across renders
#[derive(Debug, Clone)]
pub struct Template {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Expr(Expr),
}

/// A `|`-chained sequence of stages
#[derive(Debug, Clone)]
struct Expr {
    stages: Vec<Stage>,
}

#[derive(Debug, Clone)]
enum Stage {
    /// A bare value: path or literal
    Value(Term),
    /// A function call with argument terms
    Call { function: String, args: Vec<Term> },
}

#[derive(Debug, Clone)]
enum Term {
    /// `.a.b.c`; empty segments means the root itself
    Path(Vec<String>),
    Str(String),
    Number(f64),
    Bool(bool),
}

impl Template {
    /// Parse template text
    pub fn parse(input: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = input;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after_open = &rest[open + 2..];
            let close = after_open
                .find("}}")
                .ok_or_else(|| TemplateError::Parse(format!("unclosed '{{{{' in '{input}'")))?;
            let body = after_open[..close].trim();
            if body.is_empty() {
                return Err(TemplateError::Parse("empty expression".to_string()));
            }
            segments.push(Segment::Expr(parse_expr(body)?));
            rest = &after_open[close + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// Evaluate against a root value
    ///
    /// A single-expression template preserves the result's JSON type; mixed
    /// text concatenates to a string.
    pub fn render(&self, root: &Value) -> Result<Value, TemplateError> {
        if let [Segment::Expr(expr)] = self.segments.as_slice() {
            return eval_expr(expr, root);
        }

        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Expr(expr) => out.push_str(&stringify(&eval_expr(expr, root)?)),
            }
        }
        Ok(Value::String(out))
    }
}

/// Parse and render in one call
pub fn render_str(input: &str, root: &Value) -> Result<Value, TemplateError> {
    Template::parse(input)?.render(root)
}

/// Render every templated string leaf of a config tree
pub fn render_config_value(config: &Value, root: &Value) -> Result<Value, TemplateError> {
    match config {
        Value::String(s) if is_template(s) => render_str(s, root),
        Value::Array(items) => {
            let rendered: Result<Vec<Value>, TemplateError> = items
                .iter()
                .map(|item| render_config_value(item, root))
                .collect();
            Ok(Value::Array(rendered?))
        }
        Value::Object(map) => {
            let mut rendered = serde_json::Map::new();
            for (key, value) in map {
                rendered.insert(key.clone(), render_config_value(value, root)?);
            }
            Ok(Value::Object(rendered))
        }
        other => Ok(other.clone()),
    }
}

// =============================================================================
// Parsing
// =============================================================================

fn parse_expr(body: &str) -> Result<Expr, TemplateError> {
    let mut stages = Vec::new();

    for (idx, stage_src) in split_pipeline(body)?.into_iter().enumerate() {
        let tokens = tokenize(&stage_src)?;
        if tokens.is_empty() {
            return Err(TemplateError::Parse(format!("empty stage in '{body}'")));
        }

        match parse_term(&tokens[0]) {
            // `.path` or a literal opens the pipeline
            Some(term) if tokens.len() == 1 => {
                if idx > 0 {
                    return Err(TemplateError::Parse(format!(
                        "pipeline stage '{stage_src}' must be a function"
                    )));
                }
                stages.push(Stage::Value(term));
            }
            Some(_) => {
                return Err(TemplateError::Parse(format!(
                    "unexpected arguments after value in '{stage_src}'"
                )));
            }
            // A function name followed by argument terms
            None => {
                let function = tokens[0].clone();
                let args: Result<Vec<Term>, TemplateError> = tokens[1..]
                    .iter()
                    .map(|token| {
                        parse_term(token).ok_or_else(|| {
                            TemplateError::Parse(format!("bad argument '{token}' in '{stage_src}'"))
                        })
                    })
                    .collect();
                stages.push(Stage::Call {
                    function,
                    args: args?,
                });
            }
        }
    }

    Ok(Expr { stages })
}

/// Split on `|` outside of quoted strings
fn split_pipeline(body: &str) -> Result<Vec<String>, TemplateError> {
    let mut stages = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = body.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '\\' if in_quotes => {
                current.push(ch);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '|' if !in_quotes => {
                stages.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(ch),
        }
    }
    if in_quotes {
        return Err(TemplateError::Parse(format!("unclosed string in '{body}'")));
    }
    stages.push(current.trim().to_string());
    Ok(stages)
}

/// Split a stage into whitespace-separated tokens, keeping quoted strings
fn tokenize(stage: &str) -> Result<Vec<String>, TemplateError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = stage.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '\\' if in_quotes => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }
    if in_quotes {
        return Err(TemplateError::Parse(format!("unclosed string in '{stage}'")));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Parse a token as a term; `None` means it is a function name
fn parse_term(token: &str) -> Option<Term> {
    if let Some(path) = token.strip_prefix('.') {
        let segments = if path.is_empty() {
            Vec::new()
        } else {
            path.split('.').map(str::to_string).collect()
        };
        return Some(Term::Path(segments));
    }
    if token.starts_with('"') && token.ends_with('"') && token.len() >= 2 {
        return Some(Term::Str(token[1..token.len() - 1].to_string()));
    }
    if token == "true" {
        return Some(Term::Bool(true));
    }
    if token == "false" {
        return Some(Term::Bool(false));
    }
    if let Ok(number) = token.parse::<f64>() {
        return Some(Term::Number(number));
    }
    None
}

// =============================================================================
// Evaluation
// =============================================================================

fn eval_expr(expr: &Expr, root: &Value) -> Result<Value, TemplateError> {
    let mut piped: Option<Value> = None;

    for stage in &expr.stages {
        let value = match stage {
            Stage::Value(term) => eval_term(term, root),
            Stage::Call { function, args } => {
                let mut values: Vec<Value> =
                    args.iter().map(|arg| eval_term(arg, root)).collect();
                if let Some(prev) = piped.take() {
                    values.push(prev);
                }
                call_function(function, values)?
            }
        };
        piped = Some(value);
    }

    Ok(piped.unwrap_or(Value::Null))
}

fn eval_term(term: &Term, root: &Value) -> Value {
    match term {
        Term::Path(segments) => lookup_path(root, segments),
        Term::Str(s) => Value::String(s.clone()),
        Term::Number(n) => serde_json::Number::from_f64(*n)
            .map_or(Value::Null, Value::Number),
        Term::Bool(b) => Value::Bool(*b),
    }
}

/// Walk a dot path; missing segments resolve to null
fn lookup_path(root: &Value, segments: &[String]) -> Value {
    let mut current = root;
    for segment in segments {
        current = match current {
            Value::Object(map) => match map.get(segment) {
                Some(value) => value,
                None => return Value::Null,
            },
            Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(value) => value,
                None => return Value::Null,
            },
            _ => return Value::Null,
        };
    }
    current.clone()
}

/// The closed function table
fn call_function(name: &str, args: Vec<Value>) -> Result<Value, TemplateError> {
    let arity = |expected: usize, got: usize| TemplateError::Arity {
        function: name.to_string(),
        expected,
        got,
    };

    match name {
        "uuidv4" => {
            if !args.is_empty() {
                return Err(arity(0, args.len()));
            }
            Ok(Value::String(Uuid::new_v4().to_string()))
        }
        "now" => {
            if !args.is_empty() {
                return Err(arity(0, args.len()));
            }
            Ok(Value::String(
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            ))
        }
        "lower" => match args.as_slice() {
            [value] => Ok(Value::String(stringify(value).to_lowercase())),
            _ => Err(arity(1, args.len())),
        },
        "default" => match args.as_slice() {
            [fallback, value] => Ok(if is_truthy(value) {
                value.clone()
            } else {
                fallback.clone()
            }),
            _ => Err(arity(2, args.len())),
        },
        "json" => match args.as_slice() {
            [value] => serde_json::to_string(value)
                .map(Value::String)
                .map_err(|err| TemplateError::Type(err.to_string())),
            _ => Err(arity(1, args.len())),
        },
        "index" => {
            if args.len() < 2 {
                return Err(arity(2, args.len()));
            }
            let mut current = args[0].clone();
            for key in &args[1..] {
                current = index_value(&current, key);
            }
            Ok(current)
        }
        other => Err(TemplateError::UnknownFunction(other.to_string())),
    }
}

fn index_value(base: &Value, key: &Value) -> Value {
    match (base, key) {
        (Value::Object(map), Value::String(k)) => map.get(k).cloned().unwrap_or(Value::Null),
        (Value::Array(items), Value::Number(n)) => {
            let idx = n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64));
            idx.and_then(|i| items.get(usize::try_from(i).ok()?))
                .cloned()
                .unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

/// How values embed into surrounding text
fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn root() -> Value {
        json!({
            "order_id": "42",
            "name": "ALICE",
            "total": 99.99,
            "steps": {
                "lookup": {"customer": "Alice"},
                "fetch-user": {"id": 7}
            }
        })
    }

    #[test]
    fn test_plain_path() {
        assert_eq!(render_str("{{ .order_id }}", &root()).unwrap(), json!("42"));
    }

    #[test]
    fn test_single_expression_keeps_type() {
        assert_eq!(render_str("{{ .total }}", &root()).unwrap(), json!(99.99));
    }

    #[test]
    fn test_mixed_text_renders_string() {
        assert_eq!(
            render_str("ENRICHED-{{ .order_id }}", &root()).unwrap(),
            json!("ENRICHED-42")
        );
    }

    #[test]
    fn test_step_output_path() {
        assert_eq!(
            render_str("{{ .steps.lookup.customer }}", &root()).unwrap(),
            json!("Alice")
        );
    }

    #[test]
    fn test_index_for_hyphenated_names() {
        assert_eq!(
            render_str(r#"{{ index .steps "fetch-user" "id" }}"#, &root()).unwrap(),
            json!(7)
        );
    }

    #[test]
    fn test_lower_pipe() {
        assert_eq!(
            render_str("{{ .name | lower }}", &root()).unwrap(),
            json!("alice")
        );
    }

    #[test]
    fn test_default_on_missing_field() {
        assert_eq!(
            render_str(r#"{{ .missing | default "anonymous" }}"#, &root()).unwrap(),
            json!("anonymous")
        );
        assert_eq!(
            render_str(r#"{{ .name | default "anonymous" }}"#, &root()).unwrap(),
            json!("ALICE")
        );
    }

    #[test]
    fn test_json_function() {
        assert_eq!(
            render_str("{{ json .steps.lookup }}", &root()).unwrap(),
            json!(r#"{"customer":"Alice"}"#)
        );
    }

    #[test]
    fn test_now_is_rfc3339_utc() {
        let Value::String(now) = render_str("{{ now }}", &root()).unwrap() else {
            panic!("expected string");
        };
        assert!(now.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&now).is_ok());
    }

    #[test]
    fn test_uuidv4_shape() {
        let Value::String(id) = render_str("{{ uuidv4 }}", &root()).unwrap() else {
            panic!("expected string");
        };
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_unknown_function_errors() {
        let err = render_str("{{ shell .cmd }}", &root()).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownFunction(_)));
    }

    #[test]
    fn test_unclosed_expression_errors() {
        assert!(render_str("{{ .order_id", &root()).is_err());
    }

    #[test]
    fn test_missing_path_is_null() {
        assert_eq!(render_str("{{ .no.such }}", &root()).unwrap(), Value::Null);
    }

    #[test]
    fn test_render_config_value_walks_tree() {
        let config = json!({
            "url": "https://api/{{ .order_id }}",
            "nested": [{"id": "{{ .order_id }}"}],
            "count": 3
        });

        let rendered = render_config_value(&config, &root()).unwrap();
        assert_eq!(rendered["url"], "https://api/42");
        assert_eq!(rendered["nested"][0]["id"], "42");
        assert_eq!(rendered["count"], 3);
    }
}
