//! Query dialect understood by the local document service.
//!
//! Supported shape:
//! `SELECT * FROM <source> [<alias>] [WHERE <alias>.<path> = <operand> (AND ...)*]`
//!
//! Operands are `@param`, quoted strings, numbers, `true`, `false` or `null`.
//! Keywords are case-insensitive. A missing field never matches.

use crate::client::{ClientError, ClientResult, QuerySpec};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

static SELECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)^\s*SELECT\s+\*\s+FROM\s+([A-Za-z_]\w*)(?:\s+([A-Za-z_]\w*))?(?:\s+WHERE\s+(.*?))?\s*;?\s*$",
    )
    .expect("valid select regex")
});
static PREDICATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\s*([A-Za-z_]\w*)((?:\.[A-Za-z_]\w*)+)\s*=\s*(@\w+|'(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*"|-?\d+(?:\.\d+)?|(?i:true|false|null))"#,
    )
    .expect("valid predicate regex")
});
static AND_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s+AND\s+").expect("valid and regex"));

/// Parsed, parameter-bound query ready for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
struct Predicate {
    path: Vec<String>,
    expected: Value,
}

impl CompiledQuery {
    /// Returns whether one resource body satisfies every predicate.
    pub fn matches(&self, body: &Map<String, Value>) -> bool {
        self.predicates.iter().all(|predicate| {
            lookup(body, &predicate.path)
                .is_some_and(|actual| values_equal(actual, &predicate.expected))
        })
    }

    pub fn is_unfiltered(&self) -> bool {
        self.predicates.is_empty()
    }
}

/// Parses `spec` and binds its parameters.
///
/// # Errors
/// - `ClientError::BadRequest` for unsupported syntax, a wrong alias, an
///   unbound parameter or duplicate parameter names.
pub fn compile(spec: &QuerySpec) -> ClientResult<CompiledQuery> {
    let parameters = bind_parameters(spec)?;

    let captures = SELECT_RE
        .captures(&spec.query)
        .ok_or_else(|| bad_request(format!("unsupported query `{}`", spec.query)))?;
    let source = captures.get(1).map_or("", |m| m.as_str());
    let alias = match captures.get(2).map(|m| m.as_str()) {
        Some(alias) if alias.eq_ignore_ascii_case("where") => {
            return Err(bad_request("WHERE clause has no predicate"));
        }
        Some(alias) => alias,
        None => source,
    };

    let mut predicates = Vec::new();
    if let Some(clause) = captures.get(3) {
        let mut rest = clause.as_str();
        loop {
            let predicate = PREDICATE_RE
                .captures(rest)
                .ok_or_else(|| bad_request(format!("unsupported predicate near `{rest}`")))?;

            let root = predicate.get(1).map_or("", |m| m.as_str());
            if root != alias {
                return Err(bad_request(format!(
                    "unknown identifier `{root}`; expected `{alias}`"
                )));
            }
            let path = predicate
                .get(2)
                .map_or("", |m| m.as_str())
                .split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect();
            let operand = predicate.get(3).map_or("", |m| m.as_str());
            predicates.push(Predicate {
                path,
                expected: parse_operand(operand, &parameters)?,
            });

            let consumed = predicate.get(0).map_or(0, |m| m.end());
            rest = &rest[consumed..];
            if rest.trim().is_empty() {
                break;
            }
            let and = AND_RE
                .find(rest)
                .ok_or_else(|| bad_request(format!("expected AND near `{}`", rest.trim())))?;
            rest = &rest[and.end()..];
        }
    }

    Ok(CompiledQuery { predicates })
}

fn bind_parameters(spec: &QuerySpec) -> ClientResult<HashMap<&str, &Value>> {
    let mut parameters = HashMap::with_capacity(spec.parameters.len());
    for parameter in &spec.parameters {
        if parameters
            .insert(parameter.name.as_str(), &parameter.value)
            .is_some()
        {
            return Err(bad_request(format!(
                "parameter `{}` is bound more than once",
                parameter.name
            )));
        }
    }
    Ok(parameters)
}

fn parse_operand(operand: &str, parameters: &HashMap<&str, &Value>) -> ClientResult<Value> {
    if operand.starts_with('@') {
        return parameters
            .get(operand)
            .map(|value| (*value).clone())
            .ok_or_else(|| bad_request(format!("parameter `{operand}` is not bound")));
    }
    if operand.starts_with('\'') || operand.starts_with('"') {
        return Ok(Value::String(unquote(operand)));
    }
    match operand.to_ascii_lowercase().as_str() {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        "null" => return Ok(Value::Null),
        _ => {}
    }
    if let Ok(integer) = operand.parse::<i64>() {
        return Ok(Value::from(integer));
    }
    if let Ok(integer) = operand.parse::<u64>() {
        return Ok(Value::from(integer));
    }
    operand
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| bad_request(format!("invalid literal `{operand}`")))
}

fn unquote(literal: &str) -> String {
    let inner = &literal[1..literal.len() - 1];
    let mut unescaped = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                unescaped.push(escaped);
            }
        } else {
            unescaped.push(c);
        }
    }
    unescaped
}

fn lookup<'a>(body: &'a Map<String, Value>, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    rest.iter()
        .try_fold(body.get(first)?, |value, segment| value.get(segment))
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(left), Value::Number(right)) => {
            match (exact_integer(left), exact_integer(right)) {
                (Some(left), Some(right)) => left == right,
                _ => left.as_f64() == right.as_f64(),
            }
        }
        _ => actual == expected,
    }
}

/// Integers compare exactly; `as_f64` collapses values beyond 2^53.
fn exact_integer(number: &Number) -> Option<i128> {
    number
        .as_i64()
        .map(i128::from)
        .or_else(|| number.as_u64().map(i128::from))
}

fn bad_request(message: impl Into<String>) -> ClientError {
    ClientError::BadRequest(message.into())
}

#[cfg(test)]
mod tests {
    use super::compile;
    use crate::client::{ClientError, QuerySpec};
    use serde_json::{json, Map, Value};

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn select_without_where_matches_everything() {
        let query = compile(&QuerySpec::new("SELECT * FROM root")).unwrap();
        assert!(query.is_unfiltered());
        assert!(query.matches(&body(json!({ "id": "a" }))));
    }

    #[test]
    fn parameters_and_literals_are_combined_with_and() {
        let spec = QuerySpec::new(
            "select * from root r where r.completed = @completed and r.category = 'home'",
        )
        .bind("completed", false);
        let query = compile(&spec).unwrap();

        assert!(query.matches(&body(json!({ "completed": false, "category": "home" }))));
        assert!(!query.matches(&body(json!({ "completed": true, "category": "home" }))));
        assert!(!query.matches(&body(json!({ "completed": false }))));
    }

    #[test]
    fn nested_paths_and_numbers_compare_by_value() {
        let query = compile(&QuerySpec::new("SELECT * FROM c WHERE c.meta.priority = 2")).unwrap();
        assert!(query.matches(&body(json!({ "meta": { "priority": 2.0 } }))));
        assert!(!query.matches(&body(json!({ "meta": { "priority": 3 } }))));
        assert!(!query.matches(&body(json!({ "meta": 2 }))));
    }

    #[test]
    fn large_integers_compare_exactly() {
        let spec = QuerySpec::new("SELECT * FROM root r WHERE r.seq = @seq")
            .bind("seq", 9_007_199_254_740_993_u64);
        let query = compile(&spec).unwrap();
        assert!(query.matches(&body(json!({ "seq": 9_007_199_254_740_993_u64 }))));
        assert!(!query.matches(&body(json!({ "seq": 9_007_199_254_740_992_u64 }))));

        let spec = QuerySpec::new("SELECT * FROM root r WHERE r.seq = @seq").bind("seq", u64::MAX);
        let query = compile(&spec).unwrap();
        assert!(query.matches(&body(json!({ "seq": u64::MAX }))));
        assert!(!query.matches(&body(json!({ "seq": i64::MAX }))));

        let literal = compile(&QuerySpec::new(
            "SELECT * FROM root r WHERE r.seq = 18446744073709551615",
        ))
        .unwrap();
        assert!(literal.matches(&body(json!({ "seq": u64::MAX }))));
        assert!(!literal.matches(&body(json!({ "seq": 18_446_744_073_709_551_614_u64 }))));
    }

    #[test]
    fn quoted_strings_keep_escaped_quotes_and_keywords() {
        let query =
            compile(&QuerySpec::new(r"SELECT * FROM root r WHERE r.name = 'milk \'and\' bread'"))
                .unwrap();
        assert!(query.matches(&body(json!({ "name": "milk 'and' bread" }))));
    }

    #[test]
    fn unsupported_syntax_is_a_bad_request() {
        for query in [
            "DELETE FROM root",
            "SELECT * FROM root r WHERE x.id = 'a'",
            "SELECT * FROM root r WHERE r.id = 'a' OR r.id = 'b'",
            "SELECT * FROM root r WHERE r.id > 3",
            "SELECT * FROM root WHERE",
        ] {
            let err = compile(&QuerySpec::new(query)).unwrap_err();
            assert!(
                matches!(err, ClientError::BadRequest(_)),
                "query `{query}` should be rejected, got {err}"
            );
        }
    }

    #[test]
    fn unbound_and_duplicate_parameters_are_rejected() {
        let unbound = compile(&QuerySpec::new("SELECT * FROM root r WHERE r.id = @id")).unwrap_err();
        assert!(unbound.to_string().contains("@id"));

        let duplicate = QuerySpec::by_id("a").bind("id", "b");
        assert!(matches!(
            compile(&duplicate).unwrap_err(),
            ClientError::BadRequest(_)
        ));
    }
}
