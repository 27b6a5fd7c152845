//! Query evaluation for the in-memory store.
//!
//! Supports the subset of the search query language the harness issues:
//! `*`, bare full-text terms, `@field:term`, `@field:{tag|tag}`,
//! `@field:[min max]` and `@field:[lon lat radius unit]`, combined by
//! juxtaposition (logical AND).

use crate::StoreError;
use indexquake_schema::{FieldType, IndexSchema};
use serde_json::Value;
use std::cmp::Ordering;

/// Mean Earth radius used by the store's geo commands, in meters.
const EARTH_RADIUS_M: f64 = 6_372_797.560_856;

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Text(Vec<String>),
    Tag(Vec<String>),
    Numeric { min: f64, max: f64 },
    Geo { lon: f64, lat: f64, radius_m: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    All,
    Terms(Vec<String>),
    Field { alias: String, predicate: Predicate },
    And(Vec<Query>),
}

pub fn parse_query(input: &str) -> Result<Query, StoreError> {
    let input = input.trim();
    if input.is_empty() || input == "*" {
        return Ok(Query::All);
    }

    let mut parts = Vec::new();
    let mut terms = Vec::new();
    let mut rest = input;
    while let Some(c) = rest.chars().next() {
        if c.is_whitespace() {
            rest = &rest[c.len_utf8()..];
            continue;
        }
        if let Some(after_at) = rest.strip_prefix('@') {
            let (alias, tail) = after_at
                .split_once(':')
                .ok_or_else(|| syntax(input, "missing ':' after field name"))?;
            let (predicate, remaining) = parse_predicate(input, tail.trim_start())?;
            parts.push(Query::Field {
                alias: alias.to_owned(),
                predicate,
            });
            rest = remaining;
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            terms.extend(tokenize(&rest[..end]));
            rest = &rest[end..];
        }
    }

    if !terms.is_empty() {
        parts.push(Query::Terms(terms));
    }
    Ok(match parts.len() {
        0 => Query::All,
        1 => parts.remove(0),
        _ => Query::And(parts),
    })
}

fn parse_predicate<'a>(input: &str, tail: &'a str) -> Result<(Predicate, &'a str), StoreError> {
    if let Some(body) = tail.strip_prefix('[') {
        let end = body
            .find(']')
            .ok_or_else(|| syntax(input, "unterminated '['"))?;
        let args: Vec<&str> = body[..end].split_whitespace().collect();
        let predicate = match args.as_slice() {
            [min, max] => Predicate::Numeric {
                min: parse_bound(input, min)?,
                max: parse_bound(input, max)?,
            },
            [lon, lat, radius, unit] => Predicate::Geo {
                lon: parse_bound(input, lon)?,
                lat: parse_bound(input, lat)?,
                radius_m: parse_bound(input, radius)? * unit_to_meters(input, unit)?,
            },
            _ => return Err(syntax(input, "expected 2 or 4 values in range")),
        };
        return Ok((predicate, &body[end + 1..]));
    }
    if let Some(body) = tail.strip_prefix('{') {
        let end = body
            .find('}')
            .ok_or_else(|| syntax(input, "unterminated '{'"))?;
        let tags = body[..end]
            .split('|')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        return Ok((Predicate::Tag(tags), &body[end + 1..]));
    }
    let end = tail.find(char::is_whitespace).unwrap_or(tail.len());
    let words: Vec<String> = tokenize(&tail[..end]).collect();
    if words.is_empty() {
        return Err(syntax(input, "empty field term"));
    }
    Ok((Predicate::Text(words), &tail[end..]))
}

fn parse_bound(input: &str, raw: &str) -> Result<f64, StoreError> {
    match raw {
        "-inf" => Ok(f64::NEG_INFINITY),
        "+inf" | "inf" => Ok(f64::INFINITY),
        _ => raw
            .parse()
            .map_err(|_| syntax(input, &format!("bad number '{raw}'"))),
    }
}

fn unit_to_meters(input: &str, unit: &str) -> Result<f64, StoreError> {
    match unit.to_ascii_lowercase().as_str() {
        "m" => Ok(1.0),
        "km" => Ok(1000.0),
        "mi" => Ok(1609.34),
        "ft" => Ok(0.3048),
        other => Err(syntax(input, &format!("unknown unit '{other}'"))),
    }
}

fn syntax(input: &str, reason: &str) -> StoreError {
    StoreError::Response(format!("Syntax error in query '{input}': {reason}"))
}

/// Lowercased alphanumeric words.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Resolve a JSON path such as `$.metrics.score` or `$.inventory[*].status`.
pub fn resolve_path<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let trimmed = path.trim_start_matches('$');
    let mut current = vec![doc];
    for segment in trimmed.split('.').filter(|s| !s.is_empty()) {
        let (name, wildcard) = match segment.strip_suffix("[*]") {
            Some(name) => (name, true),
            None => (segment, false),
        };
        let mut next: Vec<&Value> = current.iter().filter_map(|v| v.get(name)).collect();
        if wildcard {
            next = next
                .into_iter()
                .flat_map(|v| match v {
                    Value::Array(items) => items.iter().collect(),
                    other => vec![other],
                })
                .collect();
        }
        current = next;
    }
    current
}

/// Set an object member at `path`, creating intermediate objects. Returns
/// false when the path crosses a non-object value.
pub fn set_path(doc: &mut Value, path: &str, value: Value) -> bool {
    let segments: Vec<&str> = path
        .trim_start_matches('$')
        .split('.')
        .filter(|s| !s.is_empty())
        .collect();
    let Some((last, parents)) = segments.split_last() else {
        *doc = value;
        return true;
    };
    let mut node = doc;
    for segment in parents {
        let Value::Object(map) = node else {
            return false;
        };
        node = map
            .entry((*segment).to_owned())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    match node {
        Value::Object(map) => {
            map.insert((*last).to_owned(), value);
            true
        }
        _ => false,
    }
}

/// Render a JSON value the way the store returns field values.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Values of the field declared under `alias`, or an empty list if the
/// schema does not declare it.
pub fn field_values<'a>(doc: &'a Value, schema: &IndexSchema, alias: &str) -> Vec<&'a Value> {
    schema
        .get(alias)
        .map(|f| resolve_path(doc, &f.path))
        .unwrap_or_default()
}

pub fn matches(query: &Query, doc: &Value, schema: &IndexSchema) -> bool {
    match query {
        Query::All => true,
        Query::And(parts) => parts.iter().all(|q| matches(q, doc, schema)),
        Query::Terms(terms) => {
            let words: Vec<String> = schema
                .fields()
                .iter()
                .filter(|f| f.kind == FieldType::Text)
                .flat_map(|f| resolve_path(doc, &f.path))
                .flat_map(|v| tokenize(&value_text(v)).collect::<Vec<_>>())
                .collect();
            terms.iter().all(|t| words.contains(t))
        }
        Query::Field { alias, predicate } => {
            let values = field_values(doc, schema, alias);
            match predicate {
                Predicate::Text(terms) => {
                    let words: Vec<String> = values
                        .iter()
                        .flat_map(|v| tokenize(&value_text(v)).collect::<Vec<_>>())
                        .collect();
                    terms.iter().all(|t| words.contains(t))
                }
                Predicate::Tag(tags) => values
                    .iter()
                    .any(|v| tags.contains(&value_text(v).to_lowercase())),
                Predicate::Numeric { min, max } => values
                    .iter()
                    .filter_map(|v| v.as_f64())
                    .any(|n| n >= *min && n <= *max),
                Predicate::Geo { lon, lat, radius_m } => values
                    .iter()
                    .filter_map(|v| v.as_str().and_then(parse_lon_lat))
                    .any(|(dlon, dlat)| haversine_m(*lon, *lat, dlon, dlat) <= *radius_m),
            }
        }
    }
}

pub fn parse_lon_lat(raw: &str) -> Option<(f64, f64)> {
    let (lon, lat) = raw.split_once(',')?;
    Some((lon.trim().parse().ok()?, lat.trim().parse().ok()?))
}

pub fn haversine_m(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// Evaluate `geodistance(@field, lon, lat)` against an already-loaded value.
pub fn geodistance(expression: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String, StoreError> {
    let args = expression
        .trim()
        .strip_prefix("geodistance(")
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| StoreError::Response(format!("unsupported APPLY expression '{expression}'")))?;
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    let [field, lon, lat] = parts.as_slice() else {
        return Err(StoreError::Response(format!(
            "geodistance expects 3 arguments, got {}",
            parts.len()
        )));
    };
    let origin = (
        lon.parse::<f64>()
            .map_err(|_| StoreError::Response(format!("bad longitude '{lon}'")))?,
        lat.parse::<f64>()
            .map_err(|_| StoreError::Response(format!("bad latitude '{lat}'")))?,
    );
    let point = lookup(field.trim_start_matches('@'))
        .as_deref()
        .and_then(parse_lon_lat);
    Ok(match point {
        Some((plon, plat)) => format!("{:.2}", haversine_m(origin.0, origin.1, plon, plat)),
        None => String::new(),
    })
}

/// Order two rendered values: numerically when both parse, otherwise as text.
/// Missing values sort last.
pub fn compare_rendered(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match (a.parse::<f64>(), b.parse::<f64>()) {
            (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.cmp(b),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
