//! Predicate evaluation and sorting over stored rows.
//!
//! Predicates are evaluated directly on [`Row`] columns. Nested predicates
//! read their column as a JSON document (an object or an array of objects)
//! and evaluate the inner predicate against each object, with the object's
//! keys exposed as `<path>.<key>` columns.

use std::cmp::Ordering;

use serde_json::Value as Json;
use tablemap_core::error::StoreError;
use tablemap_core::query::{BoolQuery, Query, QueryOperator, RangeQuery, SortOrder, Sorter};
use tablemap_core::types::{Column, PRIMARY_KEY_COLUMN, Row};
use tablemap_core::value::Value;

use crate::geo::GeoPoint;

/// Maximum nesting depth of a predicate tree.
const MAX_QUERY_DEPTH: usize = 16;

pub(crate) const PARAMETER_INVALID: &str = "OTSParameterInvalid";

pub(crate) fn invalid(message: impl Into<String>) -> StoreError {
    StoreError::new(PARAMETER_INVALID, message)
}

/// Evaluate a predicate against a row.
pub(crate) fn matches(query: &Query, row: &Row) -> Result<bool, StoreError> {
    eval(query, row, 0)
}

fn eval(query: &Query, row: &Row, depth: usize) -> Result<bool, StoreError> {
    if depth > MAX_QUERY_DEPTH {
        return Err(invalid(format!(
            "query depth exceeds maximum of {MAX_QUERY_DEPTH}"
        )));
    }

    match query {
        Query::MatchAll => Ok(true),

        Query::Term { field_name, term } => Ok(row
            .get(field_name)
            .is_some_and(|v| compare_values(v, term) == Some(Ordering::Equal))),
        Query::Terms { field_name, terms } => Ok(row.get(field_name).is_some_and(|v| {
            terms
                .iter()
                .any(|t| compare_values(v, t) == Some(Ordering::Equal))
        })),
        Query::Range(range) => Ok(row
            .get(&range.field_name)
            .is_some_and(|v| in_range(v, range))),

        Query::Prefix { field_name, prefix } => Ok(string_column(row, field_name)
            .is_some_and(|s| s.starts_with(prefix.as_str()))),
        Query::Wildcard { field_name, value } => Ok(string_column(row, field_name)
            .is_some_and(|s| wildcard_match(value, s))),

        Query::Match {
            field_name,
            text,
            minimum_should_match,
            operator,
        } => {
            let Some(s) = string_column(row, field_name) else {
                return Ok(false);
            };
            let haystack = tokenize(s);
            let needles = tokenize(text);
            if needles.is_empty() {
                return Ok(false);
            }
            let hits = needles.iter().filter(|n| haystack.contains(n)).count();
            Ok(match operator.unwrap_or(QueryOperator::Or) {
                QueryOperator::And => hits == needles.len(),
                QueryOperator::Or => hits >= minimum_should_match.unwrap_or(1).max(1) as usize,
            })
        }
        Query::MatchPhrase { field_name, text } => {
            let Some(s) = string_column(row, field_name) else {
                return Ok(false);
            };
            let haystack = tokenize(s);
            let phrase = tokenize(text);
            Ok(!phrase.is_empty()
                && haystack
                    .windows(phrase.len())
                    .any(|w| w == phrase.as_slice()))
        }

        Query::Nested { path, query, .. } => eval_nested(path, query, row, depth),

        Query::GeoBoundingBox {
            field_name,
            top_left,
            bottom_right,
        } => {
            let top_left = parse_point(top_left)?;
            let bottom_right = parse_point(bottom_right)?;
            Ok(geo_column(row, field_name).is_some_and(|p| p.in_bounding_box(&top_left, &bottom_right)))
        }
        Query::GeoDistance {
            field_name,
            center_point,
            distance_in_meter,
        } => {
            let center = parse_point(center_point)?;
            Ok(geo_column(row, field_name).is_some_and(|p| p.distance_to(&center) <= *distance_in_meter))
        }
        Query::GeoPolygon { field_name, points } => {
            let vertices = parse_points(points)?;
            Ok(geo_column(row, field_name).is_some_and(|p| p.in_polygon(&vertices)))
        }

        Query::Bool(b) => eval_bool(b, row, depth),
    }
}

/// `must` and `must_not` are hard constraints. `should` clauses count toward
/// `minimum_should_match`, which defaults to 1 when there is no `must` clause.
fn eval_bool(b: &BoolQuery, row: &Row, depth: usize) -> Result<bool, StoreError> {
    for q in &b.must {
        if !eval(q, row, depth + 1)? {
            return Ok(false);
        }
    }
    for q in &b.must_not {
        if eval(q, row, depth + 1)? {
            return Ok(false);
        }
    }
    if b.should.is_empty() {
        return Ok(true);
    }

    let required = match b.minimum_should_match {
        Some(n) => n.max(0) as usize,
        None if b.must.is_empty() => 1,
        None => 0,
    };
    let mut hits = 0;
    for q in &b.should {
        if hits >= required {
            break;
        }
        if eval(q, row, depth + 1)? {
            hits += 1;
        }
    }
    Ok(hits >= required)
}

fn eval_nested(path: &str, query: &Query, row: &Row, depth: usize) -> Result<bool, StoreError> {
    let Some(raw) = string_column(row, path) else {
        return Ok(false);
    };
    let parsed: Json = serde_json::from_str(raw)
        .map_err(|e| invalid(format!("nested column '{path}' is not JSON: {e}")))?;
    let objects = match parsed {
        Json::Array(items) => items,
        object @ Json::Object(_) => vec![object],
        _ => {
            return Err(invalid(format!(
                "nested column '{path}' must hold an object or an array of objects"
            )));
        }
    };

    for object in &objects {
        if eval(query, &nested_row(path, object), depth + 1)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn nested_row(path: &str, object: &Json) -> Row {
    let columns: Vec<Column> = object
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(key, value)| {
                    json_to_value(value).map(|value| Column {
                        name: format!("{path}.{key}"),
                        value,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Row::new(Vec::new(), columns)
}

/// Nested arrays and objects stay JSON text so deeper nested predicates can
/// parse them again.
fn json_to_value(value: &Json) -> Option<Value> {
    match value {
        Json::Null => None,
        Json::Bool(b) => Some(Value::Boolean(*b)),
        Json::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Double)),
        Json::String(s) => Some(Value::String(s.clone())),
        Json::Array(_) | Json::Object(_) => Some(Value::String(value.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

enum SortKey<'a> {
    Column(&'a str, SortOrder),
    GeoDistance(&'a str, Vec<GeoPoint>),
}

/// Sort rows by the given keys in order. Rows missing a sort column go last.
/// Relevance scores are not modelled, so score sorters keep the current order.
pub(crate) fn sort_rows(rows: &mut [Row], sorters: &[Sorter]) -> Result<(), StoreError> {
    let mut keys = Vec::with_capacity(sorters.len());
    for sorter in sorters {
        match sorter {
            Sorter::Field { field_name, order } => keys.push(SortKey::Column(field_name, *order)),
            Sorter::PrimaryKey { order } => keys.push(SortKey::Column(PRIMARY_KEY_COLUMN, *order)),
            Sorter::Score { .. } => {}
            Sorter::GeoDistance { field_name, points } => {
                if points.is_empty() {
                    return Err(invalid("geo distance sort needs at least one point"));
                }
                keys.push(SortKey::GeoDistance(field_name, parse_points(points)?));
            }
        }
    }

    rows.sort_by(|a, b| {
        for key in &keys {
            let ord = match key {
                SortKey::Column(column, order) => {
                    let ord = missing_last(a.get(column), b.get(column), sort_order);
                    match (order, a.get(column).is_some() && b.get(column).is_some()) {
                        (SortOrder::Desc, true) => ord.reverse(),
                        _ => ord,
                    }
                }
                SortKey::GeoDistance(column, points) => missing_last(
                    nearest_distance(a, column, points),
                    nearest_distance(b, column, points),
                    |x, y| x.total_cmp(&y),
                ),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

fn missing_last<T>(a: Option<T>, b: Option<T>, cmp: impl Fn(T, T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => cmp(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn nearest_distance(row: &Row, column: &str, points: &[GeoPoint]) -> Option<f64> {
    let at = geo_column(row, column)?;
    points
        .iter()
        .map(|p| p.distance_to(&at))
        .min_by(f64::total_cmp)
}

/// Total order over column values for sorting. A column may hold different
/// kinds in different rows, so kinds are ranked first:
/// booleans < numbers < strings < binary.
fn sort_order(left: &Value, right: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Boolean(_) => 0,
            Value::Integer(_) | Value::Double(_) => 1,
            Value::String(_) => 2,
            Value::Binary(_) => 3,
        }
    }

    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::Integer(_) | Value::Double(_), Value::Integer(_) | Value::Double(_)) => {
            match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => Ordering::Equal,
            }
        }
        _ => compare_values(left, right).unwrap_or_else(|| rank(left).cmp(&rank(right))),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Compare two column values, returning an ordering if the kinds are
/// comparable.
///
/// - Integers and doubles: compared as f64
/// - Strings: lexicographically
/// - Booleans: false < true
/// - Binary: bytewise
/// - Mismatched kinds: `None`
pub(crate) fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Integer(_) | Value::Double(_), Value::Integer(_) | Value::Double(_)) => {
            left.as_f64()?.partial_cmp(&right.as_f64()?)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        (Value::Binary(a), Value::Binary(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn in_range(value: &Value, range: &RangeQuery) -> bool {
    let above_lower = match &range.from {
        None => true,
        Some(from) => match compare_values(value, from) {
            Some(Ordering::Greater) => true,
            Some(Ordering::Equal) => range.include_lower,
            _ => false,
        },
    };
    let below_upper = match &range.to {
        None => true,
        Some(to) => match compare_values(value, to) {
            Some(Ordering::Less) => true,
            Some(Ordering::Equal) => range.include_upper,
            _ => false,
        },
    };
    above_lower && below_upper
}

fn string_column<'a>(row: &'a Row, name: &str) -> Option<&'a str> {
    row.get(name).and_then(Value::as_str)
}

fn geo_column(row: &Row, name: &str) -> Option<GeoPoint> {
    string_column(row, name).and_then(GeoPoint::parse)
}

fn parse_point(s: &str) -> Result<GeoPoint, StoreError> {
    GeoPoint::parse(s).ok_or_else(|| invalid(format!("invalid geo point '{s}'")))
}

fn parse_points(points: &[String]) -> Result<Vec<GeoPoint>, StoreError> {
    points.iter().map(|p| parse_point(p)).collect()
}

/// Lower-cased alphanumeric tokens.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// `*` matches any run of characters (including none), `?` exactly one.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
