//! Search predicates and sort descriptors.
//!
//! A [`Query`] is an immutable predicate tree sent to the store's search
//! index. Leaves match a single column; [`BoolQuery`] combines them. Nothing
//! here inspects records or talks to the store.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::value::Value;

/// A search predicate.
///
/// Serializable so that it can travel inside a search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
    /// Matches every row.
    MatchAll,

    Term {
        field_name: String,
        term: Value,
    },
    Terms {
        field_name: String,
        terms: Vec<Value>,
    },
    Range(RangeQuery),
    Prefix {
        field_name: String,
        prefix: String,
    },
    /// `*` matches any run of characters, `?` exactly one.
    Wildcard {
        field_name: String,
        value: String,
    },
    /// Full-text match on a tokenized column.
    Match {
        field_name: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum_should_match: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operator: Option<QueryOperator>,
    },
    MatchPhrase {
        field_name: String,
        text: String,
    },
    /// Predicate evaluated against the objects of a nested column.
    Nested {
        path: String,
        query: Box<Query>,
        score_mode: ScoreMode,
    },
    /// Points inside the rectangle spanned by two `"lat,lon"` corners.
    GeoBoundingBox {
        field_name: String,
        top_left: String,
        bottom_right: String,
    },
    /// Points within `distance_in_meter` of a `"lat,lon"` center.
    GeoDistance {
        field_name: String,
        center_point: String,
        distance_in_meter: f64,
    },
    /// Points inside the polygon with the given `"lat,lon"` vertices.
    GeoPolygon {
        field_name: String,
        points: Vec<String>,
    },

    Bool(BoolQuery),
}

/// Boolean combination of predicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoolQuery {
    #[serde(default)]
    pub must: Vec<Query>,
    #[serde(default)]
    pub must_not: Vec<Query>,
    #[serde(default)]
    pub should: Vec<Query>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_should_match: Option<i32>,
}

/// Bounds of a range predicate. A missing bound is unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeQuery {
    pub field_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Value>,
    pub include_lower: bool,
    pub include_upper: bool,
}

/// Comparison operator accepted by [`Query::range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    Gt,
    Lt,
    Ge,
    Le,
}

impl FromStr for RangeOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" => Ok(RangeOp::Gt),
            "<" => Ok(RangeOp::Lt),
            ">=" => Ok(RangeOp::Ge),
            "<=" => Ok(RangeOp::Le),
            other => Err(QueryError::InvalidRangeOperator(other.to_string())),
        }
    }
}

/// How the terms of a [`Query::Match`] combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryOperator {
    Or,
    And,
}

/// How nested hits contribute to the parent's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreMode {
    None,
    Avg,
    Max,
    Total,
    Min,
}

// ---------------------------------------------------------------------------
// Convenience constructors
// ---------------------------------------------------------------------------

impl Query {
    /// Matches every row. The default predicate of a session.
    pub fn match_all() -> Self {
        Query::MatchAll
    }

    /// `field == term`
    pub fn term(field: impl Into<String>, term: impl Into<Value>) -> Self {
        Query::Term {
            field_name: field.into(),
            term: term.into(),
        }
    }

    /// `field IN (terms...)`
    pub fn terms<V: Into<Value>>(field: impl Into<String>, terms: impl IntoIterator<Item = V>) -> Self {
        Query::Terms {
            field_name: field.into(),
            terms: terms.into_iter().map(Into::into).collect(),
        }
    }

    /// One-sided range: `field <op> value`.
    pub fn range(field: impl Into<String>, op: RangeOp, value: impl Into<Value>) -> Self {
        let mut range = RangeQuery {
            field_name: field.into(),
            from: None,
            to: None,
            include_lower: false,
            include_upper: false,
        };
        let value = value.into();
        match op {
            RangeOp::Gt => range.from = Some(value),
            RangeOp::Ge => {
                range.from = Some(value);
                range.include_lower = true;
            }
            RangeOp::Lt => range.to = Some(value),
            RangeOp::Le => {
                range.to = Some(value);
                range.include_upper = true;
            }
        }
        Query::Range(range)
    }

    /// `low <= field <= high`
    pub fn between(field: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Query::Range(RangeQuery {
            field_name: field.into(),
            from: Some(low.into()),
            to: Some(high.into()),
            include_lower: true,
            include_upper: true,
        })
    }

    pub fn prefix(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Query::Prefix {
            field_name: field.into(),
            prefix: prefix.into(),
        }
    }

    pub fn wildcard(field: impl Into<String>, value: impl Into<String>) -> Self {
        Query::Wildcard {
            field_name: field.into(),
            value: value.into(),
        }
    }

    /// Full-text match. `minimum_should_match` is the number of terms that
    /// must hit when `operator` is `Or`.
    pub fn match_text(
        field: impl Into<String>,
        text: impl Into<String>,
        minimum_should_match: Option<i32>,
        operator: Option<QueryOperator>,
    ) -> Self {
        Query::Match {
            field_name: field.into(),
            text: text.into(),
            minimum_should_match,
            operator,
        }
    }

    pub fn match_phrase(field: impl Into<String>, text: impl Into<String>) -> Self {
        Query::MatchPhrase {
            field_name: field.into(),
            text: text.into(),
        }
    }

    pub fn nested(path: impl Into<String>, query: Query, score_mode: ScoreMode) -> Self {
        Query::Nested {
            path: path.into(),
            query: Box::new(query),
            score_mode,
        }
    }

    /// Corners are `"latitude,longitude"` strings, e.g. `"35.8,-45.91"`.
    pub fn geo_bounding_box(
        field: impl Into<String>,
        top_left: impl Into<String>,
        bottom_right: impl Into<String>,
    ) -> Self {
        Query::GeoBoundingBox {
            field_name: field.into(),
            top_left: top_left.into(),
            bottom_right: bottom_right.into(),
        }
    }

    pub fn geo_distance(
        field: impl Into<String>,
        center_point: impl Into<String>,
        distance_in_meter: f64,
    ) -> Self {
        Query::GeoDistance {
            field_name: field.into(),
            center_point: center_point.into(),
            distance_in_meter,
        }
    }

    pub fn geo_polygon(field: impl Into<String>, points: Vec<String>) -> Self {
        Query::GeoPolygon {
            field_name: field.into(),
            points,
        }
    }

    /// `q1 AND q2 AND ...`
    pub fn and(queries: Vec<Query>) -> Self {
        Query::Bool(BoolQuery {
            must: queries,
            ..Default::default()
        })
    }

    /// `q1 OR q2 OR ...`, at least one must match.
    pub fn or(queries: Vec<Query>) -> Self {
        Query::Bool(BoolQuery {
            should: queries,
            minimum_should_match: Some(1),
            ..Default::default()
        })
    }

    /// `NOT q`
    #[allow(clippy::should_implement_trait)]
    pub fn not(query: Query) -> Self {
        Query::Bool(BoolQuery {
            must_not: vec![query],
            ..Default::default()
        })
    }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn from_asc(asc: bool) -> Self {
        if asc { SortOrder::Asc } else { SortOrder::Desc }
    }
}

/// One key of a search sort order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Sorter {
    Field { field_name: String, order: SortOrder },
    PrimaryKey { order: SortOrder },
    Score { order: SortOrder },
    /// Ascending distance from the nearest of `points`.
    GeoDistance { field_name: String, points: Vec<String> },
}
