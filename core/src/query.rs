//! Search query model.
//!
//! A small, typed subset of the Elasticsearch query DSL: enough to express
//! the cascade-delete filter and the lookups clients run against the plan
//! index, including parent/child joins. Queries parse from and render to the
//! DSL, so the HTTP adapter can accept raw DSL while in-memory stores
//! evaluate the typed form.
//!
//! ```
//! use plan_registry_core::query::SearchQuery;
//! use serde_json::json;
//!
//! let dsl = json!({ "has_parent": { "parent_type": "plan", "query": { "term": { "objectId": "P1" } } } });
//! let query = SearchQuery::from_dsl(&dsl).unwrap();
//! assert_eq!(query.to_dsl(), dsl);
//! ```

use serde_json::{Map, Value, json};
use thiserror::Error;

/// Document id pseudo-field, as in the `_id` of Elasticsearch terms.
pub const ID_FIELD: &str = "_id";

/// Errors from parsing query DSL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The clause type is not part of the supported subset.
    #[error("unsupported query clause: {0}")]
    Unsupported(String),

    /// The clause is structurally wrong.
    #[error("malformed {clause} clause: {reason}")]
    Malformed {
        /// Clause name.
        clause: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// A search query.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchQuery {
    /// Every document.
    MatchAll,
    /// Exact match on a field (`_id` addresses the document id).
    Term {
        /// Field name.
        field: String,
        /// Expected value.
        value: Value,
    },
    /// Exact match against any of several values.
    Terms {
        /// Field name.
        field: String,
        /// Accepted values.
        values: Vec<Value>,
    },
    /// Documents with one of the given ids.
    Ids(Vec<String>),
    /// Full-text match: any whitespace-separated token of `text`.
    Match {
        /// Field name.
        field: String,
        /// Query text.
        text: String,
    },
    /// Children whose parent (of relation `parent_type`) matches `query`.
    HasParent {
        /// Parent relation name.
        parent_type: String,
        /// Condition on the parent.
        query: Box<SearchQuery>,
    },
    /// Parents with at least one child (of relation `child_type`) matching
    /// `query`.
    HasChild {
        /// Child relation name.
        child_type: String,
        /// Condition on the child.
        query: Box<SearchQuery>,
    },
    /// Boolean combination.
    Bool(BoolQuery),
}

/// Clauses of a boolean query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoolQuery {
    /// All must match.
    pub must: Vec<SearchQuery>,
    /// All must match (no scoring difference in this model).
    pub filter: Vec<SearchQuery>,
    /// At least `minimum_should_match` must match.
    pub should: Vec<SearchQuery>,
    /// None may match.
    pub must_not: Vec<SearchQuery>,
    /// Defaults to 1 when there are no `must`/`filter` clauses, else 0.
    pub minimum_should_match: Option<usize>,
}

impl BoolQuery {
    /// Effective minimum number of `should` clauses that must match.
    #[must_use]
    pub fn required_should(&self) -> usize {
        self.minimum_should_match.unwrap_or_else(|| {
            usize::from(self.must.is_empty() && self.filter.is_empty() && !self.should.is_empty())
        })
    }
}

impl SearchQuery {
    /// `term` on a field.
    #[must_use]
    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `terms` on a field.
    #[must_use]
    pub fn terms<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Terms {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `bool` with only `should` clauses (logical OR).
    #[must_use]
    pub fn any_of(clauses: Vec<Self>) -> Self {
        Self::Bool(BoolQuery {
            should: clauses,
            minimum_should_match: Some(1),
            ..BoolQuery::default()
        })
    }

    /// Parse Elasticsearch query DSL.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for clauses outside the supported subset or
    /// with the wrong structure.
    pub fn from_dsl(dsl: &Value) -> Result<Self, QueryError> {
        let object = dsl.as_object().ok_or_else(|| malformed("query", "expected an object"))?;
        let (clause, body) = match object.iter().next() {
            Some(entry) if object.len() == 1 => entry,
            _ => return Err(malformed("query", "expected exactly one clause")),
        };

        match clause.as_str() {
            "match_all" => Ok(Self::MatchAll),
            "term" => {
                let (field, value) = single_field(clause, body)?;
                let value = value
                    .as_object()
                    .and_then(|o| o.get("value"))
                    .unwrap_or(value)
                    .clone();
                Ok(Self::Term { field, value })
            }
            "terms" => {
                let (field, values) = single_field(clause, body)?;
                let values = values
                    .as_array()
                    .ok_or_else(|| malformed(clause, "expected an array of values"))?
                    .clone();
                Ok(Self::Terms { field, values })
            }
            "ids" => {
                let values = body
                    .get("values")
                    .and_then(Value::as_array)
                    .ok_or_else(|| malformed(clause, "expected `values` array"))?;
                let ids = values
                    .iter()
                    .map(|v| {
                        v.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| malformed("ids", "ids must be strings"))
                    })
                    .collect::<Result<_, _>>()?;
                Ok(Self::Ids(ids))
            }
            "match" => {
                let (field, text) = single_field(clause, body)?;
                let text = text
                    .as_object()
                    .and_then(|o| o.get("query"))
                    .unwrap_or(text);
                let text = match text {
                    Value::String(s) => s.clone(),
                    Value::Number(_) | Value::Bool(_) => text.to_string(),
                    _ => return Err(malformed(clause, "expected query text")),
                };
                Ok(Self::Match { field, text })
            }
            "has_parent" => Ok(Self::HasParent {
                parent_type: string_field(clause, body, "parent_type")?,
                query: Box::new(nested_query(clause, body)?),
            }),
            "has_child" => Ok(Self::HasChild {
                child_type: string_field(clause, body, "type")?,
                query: Box::new(nested_query(clause, body)?),
            }),
            "bool" => {
                let body = body.as_object().ok_or_else(|| malformed(clause, "expected an object"))?;
                let minimum_should_match = match body.get("minimum_should_match") {
                    None => None,
                    Some(v) => Some(
                        v.as_u64()
                            .and_then(|n| usize::try_from(n).ok())
                            .ok_or_else(|| malformed(clause, "minimum_should_match must be a count"))?,
                    ),
                };
                Ok(Self::Bool(BoolQuery {
                    must: clause_list(body, "must")?,
                    filter: clause_list(body, "filter")?,
                    should: clause_list(body, "should")?,
                    must_not: clause_list(body, "must_not")?,
                    minimum_should_match,
                }))
            }
            other => Err(QueryError::Unsupported(other.to_string())),
        }
    }

    /// Render as Elasticsearch query DSL.
    #[must_use]
    pub fn to_dsl(&self) -> Value {
        match self {
            Self::MatchAll => json!({ "match_all": {} }),
            Self::Term { field, value } => json!({ "term": { field.as_str(): value } }),
            Self::Terms { field, values } => json!({ "terms": { field.as_str(): values } }),
            Self::Ids(ids) => json!({ "ids": { "values": ids } }),
            Self::Match { field, text } => json!({ "match": { field.as_str(): text } }),
            Self::HasParent { parent_type, query } => json!({
                "has_parent": { "parent_type": parent_type, "query": query.to_dsl() }
            }),
            Self::HasChild { child_type, query } => json!({
                "has_child": { "type": child_type, "query": query.to_dsl() }
            }),
            Self::Bool(b) => {
                let mut body = Map::new();
                for (name, clauses) in [
                    ("must", &b.must),
                    ("filter", &b.filter),
                    ("should", &b.should),
                    ("must_not", &b.must_not),
                ] {
                    if !clauses.is_empty() {
                        body.insert(
                            name.into(),
                            Value::Array(clauses.iter().map(Self::to_dsl).collect()),
                        );
                    }
                }
                if let Some(n) = b.minimum_should_match {
                    body.insert("minimum_should_match".into(), json!(n));
                }
                json!({ "bool": body })
            }
        }
    }
}

fn malformed(clause: &str, reason: &str) -> QueryError {
    QueryError::Malformed {
        clause: clause.to_string(),
        reason: reason.to_string(),
    }
}

fn single_field<'a>(clause: &str, body: &'a Value) -> Result<(String, &'a Value), QueryError> {
    let object = body.as_object().ok_or_else(|| malformed(clause, "expected an object"))?;
    match object.iter().next() {
        Some((field, value)) if object.len() == 1 => Ok((field.clone(), value)),
        _ => Err(malformed(clause, "expected exactly one field")),
    }
}

fn string_field(clause: &str, body: &Value, name: &str) -> Result<String, QueryError> {
    body.get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| malformed(clause, &format!("missing `{name}`")))
}

fn nested_query(clause: &str, body: &Value) -> Result<SearchQuery, QueryError> {
    let query = body.get("query").ok_or_else(|| malformed(clause, "missing `query`"))?;
    SearchQuery::from_dsl(query)
}

fn clause_list(body: &Map<String, Value>, name: &str) -> Result<Vec<SearchQuery>, QueryError> {
    match body.get(name) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(SearchQuery::from_dsl).collect(),
        Some(single) => Ok(vec![SearchQuery::from_dsl(single)?]),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_term_shorthand_and_long_form() {
        let short = SearchQuery::from_dsl(&json!({ "term": { "objectId": "P1" } })).unwrap();
        let long = SearchQuery::from_dsl(&json!({ "term": { "objectId": { "value": "P1" } } })).unwrap();
        assert_eq!(short, long);
        assert_eq!(short, SearchQuery::term("objectId", "P1"));
    }

    #[test]
    fn parses_bool_with_single_clause_objects() {
        let query = SearchQuery::from_dsl(&json!({
            "bool": {
                "must": { "match": { "name": "physical" } },
                "must_not": [{ "term": { "_org": "other.com" } }]
            }
        }))
        .unwrap();
        let SearchQuery::Bool(b) = query else {
            panic!("expected bool query");
        };
        assert_eq!(b.must.len(), 1);
        assert_eq!(b.must_not.len(), 1);
        assert_eq!(b.required_should(), 0);
    }

    #[test]
    fn should_only_bool_requires_one_match() {
        let b = BoolQuery {
            should: vec![SearchQuery::MatchAll],
            ..BoolQuery::default()
        };
        assert_eq!(b.required_should(), 1);
    }

    #[test]
    fn renders_joins_and_bool_back_to_dsl() {
        let dsl = json!({
            "bool": {
                "should": [
                    { "ids": { "values": ["P1"] } },
                    { "has_child": { "type": "planservice", "query": { "match_all": {} } } }
                ],
                "minimum_should_match": 1
            }
        });
        assert_eq!(SearchQuery::from_dsl(&dsl).unwrap().to_dsl(), dsl);
    }

    #[test]
    fn rejects_unknown_and_malformed_clauses() {
        assert_eq!(
            SearchQuery::from_dsl(&json!({ "wildcard": { "name": "*" } })),
            Err(QueryError::Unsupported("wildcard".into()))
        );
        assert!(SearchQuery::from_dsl(&json!({ "term": {} })).is_err());
        assert!(SearchQuery::from_dsl(&json!("match_all")).is_err());
        assert!(SearchQuery::from_dsl(&json!({ "has_parent": { "query": { "match_all": {} } } })).is_err());
    }
}
