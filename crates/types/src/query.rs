//! Structural query model.
//!
//! A [`Query`] is compared structurally when resolving a target by query;
//! its [`Query::canonical_id`] is a deterministic string used as the
//! reverse-lookup key. Canonical ids are not guaranteed unique, so callers
//! must always confirm a canonical-id hit with structural equality.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Comparison operator of a field filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// `array-contains`
    ArrayContains,
    /// `in`
    In,
}

impl Operator {
    /// Returns the operator's canonical spelling.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::ArrayContains => "array_contains",
            Self::In => "in",
        }
    }
}

/// Literal operand of a field filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterValue {
    /// `null`
    Null,
    /// Boolean literal.
    Boolean(bool),
    /// 64-bit integer literal.
    Integer(i64),
    /// String literal.
    String(String),
    /// List literal (operand of `in`).
    Array(Vec<FilterValue>),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            // Debug quoting keeps `"1"` distinct from `1`.
            Self::String(s) => write!(f, "{s:?}"),
            Self::Array(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            },
        }
    }
}

/// A single `field op value` restriction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldFilter {
    /// Dotted field path.
    pub field: String,
    /// Comparison operator.
    pub op: Operator,
    /// Operand.
    pub value: FilterValue,
}

/// Sort direction of an ordering clause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Ascending order.
    #[default]
    Ascending,
    /// Descending order.
    Descending,
}

/// A single ordering clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderBy {
    /// Dotted field path.
    pub field: String,
    /// Sort direction.
    pub direction: Direction,
}

/// A query over a collection (or collection group), as registered by a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    /// Parent path segments followed by the collection id.
    pub path: Vec<String>,
    /// When set, the query spans every collection with this id under `path`.
    pub collection_group: Option<String>,
    /// Conjunctive field filters in declaration order.
    pub filters: Vec<FieldFilter>,
    /// Ordering clauses in declaration order.
    pub order_by: Vec<OrderBy>,
    /// Maximum number of results.
    pub limit: Option<u32>,
}

impl Query {
    /// Creates a query over the collection at the slash-separated `path`.
    pub fn collection(path: &str) -> Self {
        Self {
            path: path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect(),
            ..Self::default()
        }
    }

    /// Creates a query over every collection named `collection_id`.
    pub fn collection_group(collection_id: &str) -> Self {
        Self { collection_group: Some(collection_id.to_string()), ..Self::default() }
    }

    /// Adds a field filter.
    #[must_use]
    pub fn filter(mut self, field: &str, op: Operator, value: FilterValue) -> Self {
        self.filters.push(FieldFilter { field: field.to_string(), op, value });
        self
    }

    /// Adds an ordering clause.
    #[must_use]
    pub fn order(mut self, field: &str, direction: Direction) -> Self {
        self.order_by.push(OrderBy { field: field.to_string(), direction });
        self
    }

    /// Caps the number of results.
    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the canonical id used for reverse lookup.
    ///
    /// Format: `{path}[|cg:{group}][|f:{field}{op}{value}...][|ob:{field}{asc|desc}...][|l:{n}]`
    pub fn canonical_id(&self) -> String {
        let mut id = self.path.join("/");

        if let Some(group) = &self.collection_group {
            id.push_str("|cg:");
            id.push_str(group);
        }

        if !self.filters.is_empty() {
            id.push_str("|f:");
            for filter in &self.filters {
                id.push_str(&format!("{}{}{}", filter.field, filter.op.as_str(), filter.value));
            }
        }

        if !self.order_by.is_empty() {
            id.push_str("|ob:");
            for order in &self.order_by {
                let direction = match order.direction {
                    Direction::Ascending => "asc",
                    Direction::Descending => "desc",
                };
                id.push_str(&format!("{}{}", order.field, direction));
            }
        }

        if let Some(limit) = self.limit {
            id.push_str(&format!("|l:{limit}"));
        }

        id
    }
}
