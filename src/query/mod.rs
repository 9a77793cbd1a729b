pub mod collation;
pub mod sort;

pub use collation::Collator;
pub use sort::{NullOrdering, RecordComparator, SortKey, sort_records};

use crate::core::{Fields, Record, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn is_descending(&self) -> bool {
        matches!(self, Self::Desc)
    }
}

/// One `(field, direction)` pair; serialized as `["updatedAt", "DESC"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, SortDirection)", into = "(String, SortDirection)")]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn to_sort_key(&self) -> SortKey {
        SortKey::new(self.field.clone(), self.direction.is_descending())
    }
}

impl From<(String, SortDirection)> for OrderBy {
    fn from((field, direction): (String, SortDirection)) -> Self {
        Self { field, direction }
    }
}

impl From<OrderBy> for (String, SortDirection) {
    fn from(order: OrderBy) -> Self {
        (order.field, order.direction)
    }
}

/// Parameters of `find_all` / `find_one`.
///
/// An empty `order` means store-default order (insertion order). `filters`
/// are equality matches; `query` is a case-insensitive substring match over
/// the kind's searchable text columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindQuery {
    pub offset: usize,
    pub limit: Option<usize>,
    pub order: Vec<OrderBy>,
    #[serde(rename = "where")]
    pub filters: Fields,
    pub query: Option<String>,
}

impl FindQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order.push(OrderBy::new(field, direction));
        self
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    pub fn text(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// The trimmed, lower-cased text query, or `None` when it matches everything.
    pub fn normalized_text(&self) -> Option<String> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase)
    }

    pub fn matches(&self, record: &Record, search_columns: &[&str]) -> bool {
        matches_filters(record, &self.filters)
            && matches_text(record, self.normalized_text().as_deref(), search_columns)
    }

    /// Filters, orders and paginates `rows` (given in store-default order).
    pub fn execute(&self, rows: Vec<Record>, search_columns: &[&str]) -> Vec<Record> {
        let text = self.normalized_text();
        let mut selected: Vec<Record> = rows
            .into_iter()
            .filter(|record| {
                matches_filters(record, &self.filters)
                    && matches_text(record, text.as_deref(), search_columns)
            })
            .collect();

        let keys: Vec<SortKey> = self.order.iter().map(OrderBy::to_sort_key).collect();
        sort_records(&mut selected, &keys);

        let limit = self.limit.unwrap_or(usize::MAX);
        selected.into_iter().skip(self.offset).take(limit).collect()
    }
}

pub fn matches_filters(record: &Record, filters: &Fields) -> bool {
    filters
        .iter()
        .all(|(field, expected)| record.value(field) == expected)
}

/// `query` must already be trimmed and lower-cased.
pub fn matches_text(record: &Record, query: Option<&str>, search_columns: &[&str]) -> bool {
    let Some(query) = query else {
        return true;
    };
    search_columns.iter().any(|column| {
        record
            .text(column)
            .is_some_and(|text| text.to_lowercase().contains(query))
    })
}
