//! Sort keys for search queries

use serde::{Deserialize, Serialize};

/// Semantic type of a sort field, determining comparison rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortFieldType {
    #[default]
    Relevance,
    String,
    DateTime,
    Double,
    Int,
}

/// A single sort key; the first key on a query wins, later keys break ties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSort {
    /// Empty means "by relevance"
    pub field_name: String,
    pub descending: bool,
    pub field_type: SortFieldType,
}

impl SearchSort {
    pub fn by_relevance() -> Self {
        Self {
            field_name: String::new(),
            descending: false,
            field_type: SortFieldType::Relevance,
        }
    }

    pub fn by_string_field(field_name: impl Into<String>, descending: bool) -> Self {
        Self::by_field(field_name, SortFieldType::String, descending)
    }

    pub fn by_datetime_field(field_name: impl Into<String>, descending: bool) -> Self {
        Self::by_field(field_name, SortFieldType::DateTime, descending)
    }

    pub fn by_double_field(field_name: impl Into<String>, descending: bool) -> Self {
        Self::by_field(field_name, SortFieldType::Double, descending)
    }

    pub fn by_int_field(field_name: impl Into<String>, descending: bool) -> Self {
        Self::by_field(field_name, SortFieldType::Int, descending)
    }

    fn by_field(field_name: impl Into<String>, field_type: SortFieldType, descending: bool) -> Self {
        Self {
            field_name: field_name.into(),
            descending,
            field_type,
        }
    }

    pub fn is_relevance(&self) -> bool {
        self.field_name.is_empty()
    }
}

impl Default for SearchSort {
    fn default() -> Self {
        Self::by_relevance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevance_sort() {
        assert!(SearchSort::default().is_relevance());
        let sort = SearchSort::by_string_field("name", true);
        assert!(!sort.is_relevance());
        assert_eq!(sort.field_type, SortFieldType::String);
        assert!(sort.descending);
    }
}
