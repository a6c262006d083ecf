//! Error types for search operations

use crate::error::AppError;

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors that can occur during search operations
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Malformed query construction
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Index not found
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Query parsing failed
    #[error("Query parsing failed: {0}")]
    QueryParsingFailed(String),

    /// Search execution failed
    #[error("Search execution failed: {0}")]
    SearchFailed(String),

    /// Document indexing failed
    #[error("Document indexing failed: {0}")]
    IndexingFailed(String),

    /// Catalog repository failure
    #[error("Repository error: {0}")]
    Repository(String),

    /// Hit materialization failed
    #[error("Product load failed: {0}")]
    ProductLoad(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Tantivy error
    #[error("Tantivy error: {0}")]
    TantivyError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl SearchError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        SearchError::InvalidArgument(msg.into())
    }
}

impl From<tantivy::TantivyError> for SearchError {
    fn from(err: tantivy::TantivyError) -> Self {
        SearchError::TantivyError(err.to_string())
    }
}

impl From<tantivy::query::QueryParserError> for SearchError {
    fn from(err: tantivy::query::QueryParserError) -> Self {
        SearchError::QueryParsingFailed(err.to_string())
    }
}

impl From<tantivy::directory::error::OpenDirectoryError> for SearchError {
    fn from(err: tantivy::directory::error::OpenDirectoryError) -> Self {
        SearchError::IndexNotFound(err.to_string())
    }
}

impl From<validator::ValidationErrors> for SearchError {
    fn from(err: validator::ValidationErrors) -> Self {
        SearchError::InvalidConfiguration(err.to_string())
    }
}

impl From<AppError> for SearchError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Validation(msg) => SearchError::InvalidArgument(msg),
            AppError::Configuration(msg) => SearchError::InvalidConfiguration(msg),
            AppError::Io(err) => SearchError::Io(err),
            other => SearchError::Repository(other.to_string()),
        }
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidArgument(msg) => AppError::Validation(msg),
            SearchError::InvalidConfiguration(msg) => AppError::Configuration(msg),
            SearchError::IndexNotFound(msg) => AppError::NotFound(msg),
            SearchError::Repository(msg) => AppError::Database(msg),
            SearchError::Io(err) => AppError::Io(err),
            other => AppError::Search(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_app_error() {
        let app: AppError = SearchError::invalid_argument("take").into();
        assert!(app.is_client_error());

        let app: AppError = SearchError::SearchFailed("boom".into()).into();
        assert_eq!(app.error_code(), "SEARCH_ERROR");
    }

    #[test]
    fn test_from_app_error() {
        let err: SearchError = AppError::Database("down".into()).into();
        assert!(matches!(err, SearchError::Repository(_)));
    }
}
