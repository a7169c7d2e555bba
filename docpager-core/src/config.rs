//! Pagination configuration.
//!
//! [`PaginationConfig`] is passed explicitly to every paginator; there is no process-wide
//! state. It deserializes from any serde format, with every field optional:
//!
//! ```ignore
//! let config: PaginationConfig = serde_json::from_str(r#"{ "default_limit": 50 }"#)?;
//! assert_eq!(config.id_field, "_id");
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    backend::PRIMARY_KEY,
    error::{DocumentStoreError, DocumentStoreResult},
};

pub const DEFAULT_LIMIT: usize = 20;
pub const DEFAULT_ENDPOINT: &str = "/";
pub const DEFAULT_SORT_FIELDS: [&str; 3] = ["_id", "created_datetime", "updated_datetime"];

/// Settings shared by every pagination call made through one store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PaginationConfig {
    /// The identifier field, used as the default sort key and as the tie-break.
    pub id_field: String,
    /// Page size when a request does not give one.
    pub default_limit: usize,
    /// Upper bound on the page size; larger requests are clamped.
    pub max_limit: Option<usize>,
    /// Sort keys callers may paginate by. Empty allows any field.
    pub sort_fields: Vec<String>,
    /// Endpoint used for `next`/`previous` links when a request does not give one.
    pub default_endpoint: String,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            id_field: PRIMARY_KEY.to_string(),
            default_limit: DEFAULT_LIMIT,
            max_limit: None,
            sort_fields: DEFAULT_SORT_FIELDS.iter().map(|field| field.to_string()).collect(),
            default_endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl PaginationConfig {
    pub fn builder() -> PaginationConfigBuilder {
        PaginationConfigBuilder::new()
    }

    /// Resolves the effective page size for a request.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidPaginationArgs`] for a zero limit.
    pub fn resolve_limit(&self, requested: Option<usize>) -> DocumentStoreResult<usize> {
        let limit = requested.unwrap_or(self.default_limit);
        if limit == 0 {
            return Err(DocumentStoreError::InvalidPaginationArgs(
                "limit must be at least 1".to_string(),
            ));
        }

        Ok(match self.max_limit {
            Some(max) => limit.min(max),
            None => limit,
        })
    }

    /// Resolves the sort key for a request, defaulting to the identifier field.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidPaginationArgs`] for a key outside
    /// `sort_fields`.
    pub fn resolve_sort<'a>(&'a self, requested: Option<&'a str>) -> DocumentStoreResult<&'a str> {
        let sort = requested.unwrap_or(&self.id_field);

        if sort != self.id_field
            && !self.sort_fields.is_empty()
            && !self.sort_fields.iter().any(|field| field == sort)
        {
            return Err(DocumentStoreError::InvalidPaginationArgs(format!(
                "cannot paginate by '{sort}'; allowed: {}",
                self.sort_fields.join(", ")
            )));
        }

        Ok(sort)
    }
}

/// Builder for [`PaginationConfig`]; unset fields keep their defaults.
#[derive(Debug, Clone, Default)]
pub struct PaginationConfigBuilder {
    config: PaginationConfig,
}

impl PaginationConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id_field(mut self, id_field: impl Into<String>) -> Self {
        self.config.id_field = id_field.into();
        self
    }

    pub fn default_limit(mut self, limit: usize) -> Self {
        self.config.default_limit = limit;
        self
    }

    pub fn max_limit(mut self, limit: usize) -> Self {
        self.config.max_limit = Some(limit);
        self
    }

    /// Replaces the sort-key allow-list. An empty list allows any field.
    pub fn sort_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.sort_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.default_endpoint = endpoint.into();
        self
    }

    pub fn build(self) -> PaginationConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_partial_config_keeps_defaults() {
        // Act
        let config: PaginationConfig = serde_json::from_str(r#"{ "default_limit": 50 }"#).unwrap();

        // Assert
        assert_eq!(config.default_limit, 50);
        assert_eq!(config.id_field, "_id");
        assert_eq!(config.sort_fields, vec!["_id", "created_datetime", "updated_datetime"]);
        assert_eq!(config.default_endpoint, "/");
    }

    #[rstest]
    #[case(None, None, Some(20))]
    #[case(Some(5), None, Some(5))]
    #[case(Some(500), Some(100), Some(100))]
    #[case(Some(0), None, None)]
    fn test_resolve_limit(
        #[case] requested: Option<usize>,
        #[case] max: Option<usize>,
        #[case] expected: Option<usize>,
    ) {
        // Arrange
        let config = PaginationConfig { max_limit: max, ..PaginationConfig::default() };

        // Act & Assert
        assert_eq!(config.resolve_limit(requested).ok(), expected);
    }

    #[rstest]
    #[case(None, Some("_id"))]
    #[case(Some("created_datetime"), Some("created_datetime"))]
    #[case(Some("title"), None)]
    fn test_resolve_sort_uses_allow_list(#[case] requested: Option<&str>, #[case] expected: Option<&str>) {
        // Arrange
        let config = PaginationConfig::default();

        // Act & Assert
        assert_eq!(config.resolve_sort(requested).ok(), expected);
    }

    #[rstest]
    fn test_empty_allow_list_accepts_any_field() {
        // Arrange
        let config = PaginationConfig::builder().sort_fields(Vec::<String>::new()).build();

        // Act & Assert
        assert_eq!(config.resolve_sort(Some("title")).unwrap(), "title");
    }
}
