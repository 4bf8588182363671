use std::collections::HashSet;

#[derive(Clone, Debug, Default)]
pub struct QueryConfig {
    pub enabled_queries: HashSet<String>,
}

impl QueryConfig {
    /// Create an empty config
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable queries by name
    #[must_use]
    pub fn with_enabled(mut self, queries: &[String]) -> Self {
        self.enabled_queries = queries.iter().cloned().collect();
        self
    }

    /// Check if a query is enabled
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled_queries.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_enables_nothing() {
        let config = QueryConfig::new();
        assert!(!config.is_enabled("connections"));
    }

    #[test]
    fn test_with_enabled() {
        let config = QueryConfig::new().with_enabled(&["memory".to_string()]);
        assert!(config.is_enabled("memory"));
        assert!(!config.is_enabled("connections"));
    }
}
