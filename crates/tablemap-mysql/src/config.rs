//! MySQL rendering configuration.

/// Options that change the SQL rendered for MySQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MySqlConfig {
    /// Schema searched by table-exists checks (`DATABASE()` when unset)
    pub database: Option<String>,
    /// Storage engine of created tables (default: InnoDB)
    pub engine: String,
    /// Default character set of created tables (default: utf8mb4)
    pub charset: String,
    /// Join non-nullable foreign-key links with `INNER JOIN`
    pub inner_join_required_links: bool,
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            database: None,
            engine: "InnoDB".to_string(),
            charset: "utf8mb4".to_string(),
            inner_join_required_links: false,
        }
    }
}

impl MySqlConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database searched by table-exists checks.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the storage engine.
    pub fn engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    /// Set the character set.
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    /// Render non-nullable links as inner joins.
    pub fn inner_join_required_links(mut self, enabled: bool) -> Self {
        self.inner_join_required_links = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MySqlConfig::new();
        assert_eq!(config.engine, "InnoDB");
        assert_eq!(config.charset, "utf8mb4");
        assert!(config.database.is_none());
        assert!(!config.inner_join_required_links);
    }

    #[test]
    fn test_builder() {
        let config = MySqlConfig::new()
            .database("zoo")
            .engine("MyISAM")
            .charset("latin1")
            .inner_join_required_links(true);
        assert_eq!(config.database.as_deref(), Some("zoo"));
        assert_eq!(config.engine, "MyISAM");
        assert_eq!(config.charset, "latin1");
        assert!(config.inner_join_required_links);
    }
}
