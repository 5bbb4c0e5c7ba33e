//! Display name resolution for announcements

use crate::notify::DisplayNameResolver;
use crate::types::UserId;
use async_trait::async_trait;
use std::collections::HashMap;

/// Resolver backed by a fixed map; unknown players are shown by their user id
#[derive(Debug, Clone, Default)]
pub struct StaticDisplayNames {
    names: HashMap<UserId, String>,
}

impl StaticDisplayNames {
    pub fn new(names: HashMap<UserId, String>) -> Self {
        Self { names }
    }

    pub fn insert(&mut self, user_id: impl Into<UserId>, name: impl Into<String>) {
        self.names.insert(user_id.into(), name.into());
    }
}

#[async_trait]
impl DisplayNameResolver for StaticDisplayNames {
    async fn resolve_display_name(&self, user_id: &str) -> String {
        self.names
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| user_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_known_and_fallback_names() {
        let mut names = StaticDisplayNames::default();
        names.insert("1234", "Alice");

        assert_eq!(names.resolve_display_name("1234").await, "Alice");
        assert_eq!(names.resolve_display_name("5678").await, "5678");
    }
}
