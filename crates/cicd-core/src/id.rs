//! Build identifiers.

use derive_more::Display;
use uuid::Uuid;

/// Identifies one build request in logs.
/// Uses UUIDv7 so identifiers sort by arrival time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("{_0}")]
pub struct BuildId(Uuid);

impl BuildId {
    /// Create a new unique BuildId.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BuildId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_v7() {
        let a = BuildId::new();
        let b = BuildId::new();
        assert_ne!(a, b);

        let text = a.to_string();
        assert_eq!(text.len(), 36);
        assert_eq!(text.chars().nth(14), Some('7'));
    }
}
