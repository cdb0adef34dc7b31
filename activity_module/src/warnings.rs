//! Acknowledgement-gated warnings for destructive automated actions.
//!
//! A warning is keyed by a string embedding the affected record ids. The
//! first time an action hits the gate it fails with the warning; once the
//! key is acknowledged the same action proceeds silently.

use std::fmt;

use crate::store::{ProjectStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserWarning {
    pub key: String,
    pub message: String,
}

impl fmt::Display for UserWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Returns the pending warning unless its key has been acknowledged.
pub fn check(
    store: &ProjectStore,
    key: &str,
    message: &str,
) -> Result<Option<UserWarning>, StoreError> {
    if store.warning_acknowledged(key)? {
        return Ok(None);
    }
    Ok(Some(UserWarning {
        key: key.to_string(),
        message: message.to_string(),
    }))
}

/// Record a user's acknowledgement so the keyed action can proceed.
pub fn acknowledge(store: &ProjectStore, key: &str) -> Result<(), StoreError> {
    store.acknowledge_warning(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn warning_fires_once_until_acknowledged() {
        let temp = TempDir::new().expect("tempdir");
        let store = ProjectStore::new(temp.path().join("project.db")).expect("store");

        let pending = check(&store, "delete_line_7", "line 7 will be deleted").expect("check");
        assert!(pending.is_some());

        acknowledge(&store, "delete_line_7").expect("acknowledge");
        let pending = check(&store, "delete_line_7", "line 7 will be deleted").expect("check");
        assert!(pending.is_none());

        // Other keys stay gated.
        assert!(check(&store, "delete_line_8", "line 8").expect("check").is_some());
    }
}
