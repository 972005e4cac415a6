//! Account resource as exposed by the resource server

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Snapshot of one remote account
///
/// `counter` is only ever changed by the server; every update request
/// increments it by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    /// Identifier chosen by the worker
    pub id: Uuid,
    /// Server-side counter, incremented by each update
    pub counter: u32,
}

impl Account {
    pub fn new(id: Uuid, counter: u32) -> Self {
        Self { id, counter }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_wire_shape() {
        let id = Uuid::parse_str("6f1c2f5e-7f0b-4b8e-9a55-2a0b8c1d9e01").expect("uuid");
        let json = serde_json::to_value(Account::new(id, 3)).expect("serialize");

        assert_eq!(json, serde_json::json!({
            "id": "6f1c2f5e-7f0b-4b8e-9a55-2a0b8c1d9e01",
            "counter": 3
        }));
    }

    #[test]
    fn test_account_rejects_negative_counter() {
        let result: Result<Account, _> = serde_json::from_str(
            r#"{"id":"6f1c2f5e-7f0b-4b8e-9a55-2a0b8c1d9e01","counter":-1}"#,
        );
        assert!(result.is_err());
    }
}
