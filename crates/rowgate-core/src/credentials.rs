use md5::{Digest, Md5};
use serde_json::Value;

use crate::params::{coerce_i64, ParamBag};

/// Column names the credential lookup descriptors are contracted to return.
pub const USER_ID_COLUMN: &str = "UserID";
pub const USER_NAME_COLUMN: &str = "UserName";
pub const PASSWORD_COLUMN: &str = "Password";
pub const SALT_COLUMN: &str = "Salt";

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Verified identity extracted from a credential lookup row.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub user_id: i64,
    pub user_name: String,
}

impl Identity {
    /// Extract identity fields from a result row, tolerating the id
    /// arriving as a float, an integer, or a numeric string. Missing
    /// fields fall back to zero / empty.
    pub fn from_row(row: &ParamBag) -> Self {
        let user_id = row.get(USER_ID_COLUMN).and_then(coerce_i64).unwrap_or(0);
        let user_name = row
            .get(USER_NAME_COLUMN)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self { user_id, user_name }
    }
}

// ---------------------------------------------------------------------------
// Password digest
// ---------------------------------------------------------------------------

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Stored digest scheme: `md5(md5(loginName + password) + salt)`,
/// lowercase hex at both rounds.
pub fn password_digest(login_name: &str, password: &str, salt: &str) -> String {
    let inner = md5_hex(&format!("{login_name}{password}"));
    md5_hex(&format!("{inner}{salt}"))
}

/// Compare a caller-supplied credential against the stored digest.
pub fn verify_password(login_name: &str, password: &str, stored: &str, salt: &str) -> bool {
    password_digest(login_name, password, salt) == stored
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
