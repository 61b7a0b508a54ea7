//! Content addresses for activity calls.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha512};

/// Stable identifier of one logical activity call.
///
/// The key is the hex SHA-512 of the JSON object
/// `{"name": .., "version": .., "input": <JSON string of the args>}`.
/// The same program asking for the same activity with the same arguments
/// always lands on the same key, which is what lets a replayed pass find the
/// record of a call made by an earlier pass. It doubles as the `activityId`
/// of the schedule decision.
///
/// ```
/// use serde_json::json;
/// use swfr::CallKey;
///
/// let a = CallKey::compute("noop", "1.0", &json!([5]));
/// let b = CallKey::compute("noop", "1.0", &json!([5]));
/// assert_eq!(a, b);
/// assert_eq!(a.as_str().len(), 128);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallKey(String);

impl CallKey {
    /// Compute the key for a call of `name@version` with positional `args`.
    pub fn compute(name: &str, version: &str, args: &Value) -> Self {
        // Field order is part of the hash input.
        let material = format!(
            r#"{{"name":{},"version":{},"input":{}}}"#,
            Value::from(name),
            Value::from(version),
            Value::String(args.to_string()),
        );
        Self(format!("{:x}", Sha512::digest(material.as_bytes())))
    }

    /// Wrap a key read back from history.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the hex digest.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for CallKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}
