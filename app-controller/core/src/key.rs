use std::{fmt, str::FromStr};

/// Identifies an application spec whose convergence must be (re-)evaluated.
///
/// A key carries no payload: reconciliation always re-reads current desired
/// and observed state at dequeue time, so a stale key is harmless.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ReconcileKey {
    pub namespace: String,
    pub name: String,
}

/// Indicates a key string that could not be split into namespace and name.
///
/// Requeueing cannot fix a malformed key; callers drop it after logging.
#[derive(Debug, thiserror::Error)]
#[error("malformed reconcile key {0:?}; expected namespace/name")]
pub struct ParseKeyError(String);

// === impl ReconcileKey ===

impl ReconcileKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ReconcileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ReconcileKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(namespace, name))
            }
            _ => Err(ParseKeyError(s.to_string())),
        }
    }
}
