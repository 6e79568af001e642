//! Identifiers for the objects a benchmark run operates on.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use uuid::Uuid;

/// Opaque unique token identifying one benchmarked remote object.
///
/// Ids are random UUIDs. Repositories map them onto their own naming scheme, for example a Fedora 3
/// PID or a Fedora 4 resource path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Creates a new random object id.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Generates `count` pairwise distinct ids, in generation order.
    pub fn generate(count: usize) -> Vec<Self> {
        let mut seen = HashSet::with_capacity(count);
        let mut ids = Vec::with_capacity(count);

        while ids.len() < count {
            let id = Self::random();
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }

        ids
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ObjectId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
