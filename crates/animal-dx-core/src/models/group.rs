//! Typed key for a (species, syndrome) model group.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Syndrome;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub species: String,
    pub syndrome: Syndrome,
}

impl GroupKey {
    pub fn new(species: impl Into<String>, syndrome: Syndrome) -> Self {
        Self {
            species: species.into(),
            syndrome,
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.species, self.syndrome)
    }
}
