//! Dataset partitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Training or evaluation split
///
/// Each partition owns its own storage root and its own quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Train,
    Eval,
}

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::Train, Partition::Eval];

    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Train => "train",
            Partition::Eval => "eval",
        }
    }

    /// Storage root of this partition under the images directory
    pub fn images_dir(&self, images_root: &Path) -> PathBuf {
        images_root.join(self.as_str())
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Partition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" | "training" => Ok(Partition::Train),
            "eval" | "test" | "evaluation" => Ok(Partition::Eval),
            other => Err(format!("Unknown partition '{}' (expected train or eval)", other)),
        }
    }
}
