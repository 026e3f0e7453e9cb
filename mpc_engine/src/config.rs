use std::{fs::File, io::BufReader, io, path::Path};

use serde::{Deserialize, Serialize};

/// How 3-party replicated openings are protected against a malicious party.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicatedCheck {
    /// No verification, secure against passive adversaries only.
    SemiHonest,
    /// Running hash of opened values, compared across parties at check time.
    Hash,
    /// Every sub-share is received twice and compared when the opening is finalized.
    Communication,
}

/// Tunable parameters of the protocol layer.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Number of pending MAC-checked openings after which a check runs automatically.
    pub check_threshold: usize,
    /// Pending checks below this count are verified one by one instead of by a random
    /// linear combination.
    pub small_check_threshold: usize,
    /// Degree of Shamir sharing polynomials, `(n - 1) / 2` if unset.
    pub shamir_threshold: Option<usize>,
    /// Verify Shamir openings with redundant interpolations.
    pub malicious_shamir: bool,
    pub replicated_check: ReplicatedCheck,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            check_threshold: 1_000_000,
            small_check_threshold: 10,
            shamir_threshold: None,
            malicious_shamir: true,
            replicated_check: ReplicatedCheck::Hash,
        }
    }
}

impl ProtocolConfig {
    /// Load configuration from JSON file. Missing fields take their default values.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Shamir threshold to use with `num_parties` parties.
    pub fn shamir_threshold_for(&self, num_parties: usize) -> usize {
        self.shamir_threshold
            .unwrap_or(num_parties.saturating_sub(1) / 2)
    }
}
