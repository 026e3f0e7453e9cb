//! Three-party replicated secret sharing.
//!
//! The secret `x = x_0 + x_1 + x_2` is split into three additive sub-shares and party `i` holds
//! `(x_i, x_{i+1})` (indices mod 3). Any two parties can reconstruct, and every sub-share is
//! known to exactly two parties, which is what the malicious checks compare.

mod opener;
pub use opener::ReplicatedOpener;

mod share;
pub use share::Rep3Share;

/// Number of parties in replicated sharing.
pub const NUM_PARTIES: usize = 3;
