//! Additive secret sharing with information-theoretic MACs (SPDZ).

mod mac_check;
pub use mac_check::{MacCheck, PendingChecks};

mod share;
pub use share::SpdzShare;
