//! Domain model: identifiers, licenses, usage records, audit entries.

pub mod audit;
pub mod keys;
pub mod license;
pub mod usage;
