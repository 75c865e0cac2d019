//! Collision detection for uploads.
//!
//! Before an upload may overwrite anything, the pipeline asks
//! [`CollisionProbe`] which of its candidate names already exist. The probe
//! answers from [`CollisionCache`] when it can, otherwise looks each name up,
//! treats a mostly-failing batch as a systemic outage, retries it with
//! exponential backoff, and, if the caller allows it, falls back to marking
//! every name as [`CollisionInfo::Degraded`] rather than guessing.

mod cache;
mod probe;
mod types;

#[cfg(test)]
mod tests;

pub use cache::{CacheStats, CollisionCache};
pub use probe::{CollisionLookup, CollisionProbe, ProbeConfig};
pub use types::{CollisionInfo, CollisionMap};
