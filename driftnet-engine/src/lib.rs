//! The driftnet node engine: discovery, peer lifecycle, and group messaging
//! (§4.2–§4.5). Applications depend on this crate and `driftnet-api`.

pub mod beacon;
pub mod engine;
pub mod group;
pub mod peer;

pub use engine::spawn;

/// The error surfaced by a failed `START` (§7). Defined in `driftnet-api`
/// alongside [`driftnet_api::Command::Start`]'s reply type, since the
/// command enum itself cannot depend on this crate without a cycle; this
/// alias keeps the name applications actually reach for.
pub type EngineStartError = driftnet_api::StartError;
