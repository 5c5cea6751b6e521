//! Call-Graph Resolver — budgeted, concurrent CALL-edge discovery
//!
//! For every syntactic call site, the resolver asks a definition provider
//! for the target's definition locations, maps both ends to enclosing FUNC
//! nodes through a per-file range index, and emits coalesced caller→callee
//! edges. Lookups overlap across a bounded pool; passes run under a hard
//! time budget and always leave behind a complete partial result.

pub mod cancel;
pub mod pass;
pub mod provider;
pub mod range_index;


pub use cancel::CancelFlag;
pub use pass::{CallResolver, PendingSite, ResolveOutcome};
pub use provider::DefinitionProvider;
pub use range_index::RangeIndex;
