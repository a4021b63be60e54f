#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Concrete `Extract` collaborators exercised by the batch engine: a DIMACS
//! CNF base-feature extractor and a content-hash identifier. These are
//! "external" per the engine's own contract — the engine only ever calls
//! through `gbd_core::Extract` — but a complete repo of this shape needs at
//! least one real collaborator to exercise the pool end-to-end.

pub mod cnf;
pub mod identify;

pub use cnf::BaseFeatures;
pub use identify::content_hash;
