//! Canonical graph model.
//!
//! Everything the exporter writes is expressed in these types, independent of both the source
//! wire format and the graph store:
//!
//! ```text
//! raw records ──► normalize ──► NodeRecord ─┐
//!                                           ├──► loader ──► GraphStore
//! relations ───► resolve ───► EdgeRecord ───┘
//! ```
//!
//! ## Modules
//!
//! - [`models`]: node/edge records, keys, property bags and run identifiers

pub mod models;

pub use models::*;
