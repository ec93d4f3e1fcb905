//! Boundary adapters: wire-shaped request/response types and the CSV
//! replay format used by the binary.

pub mod api;
pub mod csv;
