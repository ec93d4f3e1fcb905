//! Domain entities and storage ports.

pub mod command;
pub mod ports;
pub mod product;
pub mod sale;
