pub mod event_reader;
pub mod inventory_writer;
