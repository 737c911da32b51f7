//! Boards for apparel sourcing: samples, tasks and range plans, with
//! optimistic drag-and-drop reordering over a pluggable card store.

pub mod board;
pub mod config;
pub mod notify;
