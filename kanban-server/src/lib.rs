//! Kanban board server library.
//!
//! Exposes the server for use in tests and embedding. Tasks live in three
//! fixed columns per project; every move or delete keeps the positions in
//! each column contiguous, and changes are pushed live to every client
//! viewing the project.

pub mod api;
pub mod config;
pub mod notify;
pub mod reorder;
pub mod rooms;
pub mod server;
pub mod service;
pub mod store;
pub mod ws;
