//! Shared data model and real-time wire protocol for the kanban board.
//!
//! The REST layer and the WebSocket layer of `kanban-server` speak the types
//! defined here; browser clients see them as camelCase JSON.

pub mod board;
pub mod codec;
pub mod event;
pub mod ids;
pub mod notification;
pub mod request;
