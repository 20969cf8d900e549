//! WebSocket hub: connections, fan-out, role tracking, sessions.

pub mod broadcast;
pub mod connection;
pub mod roles;
pub mod session;
