//! Wire-level protocol types: inbound server events, outbound client events,
//! and the serde models they carry.

pub mod client_events;
pub mod models;
pub mod server_events;
