//! sgtc - terminal admin console for SG shot-timer servers.
//!
//! The server owns the radio, the devices, and the recorded exports; sgtc is
//! a spectator over HTTP and WebSocket. The crate splits along that seam:
//! [`client`] and [`ws`] talk to the server, [`live`] and [`presence`] reduce
//! its event stream into display state, [`store`] keeps that state across
//! restarts, [`history`] pages through recorded sessions, and [`console`]
//! wires it all into the watch-mode event loop.

pub mod client;
pub mod config;
pub mod console;
pub mod history;
pub mod live;
pub mod presence;
pub mod protocol;
pub mod store;
pub mod ws;
