//! Courier core library — configuration, notification templating, the
//! outbound dispatch queue, session lifecycle, and the HTTP gateway used by
//! the CLI binary.

pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod phone;
pub mod qr;
pub mod queue;
pub mod session;
pub mod template;
pub mod transport;
