//! Gateway: HTTP control plane for the dispatch service.
//!
//! One port serves the health probe, session status and QR, and the
//! queueing endpoints. Queueing endpoints acknowledge acceptance only;
//! delivery happens asynchronously through the drain loop.

mod protocol;
mod server;

pub use protocol::{BulkItem, EnqueueAck, SendBulkRequest, SendEventRequest, SendTaskRequest};
pub use server::{build_router, run_gateway, serve, GatewayState};
