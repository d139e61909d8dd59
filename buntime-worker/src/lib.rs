//! Worker instance lifecycle: spawning a child process, handshaking its
//! readiness, proxying one request at a time over a framed wire protocol,
//! and retiring it (spec §4.2, §6 "Wire protocol to workers").

mod instance;
mod protocol;
mod state;

pub use instance::{
    ProxyRequest, ProxyResponse, PumpResult, RequestOutcome, WorkerInstance, WsHandshake,
    WsMessage, WsUpgradeRequest,
};
pub use protocol::{WireMessage, WsFrameKind};
pub use state::WorkerState;
