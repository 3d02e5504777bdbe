//! Language Server Protocol wire layer
//!
//! - **Framing**: LSP message framing (Content-Length headers)
//! - **Protocol**: JSON-RPC 2.0 envelopes and inbound message decoding
//! - **Utilities**: outbound response/notification builders
//! - **Errors**: handler failures and their JSON-RPC error codes

pub mod error;
pub mod framing;
pub mod jsonrpc_utils;
pub mod protocol;

pub use error::LspError;
pub use framing::LspFraming;
pub use protocol::{IncomingMessage, JsonRpcErrorCode};
