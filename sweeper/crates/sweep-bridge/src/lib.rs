//! Concrete page collaborators over the in-page agent's JSON-RPC socket.
//!
//! The agent runs inside the browser tab next to the strategy tester and
//! relays a small set of DOM operations (list and find controls, set them,
//! click apply, read rendered text) over a newline-delimited JSON Unix socket.
//! [`DomInputDriver`] and [`DomResultReader`] turn those primitives into the
//! `sweep-core` collaborator traits.

pub mod client;
pub mod discover;
pub mod driver;
pub mod error;
pub mod parse;
pub mod reader;
pub mod settings;

pub use client::PageBridgeClient;
pub use discover::{InputInfo, InputKind, starter_parameters, suggest_parameter};
pub use driver::{DomInputDriver, format_value};
pub use error::BridgeError;
pub use parse::parse_metric_text;
pub use reader::{CurrentResults, DomResultReader, Side, Trade};
pub use settings::{BridgeSettings, default_socket_path};

use std::sync::Arc;

/// Driver and reader sharing one connection to the agent.
pub fn connect_page(settings: BridgeSettings) -> (DomInputDriver, DomResultReader) {
    let client = Arc::new(PageBridgeClient::new(
        settings.socket_path.clone(),
        settings.rpc_timeout(),
    ));
    (
        DomInputDriver::new(Arc::clone(&client), settings.clone()),
        DomResultReader::new(client, settings),
    )
}
