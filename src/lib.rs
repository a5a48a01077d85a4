// viewstream - live, filterable streams and webhook triggers over an
// upstream database changefeed.

pub mod cache;
pub mod error;
pub mod expr;
pub mod protocol;
pub mod schema;
pub mod server;
pub mod source;
pub mod transport;
pub mod trigger;
pub mod value;
pub mod view;

pub use error::{Result, ViewstreamError};

use serde::Deserialize;

/// Process configuration, loaded from the environment (`VIEWSTREAM_*`
/// variables) via `envy`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// `host:port` of the upstream changefeed server.
    pub upstream_addr: String,
    /// Path to the schema YAML document (SPEC_FULL.md §4.8).
    pub schema_path: String,
    /// Address this process's GraphQL/WebSocket transport binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        envy::prefixed("VIEWSTREAM_")
            .from_env::<Config>()
            .map_err(|e| ViewstreamError::Config(e.to_string()))
    }
}
