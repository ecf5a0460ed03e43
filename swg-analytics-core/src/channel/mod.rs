//! Channel to the remote logging frontend
//!
//! The analytics service never talks to the network directly. It opens a
//! port through [`ActivityPorts`], waits for the far end to report ready, and
//! then sends one [`AnalyticsRequest`] per admitted event. Inbound messages
//! arrive through [`ActivityPort::on_message`].
//!
//! ## Usage
//!
//! The bundled [`HttpChannel`] speaks to the frontend over HTTP. Point it at a
//! frontend in `~/.config/swg-analytics/config.toml`:
//!
//! ```toml
//! [runtime]
//! publication_id = "pub1"
//! frontend_url = "https://news.google.com"
//!
//! [channel]
//! timeout_secs = 30
//! max_retries = 3
//! ```

mod http;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::request::AnalyticsRequest;

pub use http::HttpChannel;

/// Callback receiving inbound messages from the far end
pub type MessageCallback = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Path of the logging frame on the frontend
pub const SERVICE_FRAME_PATH: &str = "/serviceiframe";

/// Hidden surface the channel is attached to.
///
/// In a browser this is an `<iframe>` with `display: none`. Other transports
/// only use it to identify the owning service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFrame {
    name: String,
    hidden: bool,
}

impl ServiceFrame {
    /// A hidden frame named after the publication it logs for
    pub fn hidden(publication_id: &str) -> Self {
        Self {
            name: format!("swg-analytics-{}", publication_id),
            hidden: true,
        }
    }

    pub fn node_name(&self) -> &'static str {
        "IFRAME"
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display(&self) -> &'static str {
        if self.hidden {
            "none"
        } else {
            "block"
        }
    }
}

/// Opens ports to the frontend
#[async_trait]
pub trait ActivityPorts: Send + Sync {
    /// Open a port for `frame` at `url`, passing `args` to the far end
    async fn open(
        &self,
        frame: &ServiceFrame,
        url: &str,
        args: &serde_json::Value,
    ) -> Result<Arc<dyn ActivityPort>>;
}

/// One open connection to the frontend
#[async_trait]
pub trait ActivityPort: Send + Sync {
    /// Resolves once the far end is live
    async fn when_ready(&self) -> Result<()>;

    /// Send one request
    async fn execute(&self, request: &AnalyticsRequest) -> Result<()>;

    /// Register a callback for every inbound message
    fn on_message(&self, callback: MessageCallback);
}

/// Full URL of a frontend path
pub fn frontend_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Arguments passed to the frontend frame
pub fn frontend_args(publication_id: &str) -> serde_json::Value {
    serde_json::json!({
        "_client": format!("SwG {}", env!("CARGO_PKG_VERSION")),
        "publicationId": publication_id,
    })
}
