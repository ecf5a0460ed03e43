//! # swg-analytics-core
//!
//! Core library for swg-analytics - the analytics relay of a publisher-embedded
//! subscription widget.
//!
//! This library provides:
//! - Domain types for client events, originators and event parameters
//! - The request context and its enrichment from the page
//! - An in-process client event bus
//! - The channel abstraction plus an HTTP implementation
//! - The analytics service that filters, enriches and forwards events
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Events flow through three stages:
//! - **Capture:** host code publishes a [`ClientEvent`] on the [`ClientEventManager`]
//! - **Admission & enrichment:** the [`AnalyticsService`] drops ineligible events and
//!   wraps the rest in an [`AnalyticsRequest`] bound to the live [`AnalyticsContext`]
//! - **Transmission:** a single FIFO worker opens the channel once and sends requests in order
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use swg_analytics_core::{
//!     AnalyticsEvent, AnalyticsService, ClientEvent, ClientEventManager, Config,
//!     EventOriginator, HttpChannel, PageEnvironment,
//! };
//!
//! # async fn run() -> swg_analytics_core::Result<()> {
//! let config = Config::load()?;
//! let events = ClientEventManager::new();
//! let channel = Arc::new(HttpChannel::new(config.channel.clone())?);
//! let service = AnalyticsService::new(
//!     &config.runtime,
//!     &PageEnvironment::new("https://example.com/article", "?utm_source=news"),
//!     channel,
//!     &events,
//! );
//!
//! events.log_event(&ClientEvent::new(
//!     AnalyticsEvent::ImpressionPaywall,
//!     EventOriginator::SwgClient,
//! ));
//! service.flush().await;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use channel::{ActivityPort, ActivityPorts, HttpChannel, MessageCallback, ServiceFrame};
pub use config::Config;
pub use context::{AnalyticsContext, PageEnvironment};
pub use error::{Error, Result};
pub use events::{ClientEventListener, ClientEventManager};
pub use experiments::ExperimentStore;
pub use request::{AnalyticsEventMeta, AnalyticsRequest};
pub use service::{AnalyticsService, Dispatch, DispatchStats};
pub use types::*;

// Public modules
pub mod channel;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod experiments;
pub mod logging;
pub mod request;
pub mod service;
pub mod types;
