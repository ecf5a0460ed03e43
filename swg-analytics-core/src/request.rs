//! Analytics request envelope
//!
//! A request pairs the admitted event with a handle to the live context. The
//! context is read when the request is serialized or snapshotted, not when it
//! is built, so mutations made while the request waits in the pipeline are
//! visible when it is sent.

use std::sync::{Arc, RwLock};

use serde::{Serialize, Serializer};

use crate::context::AnalyticsContext;
use crate::error::Result;
use crate::types::{AnalyticsEvent, ClientEvent, EventOriginator, EventParams};

/// Shared handle to the single context of a service
pub type SharedContext = Arc<RwLock<AnalyticsContext>>;

/// Per-event metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEventMeta {
    pub event_originator: EventOriginator,
    pub is_from_user_action: Option<bool>,
}

/// Request handed to the channel for one admitted event
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsRequest {
    event: AnalyticsEvent,
    meta: AnalyticsEventMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<EventParams>,
    #[serde(serialize_with = "serialize_live_context")]
    context: SharedContext,
}

impl AnalyticsRequest {
    /// Build a request for `event`.
    ///
    /// Additional parameters are kept only if they are [`EventParams`].
    pub fn from_client_event(event: &ClientEvent, context: SharedContext) -> Self {
        let params = event
            .additional_parameters
            .as_ref()
            .and_then(|p| p.as_event_params())
            .cloned();

        Self {
            event: event.event_type,
            meta: AnalyticsEventMeta {
                event_originator: event.event_originator,
                is_from_user_action: event.is_from_user_action,
            },
            params,
            context,
        }
    }

    pub fn event(&self) -> AnalyticsEvent {
        self.event
    }

    pub fn meta(&self) -> &AnalyticsEventMeta {
        &self.meta
    }

    pub fn params(&self) -> Option<&EventParams> {
        self.params.as_ref()
    }

    /// Copy of the context as it is right now
    pub fn context(&self) -> AnalyticsContext {
        read_context(&self.context)
    }

    /// Serialize to the JSON wire format, reading the context at this moment
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

pub(crate) fn read_context(context: &SharedContext) -> AnalyticsContext {
    match context.read() {
        Ok(ctx) => ctx.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn serialize_live_context<S: Serializer>(
    context: &SharedContext,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    read_context(context).serialize(serializer)
}
