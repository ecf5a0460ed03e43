//! Core domain types for swg-analytics
//!
//! These types describe what flows over the client event bus and what ends up
//! inside an analytics request. Numeric codes mirror the widget's message
//! definitions so that payloads stay compatible with the logging frontend.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Originator** | Which subsystem produced an event (core client, core server, publisher code) |
//! | **Admission** | Deciding whether an event is eligible for transmission |
//! | **Channel** | The cross-origin surface used to deliver requests to the logging endpoint |
//! | **Context** | Mutable per-session metadata attached to every outgoing request |

use serde::{Deserialize, Serialize};

// ============================================
// Event types
// ============================================

/// Analytics event type.
///
/// Unknown codes collapse to [`AnalyticsEvent::Unknown`] when decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", from = "i32")]
pub enum AnalyticsEvent {
    Unknown,
    ImpressionPaywall,
    ImpressionAd,
    ImpressionOffers,
    ImpressionSubscribeButton,
    ImpressionSmartbox,
    ActionSubscribe,
    ActionPaymentComplete,
    ActionAccountCreated,
    ActionAccountAcknowledged,
    ActionSubscriptionsLandingPage,
    ActionPaymentFlowStarted,
    ActionOfferSelected,
    EventPaymentFailed,
    EventCustom,
    EventConfirmTxId,
    EventChangedTxId,
    EventGpayNoTxId,
    EventGpayCannotConfirmTxId,
    /// Host-internal entitlement signal; never forwarded.
    EventSubscriptionState,
}

impl AnalyticsEvent {
    /// Wire code for this event type
    pub fn code(&self) -> i32 {
        match self {
            AnalyticsEvent::Unknown => 0,
            AnalyticsEvent::ImpressionPaywall => 1,
            AnalyticsEvent::ImpressionAd => 2,
            AnalyticsEvent::ImpressionOffers => 3,
            AnalyticsEvent::ImpressionSubscribeButton => 4,
            AnalyticsEvent::ImpressionSmartbox => 5,
            AnalyticsEvent::ActionSubscribe => 1000,
            AnalyticsEvent::ActionPaymentComplete => 1001,
            AnalyticsEvent::ActionAccountCreated => 1002,
            AnalyticsEvent::ActionAccountAcknowledged => 1003,
            AnalyticsEvent::ActionSubscriptionsLandingPage => 1004,
            AnalyticsEvent::ActionPaymentFlowStarted => 1005,
            AnalyticsEvent::ActionOfferSelected => 1006,
            AnalyticsEvent::EventPaymentFailed => 2000,
            AnalyticsEvent::EventCustom => 3000,
            AnalyticsEvent::EventConfirmTxId => 3001,
            AnalyticsEvent::EventChangedTxId => 3002,
            AnalyticsEvent::EventGpayNoTxId => 3003,
            AnalyticsEvent::EventGpayCannotConfirmTxId => 3004,
            AnalyticsEvent::EventSubscriptionState => 4000,
        }
    }
}

impl From<i32> for AnalyticsEvent {
    fn from(code: i32) -> Self {
        match code {
            1 => AnalyticsEvent::ImpressionPaywall,
            2 => AnalyticsEvent::ImpressionAd,
            3 => AnalyticsEvent::ImpressionOffers,
            4 => AnalyticsEvent::ImpressionSubscribeButton,
            5 => AnalyticsEvent::ImpressionSmartbox,
            1000 => AnalyticsEvent::ActionSubscribe,
            1001 => AnalyticsEvent::ActionPaymentComplete,
            1002 => AnalyticsEvent::ActionAccountCreated,
            1003 => AnalyticsEvent::ActionAccountAcknowledged,
            1004 => AnalyticsEvent::ActionSubscriptionsLandingPage,
            1005 => AnalyticsEvent::ActionPaymentFlowStarted,
            1006 => AnalyticsEvent::ActionOfferSelected,
            2000 => AnalyticsEvent::EventPaymentFailed,
            3000 => AnalyticsEvent::EventCustom,
            3001 => AnalyticsEvent::EventConfirmTxId,
            3002 => AnalyticsEvent::EventChangedTxId,
            3003 => AnalyticsEvent::EventGpayNoTxId,
            3004 => AnalyticsEvent::EventGpayCannotConfirmTxId,
            4000 => AnalyticsEvent::EventSubscriptionState,
            _ => AnalyticsEvent::Unknown,
        }
    }
}

impl From<AnalyticsEvent> for i32 {
    fn from(event: AnalyticsEvent) -> Self {
        event.code()
    }
}

// ============================================
// Originators
// ============================================

/// Subsystem that produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", from = "i32")]
pub enum EventOriginator {
    UnknownClient,
    SwgClient,
    AmpClient,
    PropensityClient,
    SwgServer,
    PublisherClient,
}

impl EventOriginator {
    /// Wire code for this originator
    pub fn code(&self) -> i32 {
        match self {
            EventOriginator::UnknownClient => 0,
            EventOriginator::SwgClient => 1,
            EventOriginator::AmpClient => 2,
            EventOriginator::PropensityClient => 3,
            EventOriginator::SwgServer => 4,
            EventOriginator::PublisherClient => 5,
        }
    }

    /// Publisher-side originators are only logged when the runtime allows it.
    pub fn is_publisher(&self) -> bool {
        matches!(
            self,
            EventOriginator::AmpClient
                | EventOriginator::PropensityClient
                | EventOriginator::PublisherClient
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventOriginator::UnknownClient => "unknown_client",
            EventOriginator::SwgClient => "swg_client",
            EventOriginator::AmpClient => "amp_client",
            EventOriginator::PropensityClient => "propensity_client",
            EventOriginator::SwgServer => "swg_server",
            EventOriginator::PublisherClient => "publisher_client",
        }
    }
}

impl From<i32> for EventOriginator {
    fn from(code: i32) -> Self {
        match code {
            1 => EventOriginator::SwgClient,
            2 => EventOriginator::AmpClient,
            3 => EventOriginator::PropensityClient,
            4 => EventOriginator::SwgServer,
            5 => EventOriginator::PublisherClient,
            _ => EventOriginator::UnknownClient,
        }
    }
}

impl From<EventOriginator> for i32 {
    fn from(originator: EventOriginator) -> Self {
        originator.code()
    }
}

// ============================================
// Event parameters
// ============================================

/// Structured additional parameters understood by the logging frontend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EventParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smartbox_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpay_transaction_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub had_logged: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
}

/// Additional parameters attached to a client event.
///
/// Only [`AdditionalParameters::Params`] is carried into an analytics
/// request. Anything else is kept so the host can still inspect it, but it is
/// dropped at request construction.
///
/// On the JSON side, `{"eventParams": {...}}` decodes to `Params` when the
/// inner object is a valid [`EventParams`]; every other value decodes to
/// `Other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum AdditionalParameters {
    Params(EventParams),
    Other(serde_json::Value),
}

impl AdditionalParameters {
    /// Returns the structured parameters, if that is what these are
    pub fn as_event_params(&self) -> Option<&EventParams> {
        match self {
            AdditionalParameters::Params(params) => Some(params),
            AdditionalParameters::Other(_) => None,
        }
    }
}

impl From<EventParams> for AdditionalParameters {
    fn from(params: EventParams) -> Self {
        AdditionalParameters::Params(params)
    }
}

impl From<serde_json::Value> for AdditionalParameters {
    fn from(value: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = &value {
            if map.len() == 1 {
                if let Some(inner) = map.get("eventParams") {
                    if let Ok(params) = serde_json::from_value::<EventParams>(inner.clone()) {
                        return AdditionalParameters::Params(params);
                    }
                }
            }
        }
        AdditionalParameters::Other(value)
    }
}

impl From<AdditionalParameters> for serde_json::Value {
    fn from(params: AdditionalParameters) -> Self {
        match params {
            AdditionalParameters::Params(params) => serde_json::json!({ "eventParams": params }),
            AdditionalParameters::Other(value) => value,
        }
    }
}

// ============================================
// Client events
// ============================================

/// An event published on the client event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEvent {
    pub event_type: AnalyticsEvent,
    pub event_originator: EventOriginator,
    #[serde(default)]
    pub is_from_user_action: Option<bool>,
    #[serde(default)]
    pub additional_parameters: Option<AdditionalParameters>,
}

impl ClientEvent {
    /// Event with no user-action flag and no additional parameters
    pub fn new(event_type: AnalyticsEvent, event_originator: EventOriginator) -> Self {
        Self {
            event_type,
            event_originator,
            is_from_user_action: None,
            additional_parameters: None,
        }
    }

    pub fn with_user_action(mut self, is_from_user_action: bool) -> Self {
        self.is_from_user_action = Some(is_from_user_action);
        self
    }

    pub fn with_additional_parameters(mut self, params: impl Into<AdditionalParameters>) -> Self {
        self.additional_parameters = Some(params.into());
        self
    }
}
