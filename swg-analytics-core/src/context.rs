//! Request context attached to every analytics request
//!
//! One [`AnalyticsContext`] exists per service. It is created once, mutated in
//! place, and read when a request is actually sent.

use std::collections::HashMap;

use reqwest::Url;
use serde::Serialize;

use crate::error::{Error, Result};

/// Page facts the context is derived from.
///
/// Supplied by the host once, at service construction.
#[derive(Debug, Clone, Default)]
pub struct PageEnvironment {
    /// `document.referrer`-style full URL of the referring page
    pub referrer: String,
    /// Navigation query string, with or without the leading `?`
    pub query_string: String,
}

impl PageEnvironment {
    pub fn new(referrer: impl Into<String>, query_string: impl Into<String>) -> Self {
        Self {
            referrer: referrer.into(),
            query_string: query_string.into(),
        }
    }
}

/// Mutable per-session metadata sent along with every request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsContext {
    transaction_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    referring_origin: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    utm_source: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    utm_medium: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    utm_campaign: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    sku: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    ready_to_pay: Option<bool>,

    label_list: Vec<String>,
}

impl AnalyticsContext {
    /// Build a context for the given page with a fresh transaction id
    pub fn new(page: &PageEnvironment) -> Self {
        let utm = parse_query_string(&page.query_string);

        Self {
            transaction_id: generate_transaction_id(),
            referring_origin: referring_origin(&page.referrer),
            utm_source: utm.get("utm_source").cloned(),
            utm_medium: utm.get("utm_medium").cloned(),
            utm_campaign: utm.get("utm_campaign").cloned(),
            sku: None,
            ready_to_pay: None,
            label_list: Vec::new(),
        }
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    /// Replace the transaction id. Rejects anything not shaped 8-4-4-4-12 hex.
    pub fn set_transaction_id(&mut self, transaction_id: impl Into<String>) -> Result<()> {
        let transaction_id = transaction_id.into();
        if !is_valid_transaction_id(&transaction_id) {
            return Err(Error::InvalidTransactionId(transaction_id));
        }
        self.transaction_id = transaction_id;
        Ok(())
    }

    pub fn referring_origin(&self) -> Option<&str> {
        self.referring_origin.as_deref()
    }

    pub fn utm_source(&self) -> Option<&str> {
        self.utm_source.as_deref()
    }

    pub fn utm_medium(&self) -> Option<&str> {
        self.utm_medium.as_deref()
    }

    pub fn utm_campaign(&self) -> Option<&str> {
        self.utm_campaign.as_deref()
    }

    pub fn sku(&self) -> Option<&str> {
        self.sku.as_deref()
    }

    pub fn set_sku(&mut self, sku: impl Into<String>) {
        self.sku = Some(sku.into());
    }

    pub fn ready_to_pay(&self) -> Option<bool> {
        self.ready_to_pay
    }

    pub fn set_ready_to_pay(&mut self, ready_to_pay: bool) {
        self.ready_to_pay = Some(ready_to_pay);
    }

    pub fn label_list(&self) -> &[String] {
        &self.label_list
    }

    /// Append labels not already present, keeping first-seen order.
    ///
    /// Returns how many labels were actually added.
    pub fn add_labels<I, S>(&mut self, labels: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let before = self.label_list.len();
        for label in labels {
            let label = label.as_ref();
            if !self.label_list.iter().any(|existing| existing == label) {
                self.label_list.push(label.to_string());
            }
        }
        self.label_list.len() - before
    }
}

/// Generate a random transaction id shaped `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`
pub fn generate_transaction_id() -> String {
    uuid::Uuid::new_v4().hyphenated().to_string()
}

/// Check the 8-4-4-4-12 hex-group shape
pub fn is_valid_transaction_id(value: &str) -> bool {
    const GROUPS: [usize; 5] = [8, 4, 4, 4, 12];

    let parts: Vec<&str> = value.split('-').collect();
    parts.len() == GROUPS.len()
        && parts
            .iter()
            .zip(GROUPS)
            .all(|(part, len)| part.len() == len && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Reduce a referrer URL to its origin (`scheme://host[:port]`)
fn referring_origin(referrer: &str) -> Option<String> {
    let url = Url::parse(referrer.trim()).ok()?;
    let origin = url.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

/// Parse `a=1&b=2` (optionally prefixed with `?`) into a map.
///
/// Values are percent-decoded with `+` treated as a space. The first
/// occurrence of a key wins.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    let query = query.trim().trim_start_matches('?');
    let mut params = HashMap::new();

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let (Some(key), Some(value)) = (decode_component(key), decode_component(value)) else {
            tracing::debug!(pair = %pair, "Skipping undecodable query parameter");
            continue;
        };
        params.entry(key).or_insert(value);
    }

    params
}

fn decode_component(raw: &str) -> Option<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).ok().map(|s| s.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenic_page() -> PageEnvironment {
        PageEnvironment::new(
            "https://scenic-2017.appspot.com/landing.html",
            "?utm_source=scenic&utm_medium=email&utm_campaign=campaign",
        )
    }

    #[test]
    fn test_generated_transaction_ids_are_valid() {
        for _ in 0..100 {
            let id = generate_transaction_id();
            assert!(is_valid_transaction_id(&id), "bad id: {}", id);
        }
    }

    #[test]
    fn test_transaction_id_validation() {
        assert!(is_valid_transaction_id("550e8400-e29b-41d4-a716-446655440000"));
        assert!(is_valid_transaction_id("ABCDEF01-2345-6789-abcd-ef0123456789"));
        assert!(!is_valid_transaction_id("tx-id-101"));
        assert!(!is_valid_transaction_id("550e8400e29b41d4a716446655440000"));
        assert!(!is_valid_transaction_id("550e8400-e29b-41d4-a716-44665544000g"));
        assert!(!is_valid_transaction_id(""));
    }

    #[test]
    fn test_set_transaction_id() {
        let mut ctx = AnalyticsContext::new(&PageEnvironment::default());
        let original = ctx.transaction_id().to_string();

        assert!(ctx.set_transaction_id("tx-id-101").is_err());
        assert_eq!(ctx.transaction_id(), original);

        ctx.set_transaction_id("11111111-2222-3333-4444-555555555555").unwrap();
        assert_eq!(ctx.transaction_id(), "11111111-2222-3333-4444-555555555555");
    }

    #[test]
    fn test_context_from_page() {
        let ctx = AnalyticsContext::new(&scenic_page());
        assert_eq!(ctx.referring_origin(), Some("https://scenic-2017.appspot.com"));
        assert_eq!(ctx.utm_source(), Some("scenic"));
        assert_eq!(ctx.utm_medium(), Some("email"));
        assert_eq!(ctx.utm_campaign(), Some("campaign"));
        assert!(ctx.sku().is_none());
        assert!(ctx.ready_to_pay().is_none());
        assert!(ctx.label_list().is_empty());
    }

    #[test]
    fn test_missing_page_data() {
        let ctx = AnalyticsContext::new(&PageEnvironment::new("", "?utm_source=only"));
        assert!(ctx.referring_origin().is_none());
        assert_eq!(ctx.utm_source(), Some("only"));
        assert!(ctx.utm_medium().is_none());
        assert!(ctx.utm_campaign().is_none());
    }

    #[test]
    fn test_referrer_with_port() {
        assert_eq!(
            referring_origin("http://localhost:8000/a/b?c=d"),
            Some("http://localhost:8000".to_string())
        );
        assert_eq!(referring_origin("not a url"), None);
    }

    #[test]
    fn test_query_decoding() {
        let params = parse_query_string("utm_campaign=spring%20sale&utm_source=a+b&utm_source=x");
        assert_eq!(params["utm_campaign"], "spring sale");
        assert_eq!(params["utm_source"], "a b");
    }

    #[test]
    fn test_add_labels_dedupes() {
        let mut ctx = AnalyticsContext::new(&PageEnvironment::default());

        assert_eq!(ctx.add_labels(["L1", "L2", "L1", "L2"]), 2);
        assert_eq!(ctx.label_list(), ["L1", "L2"]);

        assert_eq!(ctx.add_labels(["L1", "L2", "L3"]), 1);
        assert_eq!(ctx.label_list(), ["L1", "L2", "L3"]);
    }

    #[test]
    fn test_serialized_field_names() {
        let mut ctx = AnalyticsContext::new(&scenic_page());
        ctx.set_ready_to_pay(true);
        let json = serde_json::to_value(&ctx).unwrap();

        assert_eq!(json["referringOrigin"], "https://scenic-2017.appspot.com");
        assert_eq!(json["readyToPay"], true);
        assert!(json.get("sku").is_none());
        assert_eq!(json["labelList"], serde_json::json!([]));
    }
}
