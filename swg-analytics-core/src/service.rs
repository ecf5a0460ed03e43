//! Analytics service
//!
//! Bridges the client event bus to the logging channel.
//!
//! ## Pipeline
//!
//! ```text
//! ClientEventManager ──► handle() ──► admission ──► AnalyticsRequest
//!                                                        │
//!                              [unbounded FIFO queue] ◄──┘
//!                                        │
//!                                  dispatch worker ──► ensure port (open + when_ready, once)
//!                                                  └─► merge experiment labels
//!                                                  └─► port.execute(request)
//! ```
//!
//! ## Rules
//! - Requests reach the port in admission order; at most one is in flight.
//! - A failed unit only fails its own [`Dispatch`]; the worker moves on.
//! - A successful channel setup is memoized for the service lifetime. A failed
//!   setup is not cached, so the next unit makes its own attempt.
//! - The context is shared, not copied. Whatever it holds when a request is
//!   sent is what the request carries.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::task::{Context as TaskContext, Poll};

use tokio::sync::{mpsc, oneshot, OnceCell};

use crate::channel::{
    frontend_args, frontend_url, ActivityPort, ActivityPorts, MessageCallback, ServiceFrame,
    SERVICE_FRAME_PATH,
};
use crate::config::RuntimeConfig;
use crate::context::{AnalyticsContext, PageEnvironment};
use crate::error::{Error, Result};
use crate::events::{ClientEventListener, ClientEventManager};
use crate::experiments::ExperimentStore;
use crate::request::{read_context, AnalyticsRequest, SharedContext};
use crate::types::{AnalyticsEvent, ClientEvent};

/// Event types that never leave the host
const EXCLUDED_EVENTS: &[AnalyticsEvent] = &[AnalyticsEvent::EventSubscriptionState];

/// Completion handle for one queued unit of work.
///
/// Resolves with the unit's outcome. Dropping it does not cancel the unit.
#[must_use = "dropping a Dispatch does not cancel it, but its outcome is lost"]
pub struct Dispatch {
    rx: oneshot::Receiver<Result<()>>,
}

impl Future for Dispatch {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(Err(Error::Closed)))
    }
}

/// Counters describing what the service has done so far
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events that passed admission
    pub admitted: usize,
    /// Events dropped by admission
    pub dropped: usize,
    /// Requests the port accepted
    pub sent: usize,
    /// Units that failed in setup or send
    pub failed: usize,
}

enum Unit {
    /// Make sure the port is open; queued by `on_message`
    Setup { done: oneshot::Sender<Result<()>> },
    /// Send one request
    Send {
        request: AnalyticsRequest,
        done: oneshot::Sender<Result<()>>,
    },
    /// Resolve once everything queued before it has run
    Barrier { done: oneshot::Sender<()> },
}

/// State shared between the service handle and its dispatch worker
struct Shared {
    ports: Arc<dyn ActivityPorts>,
    frame: ServiceFrame,
    url: String,
    args: serde_json::Value,
    port: OnceCell<Arc<dyn ActivityPort>>,
    context: SharedContext,
    experiments: ExperimentStore,
    message_callbacks: Mutex<Vec<MessageCallback>>,
    sent: AtomicUsize,
    failed: AtomicUsize,
}

impl Shared {
    /// Open the port and wait for it, once; later calls reuse the port.
    async fn ensure_port(self: &Arc<Self>) -> Result<Arc<dyn ActivityPort>> {
        let port = self
            .port
            .get_or_try_init(|| async {
                tracing::debug!(
                    url = %self.url,
                    frame = self.frame.name(),
                    "Opening analytics channel"
                );
                let port = self.ports.open(&self.frame, &self.url, &self.args).await?;
                port.on_message(self.message_forwarder());
                port.when_ready().await?;
                tracing::info!(url = %self.url, "Analytics channel ready");
                Ok::<_, Error>(port)
            })
            .await?;
        Ok(Arc::clone(port))
    }

    /// Port callback that fans inbound messages out to the service's callbacks.
    ///
    /// Holds a weak reference so the port does not keep the service alive.
    fn message_forwarder(self: &Arc<Self>) -> MessageCallback {
        let shared: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |message: &serde_json::Value| {
            if let Some(shared) = shared.upgrade() {
                shared.deliver(message);
            }
        })
    }

    fn deliver(&self, message: &serde_json::Value) {
        let callbacks: Vec<MessageCallback> = match self.message_callbacks.lock() {
            Ok(callbacks) => callbacks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        tracing::trace!(callbacks = callbacks.len(), "Inbound channel message");
        for callback in callbacks {
            callback(message);
        }
    }

    async fn send(self: &Arc<Self>, request: &AnalyticsRequest) -> Result<()> {
        let port = self.ensure_port().await?;

        let experiments = self.experiments.enabled();
        if !experiments.is_empty() {
            match self.context.write() {
                Ok(mut ctx) => ctx.add_labels(&experiments),
                Err(poisoned) => poisoned.into_inner().add_labels(&experiments),
            };
        }

        port.execute(request).await
    }

    fn record(&self, outcome: &Result<()>, what: &str) {
        match outcome {
            Ok(()) => {}
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, unit = what, "Analytics dispatch failed");
            }
        }
    }
}

/// Worker loop: runs queued units one at a time until the queue closes
async fn run_dispatcher(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<Unit>) {
    while let Some(unit) = rx.recv().await {
        match unit {
            Unit::Setup { done } => {
                let outcome = shared.ensure_port().await.map(|_| ());
                shared.record(&outcome, "setup");
                let _ = done.send(outcome);
            }
            Unit::Send { request, done } => {
                let outcome = shared.send(&request).await;
                if outcome.is_ok() {
                    shared.sent.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(event = ?request.event(), "Analytics request sent");
                }
                shared.record(&outcome, "send");
                let _ = done.send(outcome);
            }
            Unit::Barrier { done } => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Analytics dispatch queue closed");
}

/// Forwards admitted client events to the logging channel
pub struct AnalyticsService {
    shared: Arc<Shared>,
    queue: mpsc::UnboundedSender<Unit>,
    enable_swg_analytics: AtomicBool,
    has_logged: AtomicBool,
    admitted: AtomicUsize,
    dropped: AtomicUsize,
}

impl AnalyticsService {
    /// Create the service and register it on `events`.
    ///
    /// Must be called from within a tokio runtime: the dispatch worker is
    /// spawned here. Nothing touches the channel until the first admitted
    /// event or `on_message` call.
    pub fn new(
        runtime: &RuntimeConfig,
        page: &PageEnvironment,
        ports: Arc<dyn ActivityPorts>,
        events: &ClientEventManager,
    ) -> Arc<Self> {
        let context = AnalyticsContext::new(page);
        tracing::debug!(
            transaction_id = context.transaction_id(),
            publication_id = %runtime.publication_id,
            "Analytics service created"
        );

        let shared = Arc::new(Shared {
            ports,
            frame: ServiceFrame::hidden(&runtime.publication_id),
            url: frontend_url(&runtime.frontend_url, SERVICE_FRAME_PATH),
            args: frontend_args(&runtime.publication_id),
            port: OnceCell::new(),
            context: Arc::new(RwLock::new(context)),
            experiments: ExperimentStore::new(runtime.experiments.clone()),
            message_callbacks: Mutex::new(Vec::new()),
            sent: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        });

        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_dispatcher(Arc::clone(&shared), rx));

        let service = Arc::new(Self {
            shared,
            queue,
            enable_swg_analytics: AtomicBool::new(runtime.enable_swg_analytics),
            has_logged: AtomicBool::new(false),
            admitted: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        });

        events.register_listener(Arc::clone(&service) as Arc<dyn ClientEventListener>);
        service
    }

    /// Hidden frame the channel is opened for
    pub fn element(&self) -> &ServiceFrame {
        &self.shared.frame
    }

    /// Experiment flags read at send time
    pub fn experiments(&self) -> &ExperimentStore {
        &self.shared.experiments
    }

    /// Toggle forwarding of publisher-side originators
    pub fn set_enable_swg_analytics(&self, enabled: bool) {
        self.enable_swg_analytics.store(enabled, Ordering::Relaxed);
    }

    /// Register a callback for inbound channel messages.
    ///
    /// Starts channel setup if nothing has yet.
    pub fn on_message<F>(&self, callback: F) -> Dispatch
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        match self.shared.message_callbacks.lock() {
            Ok(mut callbacks) => callbacks.push(Arc::new(callback)),
            Err(poisoned) => poisoned.into_inner().push(Arc::new(callback)),
        }

        let (done, rx) = oneshot::channel();
        self.enqueue(Unit::Setup { done });
        Dispatch { rx }
    }

    /// Merge labels into the context, skipping ones already present
    pub fn add_labels<I, S>(&self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.with_context(|ctx| {
            ctx.add_labels(labels);
        });
    }

    pub fn set_sku(&self, sku: impl Into<String>) {
        self.with_context(|ctx| ctx.set_sku(sku));
    }

    pub fn set_ready_to_pay(&self, ready_to_pay: bool) {
        self.with_context(|ctx| ctx.set_ready_to_pay(ready_to_pay));
    }

    /// Replace the transaction id; it must be shaped 8-4-4-4-12 hex
    pub fn set_transaction_id(&self, transaction_id: impl Into<String>) -> Result<()> {
        self.with_context(|ctx| ctx.set_transaction_id(transaction_id))
    }

    pub fn transaction_id(&self) -> String {
        self.context().transaction_id().to_string()
    }

    /// Copy of the live context
    pub fn context(&self) -> AnalyticsContext {
        read_context(&self.shared.context)
    }

    /// Whether any event has been admitted for logging
    pub fn has_logged(&self) -> bool {
        self.has_logged.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            sent: self.shared.sent.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
        }
    }

    /// Filter, build and queue one client event.
    ///
    /// Returns `None` when the event is not admitted.
    pub fn handle_client_event(&self, event: &ClientEvent) -> Option<Dispatch> {
        if !self.should_log(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(
                event = ?event.event_type,
                originator = event.event_originator.as_str(),
                "Client event not admitted"
            );
            return None;
        }

        let request = AnalyticsRequest::from_client_event(event, Arc::clone(&self.shared.context));
        let (done, rx) = oneshot::channel();
        self.enqueue(Unit::Send { request, done });

        self.has_logged.store(true, Ordering::Relaxed);
        self.admitted.fetch_add(1, Ordering::Relaxed);
        Some(Dispatch { rx })
    }

    /// Wait until every unit queued before this call has finished
    pub async fn flush(&self) {
        let (done, rx) = oneshot::channel();
        self.enqueue(Unit::Barrier { done });
        let _ = rx.await;
    }

    fn should_log(&self, event: &ClientEvent) -> bool {
        if EXCLUDED_EVENTS.contains(&event.event_type) {
            return false;
        }
        !event.event_originator.is_publisher() || self.enable_swg_analytics.load(Ordering::Relaxed)
    }

    fn enqueue(&self, unit: Unit) {
        // On failure the unit's sender is dropped and its waiter sees Error::Closed
        if self.queue.send(unit).is_err() {
            tracing::warn!("Analytics dispatch worker is gone; dropping unit");
        }
    }

    fn with_context<T>(&self, f: impl FnOnce(&mut AnalyticsContext) -> T) -> T {
        match self.shared.context.write() {
            Ok(mut ctx) => f(&mut ctx),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl ClientEventListener for AnalyticsService {
    fn handle(&self, event: &ClientEvent) {
        // Outcome is observed through stats and logs
        let _ = self.handle_client_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventOriginator;
    use async_trait::async_trait;

    /// Port that accepts everything and remembers nothing
    struct NullPort;

    #[async_trait]
    impl ActivityPort for NullPort {
        async fn when_ready(&self) -> Result<()> {
            Ok(())
        }

        async fn execute(&self, _request: &AnalyticsRequest) -> Result<()> {
            Ok(())
        }

        fn on_message(&self, _callback: MessageCallback) {}
    }

    struct NullPorts;

    #[async_trait]
    impl ActivityPorts for NullPorts {
        async fn open(
            &self,
            _frame: &ServiceFrame,
            _url: &str,
            _args: &serde_json::Value,
        ) -> Result<Arc<dyn ActivityPort>> {
            Ok(Arc::new(NullPort))
        }
    }

    fn service(runtime: RuntimeConfig) -> (Arc<AnalyticsService>, ClientEventManager) {
        let events = ClientEventManager::new();
        let service = AnalyticsService::new(
            &runtime,
            &PageEnvironment::default(),
            Arc::new(NullPorts),
            &events,
        );
        (service, events)
    }

    #[tokio::test]
    async fn test_registers_on_event_bus() {
        let (_service, events) = service(RuntimeConfig::default());
        assert_eq!(events.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_element_is_hidden_iframe() {
        let (service, _events) = service(RuntimeConfig::default());
        assert_eq!(service.element().node_name(), "IFRAME");
        assert_eq!(service.element().display(), "none");
    }

    #[tokio::test]
    async fn test_excluded_event_is_never_admitted() {
        let runtime = RuntimeConfig {
            enable_swg_analytics: true,
            ..Default::default()
        };
        let (service, _events) = service(runtime);

        let event = ClientEvent::new(
            AnalyticsEvent::EventSubscriptionState,
            EventOriginator::SwgClient,
        );
        assert!(service.handle_client_event(&event).is_none());
        assert!(!service.has_logged());
        assert_eq!(service.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_dispatch_resolves_ok() {
        let (service, _events) = service(RuntimeConfig::default());
        let event = ClientEvent::new(AnalyticsEvent::ImpressionPaywall, EventOriginator::SwgServer);

        let dispatch = service.handle_client_event(&event).expect("admitted");
        assert!(dispatch.await.is_ok());

        let stats = service.stats();
        assert_eq!(stats.admitted, 1);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_set_transaction_id_validates() {
        let (service, _events) = service(RuntimeConfig::default());
        let original = service.transaction_id();

        assert!(matches!(
            service.set_transaction_id("tx-id-101"),
            Err(Error::InvalidTransactionId(_))
        ));
        assert_eq!(service.transaction_id(), original);

        service.set_transaction_id("aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee").unwrap();
        assert_eq!(service.transaction_id(), "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee");
    }
}
