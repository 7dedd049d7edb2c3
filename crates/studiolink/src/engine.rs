//! The binding engine.
//!
//! One `Engine` owns the connection, the correlator, the compiled bindings
//! and all per-control state. A single task consumes connection events in
//! order; anything that waits on the studio runs in its own task so the
//! event loop keeps delivering replies.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use studiolink_catalog::{
    compile, BindingDescriptor, Catalog, CompiledBindings, CompilerConfig, OptionTopic,
    OptionsCache, ParamOption, SchemaError,
};
use studiolink_telemetry::{log_activation_aborted, MetricsRegistry};

use crate::activation;
use crate::config::EngineConfig;
use crate::connection::{ConnectionEvent, ConnectionState, ConnectionSupervisor};
use crate::correlator::RequestCorrelator;
use crate::error::{ActivationError, EngineError, RequestError};
use crate::protocol::{Inbound, Notification, Request, Response};
use crate::quiescence::QuiescenceCoordinator;
use crate::router::NotificationRouter;
use crate::state::{BindingStateStore, CachedValue, InstanceOptions, SubscribeOutcome, ValueFetch};
use crate::surface::ControlSurface;

/// Field of an options reply holding the list.
const OPTIONS_FIELD: &str = "options";

struct EngineState {
    catalog: Catalog,
    bindings: CompiledBindings,
    options: OptionsCache,
    store: BindingStateStore,
}

impl EngineState {
    fn recompile(&mut self, config: &CompilerConfig) {
        self.bindings = compile(&self.catalog, &self.options, config);
    }
}

struct EngineInner {
    config: EngineConfig,
    surface: Arc<dyn ControlSurface>,
    supervisor: Arc<ConnectionSupervisor>,
    correlator: RequestCorrelator,
    quiescence: Arc<QuiescenceCoordinator>,
    router: NotificationRouter,
    metrics: Arc<MetricsRegistry>,
    state: Mutex<EngineState>,
}

/// Binds control surface controls to live studio state.
pub struct Engine {
    inner: Arc<EngineInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(config: EngineConfig, catalog: Catalog, surface: Arc<dyn ControlSurface>) -> Self {
        Self::with_metrics(config, catalog, surface, Arc::new(MetricsRegistry::new()))
    }

    /// Like [`new`](Self::new), recording into an existing registry.
    pub fn with_metrics(
        config: EngineConfig,
        catalog: Catalog,
        surface: Arc<dyn ControlSurface>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let quiescence = {
            let surface = Arc::clone(&surface);
            let gauge = metrics.requests_in_flight.clone();
            let metrics = Arc::clone(&metrics);
            QuiescenceCoordinator::new(move || {
                metrics.refreshes_total.inc();
                surface.refresh_all();
            })
            .with_gauge(gauge)
        };

        let options = OptionsCache::new();
        let bindings = compile(&catalog, &options, &config.compiler);

        let inner = EngineInner {
            supervisor: Arc::new(ConnectionSupervisor::new(
                config.supervisor(),
                Arc::clone(&metrics),
            )),
            correlator: RequestCorrelator::new(
                config.client_name.clone(),
                config.request_timeout,
                Arc::clone(&metrics),
            ),
            quiescence: Arc::new(quiescence),
            router: NotificationRouter::new(Arc::clone(&metrics)),
            state: Mutex::new(EngineState {
                catalog,
                bindings,
                options,
                store: BindingStateStore::new(),
            }),
            config,
            surface,
            metrics,
        };

        Self {
            inner: Arc::new(inner),
            task: Mutex::new(None),
        }
    }

    /// Publish the control definitions, start the event loop and connect.
    ///
    /// A failed first attempt is returned, but reconnects continue in the
    /// background until [`shutdown`](Self::shutdown).
    pub async fn init(&self) -> Result<(), EngineError> {
        let endpoint = self.inner.config.endpoint()?;
        self.inner.define_controls();

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                inner.handle_event(event);
            }
            tracing::debug!("Event loop stopped");
        });
        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }

        tracing::info!(url = %endpoint.url(), "Starting studio link");
        self.inner.supervisor.connect(endpoint, events_tx).await?;
        Ok(())
    }

    /// Disconnect, stop the event loop, fail pending requests and forget
    /// all per-control state and cached options.
    pub async fn shutdown(&self) {
        self.inner.supervisor.disconnect().await;

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Event loop ended abnormally");
            }
        }

        self.inner.correlator.fail_all("engine shut down");
        {
            let mut state = self.inner.state.lock();
            state.store.clear();
            state.options.clear();
            state.recompile(&self.inner.config.compiler);
        }
        self.inner.metrics.active_topics.set(0);
        tracing::info!("Studio link stopped");
    }

    /// Replace the catalog wholesale and republish the definitions.
    pub fn reload_catalog(&self, catalog: Catalog) {
        {
            let mut state = self.inner.state.lock();
            state.catalog = catalog;
            state.recompile(&self.inner.config.compiler);
        }
        self.inner.define_controls();
        self.inner.surface.refresh_all();
    }

    /// Start tracking a control instance.
    pub async fn subscribe(
        &self,
        control_id: &str,
        definition_id: &str,
        options: InstanceOptions,
    ) -> Result<(), EngineError> {
        let (outcome, missing) = {
            let mut state = self.inner.state.lock();
            let descriptor = state
                .bindings
                .get(definition_id)
                .cloned()
                .ok_or_else(|| EngineError::UnknownDefinition(definition_id.to_string()))?;
            let outcome =
                state
                    .store
                    .subscribe(control_id, &descriptor, &options, descriptor.is_feedback());
            let missing: Vec<OptionTopic> = descriptor
                .option_topics
                .iter()
                .filter(|t| !state.options.contains(t))
                .cloned()
                .collect();
            self.inner
                .metrics
                .active_topics
                .set(state.store.topic_count() as i64);
            (outcome, missing)
        };

        tracing::debug!(control_id, definition_id, "Control subscribed");
        self.inner.apply(outcome, missing).await;
        Ok(())
    }

    /// Apply changed instance options to a tracked control.
    pub async fn reconfigure(
        &self,
        control_id: &str,
        options: InstanceOptions,
    ) -> Result<(), EngineError> {
        let fetch = {
            let mut state = self.inner.state.lock();
            let definition_id = state
                .store
                .entry(control_id)
                .map(|e| e.definition_id.clone())
                .ok_or_else(|| EngineError::UnknownControl(control_id.to_string()))?;
            let descriptor = state
                .bindings
                .get(&definition_id)
                .cloned()
                .ok_or(EngineError::UnknownDefinition(definition_id))?;
            state.store.reconfigure(control_id, &descriptor, &options)
        };

        self.inner.surface.check_controls(&[control_id.to_string()]);
        if let Some(fetch) = fetch {
            self.inner.run_fetch(fetch).await;
        }
        Ok(())
    }

    /// Stop tracking a control instance.
    pub async fn unsubscribe(&self, control_id: &str) {
        let teardown = {
            let mut state = self.inner.state.lock();
            let teardown = state.store.unsubscribe(control_id);
            self.inner
                .metrics
                .active_topics
                .set(state.store.topic_count() as i64);
            teardown
        };
        if let Some(topic) = teardown {
            self.inner.unregister_topic(&topic).await;
        }
    }

    /// Send the request a pressed control stands for.
    ///
    /// When the request cannot be built, one error is logged and nothing
    /// is sent.
    pub async fn activate(
        &self,
        definition_id: &str,
        control_id: &str,
        options: &InstanceOptions,
    ) -> Result<Response, ActivationError> {
        let (descriptor, cached) = {
            let state = self.inner.state.lock();
            let descriptor = state.bindings.get(definition_id).cloned();
            let cached = state.store.read(control_id).unwrap_or_default();
            (descriptor, cached)
        };

        let built = match descriptor {
            Some(descriptor) => activation::build_request(
                &descriptor,
                &cached,
                options,
                self.inner.surface.as_ref(),
            ),
            None => Err(ActivationError::UnknownDefinition(definition_id.to_string())),
        };
        let request = match built {
            Ok(request) => request,
            Err(e) => {
                log_activation_aborted!(definition_id, control_id, error = %e, "Activation aborted");
                return Err(e);
            }
        };

        Ok(self.inner.request(request).await?)
    }

    /// Last known value of a control's tracked parameter.
    pub fn read(&self, control_id: &str) -> Option<CachedValue> {
        self.inner.state.lock().store.read(control_id)
    }

    /// Lit state of a control.
    pub fn is_active(&self, control_id: &str) -> bool {
        self.inner
            .state
            .lock()
            .store
            .entry(control_id)
            .is_some_and(|e| e.is_active())
    }

    pub fn descriptors(&self) -> Vec<BindingDescriptor> {
        self.inner.state.lock().bindings.descriptors.clone()
    }

    pub fn rejected(&self) -> Vec<SchemaError> {
        self.inner.state.lock().bindings.rejected.clone()
    }

    /// Cached option list for one parameter.
    pub fn cached_options(&self, topic: &OptionTopic) -> Option<Vec<ParamOption>> {
        self.inner
            .state
            .lock()
            .options
            .get(topic)
            .map(<[ParamOption]>::to_vec)
    }

    /// Topics currently registered with the studio.
    pub fn topics(&self) -> Vec<String> {
        self.inner.state.lock().store.topics()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.supervisor.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.supervisor.subscribe_state()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.quiescence.in_flight()
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.pending_count()
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.inner.metrics)
    }
}

impl EngineInner {
    fn handle_event(self: &Arc<Self>, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened => {
                self.surface.status_changed(ConnectionState::Open, None);
                let inner = Arc::clone(self);
                tokio::spawn(async move { inner.resync().await });
            }
            ConnectionEvent::Closed { reason, clean } => {
                self.correlator.fail_all(&reason);
                let state = if clean {
                    ConnectionState::Disconnected
                } else {
                    ConnectionState::Failed
                };
                self.surface.status_changed(state, Some(&reason));
            }
            ConnectionEvent::Message(value) => self.handle_message(value),
        }
    }

    fn handle_message(&self, value: Value) {
        match Inbound::classify(value) {
            Inbound::Response(response) => {
                if self.correlator.resolve(&response) {
                    return;
                }
                if response.update_type().is_some() {
                    self.route(&Notification::from(response));
                } else {
                    tracing::debug!(
                        message_id = ?response.message_id(),
                        "Dropping reply nobody is waiting for"
                    );
                }
            }
            Inbound::Notification(notification) => self.route(&notification),
            Inbound::Unrecognized(value) => {
                tracing::debug!(frame = %value, "Dropping unrecognized message");
            }
        }
    }

    fn route(&self, notification: &Notification) {
        let changed = {
            let mut state = self.state.lock();
            self.router.dispatch(&mut state.store, notification)
        };
        if !changed.is_empty() {
            self.surface.check_controls(&changed);
        }
    }

    /// Restore remote state after the connection (re)opened.
    async fn resync(self: Arc<Self>) {
        let _busy = self.quiescence.begin();

        let (topics, option_topics, fetches) = {
            let state = self.state.lock();
            let option_topics: BTreeSet<OptionTopic> = state
                .store
                .live_definitions()
                .iter()
                .filter_map(|id| state.bindings.get(id))
                .flat_map(|d| d.option_topics.iter().cloned())
                .collect();
            (
                state.store.topics(),
                option_topics,
                state.store.live_fetches(),
            )
        };

        tracing::info!(
            topics = topics.len(),
            option_lists = option_topics.len(),
            fetches = fetches.len(),
            "Resynchronizing with studio"
        );

        join_all(topics.iter().map(|topic| self.register_topic(topic))).await;
        if !self.fetch_options(option_topics.into_iter().collect()).await {
            self.state.lock().recompile(&self.config.compiler);
            self.define_controls();
        }
        join_all(fetches.into_iter().map(|fetch| self.run_fetch(fetch))).await;
    }

    async fn apply(&self, outcome: SubscribeOutcome, missing: Vec<OptionTopic>) {
        let _busy = self.quiescence.begin();

        if let Some(topic) = outcome.teardown_topic {
            self.unregister_topic(&topic).await;
        }
        if let Some(topic) = outcome.register_topic {
            self.register_topic(&topic).await;
        }
        self.fetch_options(missing).await;
        if let Some(fetch) = outcome.fetch {
            self.run_fetch(fetch).await;
        }
    }

    /// Correlated request, counted for quiescence.
    async fn request(&self, request: Request) -> Result<Response, RequestError> {
        let _in_flight = self.quiescence.begin();
        self.correlator
            .send(self.supervisor.as_ref(), request)
            .await
    }

    async fn register_topic(&self, topic: &str) {
        let request =
            Request::new(&self.config.notification_on).with(&self.config.notification_field, topic);
        if self.request(request).await.is_ok() {
            tracing::debug!(topic, "Notifications enabled");
        }
    }

    async fn unregister_topic(&self, topic: &str) {
        let request = Request::new(&self.config.notification_off)
            .with(&self.config.notification_field, topic);
        if self.request(request).await.is_ok() {
            tracing::debug!(topic, "Notifications disabled");
        }
    }

    /// Read a control's current value and store it.
    async fn run_fetch(&self, fetch: ValueFetch) {
        let _busy = self.quiescence.begin();

        let Ok(response) = self.request(fetch.request).await else {
            return;
        };
        let Some(value) = response.get(&fetch.tracked_param).cloned() else {
            tracing::debug!(
                control_id = %fetch.control_id,
                field = %fetch.tracked_param,
                "Reply lacks tracked field"
            );
            return;
        };
        let stored = self.state.lock().store.set_value(&fetch.control_id, value);
        if stored {
            self.surface.check_controls(&[fetch.control_id]);
        }
    }

    /// Fetch option lists, then recompile and republish the definitions.
    ///
    /// Returns whether the definitions were republished.
    async fn fetch_options(&self, topics: Vec<OptionTopic>) -> bool {
        if topics.is_empty() {
            return false;
        }
        let _busy = self.quiescence.begin();

        let replies = join_all(topics.into_iter().map(|topic| async move {
            let request = Request::new(&self.config.options_request)
                .with("requestType", topic.request_type.clone())
                .with("parameterName", topic.param_id.clone());
            let reply = self.request(request).await;
            (topic, reply)
        }))
        .await;

        let mut fetched = 0;
        {
            let mut state = self.state.lock();
            for (topic, reply) in replies {
                let Ok(response) = reply else {
                    continue;
                };
                match parse_options(&response) {
                    Some(options) => {
                        tracing::debug!(topic = %topic, count = options.len(), "Options fetched");
                        state.options.insert(topic, options);
                        fetched += 1;
                    }
                    None => {
                        tracing::warn!(topic = %topic, "Options reply has no option list");
                    }
                }
            }
            if fetched > 0 {
                state.recompile(&self.config.compiler);
            }
        }
        if fetched > 0 {
            self.define_controls();
        }
        fetched > 0
    }

    fn define_controls(&self) {
        let descriptors = self.state.lock().bindings.descriptors.clone();
        self.surface.define_controls(&descriptors);
    }
}

fn parse_options(response: &Response) -> Option<Vec<ParamOption>> {
    let list = response.get(OPTIONS_FIELD)?;
    serde_json::from_value(list.clone()).ok()
}
