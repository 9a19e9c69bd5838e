//! Helpers for the behavioral scenarios.
//!
//! A [`Stack`] is one Horizon deployment in-process: queue, trigger
//! registry with fake sources, scheduler and the fake worker pool.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

pub use hz_adapters::{FakeBehavior, FakeLogCollector, FakeWorkerAdapter, OutputCapture, OutputStream};
pub use hz_core::{
    EventId, EventState, ExecutionOutcome, ExecutionResult, FunctionDef, FunctionId, TriggerConfig,
    TriggerKind, WorkerId,
};
pub use hz_enqueuers::{
    BrokerAck, ChangeEvent, ChangeOperation, Delivery, EnqueuerContext, EnqueuerError, ErrorChannel,
    FakeChangeStreamSource, FakeMessageBroker, FakePubSubSource, HttpRequest, Invocation, PubSubMessage,
    TriggerRegistry, TriggerSources,
};
pub use hz_engine::{Horizon, HorizonConfig, HorizonDeps, HorizonHandle, MemoryResultSink, PoolStatus};
pub use hz_queue::EventQueue;
pub use serde_json::json;
pub use std::time::Duration;
pub use tokio::time::Instant;

/// Upper bound on any single wait; paused time makes this free.
pub const WAIT_LIMIT: Duration = Duration::from_secs(300);
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct Stack {
    pub queue: EventQueue,
    pub registry: TriggerRegistry,
    pub workers: FakeWorkerAdapter,
    pub output: FakeLogCollector,
    pub results: MemoryResultSink,
    pub changes: FakeChangeStreamSource,
    pub broker: FakeMessageBroker,
    pub pubsub: FakePubSubSource,
    horizon: Option<HorizonHandle>,
}

impl Stack {
    pub async fn start(pool_size: usize) -> Self {
        Self::start_with(HorizonConfig::default().with_pool_size(pool_size)).await
    }

    /// Start with `config` and wait until every worker is idle.
    pub async fn start_with(config: HorizonConfig) -> Self {
        let queue = EventQueue::new();
        let workers = FakeWorkerAdapter::new();
        let output = FakeLogCollector::new();
        let results = MemoryResultSink::new();
        let changes = FakeChangeStreamSource::new();
        let broker = FakeMessageBroker::new();
        let pubsub = FakePubSubSource::new();

        let sources = TriggerSources::new()
            .with_change_stream(changes.clone())
            .with_message_broker(broker.clone())
            .with_pub_sub(pubsub.clone());
        let registry = TriggerRegistry::new(EnqueuerContext::new(queue.clone(), ErrorChannel::log_only()), sources);

        let deps = HorizonDeps::new(queue.clone(), workers.clone(), OutputCapture::new(output.clone()))
            .with_results(results.clone());
        let horizon = Horizon::start(config, deps).unwrap();

        let stack = Self {
            queue,
            registry,
            workers,
            output,
            results,
            changes,
            broker,
            pubsub,
            horizon: Some(horizon),
        };
        stack.wait_idle().await;
        stack
    }

    pub fn horizon(&self) -> &HorizonHandle {
        self.horizon.as_ref().expect("horizon already stopped")
    }

    /// Register `function`, asserting every trigger started.
    pub async fn deploy(&self, function: FunctionDef) {
        let triggers = function.triggers.len();
        let started = self.registry.register_function(function).await.unwrap();
        assert_eq!(started, triggers);
    }

    pub fn invoke(&self, function: &str, request: HttpRequest) -> Result<Invocation, EnqueuerError> {
        let routes = self
            .registry
            .http(&FunctionId::new(function))
            .unwrap_or_else(|| panic!("{function} has no http trigger"));
        routes.invoke(request)
    }

    pub async fn wait_idle(&self) -> PoolStatus {
        tokio::time::timeout(WAIT_LIMIT, self.horizon().wait_for_status(|s| s.all_idle()))
            .await
            .expect("pool never became idle")
            .unwrap()
    }

    pub async fn wait_state(&self, id: &EventId, want: EventState) {
        let mut rx = self.queue.watch(id).unwrap_or_else(|| panic!("unknown event {id}"));
        tokio::time::timeout(WAIT_LIMIT, rx.wait_for(|s| *s == want))
            .await
            .unwrap_or_else(|_| panic!("{id} never reached {want}"))
            .unwrap();
    }

    /// Wait for `n` recorded results and return them in completion order.
    pub async fn wait_results(&self, n: usize) -> Vec<ExecutionResult> {
        let deadline = Instant::now() + WAIT_LIMIT;
        while self.results.len() < n {
            assert!(Instant::now() < deadline, "only {} of {n} results", self.results.len());
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        self.results.results()
    }

    pub fn result_of(&self, id: &EventId) -> ExecutionResult {
        self.results
            .results()
            .into_iter()
            .find(|r| &r.event_id == id)
            .unwrap_or_else(|| panic!("no result for {id}"))
    }

    /// Stop triggers, then the pool.
    pub async fn shutdown(mut self, grace: Duration) -> PoolStatus {
        self.registry.shutdown().await;
        let horizon = self.horizon.take().expect("horizon already stopped");
        horizon.stop(grace).await
    }
}

/// Function with one HTTP trigger on `POST /<id>`.
pub fn http_function(id: &str) -> FunctionDef {
    FunctionDef::new(id, format!("/srv/functions/{id}.js")).with_trigger(TriggerConfig::new(
        "web",
        TriggerKind::Http,
        json!({ "method": "POST", "path": format!("/{id}") }),
    ))
}

pub fn post(function: &str) -> HttpRequest {
    HttpRequest::new("POST", format!("/{function}"))
}

pub async fn finish(invocation: Invocation) -> EventState {
    tokio::time::timeout(WAIT_LIMIT, invocation.wait())
        .await
        .expect("invocation never finished")
}
