// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hz-enqueuers: turn trigger occurrences into queued events

pub mod change_stream;
mod context;
mod enqueuer;
mod error;
pub mod http;
mod lifecycle;
pub mod message_queue;
mod options;
pub mod pub_sub;
mod registry;
pub mod schedule;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use change_stream::{
    ChangeEvent, ChangeOperation, ChangeStream, ChangeStreamEnqueuer, ChangeStreamOptions,
    ChangeStreamSource, MemoryResumeTokenStore, ResumeTokenStore,
};
pub use context::{EnqueueFailure, EnqueuerContext, ErrorChannel, DEFAULT_MAX_PAYLOAD_BYTES};
pub use enqueuer::Enqueuer;
pub use error::{EnqueuerError, SourceError};
pub use http::{HttpEnqueuer, HttpOptions, HttpRequest, HttpRoutes, Invocation};
pub use lifecycle::Backoff;
pub use message_queue::{Deliveries, Delivery, MessageBroker, MessageQueueEnqueuer, MessageQueueOptions};
pub use pub_sub::{PubSubEnqueuer, PubSubMessage, PubSubOptions, PubSubSource, Subscription};
pub use registry::{TriggerRegistry, TriggerSources};
pub use schedule::{ScheduleEnqueuer, ScheduleOptions};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{BrokerAck, FakeChangeStreamSource, FakeMessageBroker, FakePubSubSource};
