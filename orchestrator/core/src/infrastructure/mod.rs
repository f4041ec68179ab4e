// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod message_queue;

pub use event_bus::{EventBus, EventBusError};
pub use message_queue::{connect_message_queue, MessageQueue, QueueError, QueueHealth};
