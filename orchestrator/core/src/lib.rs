// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0
//! XMRT coordination core
//!
//! Priority task scheduling with capability matching, advisory coordination
//! rules, an agent registry and a message hub over an in-process or Redis
//! queue.
//!
//! # Architecture
//!
//! - **domain:** tasks, agents, messages, rules, configuration
//! - **application:** task manager, scheduler loop, registry, message hub
//! - **infrastructure:** event bus, message queue backends
//! - **presentation:** HTTP API

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
