// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: tasks, agents, messages, coordination rules and the
//! coordinator configuration manifest. No I/O happens here.

pub mod agent;
pub mod clock;
pub mod coordination;
pub mod events;
pub mod message;
pub mod node_config;
pub mod task;
