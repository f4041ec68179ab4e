// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0
//! XMRT coordinator CLI library: daemon server and client plus the
//! command handlers, exposed for tests.

pub mod commands;
pub mod daemon;
