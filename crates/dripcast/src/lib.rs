// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! dripcast: paced broadcast campaigns over chat-protocol device sessions.
//!
//! The protocol client itself is supplied by the embedder as a
//! [`ClientFactory`](dripcast_core::ClientFactory); this crate wires it to
//! storage, the session pool and the background dispatch loops.

pub mod commands;
pub mod logging;
pub mod runtime;
pub mod shutdown;

pub use logging::init_tracing;
pub use runtime::{Runtime, serve, serve_until};
pub use shutdown::install_signal_handler;
