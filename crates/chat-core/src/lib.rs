//! # chat-core
//!
//! Shared library for the chat server: domain types, the line-framed
//! wire protocol, the session registry, password digests, configuration,
//! and durable storage.
//!
//! This crate is used by the `chatd` binary (`chat-server`).

pub mod config;
pub mod error;
pub mod framer;
pub mod password;
pub mod protocol;
pub mod session;
pub mod store;
pub mod types;
