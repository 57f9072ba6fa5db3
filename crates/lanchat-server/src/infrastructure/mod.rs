//! Infrastructure layer for the server application.
//!
//! Contains OS-facing adapters: interface discovery, sockets and the
//! configuration file.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `lanchat_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
