//! Infrastructure layer for the client application: the server socket and
//! the configuration file.

pub mod network;
pub mod storage;
