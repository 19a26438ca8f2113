//! Structs, traits, and utils to develop and serve [discovery](https://docs.viam.com/services/discovery/)
//! services.
//!
//! # Services
//! - [discovery]
//!
//! # Utils
//! - [grpc]
//! - [grpc_client]
//! - [gateway]
//! - [json]
//! - [config]

pub mod config;
pub mod discovery;
pub mod exec;
pub mod gateway;
pub mod generic;
pub mod grpc;
pub mod grpc_client;
pub mod json;
pub mod log;
pub mod registry;
pub mod robot;
