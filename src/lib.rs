//! wbem-export: manifest-driven CIM/WBEM export
//!
//! Queries a CIM/WBEM endpoint for the providers declared in a provider
//! index and routes each response through rendering and dispatch to produce
//! artifacts for configuration-management systems.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod manifest;
pub mod session;
pub mod storage;
