pub mod activation;
pub mod cancel;
pub mod commands;
pub mod config;
pub mod error;
pub mod legacy;
pub mod manager;
pub mod manifest;
pub mod registry;
pub mod runtime;
pub mod store;
pub mod vmid;
