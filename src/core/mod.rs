//! Core building blocks: configuration and the gateway error taxonomy.

pub mod config;
pub mod error;
