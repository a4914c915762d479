//! Command handlers

pub mod config;
pub mod documents;
pub mod edit;
