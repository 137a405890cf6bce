//! Datahub service: HTTP surface and configuration bootstrap

pub mod api;
pub mod config;
