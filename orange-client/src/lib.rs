//! # orange-client: remote-control client
//!
//! Races the configured relay candidates, keeps a session alive with
//! heartbeats and automatic reconnect, logs device and workflow updates,
//! and follows any stream sent to this client. Can also provision a fresh
//! device into a cluster.

pub mod config;
pub mod decoder;
