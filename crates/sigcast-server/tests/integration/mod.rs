//! Integration tests for sigcast-server.
//!
//! These tests verify the interaction between the hubs:
//! - Client-count announcements on connect and disconnect
//! - Catalogue and delta delivery through the ticker hub
//! - Request dispatch and error replies
//! - The WebSocket gateway end to end

pub mod common;
