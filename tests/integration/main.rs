//! Integration tests for Tracker-Harvest
//!
//! These tests use wiremock to stand in for a tracker and exercise the HTTP
//! renderer and full scan runs end-to-end.

mod render_tests;
mod scan_tests;
