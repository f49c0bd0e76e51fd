//! End-to-End Integration Tests
//!
//! These tests drive the service provider through complete protocol
//! exchanges with an in-process identity provider that signs with the
//! `testdata` credentials.

mod common;
mod artifact_flows;
mod configuration;
mod login_flows;
mod logout_flows;
