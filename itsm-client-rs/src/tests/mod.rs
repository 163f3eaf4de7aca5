//! Unit tests for the ticketing client
//!
//! HTTP contracts are exercised against WireMock servers.
