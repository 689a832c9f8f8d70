//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the resolution core and
//! platform-specific implementations. The core never talks to the network
//! directly; it goes through the [`HttpClient`](http::HttpClient) transport
//! trait so that desktop, mobile, and test hosts can each supply their own
//! transport.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with retry,
//!   cancellation, and byte-level fetches.
//!
//! ## Error Handling
//!
//! All bridge operations return [`Result`](error::Result) with
//! [`BridgeError`](error::BridgeError) describing transport-level failures.

pub mod error;
pub mod http;

pub use error::{BridgeError, Result};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
