//! HTTP client for a remote Test Management System.
//!
//! The adapter core talks to the TMS exclusively through the [`TmsClient`]
//! trait; [`HttpTmsClient`] is the production implementation over reqwest.

pub mod api;
pub mod http;
pub mod models;

pub use api::{ApiError, ApiResult, TmsClient};
pub use http::{HttpClientOptions, HttpTmsClient};
pub use models::*;
