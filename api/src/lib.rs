pub mod client;
pub mod metrics;
pub mod response;

pub use client::{ApiError, BeaconApi, HttpClient};
pub use response::{CredentialParseError, Response, Validator};
