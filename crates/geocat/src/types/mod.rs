//! Validated value types shared across the crate.

mod service_url;

pub use service_url::ServiceUrl;
