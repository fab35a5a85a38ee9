//! Authenticated HTTP access to the catalog and storage services.

mod hooks;
mod request;
mod resilient;

pub use hooks::{HookError, RequestHook, RequestInfo, ResponseHook};
pub use request::{RequestBody, RequestOptions};
pub use resilient::{ClientBuilder, ResilientClient};
