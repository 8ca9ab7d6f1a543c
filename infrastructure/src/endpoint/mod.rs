//! Agent endpoint adapters.

mod static_endpoint;

pub use static_endpoint::StaticEndpoint;
