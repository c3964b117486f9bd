//! REST boundary.
//!
//! Every call returns `Result<_, TransportFailure>` so a loader or action can
//! hand it straight to a [`Resource`](crate::Resource) or
//! [`Action`](crate::Action) without wrapping.

mod client;
pub mod image;
pub mod search;

pub use client::ApiClient;
pub use image::{ensure_uploaded, ImageValue};
pub use search::{SearchPage, SearchQuery};
