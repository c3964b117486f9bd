//! Formsync Core
//!
//! Async state orchestration for the formsync template client. It provides:
//!
//! - Reactive primitives (signals, effects) with automatic dependency tracking
//! - A keyed [`Resource`] fetcher with stale-while-revalidate state
//! - An [`Action`] dispatcher with last-call-wins settlement
//! - Draft reconciliation between a server value and a local edit
//!   ([`Draft`], [`EditSession`])
//! - Boundary clients for the REST API and the real-time comment hub
//!
//! # Architecture
//!
//! - `reactive`: signals, effects and the dependency runtime
//! - `state`, `task`: the shared async state record and sequencing tickets
//! - `resource`, `action`, `draft`, `merge`: the orchestration primitives
//! - `api`, `hub`, `session`, `config`, `model`: everything that talks to
//!   the server or lives for the whole application
//!
//! # Example
//!
//! ```rust
//! use formsync_core::reactive::Signal;
//! use formsync_core::{Action, Resource};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> formsync_core::Result<()> {
//! let template_id = Signal::new(Some(7u64));
//!
//! let template = Resource::new(
//!     {
//!         let template_id = template_id.clone();
//!         move || template_id.get()
//!     },
//!     |id: u64| async move { Ok::<_, String>(format!("template {id}")) },
//! )?;
//!
//! let like = Action::new(|liked: bool| async move { Ok::<_, String>(liked) })?;
//! let settled = like.dispatch(true).settled().await;
//! assert_eq!(settled.into_result(), Some(Ok(true)));
//!
//! tokio::time::sleep(std::time::Duration::from_millis(5)).await;
//! assert_eq!(template.value().as_deref(), Some("template 7"));
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod api;
pub mod config;
pub mod draft;
pub mod error;
pub mod hub;
pub mod merge;
pub mod model;
pub mod reactive;
pub mod resource;
pub mod session;
pub mod state;
pub mod task;

pub use action::{Action, Dispatched, Settlement};
pub use draft::{Draft, DraftError, EditMode, EditSession, RollbackPolicy, SaveError};
pub use error::{Error, Result, TransportFailure};
pub use resource::Resource;
pub use state::{AsyncState, Phase};
