//! Real-time comment channel.
//!
//! A template's comments are pushed over a websocket hub: the client joins
//! the template's group, receives the current list once, then one push per
//! new comment.

mod client;
mod feed;
pub mod protocol;

pub use client::CommentHub;
pub use feed::{CommentFeed, HubEvent};
pub use protocol::{HubMessage, ProtocolError};
