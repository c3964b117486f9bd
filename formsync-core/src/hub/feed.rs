use indexmap::IndexMap;

use crate::model::Comment;

/// Something the hub pushed to this client.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// Full comment list, sent once after joining the template's group.
    Initial(Vec<Comment>),
    Comment(Comment),
    Error(String),
    Closed,
}

/// Comments of one template in arrival order, keyed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentFeed {
    comments: IndexMap<u64, Comment>,
    last_error: Option<String>,
    closed: bool,
}

impl CommentFeed {
    pub fn apply(&mut self, event: &HubEvent) {
        match event {
            HubEvent::Initial(comments) => {
                self.comments = comments.iter().map(|c| (c.id, c.clone())).collect();
            }
            // Re-delivery of a known id replaces it in place.
            HubEvent::Comment(comment) => {
                self.comments.insert(comment.id, comment.clone());
            }
            HubEvent::Error(message) => self.last_error = Some(message.clone()),
            HubEvent::Closed => self.closed = true,
        }
    }

    pub fn comments(&self) -> impl Iterator<Item = &Comment> {
        self.comments.values()
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Comment> {
        self.comments.get(&id)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
