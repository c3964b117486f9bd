//! Edit/view reconciliation between a server value and a local draft.
//!
//! [`Draft`] is the bare state machine:
//!
//! ```text
//!            begin_edit                 payload -> submit
//!  Viewing ─────────────▶ Editing ───────────────────────┐
//!     ▲                     │  ▲                          │
//!     │ cancel / commit     │  │ fail (policy applied)    │
//!     └─────────────────────┘  └──────────────────────────┘
//! ```
//!
//! With no server value the draft starts in `Editing` on a blank value
//! ("create" mode). Reconciling always means replacing the draft with a clone
//! of the server value.
//!
//! The draft also remembers the server value an edit started from, its
//! baseline, so a save can tell the fields the user changed from the ones
//! the server owns.
//!
//! [`EditSession`] wires a draft to a [`Resource`] holding the server copy
//! and an [`Action`] performing the save.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::action::{Action, Settlement};
use crate::merge;
use crate::reactive::{Effect, ReactiveContext};
use crate::resource::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditMode {
    Viewing,
    Editing,
}

/// What a failed save does to the draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RollbackPolicy {
    /// Keep the user's edits so they can retry.
    #[default]
    KeepEdits,
    /// Throw the edits away and show the server value again, still editing.
    RestoreServer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("the draft is not being edited")]
    NotEditing,
    #[error("there is no server value to edit")]
    NoServerValue,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SaveError<E> {
    #[error(transparent)]
    Draft(#[from] DraftError),
    #[error("the save was superseded by a newer save or a reset")]
    Superseded,
    #[error("the save was rejected")]
    Rejected(E),
}

/// A component-local working copy of a server entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft<T> {
    mode: EditMode,
    value: T,
    /// Server value the current edit started from.
    baseline: T,
    policy: RollbackPolicy,
    /// Editing because the entity does not exist yet.
    creating: bool,
    /// `edit` has been called since the draft was last reconciled.
    touched: bool,
}

impl<T> Draft<T>
where
    T: Clone + Default,
{
    pub fn new(server: Option<&T>) -> Self {
        match server {
            Some(value) => Self {
                mode: EditMode::Viewing,
                value: value.clone(),
                baseline: value.clone(),
                policy: RollbackPolicy::default(),
                creating: false,
                touched: false,
            },
            None => Self {
                mode: EditMode::Editing,
                value: T::default(),
                baseline: T::default(),
                policy: RollbackPolicy::default(),
                creating: true,
                touched: false,
            },
        }
    }

    pub fn with_policy(mut self, policy: RollbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn set_policy(&mut self, policy: RollbackPolicy) {
        self.policy = policy;
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn is_editing(&self) -> bool {
        self.mode == EditMode::Editing
    }

    /// Editing an entity that does not exist on the server yet.
    pub fn is_creating(&self) -> bool {
        self.creating
    }

    pub fn policy(&self) -> RollbackPolicy {
        self.policy
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// The server value the edit started from; blank in create mode.
    pub fn baseline(&self) -> &T {
        &self.baseline
    }

    /// `Viewing -> Editing` with a fresh copy of the server value.
    ///
    /// Already editing: nothing changes, edits in progress are kept.
    pub fn begin_edit(&mut self, server: &T) {
        if self.mode == EditMode::Viewing {
            self.value = server.clone();
            self.baseline = server.clone();
            self.mode = EditMode::Editing;
            self.touched = false;
        }
    }

    pub fn edit<F>(&mut self, f: F) -> Result<(), DraftError>
    where
        F: FnOnce(&mut T),
    {
        if self.mode != EditMode::Editing {
            return Err(DraftError::NotEditing);
        }
        f(&mut self.value);
        self.touched = true;
        Ok(())
    }

    /// Drop local changes.
    ///
    /// With a server value the draft goes back to `Viewing` on a copy of it.
    /// Without one it stays in create mode on a blank value.
    pub fn cancel(&mut self, server: Option<&T>) {
        self.reconcile(server);
    }

    /// The value to submit.
    pub fn payload(&self) -> Result<T, DraftError> {
        if self.mode != EditMode::Editing {
            return Err(DraftError::NotEditing);
        }
        Ok(self.value.clone())
    }

    /// Save succeeded: show the confirmed value.
    pub fn commit(&mut self, confirmed: T) {
        self.baseline = confirmed.clone();
        self.value = confirmed;
        self.mode = EditMode::Viewing;
        self.creating = false;
        self.touched = false;
    }

    /// Save failed: stay in `Editing`, applying the rollback policy.
    pub fn fail(&mut self, server: Option<&T>) {
        self.mode = EditMode::Editing;
        if self.policy == RollbackPolicy::RestoreServer {
            self.value = server.cloned().unwrap_or_default();
            self.baseline = self.value.clone();
            self.touched = false;
        }
    }

    /// Follow a newer server value while not editing.
    ///
    /// An untouched create-mode draft also switches to `Viewing` once the
    /// entity turns out to exist.
    pub fn sync(&mut self, server: Option<&T>) {
        let follows_server = match self.mode {
            EditMode::Viewing => true,
            EditMode::Editing => self.creating && !self.touched,
        };
        if follows_server {
            self.reconcile(server);
        }
    }

    fn reconcile(&mut self, server: Option<&T>) {
        self.touched = false;
        match server {
            Some(value) => {
                self.value = value.clone();
                self.baseline = value.clone();
                self.mode = EditMode::Viewing;
                self.creating = false;
            }
            None => {
                self.value = T::default();
                self.baseline = T::default();
                self.mode = EditMode::Editing;
                self.creating = true;
            }
        }
    }
}

/// `(returned, baseline, submitted) -> cached`.
type Merge<T> = Arc<dyn Fn(T, &T, &T) -> T + Send + Sync>;

/// A [`Draft`] bound to the resource that holds its server copy and the
/// action that saves it.
///
/// While viewing, the draft follows the resource. [`EditSession::save`]
/// submits the draft, folds the response into the resource cache with the
/// merge function and returns to viewing; on rejection it stays in editing
/// and applies the rollback policy.
///
/// The merge receives the server's response, the edit's baseline and the
/// submitted draft.
pub struct EditSession<K, T, E>
where
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
    T: Clone + Default + Debug + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    resource: Resource<K, T, E>,
    submit: Action<T, T, E>,
    draft: Arc<Mutex<Draft<T>>>,
    merge: Merge<T>,
    _follow: Effect,
}

impl<K, T, E> EditSession<K, T, E>
where
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
    T: Clone + Default + Debug + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Couple `resource` and `submit`, merging saves with
    /// [`merge::rebase_edits`].
    ///
    /// When the draft cannot be serialized (a pending image, say) the
    /// server's response is cached as is.
    pub fn new(resource: Resource<K, T, E>, submit: Action<T, T, E>) -> Self
    where
        T: Serialize + DeserializeOwned,
    {
        Self::with_merge(resource, submit, |returned, baseline, submitted| {
            match merge::rebase_edits(&returned, baseline, submitted) {
                Ok(merged) => merged,
                Err(err) => {
                    debug!(%err, "draft not mergeable; caching server copy");
                    returned
                }
            }
        })
    }

    pub fn with_merge<M>(resource: Resource<K, T, E>, submit: Action<T, T, E>, merge: M) -> Self
    where
        M: Fn(T, &T, &T) -> T + Send + Sync + 'static,
    {
        let draft = Arc::new(Mutex::new(Draft::new(resource.value().as_ref())));

        let follow = Effect::new({
            let state = resource.state_signal();
            let draft = Arc::clone(&draft);
            move || {
                let server = state.with(|s| s.value().cloned());
                ReactiveContext::untracked(|| draft.lock().sync(server.as_ref()));
            }
        });

        Self {
            resource,
            submit,
            draft,
            merge: Arc::new(merge),
            _follow: follow,
        }
    }

    pub fn with_policy(self, policy: RollbackPolicy) -> Self {
        self.draft.lock().set_policy(policy);
        self
    }

    pub fn resource(&self) -> &Resource<K, T, E> {
        &self.resource
    }

    pub fn submit_action(&self) -> &Action<T, T, E> {
        &self.submit
    }

    pub fn mode(&self) -> EditMode {
        self.draft.lock().mode()
    }

    pub fn is_creating(&self) -> bool {
        self.draft.lock().is_creating()
    }

    /// Snapshot of the working copy.
    pub fn draft(&self) -> T {
        self.draft.lock().value().clone()
    }

    pub fn begin_edit(&self) -> Result<(), DraftError> {
        let server = self.resource.value();
        let mut draft = self.draft.lock();
        match server {
            Some(value) => {
                draft.begin_edit(&value);
                Ok(())
            }
            None if draft.is_editing() => Ok(()),
            None => Err(DraftError::NoServerValue),
        }
    }

    pub fn edit<F>(&self, f: F) -> Result<(), DraftError>
    where
        F: FnOnce(&mut T),
    {
        self.draft.lock().edit(f)
    }

    pub fn cancel(&self) {
        let server = self.resource.value();
        self.draft.lock().cancel(server.as_ref());
        debug!("edit cancelled");
    }

    /// Submit the draft and wait for the outcome.
    ///
    /// Returns the merged value now cached in the resource.
    pub async fn save(&self) -> Result<T, SaveError<E>> {
        let (payload, baseline) = {
            let draft = self.draft.lock();
            (draft.payload()?, draft.baseline().clone())
        };

        match self.submit.dispatch(payload.clone()).settled().await {
            Settlement::Applied(Ok(returned)) => {
                let merged = (self.merge)(returned, &baseline, &payload);
                self.resource.mutate(merged.clone());
                self.draft.lock().commit(merged.clone());
                debug!("draft saved");
                Ok(merged)
            }
            Settlement::Applied(Err(error)) => {
                let server = self.resource.value();
                self.draft.lock().fail(server.as_ref());
                debug!("draft save rejected");
                Err(SaveError::Rejected(error))
            }
            Settlement::Discarded => Err(SaveError::Superseded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Profile {
        name: String,
        bio: String,
    }

    fn server() -> Profile {
        Profile {
            name: "Ada".into(),
            bio: "math".into(),
        }
    }

    #[test]
    fn starts_viewing_with_server_value() {
        let draft = Draft::new(Some(&server()));
        assert_eq!(draft.mode(), EditMode::Viewing);
        assert_eq!(draft.value(), &server());
        assert!(!draft.is_creating());
    }

    #[test]
    fn starts_creating_without_server_value() {
        let draft = Draft::<Profile>::new(None);
        assert_eq!(draft.mode(), EditMode::Editing);
        assert!(draft.is_creating());
        assert_eq!(draft.value(), &Profile::default());
    }

    #[test]
    fn edit_requires_editing_mode() {
        let mut draft = Draft::new(Some(&server()));
        assert_eq!(draft.edit(|p| p.name.clear()), Err(DraftError::NotEditing));
        assert_eq!(draft.payload(), Err(DraftError::NotEditing));
    }

    #[test]
    fn cancel_restores_server_value() {
        let original = server();
        let mut draft = Draft::new(Some(&original));

        draft.begin_edit(&original);
        draft.edit(|p| p.name = "Grace".into()).unwrap();
        draft.cancel(Some(&original));

        assert_eq!(draft.mode(), EditMode::Viewing);
        assert_eq!(draft.value(), &original);

        draft.cancel(Some(&original));
        assert_eq!(draft.value(), &original);
    }

    #[test]
    fn begin_edit_while_editing_keeps_edits() {
        let original = server();
        let mut draft = Draft::new(Some(&original));
        draft.begin_edit(&original);
        draft.edit(|p| p.bio = "poetry".into()).unwrap();

        draft.begin_edit(&original);
        assert_eq!(draft.value().bio, "poetry");
    }

    #[test]
    fn failure_policies() {
        let original = server();

        let mut keep = Draft::new(Some(&original));
        keep.begin_edit(&original);
        keep.edit(|p| p.bio = "typo".into()).unwrap();
        keep.fail(Some(&original));
        assert!(keep.is_editing());
        assert_eq!(keep.value().bio, "typo");

        let mut restore = Draft::new(Some(&original)).with_policy(RollbackPolicy::RestoreServer);
        restore.begin_edit(&original);
        restore.edit(|p| p.bio = "typo".into()).unwrap();
        restore.fail(Some(&original));
        assert!(restore.is_editing());
        assert_eq!(restore.value(), &original);
    }

    #[test]
    fn baseline_tracks_where_the_edit_started() {
        let original = server();
        let mut draft = Draft::new(Some(&original));
        draft.begin_edit(&original);
        draft.edit(|p| p.bio = "poetry".into()).unwrap();
        assert_eq!(draft.baseline(), &original);

        // Kept edits keep their baseline
        draft.fail(Some(&original));
        assert_eq!(draft.baseline(), &original);

        let blank = Draft::<Profile>::new(None);
        assert_eq!(blank.baseline(), &Profile::default());
    }

    #[test]
    fn commit_returns_to_viewing() {
        let mut draft = Draft::<Profile>::new(None);
        draft.edit(|p| p.name = "New".into()).unwrap();
        let confirmed = Profile {
            name: "New".into(),
            bio: String::new(),
        };
        draft.commit(confirmed.clone());

        assert_eq!(draft.mode(), EditMode::Viewing);
        assert!(!draft.is_creating());
        assert_eq!(draft.value(), &confirmed);
    }

    #[test]
    fn sync_follows_server_unless_user_is_editing() {
        let mut draft = Draft::new(Some(&server()));
        let newer = Profile {
            name: "Ada L.".into(),
            bio: "math".into(),
        };
        draft.sync(Some(&newer));
        assert_eq!(draft.value(), &newer);

        draft.begin_edit(&newer);
        draft.edit(|p| p.bio = "draft".into()).unwrap();
        draft.sync(Some(&server()));
        assert_eq!(draft.value().bio, "draft");
    }

    #[test]
    fn untouched_create_draft_adopts_late_server_value() {
        let mut draft = Draft::<Profile>::new(None);
        draft.sync(Some(&server()));
        assert_eq!(draft.mode(), EditMode::Viewing);
        assert_eq!(draft.value(), &server());

        let mut typed = Draft::<Profile>::new(None);
        typed.edit(|p| p.name = "mine".into()).unwrap();
        typed.sync(Some(&server()));
        assert!(typed.is_editing());
        assert_eq!(typed.value().name, "mine");
    }
}
