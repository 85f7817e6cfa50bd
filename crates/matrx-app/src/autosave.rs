use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use matrx_client::{best_effort, NoteFilter, RestInvoker};
use matrx_types::{FolderTree, Note, UpdateNoteRequest};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Remote side of the editor. [`RestInvoker`] is the production store.
#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn update_note(&self, note_id: &str, request: &UpdateNoteRequest) -> matrx_client::Result<Note>;
    async fn folder_tree(&self) -> matrx_client::Result<FolderTree>;
    async fn list_notes(&self) -> matrx_client::Result<Vec<Note>>;
}

#[async_trait]
impl NoteStore for RestInvoker {
    async fn update_note(&self, note_id: &str, request: &UpdateNoteRequest) -> matrx_client::Result<Note> {
        RestInvoker::update_note(self, note_id, request).await
    }

    async fn folder_tree(&self) -> matrx_client::Result<FolderTree> {
        RestInvoker::folder_tree(self).await
    }

    async fn list_notes(&self) -> matrx_client::Result<Vec<Note>> {
        RestInvoker::list_notes(self, &NoteFilter::default()).await
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditorSnapshot {
    pub note: Option<Note>,
    pub dirty: bool,
    pub saving: bool,
    pub last_error: Option<String>,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub tree: FolderTree,
    pub notes: Vec<Note>,
}

#[derive(Default)]
struct EditorState {
    note: Option<Note>,
    /// Bumped on every `open`; saves started under an older epoch leave state alone.
    epoch: u64,
    revision: u64,
    saved_revision: u64,
    unsaved_metadata: Option<UpdateNoteRequest>,
    saving: bool,
    last_error: Option<String>,
    last_saved_at: Option<DateTime<Utc>>,
    tree: FolderTree,
    notes: Vec<Note>,
    timer_generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl EditorState {
    fn dirty(&self) -> bool {
        self.revision > self.saved_revision || self.unsaved_metadata.is_some()
    }

    fn cancel_timer(&mut self) -> bool {
        self.timer_generation += 1;
        match self.timer.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

struct EditorInner {
    store: Arc<dyn NoteStore>,
    debounce: Duration,
    state: Mutex<EditorState>,
    save_lock: tokio::sync::Mutex<()>,
}

impl Drop for EditorInner {
    fn drop(&mut self) {
        self.state.get_mut().cancel_timer();
    }
}

/// Editing state for one open note.
///
/// Content edits land in memory at once and reach the engine after the
/// debounce window; each edit restarts the window, so a burst of keystrokes
/// becomes one `PUT`. Label and folder changes are written immediately and
/// then refresh the folder tree and note list. A failed save leaves the edit
/// dirty until [`NoteEditor::retry`] or the next successful save.
#[derive(Clone)]
pub struct NoteEditor {
    inner: Arc<EditorInner>,
}

impl NoteEditor {
    pub fn new(store: Arc<dyn NoteStore>) -> Self {
        Self::with_debounce(store, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(store: Arc<dyn NoteStore>, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(EditorInner {
                store,
                debounce,
                state: Mutex::new(EditorState::default()),
                save_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Switches to `note`, dropping any scheduled save for the previous one.
    pub fn open(&self, note: Note) {
        let mut state = self.inner.state.lock();
        state.cancel_timer();
        state.epoch += 1;
        state.note = Some(note);
        state.revision = 0;
        state.saved_revision = 0;
        state.unsaved_metadata = None;
        state.last_error = None;
    }

    pub fn edit_content(&self, content: impl Into<String>) -> Result<()> {
        let mut state = self.inner.state.lock();
        let note = state.note.as_mut().ok_or(AppError::NoNoteOpen)?;
        note.content = content.into();
        state.revision += 1;
        state.cancel_timer();

        let generation = state.timer_generation;
        let debounce = self.inner.debounce;
        let weak = Arc::downgrade(&self.inner);
        state.timer = Some(tokio::spawn(debounced_save(weak, generation, debounce)));
        Ok(())
    }

    /// Applies a label/folder/tag change locally and writes it right away.
    pub async fn update_metadata(&self, request: UpdateNoteRequest) -> Result<Note> {
        let refresh = request.touches_grouping();
        {
            let mut state = self.inner.state.lock();
            let note = state.note.as_mut().ok_or(AppError::NoNoteOpen)?;
            apply_metadata(note, &request);
            let merged = merge_metadata(state.unsaved_metadata.take(), request);
            state.unsaved_metadata = Some(merged);
        }
        let note = self.inner.save().await?;
        if refresh {
            self.refresh().await;
        }
        Ok(note)
    }

    /// Saves now, skipping the remaining debounce window.
    pub async fn flush(&self) -> Result<Option<Note>> {
        let dirty = {
            let mut state = self.inner.state.lock();
            state.cancel_timer();
            state.dirty()
        };
        if !dirty {
            return Ok(None);
        }
        self.inner.save().await.map(Some)
    }

    pub async fn retry(&self) -> Result<Option<Note>> {
        self.inner.state.lock().last_error = None;
        self.flush().await
    }

    /// Drops a scheduled save without sending it. The edit stays dirty.
    pub fn cancel_pending(&self) -> bool {
        self.inner.state.lock().cancel_timer()
    }

    pub fn has_pending_save(&self) -> bool {
        self.inner.state.lock().timer.is_some()
    }

    /// Reloads the folder tree and note list; failures keep the previous data.
    pub async fn refresh(&self) {
        let (current_tree, current_notes) = {
            let state = self.inner.state.lock();
            (state.tree.clone(), state.notes.clone())
        };
        let store = Arc::clone(&self.inner.store);
        let (tree, notes) = futures::join!(
            best_effort("folder tree", store.folder_tree(), current_tree),
            best_effort("note list", store.list_notes(), current_notes),
        );
        let mut state = self.inner.state.lock();
        state.tree = tree;
        state.notes = notes;
    }

    pub fn snapshot(&self) -> EditorSnapshot {
        let state = self.inner.state.lock();
        EditorSnapshot {
            note: state.note.clone(),
            dirty: state.dirty(),
            saving: state.saving,
            last_error: state.last_error.clone(),
            last_saved_at: state.last_saved_at,
            tree: state.tree.clone(),
            notes: state.notes.clone(),
        }
    }
}

async fn debounced_save(inner: Weak<EditorInner>, generation: u64, debounce: Duration) {
    tokio::time::sleep(debounce).await;
    let Some(inner) = inner.upgrade() else {
        return;
    };
    {
        let mut state = inner.state.lock();
        if state.timer_generation != generation {
            return;
        }
        state.timer = None;
    }
    if let Err(e) = inner.save().await {
        tracing::warn!("Autosave failed: {}", e);
    }
}

impl EditorInner {
    async fn save(&self) -> Result<Note> {
        let _serial = self.save_lock.lock().await;
        let (note_id, request, revision, epoch) = {
            let mut state = self.state.lock();
            let note = state.note.as_ref().ok_or(AppError::NoNoteOpen)?;
            let mut request = state.unsaved_metadata.clone().unwrap_or_default();
            if state.revision > state.saved_revision {
                request.content = Some(note.content.clone());
            }
            let note_id = note.id.clone();
            state.saving = true;
            (note_id, request, state.revision, state.epoch)
        };

        let outcome = self.store.update_note(&note_id, &request).await;

        let mut state = self.state.lock();
        state.saving = false;
        let same_epoch = state.epoch == epoch;
        match outcome {
            Ok(saved) => {
                if same_epoch {
                    state.saved_revision = state.saved_revision.max(revision);
                    if state.unsaved_metadata.as_ref() == Some(&request_metadata(&request)) {
                        state.unsaved_metadata = None;
                    }
                    let newer_local_edit = state.revision > revision;
                    if let Some(note) = state.note.as_mut() {
                        let local_content = std::mem::take(&mut note.content);
                        *note = saved.clone();
                        if newer_local_edit {
                            note.content = local_content;
                        }
                    }
                    state.last_error = None;
                    state.last_saved_at = Some(Utc::now());
                }
                Ok(saved)
            }
            Err(e) => {
                if same_epoch {
                    state.last_error = Some(e.to_string());
                }
                Err(e.into())
            }
        }
    }
}

fn request_metadata(request: &UpdateNoteRequest) -> UpdateNoteRequest {
    UpdateNoteRequest {
        content: None,
        ..request.clone()
    }
}

fn apply_metadata(note: &mut Note, request: &UpdateNoteRequest) {
    if let Some(label) = &request.label {
        note.label = label.clone();
    }
    if let Some(folder_name) = &request.folder_name {
        note.folder_name = folder_name.clone();
    }
    if let Some(folder_id) = &request.folder_id {
        note.folder_id = Some(folder_id.clone());
    }
    if let Some(tags) = &request.tags {
        note.tags = tags.clone();
    }
    if let Some(metadata) = &request.metadata {
        note.metadata = metadata.clone();
    }
    if let Some(position) = request.position {
        note.position = Some(position);
    }
}

fn merge_metadata(previous: Option<UpdateNoteRequest>, next: UpdateNoteRequest) -> UpdateNoteRequest {
    let Some(previous) = previous else {
        return next;
    };
    UpdateNoteRequest {
        label: next.label.or(previous.label),
        content: None,
        folder_name: next.folder_name.or(previous.folder_name),
        folder_id: next.folder_id.or(previous.folder_id),
        tags: next.tags.or(previous.tags),
        metadata: next.metadata.or(previous.metadata),
        position: next.position.or(previous.position),
    }
}
