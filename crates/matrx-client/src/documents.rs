//! `/documents/*`: folders, notes, versions, sync, conflicts, shares and
//! directory mappings. Every route needs `X-User-Id`, so each call checks
//! for a configured user before anything goes on the wire.

use matrx_types::{
    ConflictList, ConflictResolution, ConflictResolveRequest, CreateFolderRequest,
    CreateNoteRequest, DirectoryMappings, Folder, FolderTree, MappingRequest, Note, NoteVersion,
    PullNoteRequest, RevertRequest, Share, ShareRequest, StatusAck, SyncStatus,
    UpdateFolderRequest, UpdateNoteRequest, UpdateShareRequest,
};
use reqwest::Method;
use serde_json::{json, Value};

use crate::error::Result;
use crate::rest::RestInvoker;

#[derive(Debug, Clone, Default)]
pub struct NoteFilter {
    pub folder_id: Option<String>,
    pub search: Option<String>,
}

impl RestInvoker {
    pub async fn folder_tree(&self) -> Result<FolderTree> {
        self.require_user()?;
        self.get_json("/documents/tree").await
    }

    pub async fn create_folder(&self, request: &CreateFolderRequest) -> Result<Folder> {
        self.require_user()?;
        self.post_json("/documents/folders", request).await
    }

    pub async fn update_folder(&self, folder_id: &str, request: &UpdateFolderRequest) -> Result<Folder> {
        self.require_user()?;
        self.put_json(&format!("/documents/folders/{}", folder_id), request)
            .await
    }

    pub async fn delete_folder(&self, folder_id: &str) -> Result<StatusAck> {
        self.require_user()?;
        self.delete_json(&format!("/documents/folders/{}", folder_id))
            .await
    }

    pub async fn list_notes(&self, filter: &NoteFilter) -> Result<Vec<Note>> {
        self.require_user()?;
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(folder_id) = filter.folder_id.as_deref() {
            query.push(("folder_id", folder_id));
        }
        if let Some(search) = filter.search.as_deref() {
            query.push(("search", search));
        }
        let builder = self
            .request(Method::GET, "/documents/notes")
            .await
            .query(&query);
        self.send(builder).await
    }

    pub async fn get_note(&self, note_id: &str) -> Result<Note> {
        self.require_user()?;
        self.get_json(&format!("/documents/notes/{}", note_id)).await
    }

    pub async fn create_note(&self, request: &CreateNoteRequest) -> Result<Note> {
        self.require_user()?;
        self.post_json("/documents/notes", request).await
    }

    pub async fn update_note(&self, note_id: &str, request: &UpdateNoteRequest) -> Result<Note> {
        self.require_user()?;
        self.put_json(&format!("/documents/notes/{}", note_id), request)
            .await
    }

    pub async fn delete_note(&self, note_id: &str) -> Result<StatusAck> {
        self.require_user()?;
        self.delete_json(&format!("/documents/notes/{}", note_id))
            .await
    }

    pub async fn note_versions(&self, note_id: &str) -> Result<Vec<NoteVersion>> {
        self.require_user()?;
        self.get_json(&format!("/documents/notes/{}/versions", note_id))
            .await
    }

    pub async fn revert_note(&self, note_id: &str, version_number: i64) -> Result<Note> {
        self.require_user()?;
        self.post_json(
            &format!("/documents/notes/{}/revert", note_id),
            &RevertRequest { version_number },
        )
        .await
    }

    pub async fn sync_status(&self) -> Result<SyncStatus> {
        self.require_user()?;
        self.get_json("/documents/sync/status").await
    }

    pub async fn trigger_sync(&self) -> Result<Value> {
        self.require_user()?;
        self.post_json("/documents/sync/trigger", &json!({})).await
    }

    pub async fn pull_changes(&self) -> Result<Value> {
        self.require_user()?;
        self.post_json("/documents/sync/pull", &json!({})).await
    }

    pub async fn pull_note(&self, note_id: &str) -> Result<Value> {
        self.require_user()?;
        self.post_json(
            "/documents/sync/pull-note",
            &PullNoteRequest {
                note_id: note_id.to_string(),
            },
        )
        .await
    }

    pub async fn register_device(&self) -> Result<Value> {
        self.require_user()?;
        self.post_json("/documents/sync/register-device", &json!({}))
            .await
    }

    pub async fn start_watcher(&self) -> Result<StatusAck> {
        self.require_user()?;
        self.post_json("/documents/sync/start-watcher", &json!({}))
            .await
    }

    pub async fn stop_watcher(&self) -> Result<StatusAck> {
        self.require_user()?;
        self.post_json("/documents/sync/stop-watcher", &json!({}))
            .await
    }

    pub async fn conflicts(&self) -> Result<ConflictList> {
        self.require_user()?;
        self.get_json("/documents/conflicts").await
    }

    pub async fn resolve_conflict(&self, note_id: &str, resolution: ConflictResolution) -> Result<Value> {
        self.require_user()?;
        self.post_json(
            &format!("/documents/conflicts/{}/resolve", note_id),
            &ConflictResolveRequest { resolution },
        )
        .await
    }

    pub async fn list_shares(&self) -> Result<Vec<Share>> {
        self.require_user()?;
        self.get_json("/documents/shares").await
    }

    pub async fn create_share(&self, request: &ShareRequest) -> Result<Share> {
        self.require_user()?;
        self.post_json("/documents/shares", request).await
    }

    pub async fn update_share(&self, share_id: &str, request: &UpdateShareRequest) -> Result<Share> {
        self.require_user()?;
        self.put_json(&format!("/documents/shares/{}", share_id), request)
            .await
    }

    pub async fn delete_share(&self, share_id: &str) -> Result<StatusAck> {
        self.require_user()?;
        self.delete_json(&format!("/documents/shares/{}", share_id))
            .await
    }

    pub async fn directory_mappings(&self) -> Result<DirectoryMappings> {
        self.require_user()?;
        self.get_json("/documents/mappings").await
    }

    pub async fn create_mapping(&self, request: &MappingRequest) -> Result<Value> {
        self.require_user()?;
        self.post_json("/documents/mappings", request).await
    }

    /// Removes the cloud mapping and, when both are given, the local
    /// `folder_id → local_path` entry on this device.
    pub async fn delete_mapping(
        &self,
        mapping_id: &str,
        folder_id: Option<&str>,
        local_path: Option<&str>,
    ) -> Result<StatusAck> {
        self.require_user()?;
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(folder_id) = folder_id {
            query.push(("folder_id", folder_id));
        }
        if let Some(local_path) = local_path {
            query.push(("local_path", local_path));
        }
        let builder = self
            .request(Method::DELETE, &format!("/documents/mappings/{}", mapping_id))
            .await
            .query(&query);
        self.send(builder).await
    }
}
