use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Folder node as returned by `GET /documents/tree`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FolderNode {
    #[serde(flatten)]
    pub folder: Folder,
    #[serde(default)]
    pub note_count: u64,
    #[serde(default)]
    pub children: Vec<FolderNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FolderTree {
    #[serde(default)]
    pub folders: Vec<FolderNode>,
    #[serde(default)]
    pub total_notes: u64,
    #[serde(default)]
    pub unfiled_notes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Note {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_folder_name")]
    pub folder_name: String,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_folder_name() -> String {
    "General".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateFolderRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNoteRequest {
    pub label: String,
    #[serde(default)]
    pub content: String,
    pub folder_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Default for CreateNoteRequest {
    fn default() -> Self {
        Self {
            label: "New Note".to_string(),
            content: String::new(),
            folder_name: default_folder_name(),
            folder_id: None,
            tags: Vec::new(),
            metadata: Map::new(),
        }
    }
}

/// Partial note update; absent fields keep their server-side value.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UpdateNoteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

impl UpdateNoteRequest {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// True when the update can move the note between folders or rename it.
    pub fn touches_grouping(&self) -> bool {
        self.label.is_some() || self.folder_name.is_some() || self.folder_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoteVersion {
    pub version_number: i64,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevertRequest {
    pub version_number: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SyncStatus {
    #[serde(default)]
    pub configured: bool,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub last_sync_version: i64,
    #[serde(default)]
    pub last_full_sync: Option<String>,
    #[serde(default)]
    pub tracked_files: u64,
    #[serde(default)]
    pub conflicts: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullNoteRequest {
    pub note_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConflictList {
    #[serde(default)]
    pub conflicts: Vec<Value>,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    KeepLocal,
    #[default]
    KeepRemote,
    KeepBoth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictResolveRequest {
    pub resolution: ConflictResolution,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SharePermission {
    #[default]
    Read,
    Write,
    Admin,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShareRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_with_id: Option<String>,
    #[serde(default)]
    pub permission: SharePermission,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateShareRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<SharePermission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Share {
    pub id: String,
    #[serde(default)]
    pub note_id: Option<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub shared_with_id: Option<String>,
    #[serde(default)]
    pub permission: SharePermission,
    #[serde(default)]
    pub is_public: bool,
    /// `owned` or `shared_with_me`, set by the list endpoint.
    #[serde(rename = "_direction", default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingRequest {
    pub folder_id: String,
    pub local_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DirectoryMappings {
    #[serde(default)]
    pub cloud_mappings: Vec<Value>,
    /// folder id → local paths on this device.
    #[serde(default)]
    pub local_mappings: Map<String, Value>,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Generic `{ "status": "..." }` acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StatusAck {
    #[serde(default)]
    pub status: String,
}
