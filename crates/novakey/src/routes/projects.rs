use novakey_core::{Constraint, Schema, Validate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{is_blank, is_unset, signed};

/// Create or update a project inside a workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SetProjectRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub workspace_id: String,
    pub name: String,
    pub description: String,
    pub public_key: String,
    pub signature: String,
    pub message: String,
    pub timestamp: i64,
}

impl Validate for SetProjectRequest {
    fn schema() -> Schema {
        signed(
            Schema::new()
                .field("workspaceId", [Constraint::Required, Constraint::Uuid])
                .field("name", [Constraint::Required, Constraint::Max(255)]),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SetProjectResponse {
    #[serde(skip_serializing_if = "is_blank")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "is_blank")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "is_blank")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_blank")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "is_unset")]
    pub status: Option<i64>,
    #[serde(skip_serializing_if = "is_blank")]
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeleteProjectRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub public_key: String,
    pub signature: String,
    pub message: String,
    pub timestamp: i64,
}

impl Validate for DeleteProjectRequest {
    fn schema() -> Schema {
        signed(Schema::new().field("id", [Constraint::Required]))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeleteProjectResponse {
    #[serde(skip_serializing_if = "is_blank")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "is_blank")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "is_unset")]
    pub status: Option<i64>,
    #[serde(skip_serializing_if = "is_blank")]
    pub error_description: Option<String>,
}
