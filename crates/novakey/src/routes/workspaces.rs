use novakey_core::{Constraint, Schema, Validate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{is_blank, is_unset, signed};

/// A project carried inline with a workspace update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkspaceProject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub name: String,
    pub description: String,
}

/// Create or update a workspace, optionally with its projects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SetWorkspaceRequest {
    #[serde(skip_serializing_if = "is_blank")]
    pub id: Option<String>,
    pub email: String,
    pub public_key: String,
    pub signature: String,
    pub message: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "is_blank")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<WorkspaceProject>,
}

impl Validate for SetWorkspaceRequest {
    fn schema() -> Schema {
        signed(Schema::new().field("email", [Constraint::Email]))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SetWorkspaceResponse {
    #[serde(skip_serializing_if = "is_blank")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "is_blank")]
    pub password: Option<String>,
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
pub struct DeleteWorkspaceRequest {
    #[serde(skip_serializing_if = "is_blank")]
    pub id: Option<String>,
    pub signature: String,
    pub message: String,
    pub timestamp: i64,
    pub public_key: String,
    #[serde(skip_serializing_if = "is_blank")]
    pub password: Option<String>,
}

impl Validate for DeleteWorkspaceRequest {
    fn schema() -> Schema {
        signed(Schema::new().field("id", [Constraint::Required]))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeleteWorkspaceResponse {
    #[serde(skip_serializing_if = "is_blank")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "is_blank")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "is_unset")]
    pub status: Option<i64>,
    #[serde(skip_serializing_if = "is_blank")]
    pub error_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use novakey_core::services::validate;

    #[test]
    fn test_nested_projects_parse() {
        let request: SetWorkspaceRequest = serde_json::from_str(
            r#"{"publicKey":"k","signature":"s","message":"m","timestamp":9,
                "projects":[{"id":"0f8fad5b-d9cb-469f-a165-70867728950e","name":"api"}]}"#,
        )
        .unwrap();
        assert_eq!(request.projects.len(), 1);
        assert_eq!(request.projects[0].name, "api");
        assert!(request.projects[0].description.is_empty());
        // email is optional for workspaces
        assert!(validate(&request).is_ok());
    }

    #[test]
    fn test_delete_requires_id() {
        let request = DeleteWorkspaceRequest {
            public_key: "k".into(),
            signature: "s".into(),
            message: "m".into(),
            timestamp: 1,
            ..Default::default()
        };
        let err = validate(&request).unwrap_err();
        assert_eq!(err.violations().unwrap()[0].field, "id");
    }
}
