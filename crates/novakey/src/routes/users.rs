use novakey_core::{Constraint, Schema, Validate};
use serde::{Deserialize, Serialize};

use super::{is_blank, is_unset, signed};

/// Create or update a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AddUserRequest {
    #[serde(skip_serializing_if = "is_blank")]
    pub id: Option<String>,
    pub email: String,
    pub public_key: String,
    pub signature: String,
    pub message: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "is_blank")]
    pub password: Option<String>,
}

impl Validate for AddUserRequest {
    fn schema() -> Schema {
        signed(Schema::new().field("email", [Constraint::Required, Constraint::Email]))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AddUserResponse {
    #[serde(skip_serializing_if = "is_blank")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "is_blank")]
    pub username: Option<String>,
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

/// Delete the user owning `publicKey`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeleteUserRequest {
    pub public_key: String,
    pub signature: String,
    pub message: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "is_blank")]
    pub password: Option<String>,
}

impl Validate for DeleteUserRequest {
    fn schema() -> Schema {
        signed(Schema::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeleteUserResponse {
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
    fn test_add_user_requires_valid_email() {
        let request = AddUserRequest {
            email: "nobody".into(),
            public_key: "ssh-ed25519 AAAA".into(),
            signature: "sig".into(),
            message: "hello".into(),
            timestamp: 1_700_000_000,
            ..Default::default()
        };
        let err = validate(&request).unwrap_err();
        let violations = err.violations().unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "email");
        assert_eq!(violations[0].tag, "email");
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let request = DeleteUserRequest { public_key: "k".into(), ..Default::default() };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["publicKey"], "k");
    }

    #[test]
    fn test_empty_id_and_password_are_not_forwarded() {
        let request: AddUserRequest = serde_json::from_str(
            r#"{"id":"","email":"a@b.co","publicKey":"k","signature":"s","message":"m","timestamp":1,"password":""}"#,
        )
        .unwrap();
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("id").is_none(), "{json}");
        assert!(json.get("password").is_none(), "{json}");
        assert_eq!(json["email"], "a@b.co");
    }

    #[test]
    fn test_zero_status_and_empty_code_are_omitted() {
        let response: AddUserResponse =
            serde_json::from_str(r#"{"id":"u-1","code":"","status":0,"errorDescription":""}"#)
                .unwrap();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({"id": "u-1"}));
    }
}
