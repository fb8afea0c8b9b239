//! HTTP router and error mapping.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, MethodRouter},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use novakey_core::{ErrorClass, Gateway, GatewayError, GatewayResult, Procedure, RpcEndpoint, Validate};

use crate::config::ServerConfig;
use crate::routes::{projects, users, workspaces};

/// Shared application state
pub struct AppState<E> {
    pub gateway: Gateway<E>,
}

/// API error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// A pipeline failure rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            GatewayError::Validation { errors } => (StatusCode::BAD_REQUEST, Json(errors)).into_response(),
            GatewayError::Parse { .. } => error_body(StatusCode::BAD_REQUEST, "Cannot parse JSON"),
            GatewayError::Serialize { .. } => {
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "cannot marshal request")
            }
            GatewayError::Decode { .. } => {
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "cannot decode db response")
            }
            GatewayError::Database { message, .. } => {
                error_body(StatusCode::INTERNAL_SERVER_ERROR, message)
            }
            err => {
                let status = match err.class() {
                    ErrorClass::Validation => StatusCode::BAD_REQUEST,
                    ErrorClass::Fatal | ErrorClass::Pipeline => StatusCode::INTERNAL_SERVER_ERROR,
                };
                error_body(status, err.to_string())
            }
        }
    }
}

fn error_body(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: error.into() })).into_response()
}

/// Create the API router.
///
/// Fails only if a route's procedure name is malformed.
pub fn create_router<E>(state: Arc<AppState<E>>, config: &ServerConfig) -> GatewayResult<Router>
where
    E: RpcEndpoint + 'static,
{
    let router = Router::new()
        .route("/health", get(health))
        .route(
            "/users/set",
            rpc::<E, users::AddUserRequest, users::AddUserResponse>("users.set_user")?,
        )
        .route(
            "/users/delete",
            rpc::<E, users::DeleteUserRequest, users::DeleteUserResponse>("users.delete_user")?,
        )
        .route(
            "/workspaces/set",
            rpc::<E, workspaces::SetWorkspaceRequest, workspaces::SetWorkspaceResponse>(
                "workspaces.set_workspace",
            )?,
        )
        .route(
            "/workspaces/delete",
            rpc::<E, workspaces::DeleteWorkspaceRequest, workspaces::DeleteWorkspaceResponse>(
                "workspaces.delete_workspace",
            )?,
        )
        .route(
            "/projects/set",
            rpc::<E, projects::SetProjectRequest, projects::SetProjectResponse>(
                "projects.set_project",
            )?,
        )
        .route(
            "/projects/delete",
            rpc::<E, projects::DeleteProjectRequest, projects::DeleteProjectResponse>(
                "projects.delete_project",
            )?,
        )
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(router)
}

/// A POST route that runs the body through the gateway into `procedure`.
fn rpc<E, Req, Resp>(procedure: &str) -> GatewayResult<MethodRouter<Arc<AppState<E>>>>
where
    E: RpcEndpoint + 'static,
    Req: DeserializeOwned + Serialize + Validate + Send + 'static,
    Resp: DeserializeOwned + Serialize + Send + 'static,
{
    let procedure = Arc::new(Procedure::new(procedure)?);
    Ok(post(move |State(state): State<Arc<AppState<E>>>, body: Bytes| {
        let procedure = Arc::clone(&procedure);
        async move {
            state
                .gateway
                .handle::<Req, Resp>(&body, &procedure)
                .await
                .map(Json)
                .map_err(ApiError::from)
        }
    }))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring malformed CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
}

/// Health check endpoint
async fn health() -> &'static str {
    "OK"
}
