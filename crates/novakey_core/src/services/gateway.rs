//! Generic request pipeline: parse, validate, marshal, call, unmarshal.
//!
//! The gateway knows nothing about entities. Callers pick a request type, a
//! response type and a [`Procedure`]; the database does the rest.

use crate::error::{GatewayError, GatewayResult};
use crate::models::{Procedure, Validate};
use crate::services::validator::validate;
use crate::state::GatewayContext;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Something that can execute a single-document procedure call.
#[async_trait]
pub trait RpcEndpoint: Send + Sync {
    /// Invoke `procedure` with one JSON document and return its JSON result.
    async fn call(&self, procedure: &Procedure, payload: Value) -> GatewayResult<Value>;
}

/// Calls procedures on the shared PostgreSQL pool.
///
/// The pool (and tunnel) are created on the first call.
#[derive(Clone)]
pub struct PgRpcEndpoint {
    context: Arc<GatewayContext>,
}

impl PgRpcEndpoint {
    /// Create an endpoint backed by `context`.
    pub fn new(context: Arc<GatewayContext>) -> Self {
        Self { context }
    }

    /// The context owning the pool.
    pub fn context(&self) -> &Arc<GatewayContext> {
        &self.context
    }
}

#[async_trait]
impl RpcEndpoint for PgRpcEndpoint {
    async fn call(&self, procedure: &Procedure, payload: Value) -> GatewayResult<Value> {
        let pool = self.context.connect().await?;
        pool.call_json(procedure.statement(), &payload).await
    }
}

/// The request pipeline.
pub struct Gateway<E = PgRpcEndpoint> {
    endpoint: E,
}

impl Gateway<PgRpcEndpoint> {
    /// Gateway calling procedures on the context's PostgreSQL pool.
    pub fn postgres(context: Arc<GatewayContext>) -> Self {
        Self::new(PgRpcEndpoint::new(context))
    }
}

impl<E: RpcEndpoint> Gateway<E> {
    /// Create a gateway over any endpoint.
    pub fn new(endpoint: E) -> Self {
        Self { endpoint }
    }

    /// The underlying endpoint.
    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Run one request through the pipeline.
    ///
    /// Parse and validation failures return before the endpoint is touched.
    /// The endpoint is called exactly once otherwise; it is never retried.
    pub async fn handle<Req, Resp>(&self, raw_body: &[u8], procedure: &Procedure) -> GatewayResult<Resp>
    where
        Req: DeserializeOwned + Serialize + Validate,
        Resp: DeserializeOwned,
    {
        let request: Req =
            serde_json::from_slice(raw_body).map_err(|e| GatewayError::parse(e.to_string()))?;

        validate(&request)?;

        let payload = serde_json::to_value(&request)
            .map_err(|e| GatewayError::serialize(e.to_string()))?;

        let started = Instant::now();
        let result = self.endpoint.call(procedure, payload).await.inspect_err(|e| {
            tracing::warn!(procedure = %procedure, error = %e, "Procedure call failed");
        })?;
        tracing::debug!(
            procedure = %procedure,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Procedure call completed"
        );

        serde_json::from_value(result).map_err(|e| {
            tracing::warn!(procedure = %procedure, error = %e, "Procedure returned unexpected document");
            GatewayError::decode(e.to_string())
        })
    }
}
