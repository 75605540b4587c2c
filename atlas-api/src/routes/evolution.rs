//! Evolution run endpoint.

use atlas_engine::{EvolutionEngine, EvolutionRequest, EvolutionSummary};
use axum::{body::Bytes, extract::State, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Successful run payload: the summary plus a success flag.
#[derive(Debug, Clone, Serialize)]
pub struct EvolutionResponse {
    pub success: bool,
    #[serde(flatten)]
    pub summary: EvolutionSummary,
}

/// Parse a run request. An empty body means "all defaults".
pub fn parse_request(body: &[u8]) -> ApiResult<EvolutionRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(EvolutionRequest::default());
    }
    Ok(serde_json::from_slice(body)?)
}

/// POST /api/v1/evolution/run
///
/// Runs synchronously and answers with the summary. Any error that escapes
/// the engine is fatal and answered with a single error payload.
pub async fn run_evolution(
    State(engine): State<EvolutionEngine>,
    body: Bytes,
) -> ApiResult<Json<EvolutionResponse>> {
    let request_id = Uuid::new_v4().to_string();

    let request = parse_request(&body).map_err(|e| {
        tracing::warn!(request_id = %request_id, error = %e, "Rejected evolution request");
        e.with_request_id(request_id.clone())
    })?;

    match engine.run(&request, &request_id).await {
        Ok(summary) => Ok(Json(EvolutionResponse {
            success: true,
            summary,
        })),
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Evolution run failed");
            Err(ApiError::from(e).with_request_id(request_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_body_uses_defaults() {
        assert_eq!(parse_request(b"").unwrap(), EvolutionRequest::default());
        assert_eq!(parse_request(b"  \n").unwrap(), EvolutionRequest::default());
    }

    #[test]
    fn test_parse_camel_case_fields() {
        let request = parse_request(
            br#"{"mode":"adversarial_evolution","batchSize":20,"intensityMultiplier":1.5,"targetSector":"FINANCE"}"#,
        )
        .unwrap();
        assert_eq!(request.mode.as_deref(), Some("adversarial_evolution"));
        assert_eq!(request.batch_size, Some(20));
        assert_eq!(request.intensity_multiplier, Some(1.5));
        assert_eq!(request.target_sector.as_deref(), Some("FINANCE"));
    }

    #[test]
    fn test_parse_malformed_body() {
        let err = parse_request(b"{not json").unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidInput);
    }
}
