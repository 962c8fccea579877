//! JSON request handlers for the MedSafe API.

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::entities::alternative::Alternatives;
use crate::entities::chat::ChatTurn;
use crate::entities::drug::ResolvedDrug;
use crate::entities::history::HistoryRow;
use crate::entities::interaction::InteractionReport;
use crate::error::MedSafeError;
use crate::server::AppState;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

/// Maps a [`MedSafeError`] onto an HTTP status and a `{"detail": ...}` body.
#[derive(Debug)]
pub struct ApiError(pub MedSafeError);

impl From<MedSafeError> for ApiError {
    fn from(err: MedSafeError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(MedSafeError::InvalidArgument(format!(
            "Invalid request body: {}",
            rejection.body_text()
        )))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            MedSafeError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            MedSafeError::NotFound { .. } => StatusCode::NOT_FOUND,
            err if err.is_upstream() => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, status = status.as_u16(), "request failed");
        } else {
            debug!(error = %self.0, status = status.as_u16(), "request rejected");
        }
        (
            status,
            Json(ErrorResponse {
                detail: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// A JSON body whose rejection is answered through [`ApiError`].
type JsonBody<T> = Result<Json<T>, JsonRejection>;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct InteractionsRequest {
    #[serde(default)]
    pub drugs: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AlternativesQuery {
    pub drug: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExplainRequest {
    #[serde(default)]
    pub drug: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ExplainResponse {
    pub explanation: String,
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub resolved: Vec<ResolvedDrug>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct SummarizeResponse {
    pub summary: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<HistoryRow>,
}

/// GET /health
pub async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /interactions
pub async fn post_interactions(
    State(state): State<AppState>,
    body: JsonBody<InteractionsRequest>,
) -> ApiResult<InteractionReport> {
    let Json(body) = body?;
    Ok(Json(state.check_interactions(&body.drugs).await?))
}

/// GET /alternatives?drug=<name>
pub async fn get_alternatives(
    State(state): State<AppState>,
    Query(query): Query<AlternativesQuery>,
) -> ApiResult<Alternatives> {
    let drug = query.drug.as_deref().map(str::trim).unwrap_or_default();
    if drug.is_empty() {
        return Err(MedSafeError::InvalidArgument("Query parameter 'drug' is required.".into()).into());
    }
    Ok(Json(state.alternatives(drug).await?))
}

/// POST /alternatives/explain
pub async fn post_explain_alternatives(
    State(state): State<AppState>,
    body: JsonBody<ExplainRequest>,
) -> ApiResult<ExplainResponse> {
    let Json(body) = body?;
    let explanation = state.explain_alternatives(&body.drug, &body.options).await?;
    Ok(Json(ExplainResponse { explanation }))
}

/// POST /extract
pub async fn post_extract(
    State(state): State<AppState>,
    body: JsonBody<ExtractRequest>,
) -> ApiResult<ExtractResponse> {
    let Json(body) = body?;
    Ok(Json(ExtractResponse {
        resolved: state.extract(&body.text).await,
    }))
}

/// POST /chat
pub async fn post_chat(
    State(state): State<AppState>,
    body: JsonBody<ChatRequest>,
) -> ApiResult<ChatTurn> {
    let Json(body) = body?;
    Ok(Json(state.chat(&body.message).await))
}

/// POST /summarize
pub async fn post_summarize(
    State(state): State<AppState>,
    body: JsonBody<SummarizeRequest>,
) -> ApiResult<SummarizeResponse> {
    let Json(body) = body?;
    let summary = state.summarize(&body.data).await?;
    Ok(Json(SummarizeResponse { summary }))
}

/// GET /history
pub async fn get_history(State(state): State<AppState>) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        history: state.history().export_rows(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::entities::alternative::{INGREDIENT_TERM_TYPES, PRODUCT_TERM_TYPES};
    use crate::entities::chat::{HELP_MESSAGE, SAFETY_REFUSAL};
    use crate::server::router;
    use crate::service::tests::{service_with, terminology};
    use crate::testing::{FakeInteractions, FakeTerminology, interaction_data};

    fn app(terminology: FakeTerminology, interactions: FakeInteractions) -> Router {
        router(Arc::new(service_with(terminology, interactions, None, 3)))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_version() {
        let app = app(terminology(), FakeInteractions::default());
        let (status, body) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn single_drug_is_bad_request_without_upstream_calls() {
        let terminology = Arc::new(terminology());
        let interactions = Arc::new(FakeInteractions::default());
        let service = crate::service::MedSafe::new(
            terminology.clone(),
            interactions.clone(),
            None,
            crate::entities::history::SessionHistory::new(3),
            crate::config::ExtractLimits::default(),
        );
        let app = router(Arc::new(service));

        let (status, body) = send(&app, post("/interactions", json!({"drugs": ["aspirin"]}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("at least two"));
        assert_eq!(terminology.match_calls(), 0);
        assert_eq!(interactions.request_count(), 0);
    }

    #[tokio::test]
    async fn interactions_return_codes_labels_and_data_and_land_in_history() {
        let app = app(
            terminology(),
            FakeInteractions::returning(interaction_data(vec![(
                vec!["1191", "11289"],
                "Bleeding risk.",
            )])),
        );

        let (status, body) = send(
            &app,
            post("/interactions", json!({"drugs": ["aspirin", "warfarin"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rxcuis"], json!(["1191", "11289"]));
        assert_eq!(body["labels"]["11289"], "warfarin");
        assert!(body["data"]["fullInteractionTypeGroup"].is_array());

        let (status, body) = send(&app, get("/history")).await;
        assert_eq!(status, StatusCode::OK);
        let history = body["history"].as_array().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["interactions"], "aspirin + warfarin: Bleeding risk.");
    }

    #[tokio::test]
    async fn interactions_with_one_resolvable_name_is_not_found() {
        let app = app(terminology(), FakeInteractions::default());
        let (status, body) = send(
            &app,
            post("/interactions", json!({"drugs": ["aspirin", "unobtainium"]})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["detail"].as_str().unwrap().contains("unobtainium"));
    }

    #[tokio::test]
    async fn upstream_failure_is_bad_gateway() {
        let app = app(terminology(), FakeInteractions::failing());
        let (status, _) = send(
            &app,
            post("/interactions", json!({"drugs": ["aspirin", "warfarin"]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn alternatives_require_a_drug_and_resolve_it() {
        let terminology = terminology()
            .related_to("5640", &INGREDIENT_TERM_TYPES, &[("5640", "ibuprofen")])
            .related_to(
                "5640",
                &PRODUCT_TERM_TYPES,
                &[("197805", "ibuprofen 400 MG Oral Tablet")],
            );
        let app = app(terminology, FakeInteractions::default());

        let (status, _) = send(&app, get("/alternatives")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, get("/alternatives?drug=%20")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, get("/alternatives?drug=unobtainium")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["detail"].is_string());

        let (status, body) = send(&app, get("/alternatives?drug=ibuprofen")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["drug"]["rxcui"], "5640");
        assert_eq!(body["alternatives"][0]["name"], "ibuprofen 400 MG Oral Tablet");
    }

    #[tokio::test]
    async fn extract_returns_resolved_drugs_or_an_empty_list() {
        let app = app(terminology(), FakeInteractions::default());

        let (status, body) = send(
            &app,
            post("/extract", json!({"text": "Take aspirin daily and warfarin at night"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let codes: Vec<&str> = body["resolved"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["rxcui"].as_str().unwrap())
            .collect();
        assert!(codes.contains(&"1191"));
        assert!(codes.contains(&"11289"));

        let (status, body) = send(&app, post("/extract", json!({"text": ""}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resolved"], json!([]));
    }

    #[tokio::test]
    async fn chat_always_answers() {
        let app = app(terminology(), FakeInteractions::default());

        let (status, body) = send(&app, post("/chat", json!({"message": "can I take aspirin?"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "assistant");
        assert_eq!(body["content"], SAFETY_REFUSAL);

        let (_, body) = send(&app, post("/chat", json!({"message": "how do I export?"}))).await;
        assert_eq!(body["content"], HELP_MESSAGE);
    }

    #[tokio::test]
    async fn summarize_and_explain_validate_then_fall_back() {
        let app = app(terminology(), FakeInteractions::default());

        let (status, _) = send(&app, post("/summarize", json!({"data": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, body) = send(&app, post("/summarize", json!({"data": "{}"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["summary"].as_str().is_some_and(|s| !s.is_empty()));

        let (status, _) = send(&app, post("/alternatives/explain", json!({"options": []}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, body) = send(
            &app,
            post(
                "/alternatives/explain",
                json!({"drug": "ibuprofen", "options": ["Advil"]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["explanation"].is_string());
    }

    #[tokio::test]
    async fn malformed_bodies_are_bad_request_with_detail() {
        let app = app(terminology(), FakeInteractions::default());

        let (status, body) = send(&app, post("/interactions", json!({"drugs": "aspirin"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("Invalid request body"));

        let request = Request::post("/extract")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("not json"))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());

        let request = Request::post("/chat")
            .body(Body::from(r#"{"message": "hi"}"#))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn history_starts_empty() {
        let app = app(terminology(), FakeInteractions::default());
        let (status, body) = send(&app, get("/history")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"history": []}));
    }

    #[test]
    fn error_status_mapping() {
        let status = |err: MedSafeError| ApiError(err).status();
        assert_eq!(
            status(MedSafeError::InvalidArgument("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(MedSafeError::Api {
                api: "rxnav".into(),
                message: "HTTP 500".into()
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(MedSafeError::Io(std::io::Error::other("disk"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
