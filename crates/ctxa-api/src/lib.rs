//! ctxa-api - NGSI-facing HTTP layer of the context adapter
//!
//! Serves the broker-facing routes (updateContext, notify, queryContext),
//! the third-party callback webhook and a version endpoint. Handlers validate
//! and acknowledge; the orchestrator does the rest in the background.
//!
//! # Usage
//!
//! ```ignore
//! use ctxa_api::{create_router, ApiConfig, AppState};
//!
//! let state = AppState::new(orchestrator, ApiConfig::default());
//! let router = create_router(state);
//! ```

pub mod error;
pub mod handlers;
pub mod headers;
pub mod state;

pub use error::ApiError;
pub use state::{ApiConfig, AppState, RequestCounter};

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Create the adapter router with the given application state
pub fn create_router(state: AppState) -> Router {
    let config = state.config().clone();

    Router::new()
        .route("/version", get(handlers::version::version))
        // NGSI routes; the one of the inactive mode answers BAD_PAYLOAD
        .route(
            &config.route("updateContext"),
            post(handlers::ngsi::update_context),
        )
        .route(&config.route("notify"), post(handlers::ngsi::notify))
        .route(
            &config.route("queryContext"),
            post(handlers::ngsi::query_context),
        )
        // Third-party webhook
        .route(&config.callback_route(), post(handlers::callback::callback))
        .method_not_allowed_fallback(handlers::method_not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            headers::fiware_headers,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use ctxa_core::models::{CORRELATOR, FIWARE_SERVICE, FIWARE_SERVICE_PATH};
    use ctxa_core::{
        AdapterError, AdapterMode, AdapterResult, ContextBroker, ContextResponseBody,
        EntityAttributeScheme, FiwareHeaders, OperationDescriptor, QueryContextRequest,
        ServiceDescriptor, ThirdPartyResponse, ThirdPartyTransport, UpdateContextRequest,
    };
    use ctxa_orchestrator::OperationOrchestrator;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    /// Broker that never finds anything
    struct EmptyBroker;

    #[async_trait::async_trait]
    impl ContextBroker for EmptyBroker {
        async fn query_context(
            &self,
            _headers: &FiwareHeaders,
            _query: &QueryContextRequest,
        ) -> AdapterResult<ContextResponseBody> {
            Err(AdapterError::broker("404", "No context element found"))
        }

        async fn update_context(
            &self,
            _headers: &FiwareHeaders,
            _request: &UpdateContextRequest,
        ) -> AdapterResult<ContextResponseBody> {
            Ok(ContextResponseBody::default())
        }
    }

    struct NoTransport;

    #[async_trait::async_trait]
    impl ThirdPartyTransport for NoTransport {
        async fn dispatch(
            &self,
            _service: &ServiceDescriptor,
            _operation: &OperationDescriptor,
            _callback_url: &str,
            _headers: &FiwareHeaders,
        ) -> AdapterResult<ThirdPartyResponse> {
            Err(AdapterError::third_party("UNREACHABLE", "no transport"))
        }
    }

    fn router(mode: AdapterMode) -> (Router, AppState) {
        let scheme = Arc::new(EntityAttributeScheme::new(mode, "BlackButton", "service"));
        let orchestrator = Arc::new(OperationOrchestrator::new(
            Arc::new(EmptyBroker),
            Arc::new(NoTransport),
            scheme,
            "http://localhost:9999/v1/callback",
        ));
        let state = AppState::new(orchestrator, ApiConfig::default());
        (create_router(state.clone()), state)
    }

    fn post_json(uri: &str, body: Value, with_headers: bool) -> Request<Body> {
        let mut builder = Request::post(uri).header("content-type", "application/json");
        if with_headers {
            builder = builder
                .header(FIWARE_SERVICE, "blackbutton")
                .header(FIWARE_SERVICE_PATH, "/");
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn button(attributes: Value) -> Value {
        json!({
            "contextElements": [{
                "id": "btn1",
                "type": "BlackButton",
                "isPattern": "false",
                "attributes": attributes
            }],
            "updateAction": "UPDATE"
        })
    }

    #[tokio::test]
    async fn version_needs_no_headers() {
        let (router, _) = router(AdapterMode::ContextProvider);
        let response = router
            .oneshot(Request::get("/version").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(CORRELATOR));
        assert_eq!(body_json(response).await["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn missing_fiware_headers_is_400() {
        let (router, state) = router(AdapterMode::ContextProvider);
        let response = router
            .oneshot(post_json("/v1/updateContext", button(json!([])), false))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.counter().get(), 0);
    }

    #[tokio::test]
    async fn correlator_is_echoed() {
        let (router, _) = router(AdapterMode::ContextProvider);
        let mut request = post_json("/v1/queryContext", json!({"entities": []}), true);
        request
            .headers_mut()
            .insert(CORRELATOR, "corr-42".parse().unwrap());
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.headers()[CORRELATOR], "corr-42");
    }

    #[tokio::test]
    async fn invalid_update_is_acknowledged_with_400_code() {
        let (router, state) = router(AdapterMode::ContextProvider);
        let response = router
            .oneshot(post_json(
                "/v1/updateContext",
                button(json!([{"name": "aux_op_action", "type": "string", "value": "S"}])),
                true,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let status = &body["contextResponses"][0]["statusCode"];
        assert_eq!(status["code"], "400");
        assert!(status["reasonPhrase"].as_str().unwrap().starts_with("BAD_PAYLOAD"));
        assert_eq!(body["contextResponses"][0]["contextElement"]["id"], "btn1");
        assert_eq!(state.counter().get(), 1);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_payload() {
        let (router, _) = router(AdapterMode::ContextProvider);
        let request = Request::post("/v1/updateContext")
            .header(FIWARE_SERVICE, "blackbutton")
            .header(FIWARE_SERVICE_PATH, "/")
            .body(Body::from("{not json"))
            .unwrap();
        let body = body_json(router.oneshot(request).await.unwrap()).await;
        assert_eq!(body["contextResponses"][0]["statusCode"]["code"], "400");
    }

    #[tokio::test]
    async fn inactive_mode_route_names_the_mode() {
        let (router, _) = router(AdapterMode::ContextProvider);
        let response = router
            .oneshot(post_json("/v1/notify", json!({"contextResponses": []}), true))
            .await
            .unwrap();
        let body = body_json(response).await;
        let reason = body["contextResponses"][0]["statusCode"]["reasonPhrase"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(reason.starts_with("BAD_PAYLOAD"));
        assert!(reason.contains("notification mode"));
    }

    #[tokio::test]
    async fn callback_always_answers_200() {
        let (router, _) = router(AdapterMode::ContextProvider);
        let request = Request::post("/v1/callback")
            .body(Body::from("garbage"))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (router, _) = router(AdapterMode::ContextProvider);
        let response = router
            .oneshot(Request::get("/v2/entities").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn wrong_method_on_known_route_is_404() {
        let (router, _) = router(AdapterMode::ContextProvider);
        let request = Request::get("/v1/updateContext")
            .header(FIWARE_SERVICE, "blackbutton")
            .header(FIWARE_SERVICE_PATH, "/")
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router
            .oneshot(Request::post("/version").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
