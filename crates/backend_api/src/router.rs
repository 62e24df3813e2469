use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{handlers, state::AppState};

/// Create the main application router with all API endpoints
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Auth
        .route("/api/auth/session", get(handlers::get_session))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/logout", post(handlers::logout))
        // Price
        .route("/api/price", get(handlers::get_price))
        .route("/api/price/refresh", post(handlers::refresh_price))
        // Goal analysis
        .route(
            "/api/analysis",
            get(handlers::get_analysis)
                .post(handlers::create_analysis)
                .delete(handlers::clear_analysis),
        )
        .route("/api/analysis/customization", get(handlers::get_customization))
        // Saving plans
        .route(
            "/api/savings",
            get(handlers::get_dashboard).post(handlers::start_plan),
        )
        .route("/api/savings/:id", get(handlers::get_plan))
        .route("/api/savings/:id/top-up", post(handlers::top_up))
        .route("/api/savings/:id/withdraw", post(handlers::withdraw))
        .route("/api/savings/:id/withdraw/quote", get(handlers::quote_withdrawal))
        .route("/api/savings/:id/stake", post(handlers::stake))
        .route("/api/savings/:id/unstake", post(handlers::unstake))
        .route("/api/savings/:id/tips", get(handlers::plan_tips))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai_client::SavingsAdvisor;
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use models::PriceSettings;
    use serde_json::{json, Value};
    use services::{
        AnalysisStore, AuthConfig, AuthService, InMemorySavingsActor, PriceService,
        StaticIdentityProvider, TaskScope,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let actor = Arc::new(InMemorySavingsActor::new());
        let auth = AuthService::new(
            AuthConfig {
                identity_provider_url: "https://identity.ic0.app".to_string(),
                canister_id: "bkyz2-fmaaa-aaaaa-qaaaq-cai".to_string(),
            },
            Arc::new(StaticIdentityProvider::new(Some("2vxsx-fae".to_string()))),
            actor,
        );
        // Nothing listens on the discard port, so price lookups fail fast
        let price = PriceService::new(
            &PriceSettings {
                api_url: "http://127.0.0.1:9/price".to_string(),
                ..PriceSettings::default()
            },
            None,
        )
        .unwrap();

        AppState {
            auth: Arc::new(auth),
            price: Arc::new(price),
            analysis: Arc::new(AnalysisStore::in_memory()),
            advisor: Arc::new(SavingsAdvisor::new(None)),
            scope: Arc::new(TaskScope::new()),
            price_max_age: Duration::from_secs(60),
        }
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn plan_body() -> Value {
        json!({
            "name": "Family Vacation",
            "totalIcp": 1200.0,
            "monthlyIcp": 100.0,
            "months": 12,
            "priorityLevel": 2
        })
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(test_state());
        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["llm"], false);
    }

    #[tokio::test]
    async fn test_savings_require_login() {
        let app = create_router(test_state());
        let (status, body) = call(&app, Method::GET, "/api/savings", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Not authenticated");
    }

    #[tokio::test]
    async fn test_plan_lifecycle() {
        let app = create_router(test_state());
        let (status, session) = call(&app, Method::POST, "/api/auth/login", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["isAuthenticated"], true);

        let (status, plan) = call(&app, Method::POST, "/api/savings", Some(plan_body())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(plan["icon"], "✈️");
        assert_eq!(plan["timelineMonths"], 12);
        let id = plan["id"].as_u64().unwrap();

        let (status, report) = call(
            &app,
            Method::POST,
            &format!("/api/savings/{id}/top-up"),
            Some(json!({ "amount": "600", "autoStake": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["partial"], false);
        assert_eq!(report["plan"]["currentSaved"], 600.0);
        assert_eq!(report["plan"]["progressPercent"], 50.0);

        let (status, quote) = call(
            &app,
            Method::GET,
            &format!("/api/savings/{id}/withdraw/quote?amount=100"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(quote["isForce"], true);
        assert_eq!(quote["feeRate"], 0.05);

        let (status, report) = call(
            &app,
            Method::POST,
            &format!("/api/savings/{id}/withdraw"),
            Some(json!({ "amount": 100 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["plan"]["currentSaved"], 500.0);

        let (status, dashboard) = call(&app, Method::GET, "/api/savings", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dashboard["activePlans"], 1);
        assert_eq!(dashboard["plans"][0]["target"], "Family Vacation");

        let (status, tips) = call(&app, Method::GET, &format!("/api/savings/{id}/tips"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!tips["tips"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_errors_are_bad_requests() {
        let app = create_router(test_state());
        call(&app, Method::POST, "/api/auth/login", None).await;
        let (_, plan) = call(&app, Method::POST, "/api/savings", Some(plan_body())).await;
        let id = plan["id"].as_u64().unwrap();

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/api/savings/{id}/top-up"),
            Some(json!({ "amount": "abc" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Please enter a valid number");

        let (status, _) = call(&app, Method::GET, "/api/savings/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_analysis_falls_back_without_llm() {
        let app = create_router(test_state());

        let (status, _) = call(&app, Method::GET, "/api/analysis", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, session) = call(
            &app,
            Method::POST,
            "/api/analysis",
            Some(json!({ "target": "New laptop", "monthlyIncome": 3000.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(session["target"], "New laptop");
        assert_eq!(session["analysis"]["monthlySavings"]["usd"], 600.0);
        assert_eq!(session["analysis"]["timeline"]["months"], 12);

        let (status, form) = call(&app, Method::GET, "/api/analysis/customization", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(form["name"], "New laptop");
        assert_eq!(form["months"], 12);

        let (status, _) = call(&app, Method::DELETE, "/api/analysis", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, Method::GET, "/api/analysis", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_analysis_rejects_empty_goal() {
        let app = create_router(test_state());
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/analysis",
            Some(json!({ "target": "  ", "monthlyIncome": 3000.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_price_degrades_instead_of_failing() {
        let app = create_router(test_state());
        let (status, price) = call(&app, Method::GET, "/api/price", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(price["price"], 0.0);
        assert!(price["error"].is_string());
    }
}
