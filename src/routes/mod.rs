/// Application routes configuration
use crate::handlers::{
    delete_target, get_elements, get_history, get_metrics, get_position, get_prediction,
    get_simulation, get_status, get_target, health, post_location, put_target, put_threshold,
    refresh_elements, simulation_action, simulation_tick, trigger_fetch, AppState,
};
use axum::{
    routing::{get, post, put},
    Router,
};

/// Build the application router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health))
        // ISS position and orbital elements
        .route("/iss/position", get(get_position))
        .route("/iss/fetch", post(trigger_fetch))
        .route("/iss/history", get(get_history))
        .route("/iss/elements", get(get_elements))
        .route("/iss/elements/refresh", post(refresh_elements))
        // Target selection
        .route(
            "/target",
            get(get_target).put(put_target).delete(delete_target),
        )
        .route("/target/location", post(post_location))
        .route("/threshold", put(put_threshold))
        // Prediction and simulation
        .route("/prediction", get(get_prediction))
        .route("/simulation", get(get_simulation))
        .route("/simulation/tick", post(simulation_tick))
        .route("/simulation/:action", post(simulation_action))
        // HUD
        .route("/metrics", get(get_metrics))
        .route("/status", get(get_status))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tests::{iss_elements, offline_service, ISS_EPOCH_MS};
    use crate::services::TrackerService;
    use serde_json::{json, Value};
    use std::sync::Arc;

    async fn serve(tracker: Arc<TrackerService>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = build_router(AppState { tracker });
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_target_flow_over_http() {
        let now = ISS_EPOCH_MS + 3_600_000;
        let tracker = Arc::new(offline_service(now));
        tracker.install_elements(iss_elements()).await.unwrap();
        let base = serve(tracker).await;
        let client = reqwest::Client::new();

        let body: Value = client
            .put(format!("{}/target", base))
            .json(&json!({ "lat": 48.85, "lng": 2.35, "label": "Paris" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["ok"], true);
        assert_eq!(body["target"]["label"], "Paris");
        assert_eq!(body["thresholdKm"], 100.0);

        let body: Value = client
            .get(format!("{}/prediction", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["ok"], true);
        assert!(body["prediction"]["timeMs"].as_i64().unwrap() >= now);

        let body: Value = client
            .get(format!("{}/metrics", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(body["etaMs"].as_i64().is_some());
    }

    #[tokio::test]
    async fn test_errors_are_ok_false() {
        let tracker = Arc::new(offline_service(ISS_EPOCH_MS));
        let base = serve(tracker).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/simulation/rewind", base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"]["code"], "INVALID_INPUT");

        let body: Value = client
            .post(format!("{}/target/location", base))
            .json(&json!({ "error": "permission_denied" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"]["code"], "GEOLOCATION_ERROR");

        let body: Value = client
            .get(format!("{}/status", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["lastError"]["category"], "geolocation");
    }
}
