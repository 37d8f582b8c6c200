/// HTTP request handlers
use crate::domain::{GeoPoint, GeolocationFailure, Health, TargetPoint};
use crate::errors::ApiError;
use crate::metrics::HudMetrics;
use crate::services::{
    ElementsView, HistoryView, PositionView, PredictionView, SimulationView, StatusView,
    TargetView, TrackerEvent, TrackerService,
};
use crate::simulation::PlaybackCommand;
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<TrackerService>,
}

/// Successful response wrapper
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub ok: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { ok: true, data }
    }
}

type ApiJson<T> = Result<Json<SuccessResponse<T>>, ApiError>;

fn ok<T: Serialize>(data: T) -> ApiJson<T> {
    Ok(Json(SuccessResponse::new(data)))
}

/// Target chosen by the user; without a label it counts as a map click
#[derive(Debug, Deserialize)]
pub struct TargetRequest {
    pub lat: f64,
    pub lng: f64,
    pub label: Option<String>,
}

/// Result of a browser geolocation request
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LocationReport {
    Resolved { lat: f64, lng: f64 },
    Failed { error: GeolocationFailure },
}

#[derive(Debug, Deserialize)]
pub struct ThresholdRequest {
    pub km: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickRequest {
    pub elapsed_ms: u64,
}

/// Health check handler
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        now: Utc::now(),
    })
}

/// Displayed ISS position
pub async fn get_position(State(state): State<AppState>) -> ApiJson<PositionView> {
    ok(state.tracker.position().await)
}

/// Trigger a live telemetry fetch
pub async fn trigger_fetch(State(state): State<AppState>) -> ApiJson<PositionView> {
    state.tracker.fetch_telemetry().await?;
    get_position(State(state)).await
}

pub async fn get_history(State(state): State<AppState>) -> ApiJson<HistoryView> {
    ok(state.tracker.history().await)
}

pub async fn get_elements(State(state): State<AppState>) -> ApiJson<ElementsView> {
    ok(state.tracker.elements().await)
}

/// Refetch orbital elements now
pub async fn refresh_elements(State(state): State<AppState>) -> ApiJson<ElementsView> {
    state.tracker.refresh_elements().await?;
    get_elements(State(state)).await
}

pub async fn get_target(State(state): State<AppState>) -> ApiJson<TargetView> {
    ok(state.tracker.target().await)
}

pub async fn put_target(
    State(state): State<AppState>,
    Json(req): Json<TargetRequest>,
) -> ApiJson<TargetView> {
    let point = GeoPoint::new(req.lat, req.lng);
    let event = match req.label {
        Some(label) => TrackerEvent::TargetSet(TargetPoint::new(point, label)),
        None => TrackerEvent::PointSelected(point),
    };
    state.tracker.dispatch(event).await?;
    get_target(State(state)).await
}

pub async fn delete_target(State(state): State<AppState>) -> ApiJson<TargetView> {
    state.tracker.dispatch(TrackerEvent::TargetCleared).await?;
    get_target(State(state)).await
}

/// Use the browser's location as the target
pub async fn post_location(
    State(state): State<AppState>,
    Json(report): Json<LocationReport>,
) -> ApiJson<TargetView> {
    let event = match report {
        LocationReport::Resolved { lat, lng } => {
            TrackerEvent::LocationResolved(GeoPoint::new(lat, lng))
        }
        LocationReport::Failed { error } => TrackerEvent::LocationFailed(error),
    };
    state.tracker.dispatch(event).await?;
    get_target(State(state)).await
}

pub async fn put_threshold(
    State(state): State<AppState>,
    Json(req): Json<ThresholdRequest>,
) -> ApiJson<TargetView> {
    state
        .tracker
        .dispatch(TrackerEvent::ThresholdChanged(req.km))
        .await?;
    get_target(State(state)).await
}

pub async fn get_prediction(State(state): State<AppState>) -> ApiJson<PredictionView> {
    ok(state.tracker.prediction().await)
}

pub async fn get_simulation(State(state): State<AppState>) -> ApiJson<SimulationView> {
    ok(state.tracker.simulation().await)
}

/// Playback control: play, pause, toggle, reset or speed
pub async fn simulation_action(
    State(state): State<AppState>,
    Path(action): Path<String>,
) -> ApiJson<SimulationView> {
    let command: PlaybackCommand = action.parse().map_err(ApiError::InvalidInput)?;
    state
        .tracker
        .dispatch(TrackerEvent::Playback(command))
        .await?;
    get_simulation(State(state)).await
}

/// Advance playback by an explicit amount of real time
pub async fn simulation_tick(
    State(state): State<AppState>,
    Json(req): Json<TickRequest>,
) -> ApiJson<SimulationView> {
    state
        .tracker
        .dispatch(TrackerEvent::Tick {
            elapsed_ms: req.elapsed_ms,
        })
        .await?;
    get_simulation(State(state)).await
}

pub async fn get_metrics(State(state): State<AppState>) -> ApiJson<HudMetrics> {
    ok(state.tracker.metrics().await)
}

/// Error banner and service status
pub async fn get_status(State(state): State<AppState>) -> ApiJson<StatusView> {
    ok(state.tracker.status().await)
}
