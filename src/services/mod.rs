/// Tracker service: shared state, synchronisation loops and event handling
use crate::clients::{ElementsClient, TelemetryClient};
use crate::config::AppConfig;
use crate::domain::{
    GeoPoint, GeolocationFailure, OrbitalElements, PassPrediction, PathSample, PlaybackState,
    SatelliteState, StateSource, TargetPoint,
};
use crate::errors::{ApiError, ApiResult, ErrorCategory, ErrorSurface, SurfacedError};
use crate::metrics::{hud_metrics, progress_ratio, HudMetrics, MetricsInput};
use crate::orbit::{build_model, GroundTrack, OrbitalModel};
use crate::predictor::predict_pass;
use crate::repo::PositionHistory;
use crate::simulation::{build_path, PlaybackCommand, Player, SimulationPath};
use crate::utils::{distance_km, format_lat_lng};
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Source of "now" in epoch milliseconds
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Inputs that change tracker state
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// A point picked on the map
    PointSelected(GeoPoint),
    TargetSet(TargetPoint),
    LocationResolved(GeoPoint),
    LocationFailed(GeolocationFailure),
    TargetCleared,
    ThresholdChanged(f64),
    Playback(PlaybackCommand),
    /// Real time elapsed since the previous frame
    Tick { elapsed_ms: u64 },
}

/// Prediction plus the simulation path derived from it
#[derive(Debug, Clone)]
pub struct PassPlan {
    pub prediction: Option<PassPrediction>,
    pub path: Option<SimulationPath>,
}

/// Predict the next pass over `target` at or after `search_from_ms` and build
/// the path leading to it from `now_ms`
pub fn plan_pass<T: GroundTrack + ?Sized>(
    track: &T,
    target: &GeoPoint,
    threshold_km: f64,
    now_ms: i64,
    search_from_ms: i64,
    config: &AppConfig,
) -> PassPlan {
    let prediction = predict_pass(
        track,
        target,
        threshold_km,
        search_from_ms.max(now_ms),
        &config.prediction,
    );
    let path = prediction.as_ref().and_then(|p| {
        build_path(
            track,
            target,
            p,
            threshold_km,
            now_ms,
            config.simulation.step_ms,
        )
    });
    PassPlan { prediction, path }
}

struct TrackerState {
    live: Option<SatelliteState>,
    current: Option<SatelliteState>,
    source: Option<StateSource>,
    model: Option<Arc<OrbitalModel>>,
    history: PositionHistory,
    target: Option<TargetPoint>,
    threshold_km: f64,
    prediction: Option<PassPrediction>,
    path: Option<Arc<SimulationPath>>,
    player: Option<Player>,
    errors: ErrorSurface,
    /// Bumped whenever the prediction inputs change
    generation: u64,
    /// Earliest instant the next search may report, set after a prediction expires
    search_from_ms: Option<i64>,
    last_synthetic_sample_ms: Option<i64>,
}

impl TrackerState {
    fn new(config: &AppConfig) -> Self {
        Self {
            live: None,
            current: None,
            source: None,
            model: None,
            history: PositionHistory::new(config.history.capacity, config.history.min_interval_ms),
            target: None,
            threshold_km: config.prediction.default_threshold_km,
            prediction: None,
            path: None,
            player: None,
            errors: ErrorSurface::default(),
            generation: 0,
            search_from_ms: None,
            last_synthetic_sample_ms: None,
        }
    }

    /// Drop the prediction and everything derived from it
    fn invalidate_plan(&mut self) {
        self.prediction = None;
        self.path = None;
        self.player = None;
        self.search_from_ms = None;
        self.generation = self.generation.wrapping_add(1);
    }

    fn distance_to_target(&self) -> Option<f64> {
        let current = self.current.map(|s| s.point());
        let target = self.target.as_ref().map(TargetPoint::point);
        distance_km(current.as_ref(), target.as_ref())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionView {
    pub position: Option<SatelliteState>,
    pub source: Option<StateSource>,
    pub position_text: Option<String>,
    pub live: Option<SatelliteState>,
    pub distance_to_target_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryView {
    pub history: Vec<SatelliteState>,
    pub trail: Vec<GeoPoint>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementsView {
    pub elements: Option<OrbitalElements>,
    pub epoch_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetView {
    pub target: Option<TargetPoint>,
    pub target_text: Option<String>,
    pub threshold_km: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionView {
    pub prediction: Option<PassPrediction>,
    pub time_utc: Option<String>,
    pub threshold_km: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationView {
    pub samples: Vec<PathSample>,
    /// Polyline pieces split at the antimeridian
    pub segments: Vec<Vec<GeoPoint>>,
    pub playback: Option<PlaybackState>,
    pub position: Option<GeoPoint>,
    pub progress: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub last_error: Option<SurfacedError>,
    pub has_model: bool,
    pub model_epoch_ms: Option<i64>,
    pub has_target: bool,
    pub threshold_km: f64,
    pub history_len: usize,
    pub background_tasks: usize,
}

/// Tracker service owning all mutable state
pub struct TrackerService {
    config: Arc<AppConfig>,
    telemetry_client: TelemetryClient,
    elements_client: ElementsClient,
    clock: Clock,
    state: RwLock<TrackerState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    cancelled: AtomicBool,
}

impl TrackerService {
    pub fn new(
        config: Arc<AppConfig>,
        telemetry_client: TelemetryClient,
        elements_client: ElementsClient,
    ) -> Self {
        Self::with_clock(
            config,
            telemetry_client,
            elements_client,
            Arc::new(|| Utc::now().timestamp_millis()),
        )
    }

    pub fn with_clock(
        config: Arc<AppConfig>,
        telemetry_client: TelemetryClient,
        elements_client: ElementsClient,
        clock: Clock,
    ) -> Self {
        let state = TrackerState::new(&config);
        Self {
            config,
            telemetry_client,
            elements_client,
            clock,
            state: RwLock::new(state),
            tasks: Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
        }
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn report_error(&self, category: ErrorCategory, error: &ApiError) {
        if self.is_cancelled() {
            return;
        }
        let at_ms = self.now();
        self.state.write().await.errors.report(category, error, at_ms);
    }

    /// Fetch live telemetry and apply it
    pub async fn fetch_telemetry(&self) -> ApiResult<()> {
        match self.telemetry_client.fetch_position().await {
            Ok(fetched) => {
                self.apply_telemetry(fetched).await;
                Ok(())
            }
            Err(e) => {
                self.report_error(ErrorCategory::Telemetry, &e).await;
                Err(e)
            }
        }
    }

    /// Apply a fetched live state. Returns false when it was older than the
    /// live state already held, or when the service has shut down.
    pub async fn apply_telemetry(&self, fetched: SatelliteState) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let mut state = self.state.write().await;
        state.errors.clear(ErrorCategory::Telemetry);
        if let Some(live) = &state.live {
            if fetched.timestamp_ms <= live.timestamp_ms {
                debug!(
                    "Ignoring stale telemetry ({} <= {})",
                    fetched.timestamp_ms, live.timestamp_ms
                );
                return false;
            }
        }

        // authoritative until the next synthetic tick
        state.live = Some(fetched);
        state.current = Some(fetched);
        state.source = Some(StateSource::Live);
        state.history.push(fetched, StateSource::Live);
        true
    }

    /// Fetch orbital elements and rebuild the model when they changed
    pub async fn refresh_elements(&self) -> ApiResult<()> {
        let elements = match self.elements_client.fetch_elements(self.now()).await {
            Ok(elements) => elements,
            Err(e) => {
                self.report_error(ErrorCategory::Elements, &e).await;
                return Err(e);
            }
        };
        self.install_elements(elements).await
    }

    /// Build a model from `elements` and make it current.
    ///
    /// A failed build keeps the previous model.
    pub async fn install_elements(&self, elements: OrbitalElements) -> ApiResult<()> {
        if self.is_cancelled() {
            return Ok(());
        }
        {
            let mut state = self.state.write().await;
            state.errors.clear(ErrorCategory::Elements);
            if let Some(model) = &state.model {
                if model.elements().same_orbit(&elements) {
                    debug!("Orbital elements unchanged, keeping model");
                    return Ok(());
                }
            }
        }

        let model = match build_model(&elements) {
            Ok(model) => model,
            Err(e) => {
                let err = match e {
                    ApiError::ModelBuild(_) => e,
                    other => ApiError::ModelBuild(other.to_string()),
                };
                warn!("{}", err);
                self.report_error(ErrorCategory::Model, &err).await;
                return Err(err);
            }
        };

        {
            let mut state = self.state.write().await;
            info!(
                "Orbital model rebuilt (epoch {}, {:?})",
                model.epoch_ms(),
                elements.name
            );
            state.model = Some(Arc::new(model));
            state.errors.clear(ErrorCategory::Model);
            state.invalidate_plan();
        }
        self.refresh_prediction().await
    }

    /// Propagate the model to now and update the displayed position
    pub async fn synthetic_tick(&self) -> ApiResult<()> {
        if self.is_cancelled() {
            return Ok(());
        }
        let now = self.now();
        let expired = {
            let mut state = self.state.write().await;
            let Some(model) = state.model.clone() else {
                return Ok(());
            };
            if let Some(synthetic) = model.propagate(now) {
                state.current = Some(synthetic);
                state.source = Some(StateSource::Model);
                let due = state
                    .last_synthetic_sample_ms
                    .map_or(true, |t| now - t >= self.config.history.synthetic_sample_ms);
                if due && state.history.push(synthetic, StateSource::Model) {
                    state.last_synthetic_sample_ms = Some(now);
                }
            }

            match state.prediction.filter(|p| p.time_ms < now) {
                Some(stale) => {
                    debug!("Predicted pass is in the past, recomputing");
                    state.invalidate_plan();
                    // skip the approach that just happened
                    state.search_from_ms = Some(
                        stale
                            .time_ms
                            .saturating_add(self.config.prediction.refine_window_ms),
                    );
                    true
                }
                None => false,
            }
        };

        if expired {
            self.refresh_prediction().await?;
        }
        Ok(())
    }

    /// Recompute prediction and path off the async runtime.
    ///
    /// The result is dropped if the inputs changed while it was computing.
    pub async fn refresh_prediction(&self) -> ApiResult<()> {
        let (model, target, threshold_km, generation, search_from_ms) = {
            let state = self.state.read().await;
            (
                state.model.clone(),
                state.target.clone(),
                state.threshold_km,
                state.generation,
                state.search_from_ms,
            )
        };
        let (Some(model), Some(target)) = (model, target) else {
            return Ok(());
        };

        let config = self.config.clone();
        let now = self.now();
        let search_from = search_from_ms.map_or(now, |t| t.max(now));
        let plan = tokio::task::spawn_blocking(move || {
            plan_pass(
                model.as_ref(),
                &target.point(),
                threshold_km,
                now,
                search_from,
                &config,
            )
        })
        .await?;

        self.apply_plan(generation, plan).await;
        Ok(())
    }

    async fn apply_plan(&self, generation: u64, plan: PassPlan) -> bool {
        if self.is_cancelled() {
            debug!("Discarding prediction computed after shutdown");
            return false;
        }
        let mut state = self.state.write().await;
        if state.generation != generation {
            debug!(
                "Discarding stale prediction (generation {} != {})",
                generation, state.generation
            );
            return false;
        }

        match &plan.prediction {
            Some(p) => info!(
                "Prediction updated: {} at {} ({:.1} km)",
                if p.threshold_hit { "pass" } else { "closest approach" },
                p.time_ms,
                p.distance_km
            ),
            None => warn!("Prediction unavailable: model could not be evaluated"),
        }
        state.player = plan
            .path
            .as_ref()
            .map(|path| Player::new(path, self.config.simulation.base_scale));
        state.path = plan.path.map(Arc::new);
        state.prediction = plan.prediction;
        true
    }

    /// Apply one event
    pub async fn dispatch(&self, event: TrackerEvent) -> ApiResult<()> {
        match event {
            TrackerEvent::PointSelected(point) => {
                self.set_target(Some(TargetPoint::new(point, "Selected point")))
                    .await
            }
            TrackerEvent::TargetSet(target) => self.set_target(Some(target)).await,
            TrackerEvent::LocationResolved(point) => {
                self.state
                    .write()
                    .await
                    .errors
                    .clear(ErrorCategory::Geolocation);
                self.set_target(Some(TargetPoint::new(point, "My location")))
                    .await
            }
            TrackerEvent::LocationFailed(failure) => {
                let err = ApiError::Geolocation(failure.message().to_string());
                self.report_error(ErrorCategory::Geolocation, &err).await;
                Err(err)
            }
            TrackerEvent::TargetCleared => self.set_target(None).await,
            TrackerEvent::ThresholdChanged(km) => self.set_threshold(km).await,
            TrackerEvent::Playback(command) => {
                let mut state = self.state.write().await;
                let player = state
                    .player
                    .as_mut()
                    .ok_or_else(|| ApiError::NotFound("no simulation path".to_string()))?;
                player.apply(command);
                Ok(())
            }
            TrackerEvent::Tick { elapsed_ms } => {
                if let Some(player) = self.state.write().await.player.as_mut() {
                    player.advance(elapsed_ms);
                }
                Ok(())
            }
        }
    }

    async fn set_target(&self, target: Option<TargetPoint>) -> ApiResult<()> {
        if let Some(t) = &target {
            if !t.point().is_valid() {
                return Err(ApiError::InvalidInput(format!(
                    "target ({}, {}) is out of range",
                    t.lat, t.lng
                )));
            }
        }
        {
            let mut state = self.state.write().await;
            match &target {
                Some(t) => info!("Target set to {} ({})", format_lat_lng(&t.point()), t.label),
                None => info!("Target cleared"),
            }
            state.target = target;
            state.invalidate_plan();
        }
        self.refresh_prediction().await
    }

    async fn set_threshold(&self, km: f64) -> ApiResult<()> {
        if !km.is_finite() {
            return Err(ApiError::InvalidInput(format!(
                "threshold must be a finite number, got {}",
                km
            )));
        }
        let km = self.config.prediction.clamp_threshold(km);
        {
            let mut state = self.state.write().await;
            if state.threshold_km == km {
                return Ok(());
            }
            debug!("Threshold changed to {} km", km);
            state.threshold_km = km;
            state.invalidate_plan();
        }
        self.refresh_prediction().await
    }

    pub async fn position(&self) -> PositionView {
        let state = self.state.read().await;
        PositionView {
            position: state.current,
            source: state.source,
            position_text: state.current.map(|s| format_lat_lng(&s.point())),
            live: state.live,
            distance_to_target_km: state.distance_to_target(),
        }
    }

    pub async fn history(&self) -> HistoryView {
        let state = self.state.read().await;
        HistoryView {
            history: state.history.entries(),
            trail: state.history.trail(),
        }
    }

    pub async fn elements(&self) -> ElementsView {
        let state = self.state.read().await;
        ElementsView {
            elements: state.model.as_ref().map(|m| m.elements().clone()),
            epoch_ms: state.model.as_ref().map(|m| m.epoch_ms()),
        }
    }

    pub async fn target(&self) -> TargetView {
        let state = self.state.read().await;
        TargetView {
            target: state.target.clone(),
            target_text: state.target.as_ref().map(|t| format_lat_lng(&t.point())),
            threshold_km: state.threshold_km,
        }
    }

    pub async fn prediction(&self) -> PredictionView {
        let state = self.state.read().await;
        PredictionView {
            prediction: state.prediction,
            time_utc: state
                .prediction
                .and_then(|p| p.time_utc())
                .map(|t| t.to_rfc3339()),
            threshold_km: state.threshold_km,
        }
    }

    pub async fn simulation(&self) -> SimulationView {
        let state = self.state.read().await;
        let playback = state.player.as_ref().map(Player::state);
        match &state.path {
            Some(path) => SimulationView {
                samples: path.samples().to_vec(),
                segments: path.segments(),
                playback,
                position: playback.map(|p| path.position_at(p.simulated_time_ms)),
                progress: playback.map(|p| progress_ratio(path, &p)),
            },
            None => SimulationView {
                samples: Vec::new(),
                segments: Vec::new(),
                playback: None,
                position: None,
                progress: None,
            },
        }
    }

    pub async fn metrics(&self) -> HudMetrics {
        let now = self.now();
        let state = self.state.read().await;
        let playback = state.player.as_ref().map(Player::state);
        hud_metrics(&MetricsInput {
            now_ms: now,
            threshold_km: state.threshold_km,
            has_target: state.target.is_some(),
            distance_to_target_km: state.distance_to_target(),
            prediction: state.prediction.as_ref(),
            path: state.path.as_deref(),
            playback: playback.as_ref(),
        })
    }

    pub async fn status(&self) -> StatusView {
        let background_tasks = self.tasks.lock().await.len();
        let state = self.state.read().await;
        StatusView {
            last_error: state.errors.current().cloned(),
            has_model: state.model.is_some(),
            model_epoch_ms: state.model.as_ref().map(|m| m.epoch_ms()),
            has_target: state.target.is_some(),
            threshold_km: state.threshold_km,
            history_len: state.history.len(),
            background_tasks,
        }
    }

    /// Start all background loops. Calling it again while they run is a no-op.
    pub async fn start_background_tasks(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            debug!("Background tasks already running");
            return;
        }
        self.cancelled.store(false, Ordering::SeqCst);
        let intervals = self.config.fetch_intervals.clone();

        // Background task: orbital elements
        {
            let service = self.clone();
            let interval = intervals.tle_seconds;
            tasks.push(tokio::spawn(async move {
                info!(
                    "Starting orbital elements task (interval: {}s, {} sources)",
                    interval,
                    service.elements_client.sources().len()
                );
                while !service.is_cancelled() {
                    if let Err(e) = service.refresh_elements().await {
                        error!("Orbital elements refresh error: {}", e);
                    }
                    tokio::time::sleep(Duration::from_secs(interval)).await;
                }
            }));
        }

        // Background task: live telemetry
        {
            let service = self.clone();
            let interval = intervals.telemetry_seconds;
            tasks.push(tokio::spawn(async move {
                info!(
                    "Starting ISS telemetry task (interval: {}s, source: {})",
                    interval,
                    service.telemetry_client.base_url()
                );
                while !service.is_cancelled() {
                    if let Err(e) = service.fetch_telemetry().await {
                        error!("ISS telemetry fetch error: {}", e);
                    }
                    tokio::time::sleep(Duration::from_secs(interval)).await;
                }
            }));
        }

        // Background task: synthetic position from the model
        {
            let service = self.clone();
            let interval = intervals.synthetic_millis.max(1);
            tasks.push(tokio::spawn(async move {
                info!("Starting synthetic position task (interval: {}ms)", interval);
                while !service.is_cancelled() {
                    if let Err(e) = service.synthetic_tick().await {
                        error!("Synthetic position error: {}", e);
                    }
                    tokio::time::sleep(Duration::from_millis(interval)).await;
                }
            }));
        }

        let (events, mut inbox) = mpsc::channel::<TrackerEvent>(64);

        // Background task: frame driver
        {
            let service = self.clone();
            let interval = intervals.frame_millis.max(1);
            tasks.push(tokio::spawn(async move {
                let mut last = Instant::now();
                while !service.is_cancelled() {
                    tokio::time::sleep(Duration::from_millis(interval)).await;
                    let now = Instant::now();
                    let elapsed_ms = now.duration_since(last).as_millis() as u64;
                    last = now;
                    if events.send(TrackerEvent::Tick { elapsed_ms }).await.is_err() {
                        break;
                    }
                }
            }));
        }

        // Background task: event loop
        {
            let service = self.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(event) = inbox.recv().await {
                    if service.is_cancelled() {
                        break;
                    }
                    if let Err(e) = service.dispatch(event).await {
                        debug!("Event rejected: {}", e);
                    }
                }
            }));
        }

        info!("All background tasks started successfully");
    }

    /// Stop the background loops; late results are discarded from here on
    pub async fn shutdown(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for handle in &handles {
            handle.abort();
        }
        info!("Stopped {} background tasks", handles.len());
    }
}
