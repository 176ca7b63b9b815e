use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use uuid::Uuid;

use crate::exercise::{self, ExerciseType};
use crate::pose::{PoseFrame, PoseSmoother};
use crate::reps::{RepCounter, SyntheticMotion};
use crate::settings::{ConfigError, RelayConfig};
use crate::workout::{PerformanceMetrics, WorkoutEvent, WorkoutSession};
use crate::{log_debug, log_error, log_info, log_warn};

use super::connection::{ConnectionStatus, ReconnectDecision, RelayConnectionState};
use super::messages::{
    adapt_legacy_feedback, decode_inbound, BiometricPayload, FeedbackMessage, FeedbackSignal,
    InboundMessage, NamedKeypoint, OutboundEnvelope, OutboundMessage, PosePayload, RepPayload,
    SystemCommand,
};
use super::monitor::{MessageStats, MonitorReport, MONITOR_INTERVAL, SILENCE_WARNING};
use super::observer::SessionObserver;
use super::simulation::generate_local_metrics;
use super::ticker::Ticker;
use super::transport::{
    ReadyState, RelayConnector, RelaySocket, SocketEvent, WebSocketConnector, CLOSE_NORMAL,
};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "formcoach::relay";

pub const SIMULATION_TICK: Duration = Duration::from_secs(1);

/// Observer callbacks collected under the lock and fired after it is released.
enum Notification {
    RepCounted(u32),
    Metrics(PerformanceMetrics),
    Workout(WorkoutEvent),
    Feedback(FeedbackSignal),
    ExerciseSelected(ExerciseType),
    Connection(ConnectionStatus),
}

type Notes = Vec<Notification>;

struct ClientState {
    session: WorkoutSession,
    connection: RelayConnectionState,
    counter: RepCounter,
    smoother: PoseSmoother,
    motion: SyntheticMotion,
    socket: Option<Box<dyn RelaySocket>>,
    /// Bumped for every new socket; events tagged with an older value are dropped.
    generation: u64,
    simulation: Option<Ticker>,
    monitor: Option<Ticker>,
    reconnect_timer: Option<JoinHandle<()>>,
    feedback: Option<FeedbackSignal>,
    stats: MessageStats,
    last_pose_sent: Option<Instant>,
}

struct ClientInner {
    state: Mutex<ClientState>,
    device_id: String,
    connector: Arc<dyn RelayConnector>,
    observer: Arc<dyn SessionObserver>,
}

/// Point-in-time view of the client for UIs and diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSnapshot {
    pub device_id: String,
    pub session: WorkoutSession,
    pub display_duration: String,
    pub connection: ConnectionStatus,
    pub feedback: Option<String>,
    pub simulating: bool,
    pub message_stats: MessageStats,
}

/// Owns the workout session and its relay connection.
///
/// While connected the relay is the only source of rep counts and metrics;
/// while disconnected with a workout running, the local simulation and
/// [`RepCounter`] take over. Must be used from within a Tokio runtime.
#[derive(Clone)]
pub struct SessionRelayClient {
    inner: Arc<ClientInner>,
}

impl SessionRelayClient {
    pub fn new(
        config: RelayConfig,
        connector: Arc<dyn RelayConnector>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let state = ClientState {
            session: WorkoutSession::default(),
            connection: RelayConnectionState::new(config),
            counter: RepCounter::new(),
            smoother: PoseSmoother::default(),
            motion: SyntheticMotion::new(),
            socket: None,
            generation: 0,
            simulation: None,
            monitor: None,
            reconnect_timer: None,
            feedback: None,
            stats: MessageStats::default(),
            last_pose_sent: None,
        };

        let device_id = generate_device_id();
        log_info!("Session client created with device id {}", device_id);

        Self {
            inner: Arc::new(ClientInner {
                state: Mutex::new(state),
                device_id,
                connector,
                observer,
            }),
        }
    }

    pub fn with_websocket(config: RelayConfig, observer: Arc<dyn SessionObserver>) -> Self {
        Self::new(config, Arc::new(WebSocketConnector), observer)
    }

    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    /// Begins a workout. A second call while active is a no-op.
    pub fn start_workout(&self) {
        self.apply(|state, notes| self.start_workout_locked(state, notes));
    }

    /// Ends the workout and finalizes its stats. The relay connection stays up.
    pub fn stop_workout(&self) {
        self.apply(|state, notes| self.stop_workout_locked(state, notes));
    }

    /// Applies the exercise selection policy to `raw` and resets rep tracking.
    pub fn set_exercise_type(&self, raw: &str) -> ExerciseType {
        let exercise = exercise::normalize(Some(raw));
        self.apply(|state, notes| Self::select_exercise_locked(state, exercise, notes));
        exercise
    }

    fn start_workout_locked(&self, state: &mut ClientState, notes: &mut Notes) {
        if state.session.is_active {
            log_debug!("Workout already active");
            return;
        }

        let id = Uuid::new_v4().to_string();
        state.session.begin(id.clone(), Utc::now(), Instant::now());
        state.counter.reset();
        state.smoother.clear();
        state.motion.restart();
        state.last_pose_sent = None;
        log_info!(
            "Workout {} started ({})",
            id,
            state.session.exercise_type.display_name()
        );

        if state.connection.is_connected {
            self.send_locked(state, OutboundMessage::WorkoutStarted);
        } else {
            self.connect_locked(state, notes);
        }

        if !state.connection.is_connected {
            self.start_simulation_locked(state);
        }

        notes.push(Notification::Workout(WorkoutEvent::Started));
    }

    fn stop_workout_locked(&self, state: &mut ClientState, notes: &mut Notes) {
        if !state.session.is_active {
            log_debug!("No active workout to stop");
            return;
        }

        state.session.end();
        Self::stop_simulation_locked(state);

        if state.connection.is_connected {
            self.send_locked(state, OutboundMessage::WorkoutStopped);
        }

        let stats = &state.session.stats;
        log_info!(
            "Workout stopped: {}s, {} reps, avg hr {}, {} kcal",
            stats.duration_seconds,
            stats.total_reps,
            stats.avg_heart_rate,
            stats.calories_burned
        );
        notes.push(Notification::Workout(WorkoutEvent::Stopped));
    }

    fn select_exercise_locked(state: &mut ClientState, exercise: ExerciseType, notes: &mut Notes) {
        state.session.exercise_type = exercise;
        state.counter.reset();
        state.smoother.clear();
        log_info!("Exercise set to {}", exercise.display_name());
        notes.push(Notification::ExerciseSelected(exercise));
    }

    /// Opens a relay connection unless one is already open or pending.
    /// Returns whether a connection is open or in progress afterwards.
    pub fn connect_to_relay_node(&self) -> bool {
        self.apply(|state, notes| self.connect_locked(state, notes))
    }

    /// Manual reconnect: clears the attempt budget and connects now.
    pub fn reconnect(&self) -> bool {
        self.apply(|state, notes| {
            if let Some(timer) = state.reconnect_timer.take() {
                timer.abort();
            }
            state.connection.reset_attempts();
            self.connect_locked(state, notes)
        })
    }

    /// Applies the reconnect policy as if the connection had just been lost.
    pub fn attempt_reconnect(&self) {
        self.apply(|state, notes| self.attempt_reconnect_locked(state, notes));
    }

    /// Closes the relay connection with code 1000 and stops every timer,
    /// including a pending reconnect.
    pub fn disconnect(&self) {
        self.apply(|state, notes| {
            Self::stop_simulation_locked(state);
            state.monitor = None;
            if let Some(timer) = state.reconnect_timer.take() {
                timer.abort();
                log_debug!("Pending reconnect cancelled");
            }
            if let Some(socket) = state.socket.take() {
                socket.close(CLOSE_NORMAL, "client disconnect");
            }

            state.generation += 1;
            state.connection.is_connected = false;
            state.connection.reset_attempts();
            state.stats = MessageStats::default();
            log_info!("Disconnected from relay node");
            notes.push(Notification::Connection(state.connection.status()));
        });
    }

    /// Replaces the relay configuration. Takes effect on the next connection.
    pub fn configure(&self, config: RelayConfig) -> Result<(), ConfigError> {
        if let Some(error) = config.validate().into_iter().next() {
            return Err(error);
        }
        let mut state = self.lock();
        log_info!("Relay configuration updated ({})", config.url);
        state.connection.config = config;
        Ok(())
    }

    fn connect_locked(&self, state: &mut ClientState, notes: &mut Notes) -> bool {
        if !state.connection.config.enabled {
            log_info!("Relay disabled, staying in local mode");
            return false;
        }

        if let Some(socket) = &state.socket {
            match socket.ready_state() {
                ReadyState::Open => {
                    log_debug!("Already connected to relay node");
                    return true;
                }
                ReadyState::Connecting => {
                    log_debug!("Relay connection already in progress");
                    return true;
                }
                ReadyState::Closing | ReadyState::Closed => {}
            }
        }

        state.generation += 1;
        let generation = state.generation;
        let url = state.connection.config.url.clone();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        log_info!("Connecting to relay node at {}", url);
        match self.inner.connector.open(&url, events_tx) {
            Ok(socket) => {
                state.socket = Some(socket);
                tokio::spawn(pump_socket_events(
                    Arc::downgrade(&self.inner),
                    generation,
                    events_rx,
                ));
                true
            }
            Err(err) => {
                log_error!("Failed to create relay connection: {:#}", err);
                state.socket = None;
                self.attempt_reconnect_locked(state, notes);
                false
            }
        }
    }

    fn attempt_reconnect_locked(&self, state: &mut ClientState, notes: &mut Notes) {
        let max = state.connection.config.max_reconnect_attempts;
        match state.connection.next_reconnect(state.session.is_active) {
            ReconnectDecision::GiveUp => {
                log_error!(
                    "Max reconnect attempts ({}) reached, staying disconnected",
                    max
                );
            }
            ReconnectDecision::Skip => {
                log_info!("No active workout, not reconnecting");
            }
            ReconnectDecision::Schedule { attempt, delay } => {
                log_info!(
                    "Reconnecting in {}ms (attempt {}/{})",
                    delay.as_millis(),
                    attempt,
                    max
                );
                if let Some(previous) = state.reconnect_timer.take() {
                    previous.abort();
                }
                let weak = Arc::downgrade(&self.inner);
                state.reconnect_timer = Some(tokio::spawn(async move {
                    time::sleep(delay).await;
                    if let Some(client) = SessionRelayClient::upgrade(&weak) {
                        client.fire_reconnect();
                    }
                }));
            }
        }
        notes.push(Notification::Connection(state.connection.status()));
    }

    fn fire_reconnect(&self) {
        self.apply(|state, notes| {
            // disconnect() got here first
            if state.reconnect_timer.take().is_none() {
                return;
            }
            self.connect_locked(state, notes);
        });
    }

    /// Returns false when the event came from a superseded socket.
    fn handle_socket_event(&self, generation: u64, event: SocketEvent) -> bool {
        self.apply(|state, notes| {
            if generation != state.generation {
                log_debug!("Ignoring {:?} from a superseded socket", event);
                return false;
            }

            match event {
                SocketEvent::Open => self.handle_open_locked(state, notes),
                SocketEvent::Message(text) => self.handle_text_locked(state, &text, notes),
                SocketEvent::Close { code, reason } => {
                    self.handle_close_locked(state, code, &reason, notes)
                }
                SocketEvent::Error(err) => {
                    log_error!("Relay socket error: {}", err);
                    state.connection.is_connected = false;
                    if state.session.is_active {
                        self.start_simulation_locked(state);
                    }
                    notes.push(Notification::Connection(state.connection.status()));
                }
            }
            true
        })
    }

    fn handle_open_locked(&self, state: &mut ClientState, notes: &mut Notes) {
        state.connection.mark_open();
        log_info!(
            "Connected to relay node {} as {}",
            state.connection.config.url,
            self.inner.device_id
        );

        if state.simulation.is_some() {
            log_info!("Relay is authoritative now, stopping local simulation");
            Self::stop_simulation_locked(state);
        }

        self.send_locked(state, OutboundMessage::DeviceRegister);
        self.start_monitor_locked(state);
        notes.push(Notification::Connection(ConnectionStatus::Connected));
    }

    fn handle_close_locked(&self, state: &mut ClientState, code: u16, reason: &str, notes: &mut Notes) {
        log_warn!("Relay connection closed (code {}, reason {:?})", code, reason);
        state.connection.is_connected = false;
        state.socket = None;
        state.monitor = None;

        if state.session.is_active {
            log_info!("Resuming local simulation");
            self.start_simulation_locked(state);
        }

        if state
            .connection
            .should_reconnect_after_close(code, state.session.is_active)
        {
            self.attempt_reconnect_locked(state, notes);
        } else {
            log_info!("Clean close with no active workout, not reconnecting");
            notes.push(Notification::Connection(state.connection.status()));
        }
    }

    fn handle_text_locked(&self, state: &mut ClientState, text: &str, notes: &mut Notes) {
        let summary_due = state.stats.record_frame(Instant::now());

        match decode_inbound(text) {
            Ok(message) => {
                state.stats.record_kind(message.kind());
                log_debug!("Received {} message", message.kind());
                self.dispatch_locked(state, message, notes);
            }
            Err(err) => log_error!("Failed to handle relay message: {}", err),
        }

        if summary_due {
            log_info!("Relay message summary: {}", state.stats.summary());
            if state.stats.count_of("ai_feedback") == 0 {
                log_warn!(
                    "No ai_feedback received in {} messages",
                    state.stats.count
                );
            }
        }
    }

    fn dispatch_locked(&self, state: &mut ClientState, message: InboundMessage, notes: &mut Notes) {
        match message {
            InboundMessage::AiFeedback(feedback) => Self::apply_feedback_locked(state, feedback, notes),
            InboundMessage::SystemCommand(command) => self.apply_command_locked(state, command, notes),
            InboundMessage::PerformanceMetrics(metrics) => {
                if let Some(reps) = metrics.rep_count {
                    if state.session.record_rep_count(reps) {
                        notes.push(Notification::RepCounted(reps));
                    }
                }
                state.session.apply_metrics(&metrics);
                notes.push(Notification::Metrics(metrics));
            }
            InboundMessage::BiometricData(metrics) => {
                notes.push(Notification::Metrics(metrics));
            }
            InboundMessage::Unknown { kind, raw } => {
                log_warn!("Unknown relay message type: {}", kind);
                if let Some(feedback) = adapt_legacy_feedback(&raw) {
                    log_warn!(
                        "Treating \"{}\" message as legacy feedback ({})",
                        kind,
                        feedback.signal.as_str()
                    );
                    Self::apply_feedback_locked(state, feedback, notes);
                }
            }
        }
    }

    fn apply_feedback_locked(state: &mut ClientState, feedback: FeedbackMessage, notes: &mut Notes) {
        match feedback.signal {
            FeedbackSignal::GoodForm | FeedbackSignal::BadForm => {
                log_debug!("Form feedback: {}", feedback.signal.as_str());
                state.feedback = Some(feedback.signal.clone());
                notes.push(Notification::Feedback(feedback.signal));
            }
            FeedbackSignal::Error => {
                log_info!("Relay could not judge form, keeping previous feedback");
            }
            FeedbackSignal::Unrecognized(raw) => {
                log_warn!("Unrecognized feedback value {:?}, ignoring", raw);
            }
        }
    }

    fn apply_command_locked(&self, state: &mut ClientState, command: SystemCommand, notes: &mut Notes) {
        log_info!("System command: {:?}", command);
        match command {
            SystemCommand::SelectExercise { exercise_type } => {
                let exercise = exercise::normalize(exercise_type.as_deref());
                Self::select_exercise_locked(state, exercise, notes);
            }
            SystemCommand::StartWorkout => self.start_workout_locked(state, notes),
            SystemCommand::StopWorkout => {
                if state.session.is_active {
                    self.stop_workout_locked(state, notes);
                } else {
                    log_warn!("stop_workout received with no active workout");
                }
            }
            SystemCommand::PauseWorkout => {
                if state.session.is_active {
                    notes.push(Notification::Workout(WorkoutEvent::Paused));
                } else {
                    log_warn!("pause_workout received with no active workout");
                }
            }
            SystemCommand::Unknown(action) => {
                log_warn!("Unknown system command action {:?}", action);
            }
        }
    }

    /// Feeds one detected pose. Connected: uploaded as `pose_data`, throttled
    /// to the configured transmission interval. Disconnected during a
    /// workout: smoothed and run through the local rep counter.
    pub fn submit_pose(&self, frame: &PoseFrame) {
        self.apply(|state, notes| {
            if state.connection.is_connected {
                self.upload_pose_locked(state, frame);
                return;
            }
            if !state.session.is_active {
                return;
            }
            let smoothed = state.smoother.push(frame);
            Self::advance_local_reps(state, &smoothed, notes);
        });
    }

    /// Counts one rep detected outside the pose pipeline and reports it.
    pub fn trigger_rep_detection(&self) {
        self.apply(|state, notes| {
            if !state.session.is_active {
                return;
            }
            let count = state.session.rep_count + 1;
            state.session.record_rep_count(count);
            notes.push(Notification::RepCounted(count));

            if state.connection.config.enable_rep_detection {
                let data = RepPayload {
                    rep_count: count,
                    exercise_type: state.session.exercise_type,
                    timestamp: Utc::now().timestamp_millis(),
                };
                self.send_locked(state, OutboundMessage::RepDetection { data });
            }
        });
    }

    /// Pushes externally measured biometrics to observers and the relay.
    pub fn report_metrics(&self, metrics: PerformanceMetrics) {
        self.apply(|state, notes| {
            if state.connection.config.enable_biometric_data && state.connection.is_connected {
                let data = BiometricPayload {
                    metrics: metrics.clone(),
                    exercise_type: state.session.exercise_type,
                };
                self.send_locked(state, OutboundMessage::BiometricData { data });
            }
            notes.push(Notification::Metrics(metrics));
        });
    }

    fn upload_pose_locked(&self, state: &mut ClientState, frame: &PoseFrame) {
        let config = &state.connection.config;
        if !config.enable_pose_data {
            return;
        }
        let interval = Duration::from_millis(config.data_transmission_interval_ms);
        let now = Instant::now();
        if let Some(last) = state.last_pose_sent {
            if now.saturating_duration_since(last) < interval {
                return;
            }
        }

        let mut keypoints: Vec<NamedKeypoint> = frame
            .keypoints
            .iter()
            .map(|(name, keypoint)| NamedKeypoint {
                name: name.clone(),
                keypoint: *keypoint,
            })
            .collect();
        keypoints.sort_by(|a, b| a.name.cmp(&b.name));

        let data = PosePayload {
            keypoints,
            score: frame.score,
            exercise_type: state.session.exercise_type,
            timestamp: Utc::now().timestamp_millis(),
        };
        if self.send_locked(state, OutboundMessage::PoseData { data }) {
            state.last_pose_sent = Some(now);
        }
    }

    fn advance_local_reps(state: &mut ClientState, frame: &PoseFrame, notes: &mut Notes) {
        let before = state.counter.last_rep_count();
        let after = state.counter.count_reps(frame, state.session.exercise_type);
        if after > before {
            let count = state.session.rep_count + (after - before);
            state.session.record_rep_count(count);
            log_debug!("Local rep detected, total {}", count);
            notes.push(Notification::RepCounted(count));
        }
    }

    fn start_simulation_locked(&self, state: &mut ClientState) {
        if state.simulation.as_ref().is_some_and(Ticker::is_running) {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        state.simulation = Some(Ticker::spawn(SIMULATION_TICK, move || {
            SessionRelayClient::upgrade(&weak)
                .map(|client| client.simulation_tick())
                .unwrap_or(false)
        }));
        log_info!("Local metrics simulation started");
    }

    fn stop_simulation_locked(state: &mut ClientState) {
        if let Some(simulation) = state.simulation.take() {
            simulation.stop();
            log_info!("Local metrics simulation stopped");
        }
    }

    fn simulation_tick(&self) -> bool {
        self.apply(|state, notes| {
            if state.connection.is_connected || !state.session.is_active {
                Self::stop_simulation_locked(state);
                return false;
            }

            let exercise = state.session.exercise_type;
            if state.connection.config.local_rep_simulation_enabled && exercise.counts_reps() {
                let frame = state.motion.next_frame(exercise);
                Self::advance_local_reps(state, &frame, notes);
            }

            let metrics = generate_local_metrics(
                state.session.elapsed_secs(),
                state.session.rep_count,
                Utc::now().timestamp_millis(),
            );
            // local calories are an estimate, not a reported figure
            state.session.apply_metrics(&PerformanceMetrics {
                calories_burned: None,
                ..metrics.clone()
            });
            notes.push(Notification::Metrics(metrics));
            true
        })
    }

    fn start_monitor_locked(&self, state: &mut ClientState) {
        let weak = Arc::downgrade(&self.inner);
        state.monitor = Some(Ticker::spawn(MONITOR_INTERVAL, move || {
            SessionRelayClient::upgrade(&weak)
                .map(|client| client.monitor_tick())
                .unwrap_or(false)
        }));
    }

    fn monitor_tick(&self) -> bool {
        let state = self.lock();
        if !state.connection.is_connected {
            return false;
        }

        let report = MonitorReport {
            ready_state: state.socket.as_ref().map(|socket| socket.ready_state()),
            is_connected: state.connection.is_connected,
            message_count: state.stats.count,
            since_last_message: state.stats.since_last(Instant::now()),
            workout_active: state.session.is_active,
        };
        log_info!("Connection health: {}", report.describe());

        if report.state_mismatch() {
            log_warn!("Marked connected but socket is not open");
        }
        if report.relay_silent() {
            log_warn!(
                "No relay messages for over {}s during an active workout",
                SILENCE_WARNING.as_secs()
            );
        }
        true
    }

    /// Returns whether the message was handed to an open socket.
    fn send_locked(&self, state: &ClientState, message: OutboundMessage) -> bool {
        let kind = message.kind();
        let Some(socket) = state
            .socket
            .as_ref()
            .filter(|socket| socket.ready_state() == ReadyState::Open)
        else {
            log_warn!("Relay connection not available, dropping {}", kind);
            return false;
        };

        let envelope = OutboundEnvelope {
            message,
            device_id: self.inner.device_id.clone(),
            exercise_type: state.session.exercise_type,
            timestamp: Utc::now().timestamp_millis(),
        };
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(err) => {
                log_error!("Failed to encode {}: {}", kind, err);
                return false;
            }
        };

        match socket.send_text(text) {
            Ok(()) => {
                log_debug!("Sent {}", kind);
                true
            }
            Err(err) => {
                log_error!("Failed to send {}: {:#}", kind, err);
                false
            }
        }
    }

    pub fn rep_count(&self) -> u32 {
        self.lock().session.rep_count
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connection.is_connected
    }

    pub fn is_workout_active(&self) -> bool {
        self.lock().session.is_active
    }

    pub fn is_simulating(&self) -> bool {
        self.lock()
            .simulation
            .as_ref()
            .is_some_and(Ticker::is_running)
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.lock()
            .reconnect_timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.lock().connection.reconnect_attempts
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.lock().connection.status()
    }

    pub fn exercise_type(&self) -> ExerciseType {
        self.lock().session.exercise_type
    }

    pub fn last_feedback(&self) -> Option<FeedbackSignal> {
        self.lock().feedback.clone()
    }

    pub fn session(&self) -> WorkoutSession {
        self.lock().session.clone()
    }

    pub fn snapshot(&self) -> ClientSnapshot {
        let state = self.lock();
        ClientSnapshot {
            device_id: self.inner.device_id.clone(),
            session: state.session.clone(),
            display_duration: state.session.display_duration(),
            connection: state.connection.status(),
            feedback: state.feedback.as_ref().map(|signal| signal.as_str().to_string()),
            simulating: state.simulation.as_ref().is_some_and(Ticker::is_running),
            message_stats: state.stats.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClientState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `f` under the state lock, then delivers whatever it queued for
    /// observers.
    fn apply<R>(&self, f: impl FnOnce(&mut ClientState, &mut Notes) -> R) -> R {
        let mut notes = Vec::new();
        let result = {
            let mut state = self.lock();
            f(&mut *state, &mut notes)
        };
        self.notify(notes);
        result
    }

    fn notify(&self, notes: Notes) {
        let observer = &self.inner.observer;
        for note in notes {
            match note {
                Notification::RepCounted(count) => observer.on_rep_counted(count),
                Notification::Metrics(metrics) => observer.on_metrics_update(&metrics),
                Notification::Workout(event) => observer.on_exercise_state_change(event),
                Notification::Feedback(signal) => observer.on_feedback(&signal),
                Notification::ExerciseSelected(exercise) => observer.on_exercise_selected(exercise),
                Notification::Connection(status) => observer.on_connection_change(status),
            }
        }
    }

    fn upgrade(weak: &Weak<ClientInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

async fn pump_socket_events(
    client: Weak<ClientInner>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<SocketEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(client) = SessionRelayClient::upgrade(&client) else {
            break;
        };
        if !client.handle_socket_event(generation, event) {
            break;
        }
    }
}

/// `device_<9 base36 chars>_<epoch ms>`
fn generate_device_id() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("device_{suffix}_{}", Utc::now().timestamp_millis())
}
