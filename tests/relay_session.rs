use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use formcoach_lib::exercise::ExerciseType;
use formcoach_lib::relay::{
    ConnectionStatus, FeedbackSignal, NoopObserver, ReadyState, RelayConnector, RelaySocket,
    SessionObserver, SessionRelayClient, SocketEvent, SocketEvents,
};
use formcoach_lib::settings::RelayConfig;
use formcoach_lib::workout::{estimate_calories, PerformanceMetrics, WorkoutEvent};
use serde_json::{json, Value};

struct FakeSocket {
    state: Mutex<ReadyState>,
    events: SocketEvents,
    sent: Mutex<Vec<Value>>,
    closed_with: Mutex<Option<u16>>,
}

impl FakeSocket {
    fn open(&self) {
        *self.state.lock().unwrap() = ReadyState::Open;
        let _ = self.events.send(SocketEvent::Open);
    }

    fn receive(&self, frame: Value) {
        let _ = self.events.send(SocketEvent::Message(frame.to_string()));
    }

    fn drop_with(&self, code: u16) {
        *self.state.lock().unwrap() = ReadyState::Closed;
        let _ = self.events.send(SocketEvent::Close {
            code,
            reason: String::new(),
        });
    }

    fn fail(&self, message: &str) {
        let _ = self.events.send(SocketEvent::Error(message.to_string()));
    }

    fn sent(&self) -> Vec<Value> {
        self.sent.lock().unwrap().clone()
    }

    fn sent_types(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|frame| frame["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

struct SocketHandle(Arc<FakeSocket>);

impl RelaySocket for SocketHandle {
    fn ready_state(&self) -> ReadyState {
        *self.0.state.lock().unwrap()
    }

    fn send_text(&self, text: String) -> anyhow::Result<()> {
        if self.ready_state() != ReadyState::Open {
            anyhow::bail!("socket not open");
        }
        self.0
            .sent
            .lock()
            .unwrap()
            .push(serde_json::from_str(&text)?);
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        *self.0.closed_with.lock().unwrap() = Some(code);
        *self.0.state.lock().unwrap() = ReadyState::Closed;
        let _ = self.0.events.send(SocketEvent::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

#[derive(Default)]
struct FakeRelay {
    sockets: Mutex<Vec<Arc<FakeSocket>>>,
    refuse: AtomicBool,
}

impl FakeRelay {
    fn opened(&self) -> usize {
        self.sockets.lock().unwrap().len()
    }

    fn latest(&self) -> Arc<FakeSocket> {
        self.sockets
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no socket opened")
    }
}

impl RelayConnector for FakeRelay {
    fn open(&self, _url: &str, events: SocketEvents) -> anyhow::Result<Box<dyn RelaySocket>> {
        if self.refuse.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        let socket = Arc::new(FakeSocket {
            state: Mutex::new(ReadyState::Connecting),
            events,
            sent: Mutex::new(Vec::new()),
            closed_with: Mutex::new(None),
        });
        self.sockets.lock().unwrap().push(socket.clone());
        Ok(Box::new(SocketHandle(socket)))
    }
}

#[derive(Default)]
struct Recorder {
    reps: Mutex<Vec<u32>>,
    metrics: Mutex<Vec<PerformanceMetrics>>,
    workout: Mutex<Vec<WorkoutEvent>>,
    feedback: Mutex<Vec<FeedbackSignal>>,
    exercises: Mutex<Vec<ExerciseType>>,
    connection: Mutex<Vec<ConnectionStatus>>,
}

impl Recorder {
    fn reps(&self) -> Vec<u32> {
        self.reps.lock().unwrap().clone()
    }

    fn metrics_seen(&self) -> usize {
        self.metrics.lock().unwrap().len()
    }

    fn workout(&self) -> Vec<WorkoutEvent> {
        self.workout.lock().unwrap().clone()
    }
}

impl SessionObserver for Recorder {
    fn on_rep_counted(&self, count: u32) {
        self.reps.lock().unwrap().push(count);
    }

    fn on_metrics_update(&self, metrics: &PerformanceMetrics) {
        self.metrics.lock().unwrap().push(metrics.clone());
    }

    fn on_exercise_state_change(&self, event: WorkoutEvent) {
        self.workout.lock().unwrap().push(event);
    }

    fn on_feedback(&self, signal: &FeedbackSignal) {
        self.feedback.lock().unwrap().push(signal.clone());
    }

    fn on_exercise_selected(&self, exercise: ExerciseType) {
        self.exercises.lock().unwrap().push(exercise);
    }

    fn on_connection_change(&self, status: ConnectionStatus) {
        self.connection.lock().unwrap().push(status);
    }
}

fn test_config() -> RelayConfig {
    RelayConfig {
        reconnect_interval_ms: 1000,
        max_reconnect_attempts: 3,
        ..RelayConfig::default()
    }
}

fn setup(config: RelayConfig) -> (SessionRelayClient, Arc<FakeRelay>, Arc<Recorder>) {
    let relay = Arc::new(FakeRelay::default());
    let recorder = Arc::new(Recorder::default());
    let client = SessionRelayClient::new(config, relay.clone(), recorder.clone());
    (client, relay, recorder)
}

/// Lets the socket pump drain without moving the paused clock.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

async fn connected(client: &SessionRelayClient, relay: &FakeRelay) -> Arc<FakeSocket> {
    client.connect_to_relay_node();
    let socket = relay.latest();
    socket.open();
    settle().await;
    assert!(client.is_connected());
    socket
}

fn metrics_frame(reps: u32) -> Value {
    json!({
        "type": "performance_metrics",
        "payload": { "repCount": reps, "heartRate": 110, "workoutDuration": 30 }
    })
}

#[tokio::test(start_paused = true)]
async fn offline_workout_simulates_until_relay_takes_over() {
    let (client, relay, recorder) = setup(test_config());
    assert_eq!(client.set_exercise_type("squats"), ExerciseType::Squats);

    client.start_workout();
    assert_eq!(relay.opened(), 1);
    assert!(!client.is_connected());
    assert!(client.is_simulating());

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(recorder.metrics_seen(), 3);
    assert_eq!(client.session().stats.duration_seconds, 3);

    client.trigger_rep_detection();
    client.trigger_rep_detection();
    assert_eq!(client.rep_count(), 2);

    let socket = relay.latest();
    socket.open();
    settle().await;

    assert!(client.is_connected());
    assert!(!client.is_simulating());
    assert_eq!(client.rep_count(), 2);

    let sent = socket.sent();
    assert_eq!(socket.sent_types(), vec!["device_register"]);
    assert_eq!(sent[0]["deviceId"], client.device_id());
    assert_eq!(sent[0]["exerciseType"], "squats");

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(recorder.metrics_seen(), 3);
    assert_eq!(recorder.workout(), vec![WorkoutEvent::Started]);
}

#[tokio::test(start_paused = true)]
async fn server_rep_counts_fire_only_on_strict_increase() {
    let (client, relay, recorder) = setup(test_config());
    let socket = connected(&client, &relay).await;
    client.start_workout();

    socket.receive(metrics_frame(3));
    settle().await;
    recorder.reps.lock().unwrap().clear();

    for reps in [3, 5, 4, 7] {
        socket.receive(metrics_frame(reps));
    }
    settle().await;

    assert_eq!(recorder.reps(), vec![5, 7]);
    assert_eq!(client.rep_count(), 7);
    assert_eq!(recorder.metrics_seen(), 5);
    assert!(client.session().exercise_started);
}

#[tokio::test(start_paused = true)]
async fn first_server_count_fires_from_zero() {
    let (client, relay, recorder) = setup(test_config());
    let socket = connected(&client, &relay).await;
    client.start_workout();

    for reps in [3, 3, 5, 4, 7] {
        socket.receive(metrics_frame(reps));
    }
    settle().await;

    assert_eq!(recorder.reps(), vec![3, 5, 7]);
}

#[tokio::test(start_paused = true)]
async fn reconnects_are_capped_during_a_workout() {
    let (client, relay, _recorder) = setup(test_config());
    client.start_workout();
    assert_eq!(relay.opened(), 1);

    for attempt in 1..=3u32 {
        relay.latest().drop_with(1006);
        settle().await;
        assert_eq!(client.reconnect_attempts(), attempt);
        assert!(client.has_pending_reconnect());
        assert_eq!(
            client.connection_status(),
            ConnectionStatus::Reconnecting { attempt, max: 3 }
        );

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(relay.opened(), attempt as usize + 1);
        assert!(!client.has_pending_reconnect());
    }

    relay.latest().drop_with(1006);
    settle().await;
    assert_eq!(client.reconnect_attempts(), 3);
    assert!(!client.has_pending_reconnect());
    assert_eq!(client.connection_status(), ConnectionStatus::GaveUp { max: 3 });

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(relay.opened(), 4);
    // still degraded to local mode
    assert!(client.is_simulating());

    assert!(client.reconnect());
    assert_eq!(relay.opened(), 5);
    assert_eq!(client.reconnect_attempts(), 0);
    assert_eq!(client.connection_status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn disconnect_clears_a_spent_retry_budget() {
    let (client, relay, _recorder) = setup(RelayConfig {
        max_reconnect_attempts: 1,
        ..test_config()
    });
    client.start_workout();

    relay.latest().drop_with(1006);
    settle().await;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    relay.latest().drop_with(1006);
    settle().await;
    assert_eq!(client.connection_status(), ConnectionStatus::GaveUp { max: 1 });

    client.disconnect();
    settle().await;
    assert_eq!(client.connection_status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn successful_open_resets_the_attempt_budget() {
    let (client, relay, _recorder) = setup(test_config());
    client.start_workout();

    relay.latest().drop_with(1006);
    settle().await;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(client.reconnect_attempts(), 1);

    relay.latest().open();
    settle().await;
    assert_eq!(client.reconnect_attempts(), 0);
    assert_eq!(client.connection_status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn clean_idle_close_does_not_reconnect() {
    let (client, relay, _recorder) = setup(test_config());
    let socket = connected(&client, &relay).await;

    socket.drop_with(1000);
    settle().await;

    assert!(!client.is_connected());
    assert!(!client.has_pending_reconnect());
    assert_eq!(client.reconnect_attempts(), 0);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(relay.opened(), 1);
    assert_eq!(client.connection_status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn first_idle_failure_is_not_retried() {
    let (client, relay, _recorder) = setup(test_config());
    let socket = connected(&client, &relay).await;

    socket.drop_with(1006);
    settle().await;

    assert!(!client.has_pending_reconnect());
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(relay.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn clean_close_during_workout_still_reconnects() {
    let (client, relay, _recorder) = setup(test_config());
    let socket = connected(&client, &relay).await;
    client.start_workout();

    socket.drop_with(1000);
    settle().await;

    assert!(client.has_pending_reconnect());
    assert!(client.is_simulating());
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(relay.opened(), 2);
}

#[tokio::test(start_paused = true)]
async fn refused_connection_schedules_a_retry() {
    let (client, relay, _recorder) = setup(test_config());
    relay.refuse.store(true, Ordering::SeqCst);

    client.start_workout();
    assert_eq!(relay.opened(), 0);
    assert!(client.has_pending_reconnect());
    assert!(client.is_simulating());

    relay.refuse.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(relay.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn local_reps_only_count_while_disconnected() {
    let config = RelayConfig {
        local_rep_simulation_enabled: true,
        ..test_config()
    };
    let (client, relay, recorder) = setup(config);
    client.set_exercise_type("bicep-curls");
    client.start_workout();

    // four synthetic frames per rep, the first completes on tick five
    tokio::time::sleep(Duration::from_millis(5500)).await;
    assert_eq!(recorder.reps(), vec![1]);
    assert_eq!(client.rep_count(), 1);

    let socket = relay.latest();
    socket.open();
    settle().await;
    assert!(!client.is_simulating());

    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(recorder.reps(), vec![1]);
    assert_eq!(client.rep_count(), 1);

    socket.drop_with(1006);
    settle().await;
    assert!(!client.is_connected());
    assert!(client.is_simulating());
}

#[tokio::test(start_paused = true)]
async fn hr_only_simulation_never_counts_reps() {
    let config = RelayConfig {
        local_rep_simulation_enabled: true,
        ..test_config()
    };
    let (client, _relay, recorder) = setup(config);
    client.start_workout();

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    assert!(recorder.reps().is_empty());
    assert_eq!(recorder.metrics_seen(), 10);
    assert_eq!(client.snapshot().display_duration, "00:00");
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_reconnect() {
    let (client, relay, _recorder) = setup(test_config());
    client.start_workout();

    relay.latest().drop_with(1006);
    settle().await;
    assert!(client.has_pending_reconnect());

    client.disconnect();
    assert!(!client.has_pending_reconnect());
    assert!(!client.is_simulating());
    assert_eq!(client.reconnect_attempts(), 0);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(relay.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_closes_normally_and_ignores_late_events() {
    let (client, relay, recorder) = setup(test_config());
    let socket = connected(&client, &relay).await;

    client.disconnect();
    settle().await;
    assert_eq!(*socket.closed_with.lock().unwrap(), Some(1000));
    assert!(!client.is_connected());

    socket.open();
    socket.receive(metrics_frame(9));
    settle().await;
    assert!(!client.is_connected());
    assert_eq!(client.rep_count(), 0);
    assert!(recorder.reps().is_empty());
}

#[tokio::test(start_paused = true)]
async fn relay_drives_the_workout_with_system_commands() {
    let (client, relay, recorder) = setup(test_config());
    let socket = connected(&client, &relay).await;

    socket.receive(json!({
        "type": "system_command",
        "payload": { "action": "select_exercise", "exerciseType": "lateral-raises" }
    }));
    socket.receive(json!({"type": "system_command", "payload": {"action": "start_workout"}}));
    settle().await;

    assert_eq!(client.exercise_type(), ExerciseType::LateralRaises);
    assert_eq!(
        *recorder.exercises.lock().unwrap(),
        vec![ExerciseType::LateralRaises]
    );
    assert!(client.is_workout_active());
    assert!(!client.is_simulating());

    socket.receive(json!({"type": "system_command", "payload": {"action": "pause_workout"}}));
    socket.receive(metrics_frame(4));
    socket.receive(json!({"type": "system_command", "payload": {"action": "stop_workout"}}));
    socket.receive(json!({"type": "system_command", "payload": {"action": "stop_workout"}}));
    socket.receive(json!({"type": "system_command", "payload": {"action": "warp_speed"}}));
    settle().await;

    assert_eq!(
        recorder.workout(),
        vec![
            WorkoutEvent::Started,
            WorkoutEvent::Paused,
            WorkoutEvent::Stopped
        ]
    );
    assert!(!client.is_workout_active());
    assert!(client.is_connected());

    let stats = client.session().stats;
    assert_eq!(stats.total_reps, 4);
    assert_eq!(stats.avg_heart_rate, 110);
    assert_eq!(stats.duration_seconds, 30);

    assert_eq!(
        socket.sent_types(),
        vec!["device_register", "workout_started", "workout_stopped"]
    );
    assert_eq!(socket.sent()[1]["exerciseType"], "lateral-raises");
}

#[tokio::test(start_paused = true)]
async fn server_duration_survives_stop() {
    let relay = Arc::new(FakeRelay::default());
    let client = SessionRelayClient::new(test_config(), relay.clone(), Arc::new(NoopObserver));
    let socket = connected(&client, &relay).await;
    client.set_exercise_type("squats");
    client.start_workout();

    tokio::time::sleep(Duration::from_secs(60)).await;
    socket.receive(json!({
        "type": "performance_metrics",
        "payload": { "repCount": 2, "workoutDuration": 10 }
    }));
    settle().await;
    assert_eq!(client.session().stats.duration_seconds, 10);

    client.stop_workout();
    let stats = client.session().stats;
    assert_eq!(stats.duration_seconds, 10);
    assert_eq!(stats.total_reps, 2);
    assert_eq!(stats.calories_burned, estimate_calories(10, 2));
}

#[tokio::test(start_paused = true)]
async fn socket_error_resumes_local_simulation() {
    let (client, relay, recorder) = setup(test_config());
    let socket = connected(&client, &relay).await;
    client.start_workout();
    assert!(!client.is_simulating());

    socket.fail("connection reset");
    settle().await;

    assert!(!client.is_connected());
    assert!(client.is_simulating());
    assert_eq!(
        recorder.connection.lock().unwrap().last(),
        Some(&ConnectionStatus::Disconnected)
    );

    // the close that follows must not start a second simulation
    socket.drop_with(1006);
    settle().await;
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(recorder.metrics_seen(), 2);
}

#[tokio::test(start_paused = true)]
async fn unknown_exercise_from_relay_falls_back_to_hr_only() {
    let (client, relay, _recorder) = setup(test_config());
    client.set_exercise_type("squats");
    let socket = connected(&client, &relay).await;

    socket.receive(json!({
        "type": "system_command",
        "payload": { "action": "select_exercise", "exerciseType": "burpees" }
    }));
    settle().await;
    assert_eq!(client.exercise_type(), ExerciseType::HrOnly);
}

#[tokio::test(start_paused = true)]
async fn feedback_keeps_last_verdict_on_error() {
    let (client, relay, recorder) = setup(test_config());
    let socket = connected(&client, &relay).await;

    socket.receive(json!({"type": "ai_feedback", "payload": {"feedback": "Good Form"}}));
    socket.receive(json!({"type": "ai_feedback", "payload": {"feedback": "Error"}}));
    socket.receive(json!({"type": "ai_feedback", "payload": {"feedback": "meh"}}));
    settle().await;

    assert_eq!(client.last_feedback(), Some(FeedbackSignal::GoodForm));
    assert_eq!(
        *recorder.feedback.lock().unwrap(),
        vec![FeedbackSignal::GoodForm]
    );

    socket.receive(json!({"type": "form_update", "feedback": "Bad Form"}));
    socket.receive(json!("not an object"));
    socket.receive(json!({"type": "ai_feedback"}));
    settle().await;

    assert_eq!(client.last_feedback(), Some(FeedbackSignal::BadForm));
    assert_eq!(client.snapshot().message_stats.count, 6);
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn pose_uploads_are_throttled() {
    let (client, relay, _recorder) = setup(test_config());
    let socket = connected(&client, &relay).await;
    client.start_workout();

    let frame = formcoach_lib::pose::PoseFrame::new(0.9).with_keypoint(
        formcoach_lib::pose::names::LEFT_SHOULDER,
        formcoach_lib::pose::Keypoint::new(120.0, 80.0, 0.95),
    );

    client.submit_pose(&frame);
    client.submit_pose(&frame);
    tokio::time::sleep(Duration::from_millis(150)).await;
    client.submit_pose(&frame);

    let poses: Vec<Value> = socket
        .sent()
        .into_iter()
        .filter(|frame| frame["type"] == "pose_data")
        .collect();
    assert_eq!(poses.len(), 2);
    assert_eq!(poses[0]["data"]["keypoints"][0]["name"], "left_shoulder");
    assert_eq!(client.rep_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn biometrics_and_rep_reports_are_forwarded() {
    let (client, relay, recorder) = setup(test_config());
    let socket = connected(&client, &relay).await;
    client.start_workout();

    client.report_metrics(PerformanceMetrics {
        heart_rate: Some(128),
        ..PerformanceMetrics::default()
    });
    client.trigger_rep_detection();

    let sent = socket.sent();
    let biometric = sent
        .iter()
        .find(|frame| frame["type"] == "biometric_data")
        .expect("biometric_data sent");
    assert_eq!(biometric["data"]["heartRate"], 128);
    let rep = sent
        .iter()
        .find(|frame| frame["type"] == "rep_detection")
        .expect("rep_detection sent");
    assert_eq!(rep["data"]["repCount"], 1);
    assert_eq!(recorder.reps(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn start_and_stop_are_idempotent() {
    let (client, _relay, recorder) = setup(test_config());
    client.stop_workout();
    client.start_workout();
    client.start_workout();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    client.stop_workout();
    client.stop_workout();

    assert_eq!(
        recorder.workout(),
        vec![WorkoutEvent::Started, WorkoutEvent::Stopped]
    );
    assert!(!client.is_simulating());
    let stats = client.session().stats;
    assert_eq!(stats.duration_seconds, 2);
    assert!(stats.avg_heart_rate >= 60);
}

#[tokio::test(start_paused = true)]
async fn disabled_relay_stays_local() {
    let config = RelayConfig {
        enabled: false,
        ..test_config()
    };
    let (client, relay, _recorder) = setup(config);
    client.start_workout();

    assert_eq!(relay.opened(), 0);
    assert!(!client.has_pending_reconnect());
    assert!(client.is_simulating());
}

#[tokio::test(start_paused = true)]
async fn configure_rejects_invalid_settings() {
    let (client, relay, _recorder) = setup(test_config());
    let bad = RelayConfig {
        url: "http://relay".into(),
        ..test_config()
    };
    assert!(client.configure(bad).is_err());

    let moved = RelayConfig {
        url: "ws://10.0.0.9:9000".into(),
        ..test_config()
    };
    client.configure(moved).unwrap();
    client.connect_to_relay_node();
    assert_eq!(relay.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn explicit_reconnect_attempt_follows_policy() {
    let (client, relay, _recorder) = setup(RelayConfig {
        enabled: false,
        ..test_config()
    });

    client.attempt_reconnect();
    assert!(!client.has_pending_reconnect());

    client.start_workout();
    client.attempt_reconnect();
    assert!(client.has_pending_reconnect());
    assert_eq!(client.reconnect_attempts(), 1);

    // the timer fires but the relay is switched off
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(relay.opened(), 0);
}
