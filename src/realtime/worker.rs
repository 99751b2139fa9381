use crate::config::WorkerConfig;
use crate::error::{PullcordError, Result};
use crate::nav::{Classification, Fix, NavigationController, Segment};
use crate::realtime::filter::{FilterVerdict, FixFilter};
use crate::telemetry::TelemetryRecord;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Input to the navigator task.
#[derive(Debug, Clone)]
pub enum Command {
    Start(Vec<Segment>),
    Fix(Fix),
    /// The rider acknowledged the current prompt
    Confirm,
    /// The rider reports arriving at the current segment's stop
    Skip,
    /// Abort the trip and end the task
    Stop,
}

/// Output of the navigator task, for the alerting and telemetry sides of the host.
#[derive(Debug, Clone, PartialEq)]
pub enum NavEvent {
    GetReady { segment: usize },
    StopReached { segment: usize, trip_finished: bool },
    Rejected { reason: String },
    Telemetry(TelemetryRecord),
}

/// Controller state as last published by the task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NavSnapshot {
    pub active_index: Option<usize>,
    pub ready: bool,
    pub finished: bool,
    pub awaiting_confirmation: bool,
    /// Fixes the engine rejected as invalid
    pub dropped_fixes: u64,
    /// Fixes the duplicate filter held back
    pub filtered_fixes: u64,
}

/// Handle to a running navigator task.
pub struct NavigatorHandle {
    commands: mpsc::Sender<Command>,
    snapshot: Arc<RwLock<NavSnapshot>>,
    task: JoinHandle<NavSnapshot>,
}

impl NavigatorHandle {
    pub async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| PullcordError::WorkerClosed)
    }

    /// Another producer for the same task, e.g. for a UI confirm button.
    pub fn sender(&self) -> mpsc::Sender<Command> {
        self.commands.clone()
    }

    pub async fn snapshot(&self) -> NavSnapshot {
        *self.snapshot.read().await
    }

    pub fn shared_snapshot(&self) -> Arc<RwLock<NavSnapshot>> {
        self.snapshot.clone()
    }

    /// Close this handle's queue and wait for the task to drain it. Senders
    /// obtained through [`NavigatorHandle::sender`] must be dropped too, or
    /// the task keeps waiting for them.
    pub async fn finish(self) -> Result<NavSnapshot> {
        let NavigatorHandle { commands, task, .. } = self;
        drop(commands);
        task.await.map_err(|_| PullcordError::WorkerClosed)
    }
}

/// Spawn the single task that owns `controller`.
///
/// Every fix goes through one queue and is classified to completion before
/// the next is taken, so classification always sees a consistent segment
/// and detector. Must be called from within a tokio runtime.
pub fn spawn_navigator(
    controller: NavigationController,
    config: WorkerConfig,
) -> (NavigatorHandle, mpsc::UnboundedReceiver<NavEvent>) {
    let capacity = config.channel_capacity.max(1);
    let (command_tx, command_rx) = mpsc::channel(capacity);
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let snapshot = Arc::new(RwLock::new(NavSnapshot::default()));

    info!("Starting navigator, queue capacity {}", capacity);

    let worker = Worker {
        controller,
        config,
        filter: FixFilter::new(),
        events: event_tx,
        snapshot: snapshot.clone(),
        received: 0,
        filtered: 0,
    };
    let task = tokio::spawn(worker.run(command_rx));

    (
        NavigatorHandle {
            commands: command_tx,
            snapshot,
            task,
        },
        event_rx,
    )
}

struct Worker {
    controller: NavigationController,
    config: WorkerConfig,
    filter: FixFilter,
    events: mpsc::UnboundedSender<NavEvent>,
    snapshot: Arc<RwLock<NavSnapshot>>,
    received: u64,
    filtered: u64,
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> NavSnapshot {
        while let Some(command) = commands.recv().await {
            let keep_running = self.handle(command);
            let current = self.current();
            *self.snapshot.write().await = current;
            if !keep_running {
                break;
            }
        }
        info!(
            "Navigator stopped after {} fixes ({} filtered)",
            self.received, self.filtered
        );
        self.current()
    }

    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Start(segments) => {
                self.filter.reset();
                if let Err(e) = self.controller.start(segments) {
                    warn!("Trip not started: {}", e);
                    self.emit(NavEvent::Rejected {
                        reason: e.to_string(),
                    });
                }
            }
            Command::Fix(fix) => self.handle_fix(fix),
            Command::Confirm => self.controller.confirm(),
            Command::Skip => self.controller.skip_segment(),
            Command::Stop => {
                self.controller.stop();
                return false;
            }
        }
        true
    }

    fn handle_fix(&mut self, fix: Fix) {
        let seq = self.received;
        self.received += 1;

        if self.config.drop_duplicates {
            let verdict = self.filter.check(&fix);
            if verdict != FilterVerdict::Accept {
                self.filtered += 1;
                debug!("Filtered fix {} ({:?})", seq, verdict);
                return;
            }
        }

        let active = self.controller.active_index();
        let classification = match self.controller.on_location(&fix) {
            Ok(classification) => classification,
            Err(e) => {
                warn!("Fix {} rejected: {}", seq, e);
                self.emit(NavEvent::Rejected {
                    reason: e.to_string(),
                });
                return;
            }
        };

        let segment = active.unwrap_or_default();
        match classification {
            Classification::GetReady => {
                self.emit(NavEvent::GetReady { segment });
                if self.config.auto_confirm {
                    self.controller.confirm();
                }
            }
            Classification::StopReached => {
                self.emit(NavEvent::StopReached {
                    segment,
                    trip_finished: self.controller.is_finished(),
                });
            }
            Classification::NoEvent => {}
        }

        if self.config.telemetry {
            let record =
                TelemetryRecord::capture(seq, &fix, classification, active, &self.controller);
            self.emit(NavEvent::Telemetry(record));
        }
    }

    fn emit(&self, event: NavEvent) {
        // The host may have stopped listening; the trip carries on regardless.
        let _ = self.events.send(event);
    }

    fn current(&self) -> NavSnapshot {
        NavSnapshot {
            active_index: self.controller.active_index(),
            ready: self.controller.is_ready(),
            finished: self.controller.is_finished(),
            awaiting_confirmation: self.controller.is_awaiting_confirmation(),
            dropped_fixes: self.controller.dropped_fixes(),
            filtered_fixes: self.filtered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;

    const STOP_A: GeoPoint = GeoPoint::new(28.0587, -82.4139);
    const STOP_B: GeoPoint = GeoPoint::new(28.0632, -82.4139);

    fn fix_near(meters: f64, speed: f32, t: u64) -> Fix {
        let p = STOP_A.destination(180.0, meters);
        Fix::new(p.lat, p.lon, speed, t)
    }

    async fn drain(mut events: mpsc::UnboundedReceiver<NavEvent>) -> Vec<NavEvent> {
        let mut out = Vec::new();
        while let Some(event) = events.recv().await {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn processes_fixes_in_order_with_auto_confirm() {
        let config = WorkerConfig {
            auto_confirm: true,
            ..Default::default()
        };
        let (handle, events) = spawn_navigator(NavigationController::default(), config);

        handle
            .send(Command::Start(vec![Segment::new(STOP_A, STOP_B).unwrap()]))
            .await
            .unwrap();
        handle.send(Command::Fix(fix_near(200.0, 8.0, 1))).await.unwrap();
        handle.send(Command::Fix(fix_near(12.0, 18.0, 2))).await.unwrap();

        let snapshot = handle.finish().await.unwrap();
        assert!(snapshot.finished);
        assert!(snapshot.ready);

        let events = drain(events).await;
        assert_eq!(
            events,
            vec![
                NavEvent::GetReady { segment: 0 },
                NavEvent::StopReached {
                    segment: 0,
                    trip_finished: true
                },
            ]
        );
    }

    #[tokio::test]
    async fn holds_until_confirm_command() {
        let (handle, events) =
            spawn_navigator(NavigationController::default(), WorkerConfig::default());

        handle
            .send(Command::Start(vec![Segment::new(STOP_A, STOP_B).unwrap()]))
            .await
            .unwrap();
        handle.send(Command::Fix(fix_near(200.0, 8.0, 1))).await.unwrap();
        handle.send(Command::Fix(fix_near(12.0, 18.0, 2))).await.unwrap();
        handle.send(Command::Confirm).await.unwrap();
        handle.send(Command::Fix(fix_near(12.0, 18.0, 3))).await.unwrap();

        let snapshot = handle.finish().await.unwrap();
        assert!(snapshot.finished);
        let events = drain(events).await;
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn filters_duplicates_and_reports_invalid_fixes() {
        let config = WorkerConfig {
            telemetry: true,
            ..Default::default()
        };
        let (handle, events) = spawn_navigator(NavigationController::default(), config);

        handle
            .send(Command::Start(vec![Segment::new(STOP_A, STOP_B).unwrap()]))
            .await
            .unwrap();
        let fix = fix_near(400.0, 8.0, 10);
        handle.send(Command::Fix(fix)).await.unwrap();
        handle.send(Command::Fix(fix)).await.unwrap();
        handle
            .send(Command::Fix(Fix::new(f64::NAN, 0.0, 1.0, 11)))
            .await
            .unwrap();

        let snapshot = handle.finish().await.unwrap();
        assert_eq!(snapshot.filtered_fixes, 1);
        assert_eq!(snapshot.dropped_fixes, 1);
        assert!(!snapshot.finished);

        let events = drain(events).await;
        assert_eq!(events.len(), 2);
        match &events[0] {
            NavEvent::Telemetry(record) => {
                assert_eq!(record.seq, 0);
                assert_eq!(record.classification, Classification::NoEvent);
                assert_eq!(record.active_index, Some(0));
            }
            other => panic!("expected telemetry, got {:?}", other),
        }
        assert!(matches!(events[1], NavEvent::Rejected { .. }));
    }

    #[tokio::test]
    async fn corrupt_fix_does_not_block_later_fixes() {
        let config = WorkerConfig {
            auto_confirm: true,
            ..Default::default()
        };
        let (handle, events) = spawn_navigator(NavigationController::default(), config);

        handle
            .send(Command::Start(vec![Segment::new(STOP_A, STOP_B).unwrap()]))
            .await
            .unwrap();
        handle.send(Command::Fix(fix_near(400.0, 8.0, 10))).await.unwrap();
        handle
            .send(Command::Fix(Fix::new(f64::NAN, f64::NAN, 5.0, u64::MAX)))
            .await
            .unwrap();
        let approach = [
            (200.0, 8.0),
            (80.0, 6.0),
            (30.0, 4.0),
            (10.0, 1.0),
            (5.0, 0.0),
            (35.0, 7.0),
        ];
        for (i, (meters, speed)) in approach.into_iter().enumerate() {
            handle
                .send(Command::Fix(fix_near(meters, speed, 11 + i as u64)))
                .await
                .unwrap();
        }

        let snapshot = handle.finish().await.unwrap();
        assert_eq!(snapshot.dropped_fixes, 1);
        assert_eq!(snapshot.filtered_fixes, 0);
        assert!(snapshot.finished);

        let events = drain(events).await;
        assert!(matches!(events[0], NavEvent::Rejected { .. }));
        assert_eq!(events[1], NavEvent::GetReady { segment: 0 });
        assert_eq!(
            events[2],
            NavEvent::StopReached {
                segment: 0,
                trip_finished: true
            }
        );
    }

    #[tokio::test]
    async fn rejects_empty_trip_and_stops_on_command() {
        let (handle, events) =
            spawn_navigator(NavigationController::default(), WorkerConfig::default());
        let shared = handle.shared_snapshot();

        handle.send(Command::Start(Vec::new())).await.unwrap();
        handle.send(Command::Stop).await.unwrap();

        let snapshot = handle.finish().await.unwrap();
        assert_eq!(snapshot.active_index, None);
        assert_eq!(*shared.read().await, snapshot);

        let events = drain(events).await;
        assert_eq!(
            events,
            vec![NavEvent::Rejected {
                reason: "trip has no segments".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn skip_command_advances() {
        let (handle, _events) =
            spawn_navigator(NavigationController::default(), WorkerConfig::default());
        handle
            .send(Command::Start(vec![
                Segment::new(STOP_A, STOP_B).unwrap(),
                Segment::new(STOP_B, STOP_A).unwrap(),
            ]))
            .await
            .unwrap();
        handle.send(Command::Skip).await.unwrap();

        let snapshot = handle.finish().await.unwrap();
        assert_eq!(snapshot.active_index, Some(1));
        assert!(!snapshot.finished);
    }
}
