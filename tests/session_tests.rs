//! Session lifecycle tests with a scripted launcher.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

use marksman_bridge::host::{ProgressHandle, ProgressView, StatusIndicator};
use marksman_bridge::server::{
    BoxFuture, LaunchFuture, RunState, Session, SessionController, SessionEvent, SessionHandle,
    SessionLauncher, StatusPayload,
};
use marksman_bridge::{Fetcher, Resolver, ServerSpec, Settings};

struct NullProgress;

impl ProgressView for NullProgress {
    fn begin(&self, _title: &str) -> Box<dyn ProgressHandle> {
        Box::new(NullHandle)
    }
}

struct NullHandle;

impl ProgressHandle for NullHandle {
    fn report(&mut self, _percent: u32, _increment: u32) {}
}

#[derive(Default)]
struct FakeIndicator {
    texts: Mutex<Vec<String>>,
}

impl FakeIndicator {
    fn last(&self) -> String {
        self.texts.lock().unwrap().last().cloned().unwrap_or_default()
    }

    fn all(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

impl StatusIndicator for FakeIndicator {
    fn set_text(&self, text: &str) {
        self.texts.lock().unwrap().push(text.to_string());
    }

    fn show(&self) {}

    fn hide(&self) {}
}

struct FakeHandle {
    index: usize,
    log: Arc<Mutex<Vec<String>>>,
    output: PathBuf,
    events_tx: Option<mpsc::Sender<SessionEvent>>,
}

impl SessionHandle for FakeHandle {
    fn stop(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            // A stopping process always reports its exit, like the real client.
            if let Some(tx) = self.events_tx.take() {
                let _ = tx.send(SessionEvent::Stopped).await;
            }
            self.log.lock().unwrap().push(format!("stop {}", self.index));
        })
    }

    fn output_path(&self) -> &Path {
        &self.output
    }
}

#[derive(Default)]
struct FakeLauncher {
    log: Arc<Mutex<Vec<String>>>,
    launched: AtomicUsize,
    senders: Mutex<Vec<mpsc::Sender<SessionEvent>>>,
}

impl FakeLauncher {
    fn sender(&self, index: usize) -> mpsc::Sender<SessionEvent> {
        self.senders.lock().unwrap()[index].clone()
    }
}

impl SessionLauncher for FakeLauncher {
    fn launch(&self, _spec: &ServerSpec) -> LaunchFuture {
        let index = self.launched.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(format!("launch {}", index));

        let (events_tx, events_rx) = mpsc::channel(8);
        self.senders.lock().unwrap().push(events_tx.clone());

        let handle = FakeHandle {
            index,
            log: Arc::clone(&self.log),
            output: PathBuf::from("/tmp/marksman-test.log"),
            events_tx: Some(events_tx),
        };
        Box::pin(async move {
            Ok(Session {
                handle: Box::new(handle),
                events: events_rx,
            })
        })
    }
}

fn controller_with(
    settings: Settings,
    launcher: Arc<FakeLauncher>,
    indicator: Arc<FakeIndicator>,
    storage_root: PathBuf,
) -> SessionController {
    let resolver = Resolver::with_search_path(settings, std::ffi::OsString::new()).unwrap();
    // Unroutable fetcher: the download source must never produce a binary.
    let fetcher = Fetcher::with_release(storage_root, "http://127.0.0.1:1", "test");
    SessionController::new(
        resolver,
        fetcher,
        Box::new(launcher),
        indicator,
        Arc::new(NullProgress),
    )
}

fn launchable_settings() -> Settings {
    Settings {
        custom_command: Some("fake-marksman".to_string()),
        ..Settings::default()
    }
}

/// Polls until `condition` holds or a second has passed.
async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within one second");
}

#[tokio::test]
async fn test_restart_keeps_exactly_one_session() {
    let launcher = Arc::new(FakeLauncher::default());
    let indicator = Arc::new(FakeIndicator::default());
    let storage = tempfile::tempdir().unwrap();
    let mut controller = controller_with(
        launchable_settings(),
        Arc::clone(&launcher),
        Arc::clone(&indicator),
        storage.path().to_path_buf(),
    );

    assert!(controller.connect().await);
    assert!(controller.has_session());
    assert_eq!(launcher.launched.load(Ordering::SeqCst), 1);

    controller.restart().await;

    assert!(controller.has_session());
    assert_eq!(launcher.launched.load(Ordering::SeqCst), 2);
    // The old session stops fully before the new one launches.
    let log = launcher.log.lock().unwrap().clone();
    assert_eq!(log, vec!["launch 0", "stop 0", "launch 1"]);
    // Restart passes through the pending marker before reconnecting.
    assert!(indicator.all().iter().any(|text| text == "? MN"));
}

#[tokio::test]
async fn test_status_notifications_update_the_indicator() {
    let launcher = Arc::new(FakeLauncher::default());
    let indicator = Arc::new(FakeIndicator::default());
    let storage = tempfile::tempdir().unwrap();
    let mut controller = controller_with(
        launchable_settings(),
        Arc::clone(&launcher),
        Arc::clone(&indicator),
        storage.path().to_path_buf(),
    );

    assert!(controller.connect().await);
    let events = launcher.sender(0);

    events
        .send(SessionEvent::Status(StatusPayload {
            state: RunState::Ok,
            doc_count: 5,
        }))
        .await
        .unwrap();
    wait_until(|| indicator.last() == "✓ MN (5)").await;

    // Self-loop: a fresh ok payload refreshes the count.
    events
        .send(SessionEvent::Status(StatusPayload {
            state: RunState::Ok,
            doc_count: 7,
        }))
        .await
        .unwrap();
    wait_until(|| indicator.last() == "✓ MN (7)").await;
}

#[tokio::test]
async fn test_stopped_event_overrides_stale_ok() {
    let launcher = Arc::new(FakeLauncher::default());
    let indicator = Arc::new(FakeIndicator::default());
    let storage = tempfile::tempdir().unwrap();
    let mut controller = controller_with(
        launchable_settings(),
        Arc::clone(&launcher),
        Arc::clone(&indicator),
        storage.path().to_path_buf(),
    );

    assert!(controller.connect().await);
    let events = launcher.sender(0);

    events
        .send(SessionEvent::Status(StatusPayload {
            state: RunState::Ok,
            doc_count: 3,
        }))
        .await
        .unwrap();
    wait_until(|| indicator.last() == "✓ MN (3)").await;

    events.send(SessionEvent::Stopped).await.unwrap();
    wait_until(|| indicator.last() == "☠ MN").await;

    // A stale ok delivered after the stop must never resurrect the status.
    let _ = events
        .send(SessionEvent::Status(StatusPayload {
            state: RunState::Ok,
            doc_count: 9,
        }))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(indicator.last(), "☠ MN");
}

#[tokio::test]
async fn test_resolution_failure_leaves_bridge_inert() {
    let launcher = Arc::new(FakeLauncher::default());
    let indicator = Arc::new(FakeIndicator::default());
    // No custom command, empty search path, unroutable download source.
    let storage = tempfile::tempdir().unwrap();
    let mut controller = controller_with(
        Settings::default(),
        Arc::clone(&launcher),
        Arc::clone(&indicator),
        storage.path().to_path_buf(),
    );

    assert!(!controller.connect().await);
    assert!(!controller.has_session());
    assert_eq!(launcher.launched.load(Ordering::SeqCst), 0);
    assert_eq!(indicator.last(), "☠ MN");
}

#[tokio::test]
async fn test_stop_current_is_idempotent() {
    let launcher = Arc::new(FakeLauncher::default());
    let indicator = Arc::new(FakeIndicator::default());
    let storage = tempfile::tempdir().unwrap();
    let mut controller = controller_with(
        launchable_settings(),
        Arc::clone(&launcher),
        Arc::clone(&indicator),
        storage.path().to_path_buf(),
    );

    assert!(controller.connect().await);
    controller.stop_current().await;
    assert!(!controller.has_session());
    assert!(controller.output_path().is_none());

    // Stopping again with no session is a no-op.
    controller.stop_current().await;
    assert_eq!(
        launcher.log.lock().unwrap().iter().filter(|entry| entry.starts_with("stop")).count(),
        1
    );
}
