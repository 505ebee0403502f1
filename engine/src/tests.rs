//! Unit tests for the delivery pipeline.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tempfile::tempdir;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use relay_client::{
    AttributionService, ConnectError, FetchError, ServiceConnection, SetupEvent,
};
use relay_runtime::{ReadinessGate, RuntimeHandle};
use relay_store::FlagStore;
use relay_types::{Referrer, ResponseCode, RuntimeEvent};

use crate::{DeliveryOutcome, DeliveryPipeline, FailureReason};

const NAMESPACE: &str = "relay-test";

#[derive(Clone)]
enum Behavior {
    Deliver(&'static str),
    Refuse(ResponseCode),
    DropBeforeSetup,
    FailConnect,
    FailFetch,
    PanicOnFetch,
}

struct ScriptedService {
    behavior: Behavior,
    connects: AtomicUsize,
}

impl ScriptedService {
    fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            connects: AtomicUsize::new(0),
        }
    }

    fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl AttributionService for ScriptedService {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn ServiceConnection>, ConnectError>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.clone();
        Box::pin(async move {
            if matches!(behavior, Behavior::FailConnect) {
                return Err(ConnectError::Unreachable("scripted".to_string()));
            }
            Ok(Box::new(ScriptedConnection { behavior }) as Box<dyn ServiceConnection>)
        })
    }
}

struct ScriptedConnection {
    behavior: Behavior,
}

impl ServiceConnection for ScriptedConnection {
    fn setup(&mut self) -> BoxFuture<'_, SetupEvent> {
        let event = match &self.behavior {
            Behavior::Deliver(_) | Behavior::FailFetch | Behavior::PanicOnFetch => {
                SetupEvent::Finished(ResponseCode::Ok)
            }
            Behavior::Refuse(code) => SetupEvent::Finished(*code),
            Behavior::DropBeforeSetup => SetupEvent::Disconnected,
            Behavior::FailConnect => unreachable!("connect already failed"),
        };
        Box::pin(async move { event })
    }

    fn fetch_referrer(&mut self) -> BoxFuture<'_, Result<Referrer, FetchError>> {
        let behavior = self.behavior.clone();
        Box::pin(async move {
            match behavior {
                Behavior::Deliver(raw) => Ok(Referrer::new(raw).expect("non-empty")),
                Behavior::FailFetch => Err(FetchError::Transport("scripted".to_string())),
                Behavior::PanicOnFetch => panic!("scripted fetch panic"),
                _ => unreachable!("fetch after non-OK setup"),
            }
        })
    }

    fn disconnect(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async {})
    }
}

struct Fixture {
    pipeline: Arc<DeliveryPipeline>,
    service: Arc<ScriptedService>,
    gate: Arc<ReadinessGate>,
    store: FlagStore,
}

fn fixture(dir: &Path, behavior: Behavior) -> Fixture {
    let service = Arc::new(ScriptedService::new(behavior));
    let gate = Arc::new(ReadinessGate::new());
    let store = FlagStore::open(dir, NAMESPACE);
    let pipeline = Arc::new(DeliveryPipeline::new(
        Arc::clone(&service) as Arc<dyn AttributionService>,
        Arc::clone(&gate),
        store.clone(),
    ));
    Fixture {
        pipeline,
        service,
        gate,
        store,
    }
}

fn ready_runtime(gate: &ReadinessGate) -> UnboundedReceiver<RuntimeEvent> {
    let (handle, rx) = RuntimeHandle::channel();
    gate.install(handle).expect("install");
    rx
}

async fn expect_event(rx: &mut UnboundedReceiver<RuntimeEvent>) -> RuntimeEvent {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("event within deadline")
        .expect("channel open")
}

#[tokio::test]
async fn scenario_a_runtime_present_delivers_once() {
    let dir = tempdir().expect("tempdir");
    let f = fixture(dir.path(), Behavior::Deliver("utm_source=test"));
    let mut rx = ready_runtime(&f.gate);

    assert_eq!(f.pipeline.run().await, DeliveryOutcome::Delivered);

    let event = expect_event(&mut rx).await;
    assert_eq!(event.name(), "InstallReferrer");
    assert_eq!(event.payload(), "utm_source=test");
    assert!(rx.try_recv().is_err());
    assert!(f.store.delivered());
}

#[tokio::test]
async fn scenario_b_queues_and_delivers_the_exact_string_on_readiness() {
    let dir = tempdir().expect("tempdir");
    let f = fixture(
        dir.path(),
        Behavior::Deliver("utm_source=test&utm_campaign=launch"),
    );

    assert_eq!(f.pipeline.run().await, DeliveryOutcome::Queued);
    // The flag is committed before the runtime ever shows up.
    assert!(f.store.delivered());

    let mut rx = ready_runtime(&f.gate);
    let event = expect_event(&mut rx).await;
    assert_eq!(event.payload(), "utm_source=test&utm_campaign=launch");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn scenario_c_service_unavailable_leaves_flag_clear() {
    let dir = tempdir().expect("tempdir");
    let f = fixture(dir.path(), Behavior::Refuse(ResponseCode::ServiceUnavailable));
    let mut rx = ready_runtime(&f.gate);

    assert_eq!(
        f.pipeline.run().await,
        DeliveryOutcome::Failed(FailureReason::Refused(ResponseCode::ServiceUnavailable))
    );
    assert!(rx.try_recv().is_err());
    assert!(!f.store.delivered());
}

#[tokio::test]
async fn scenario_d_durable_flag_gates_nothing() {
    let dir = tempdir().expect("tempdir");

    // A previous install attempt left the durable flag set.
    FlagStore::open(dir.path(), NAMESPACE).mark_delivered();

    let f = fixture(dir.path(), Behavior::Deliver("utm_source=test"));
    let mut rx = ready_runtime(&f.gate);

    // The connection is still attempted and the emission still happens:
    // only the in-process attempt guard gates delivery.
    assert_eq!(f.pipeline.run().await, DeliveryOutcome::Delivered);
    assert_eq!(f.service.connect_count(), 1);
    assert_eq!(expect_event(&mut rx).await.payload(), "utm_source=test");
}

#[tokio::test]
async fn repeated_runs_emit_at_most_once() {
    let dir = tempdir().expect("tempdir");
    let f = fixture(dir.path(), Behavior::Deliver("utm_source=test"));
    let mut rx = ready_runtime(&f.gate);

    assert_eq!(f.pipeline.run().await, DeliveryOutcome::Delivered);
    // The flag is now true; a second run still connects but must not emit.
    assert_eq!(f.pipeline.run().await, DeliveryOutcome::AlreadyAttempted);
    assert_eq!(f.service.connect_count(), 2);

    assert_eq!(expect_event(&mut rx).await.payload(), "utm_source=test");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn concurrent_runs_emit_at_most_once() {
    let dir = tempdir().expect("tempdir");
    let f = fixture(dir.path(), Behavior::Deliver("utm_source=test"));
    let mut rx = ready_runtime(&f.gate);

    let (first, second) = tokio::join!(f.pipeline.run(), f.pipeline.run());
    let outcomes = [first, second];
    assert!(outcomes.contains(&DeliveryOutcome::Delivered));
    assert!(outcomes.contains(&DeliveryOutcome::AlreadyAttempted));

    assert_eq!(expect_event(&mut rx).await.payload(), "utm_source=test");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn fetch_failure_after_ok_status_still_marks_the_flag() {
    let dir = tempdir().expect("tempdir");
    let f = fixture(dir.path(), Behavior::FailFetch);
    let mut rx = ready_runtime(&f.gate);

    assert_eq!(
        f.pipeline.run().await,
        DeliveryOutcome::Failed(FailureReason::Fetch)
    );
    assert!(rx.try_recv().is_err());
    assert!(f.store.delivered());

    // The failed attempt consumed this install's one delivery.
    assert_eq!(f.pipeline.run().await, DeliveryOutcome::Failed(FailureReason::Fetch));
}

#[tokio::test]
async fn connect_failure_leaves_flag_clear() {
    let dir = tempdir().expect("tempdir");
    let f = fixture(dir.path(), Behavior::FailConnect);

    assert_eq!(
        f.pipeline.run().await,
        DeliveryOutcome::Failed(FailureReason::Connect)
    );
    assert!(!f.store.delivered());
}

#[tokio::test]
async fn disconnect_before_setup_leaves_flag_clear() {
    let dir = tempdir().expect("tempdir");
    let f = fixture(dir.path(), Behavior::DropBeforeSetup);

    assert_eq!(
        f.pipeline.run().await,
        DeliveryOutcome::Failed(FailureReason::Disconnected)
    );
    assert!(!f.store.delivered());
}

#[tokio::test]
async fn panic_during_fetch_is_contained_at_the_task_boundary() {
    let dir = tempdir().expect("tempdir");
    let f = fixture(dir.path(), Behavior::PanicOnFetch);

    let outcome = Arc::clone(&f.pipeline).spawn().await.expect("task joins");
    assert_eq!(outcome, DeliveryOutcome::Failed(FailureReason::Internal));
}

#[tokio::test]
async fn closed_event_channel_is_logged_and_still_marks_the_flag() {
    let dir = tempdir().expect("tempdir");
    let f = fixture(dir.path(), Behavior::Deliver("utm_source=test"));

    let (handle, rx) = RuntimeHandle::channel();
    f.gate.install(handle).expect("install");
    drop(rx);

    assert_eq!(f.pipeline.run().await, DeliveryOutcome::Delivered);
    assert!(f.store.delivered());
}
