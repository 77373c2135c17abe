use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use blockflow_buffer::{BufferChunk, BufferManagerArgs, PoolId, SharedBuffer};
use blockflow_runtime::thread_actor::{ActorRef, spawn_ticking_actor_named};

use crate::block::{Block, CallArgs, PortSetup, WorkContext};
use crate::config::WorkerConfig;
use crate::dtype::DType;
use crate::error::{BlockError, ProtocolError};
use crate::label::Label;
use crate::payload::Payload;
use crate::port::{InputPort, OutputPort, PortDirection, PortId, PortSubscriber, PortTable};
use crate::worker::WorkerId;
use crate::worker::actor::WorkerActor;
use crate::worker::messages::{
    ActivateMessage, BufferReturnMessage, CallMessage, DeactivateMessage, DeliverBufferMessage,
    DeliverLabelMessage, PortInfoMessage, SetupPortsMessage, ShutdownMessage, StatsMessage,
    SubscribeMessage, SubscriptionAction,
};
use crate::worker::stats::WorkerStats;

const TEST_TIMEOUT: Duration = Duration::from_millis(500);

fn test_config() -> WorkerConfig {
    WorkerConfig {
        call_timeout: TEST_TIMEOUT,
        ..WorkerConfig::default()
    }
}

struct TestWorker {
    id: WorkerId,
    name: Arc<str>,
    actor_ref: ActorRef<WorkerActor>,
    join: JoinHandle<()>,
}

impl TestWorker {
    fn spawn(name: &str, block: impl Block) -> Self {
        let id = WorkerId::next();
        let name: Arc<str> = Arc::from(name);
        let actor = WorkerActor::new(id, Arc::clone(&name), Box::new(block), test_config());
        let (actor_ref, join) = spawn_ticking_actor_named(
            actor,
            format!("blockflow-worker-test-{name}"),
            Duration::from_millis(1),
        )
        .expect("failed to spawn worker actor");
        actor_ref
            .call(SetupPortsMessage, TEST_TIMEOUT)
            .expect("failed to call setup ports")
            .expect("failed to set up ports");
        Self {
            id,
            name,
            actor_ref,
            join,
        }
    }

    fn subscriber(&self, port: impl Into<PortId>) -> PortSubscriber {
        PortSubscriber {
            worker: self.id,
            worker_name: Arc::clone(&self.name),
            port: port.into().to_name(),
            actor: self.actor_ref.clone(),
        }
    }

    fn subscribe(
        &self,
        action: SubscriptionAction,
        port: impl Into<PortId>,
        subscriber: PortSubscriber,
    ) -> Result<(), ProtocolError> {
        self.actor_ref
            .call(
                SubscribeMessage {
                    action,
                    port: port.into(),
                    subscriber,
                },
                TEST_TIMEOUT,
            )
            .expect("failed to call subscribe")
    }

    fn subscribers(&self, direction: PortDirection, port: impl Into<PortId>) -> Vec<String> {
        let infos = self
            .actor_ref
            .call(
                PortInfoMessage {
                    direction,
                    port: Some(port.into()),
                },
                TEST_TIMEOUT,
            )
            .expect("failed to call port info")
            .expect("port should exist");
        infos[0].subscribers.clone()
    }

    fn activate(&self) -> Result<(), String> {
        self.actor_ref
            .call(ActivateMessage, TEST_TIMEOUT)
            .expect("failed to call activate")
    }

    fn deactivate(&self) -> Result<(), String> {
        self.actor_ref
            .call(DeactivateMessage, TEST_TIMEOUT)
            .expect("failed to call deactivate")
    }

    fn deliver_bytes(&self, bytes: &[u8]) {
        let chunk = BufferChunk::from(SharedBuffer::copy_from_slice(bytes).expect("copy bytes"));
        self.actor_ref
            .cast(DeliverBufferMessage {
                port: PortId::Index(0),
                chunk,
            })
            .expect("failed to deliver buffer");
    }

    fn deliver_label(&self, label: Label) {
        self.actor_ref
            .cast(DeliverLabelMessage {
                port: PortId::Index(0),
                label,
            })
            .expect("failed to deliver label");
    }

    fn stats(&self) -> WorkerStats {
        self.actor_ref
            .call(StatsMessage, TEST_TIMEOUT)
            .expect("failed to call stats")
    }
}

fn shutdown_and_join(workers: Vec<TestWorker>) {
    for worker in &workers {
        worker
            .actor_ref
            .call(ShutdownMessage, TEST_TIMEOUT)
            .expect("failed to call shutdown");
    }
    for worker in workers {
        drop(worker.actor_ref);
        worker.join.join().expect("failed to join worker thread");
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TEST_TIMEOUT * 4;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

/// Fills every pool buffer it is offered.
struct FillSource;

impl Block for FillSource {
    fn setup(&mut self, ports: &mut PortSetup) {
        ports.output(0, DType::byte()).buffers(BufferManagerArgs {
            num_buffers: 4,
            buffer_size: 1024,
            node_affinity: None,
        });
    }

    fn work(&mut self, ctx: &mut WorkContext<'_>) -> Result<(), BlockError> {
        let Some(output) = ctx.output(0) else {
            return Ok(());
        };
        let elements = output.elements();
        output.produce(elements);
        Ok(())
    }
}

struct CountingSink {
    consumed: Arc<AtomicU64>,
}

impl Block for CountingSink {
    fn setup(&mut self, ports: &mut PortSetup) {
        ports.input(0, DType::byte());
    }

    fn work(&mut self, ctx: &mut WorkContext<'_>) -> Result<(), BlockError> {
        let Some(input) = ctx.input(0) else {
            return Ok(());
        };
        let elements = input.elements();
        input.consume(elements);
        self.consumed.fetch_add(elements as u64, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum LabelHook {
    Forward,
    Reject,
    Panic,
}

/// Byte sink whose deactivate and label hooks can be made to fail.
struct FragileSink {
    consumed: Arc<AtomicU64>,
    labels: LabelHook,
    deactivate_error: Option<&'static str>,
}

impl FragileSink {
    fn new(consumed: &Arc<AtomicU64>) -> Self {
        Self {
            consumed: Arc::clone(consumed),
            labels: LabelHook::Forward,
            deactivate_error: None,
        }
    }
}

impl Block for FragileSink {
    fn setup(&mut self, ports: &mut PortSetup) {
        ports.input(0, DType::byte());
    }

    fn work(&mut self, ctx: &mut WorkContext<'_>) -> Result<(), BlockError> {
        let Some(input) = ctx.input(0) else {
            return Ok(());
        };
        let elements = input.elements();
        input.consume(elements);
        self.consumed.fetch_add(elements as u64, Ordering::Relaxed);
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), BlockError> {
        match self.deactivate_error {
            Some(message) => Err(message.into()),
            None => Ok(()),
        }
    }

    fn propagate_labels(
        &mut self,
        _input: &InputPort,
        _labels: &[Label],
        _outputs: &mut PortTable<OutputPort>,
    ) -> Result<(), BlockError> {
        match self.labels {
            LabelHook::Forward => Ok(()),
            LabelHook::Reject => Err("label rejected".into()),
            LabelHook::Panic => panic!("label hook exploded"),
        }
    }
}

struct GainStage {
    gain: f32,
    activate_error: Option<&'static str>,
}

impl GainStage {
    fn new() -> Self {
        Self {
            gain: 1.0,
            activate_error: None,
        }
    }
}

impl Block for GainStage {
    fn setup(&mut self, ports: &mut PortSetup) {
        ports.input(0, DType::of::<f32>());
        ports.output(0, DType::of::<f32>());
    }

    fn work(&mut self, _ctx: &mut WorkContext<'_>) -> Result<(), BlockError> {
        Ok(())
    }

    fn activate(&mut self) -> Result<(), BlockError> {
        match self.activate_error {
            Some(message) => Err(message.into()),
            None => Ok(()),
        }
    }

    fn call(&mut self, name: &str, args: CallArgs) -> Result<Payload, BlockError> {
        match name {
            "setGain" => {
                args.expect_len(1)?;
                self.gain = *args.get::<f32>(0)?;
                Ok(Payload::unit())
            },
            "getGain" => Ok(Payload::new(self.gain)),
            "explode" => panic!("gain stage exploded"),
            _ => Err(BlockError::UnknownCall(name.to_string())),
        }
    }
}

#[test]
fn duplicate_and_missing_subscriptions_leave_ports_unchanged() {
    let gain = TestWorker::spawn("gain", GainStage::new());
    let sink = TestWorker::spawn(
        "sink",
        CountingSink {
            consumed: Arc::new(AtomicU64::new(0)),
        },
    );

    gain.subscribe(SubscriptionAction::SubscribeInput, 0, sink.subscriber(0))
        .expect("first subscription should succeed");
    let err = gain
        .subscribe(SubscriptionAction::SubscribeInput, 0, sink.subscriber(0))
        .expect_err("duplicate subscription should fail");
    assert!(matches!(err, ProtocolError::DuplicateSubscription { .. }));
    assert_eq!(gain.subscribers(PortDirection::Output, 0), vec!["sink:0".to_string()]);

    gain.subscribe(SubscriptionAction::UnsubscribeInput, 0, sink.subscriber(0))
        .expect("unsubscribe should succeed");
    let err = gain
        .subscribe(SubscriptionAction::UnsubscribeInput, 0, sink.subscriber(0))
        .expect_err("second unsubscribe should fail");
    assert!(matches!(err, ProtocolError::MissingSubscription { .. }));
    assert!(gain.subscribers(PortDirection::Output, 0).is_empty());

    shutdown_and_join(vec![gain, sink]);
}

#[test]
fn subscribing_an_indexed_port_allocates_it_lazily() {
    let gain = TestWorker::spawn("gain", GainStage::new());
    let sink = TestWorker::spawn(
        "sink",
        CountingSink {
            consumed: Arc::new(AtomicU64::new(0)),
        },
    );

    gain.subscribe(SubscriptionAction::SubscribeInput, 2, sink.subscriber(0))
        .expect("indexed subscription should allocate the port");
    let infos = gain
        .actor_ref
        .call(
            PortInfoMessage {
                direction: PortDirection::Output,
                port: None,
            },
            TEST_TIMEOUT,
        )
        .expect("failed to call port info")
        .expect("listing ports should succeed");
    let names: Vec<&str> = infos.iter().map(|info| info.name.as_str()).collect();
    assert_eq!(names, vec!["0", "2"]);
    assert_eq!(infos[1].dtype, DType::of::<f32>());
    assert_eq!(infos[1].index, Some(2));

    let err = gain
        .subscribe(SubscriptionAction::SubscribeOutput, "ctrl", sink.subscriber(0))
        .expect_err("named ports are never allocated on demand");
    assert_eq!(
        err,
        ProtocolError::NoSuchPort {
            direction: PortDirection::Input,
            port: "ctrl".to_string(),
        }
    );

    shutdown_and_join(vec![gain, sink]);
}

#[test]
fn shutdown_is_idempotent_and_blocks_activation() {
    let gain = TestWorker::spawn("gain", GainStage::new());

    gain.actor_ref
        .call(ShutdownMessage, TEST_TIMEOUT)
        .expect("failed to call first shutdown");
    gain.actor_ref
        .call(ShutdownMessage, TEST_TIMEOUT)
        .expect("failed to call second shutdown");

    let err = gain.activate().expect_err("activate after shutdown should fail");
    assert_eq!(err, "worker is shut down");
    let infos = gain
        .actor_ref
        .call(
            PortInfoMessage {
                direction: PortDirection::Input,
                port: None,
            },
            TEST_TIMEOUT,
        )
        .expect("failed to call port info")
        .expect("listing ports should succeed");
    assert!(infos.is_empty());

    shutdown_and_join(vec![gain]);
}

#[test]
fn calls_dispatch_by_name_and_wrap_failures() {
    let gain = TestWorker::spawn("gain", GainStage::new());
    let call = |name: &str, args: Vec<Payload>| {
        gain.actor_ref
            .call(
                CallMessage {
                    name: name.to_string(),
                    args,
                },
                TEST_TIMEOUT,
            )
            .expect("failed to call block")
    };

    call("setGain", vec![Payload::new(0.25f32)]).expect("setGain should succeed");
    let value = call("getGain", Vec::new()).expect("getGain should succeed");
    assert_eq!(value.downcast_ref::<f32>(), Some(&0.25));

    let err = call("nope", Vec::new()).expect_err("unknown call should fail");
    assert_eq!(err.to_string(), "Block::call(nope): no call named 'nope'");

    let err = call("setGain", vec![Payload::new("loud")]).expect_err("wrong argument type");
    assert_eq!(err.call, "setGain");
    assert!(err.message.contains("argument 0"), "{}", err.message);

    let err = call("explode", Vec::new()).expect_err("panicking call should fail");
    assert_eq!(err.message, "gain stage exploded");
    call("getGain", Vec::new()).expect("worker should survive a panicking call");

    shutdown_and_join(vec![gain]);
}

#[test]
fn failed_activate_reports_text_and_keeps_worker_active() {
    let source = TestWorker::spawn("source", FillSource);
    let gain = TestWorker::spawn(
        "gain",
        GainStage {
            gain: 1.0,
            activate_error: Some("device busy"),
        },
    );

    let err = gain.activate().expect_err("activate hook should fail");
    assert_eq!(err, "device busy");
    // Still marked active: one f32 of input is enough to schedule work.
    gain.deliver_bytes(&1.0f32.to_ne_bytes());
    assert!(wait_until(|| gain.stats().num_work_calls > 0));
    gain.deactivate().expect("deactivate should succeed");

    source.activate().expect("source should activate");
    assert!(wait_until(|| source.stats().num_work_calls > 0));

    shutdown_and_join(vec![source, gain]);
}

#[test]
fn full_pool_stalls_producer_until_consumer_returns_buffers() {
    let consumed = Arc::new(AtomicU64::new(0));
    let source = TestWorker::spawn("source", FillSource);
    let sink = TestWorker::spawn(
        "sink",
        CountingSink {
            consumed: Arc::clone(&consumed),
        },
    );
    source
        .subscribe(SubscriptionAction::SubscribeInput, 0, sink.subscriber(0))
        .expect("source output subscription");
    sink.subscribe(SubscriptionAction::SubscribeOutput, 0, source.subscriber(0))
        .expect("sink input subscription");

    source.activate().expect("source should activate");
    assert!(wait_until(|| source.stats().bytes_produced == 4 * 1024));
    thread::sleep(Duration::from_millis(50));
    let stats = source.stats();
    assert_eq!(stats.num_work_calls, 4);
    assert_eq!(stats.bytes_produced, 4 * 1024);
    assert_eq!(consumed.load(Ordering::Relaxed), 0);

    sink.activate().expect("sink should activate");
    assert!(wait_until(|| consumed.load(Ordering::Relaxed) > 4 * 1024));
    assert!(source.stats().num_work_calls > 4);

    shutdown_and_join(vec![source, sink]);
}

#[test]
fn failed_deactivate_still_stops_scheduling() {
    let consumed = Arc::new(AtomicU64::new(0));
    let sink = TestWorker::spawn(
        "sink",
        FragileSink {
            deactivate_error: Some("flush failed"),
            ..FragileSink::new(&consumed)
        },
    );

    sink.activate().expect("sink should activate");
    sink.deliver_bytes(b"ab");
    assert!(wait_until(|| consumed.load(Ordering::Relaxed) == 2));

    let err = sink.deactivate().expect_err("deactivate hook should fail");
    assert_eq!(err, "flush failed");
    let calls = sink.stats().num_work_calls;
    sink.deliver_bytes(b"cdef");
    thread::sleep(Duration::from_millis(50));
    assert_eq!(consumed.load(Ordering::Relaxed), 2);
    assert_eq!(sink.stats().num_work_calls, calls);

    sink.activate().expect("sink should activate again");
    assert!(wait_until(|| consumed.load(Ordering::Relaxed) == 6));

    shutdown_and_join(vec![sink]);
}

#[test]
fn failing_label_hook_does_not_stop_the_worker() {
    for hook in [LabelHook::Reject, LabelHook::Panic] {
        let consumed = Arc::new(AtomicU64::new(0));
        let sink = TestWorker::spawn(
            "sink",
            FragileSink {
                labels: hook,
                ..FragileSink::new(&consumed)
            },
        );
        sink.activate().expect("sink should activate");

        sink.deliver_label(Label::new("mark", Payload::unit(), 0));
        sink.deliver_bytes(b"abcd");
        assert!(wait_until(|| consumed.load(Ordering::Relaxed) == 4));

        sink.deliver_label(Label::new("mark", Payload::unit(), 5));
        sink.deliver_bytes(b"efgh");
        assert!(wait_until(|| consumed.load(Ordering::Relaxed) == 8));
        assert_eq!(sink.stats().bytes_consumed, 8);

        shutdown_and_join(vec![sink]);
    }
}

#[test]
fn buffer_returned_to_an_unknown_pool_is_dropped() {
    let consumed = Arc::new(AtomicU64::new(0));
    let source = TestWorker::spawn("source", FillSource);
    let sink = TestWorker::spawn("sink", FragileSink::new(&consumed));
    source
        .subscribe(SubscriptionAction::SubscribeInput, 0, sink.subscriber(0))
        .expect("source output subscription");
    sink.subscribe(SubscriptionAction::SubscribeOutput, 0, source.subscriber(0))
        .expect("sink input subscription");

    source.activate().expect("source should activate");
    assert!(wait_until(|| source.stats().bytes_produced == 4 * 1024));

    source
        .actor_ref
        .cast(BufferReturnMessage {
            pool: PoolId::next(),
            buffer: SharedBuffer::make(1024, None).expect("make buffer"),
        })
        .expect("failed to return buffer");
    thread::sleep(Duration::from_millis(50));
    // The stray buffer never refills the stalled pool.
    assert_eq!(source.stats().num_work_calls, 4);

    sink.activate().expect("sink should activate");
    assert!(wait_until(|| consumed.load(Ordering::Relaxed) > 4 * 1024));

    shutdown_and_join(vec![source, sink]);
}

#[test]
fn queries_recheck_readiness_without_running_a_stalled_block() {
    let consumed = Arc::new(AtomicU64::new(0));
    let source = TestWorker::spawn("source", FillSource);
    let sink = TestWorker::spawn("sink", FragileSink::new(&consumed));
    source
        .subscribe(SubscriptionAction::SubscribeInput, 0, sink.subscriber(0))
        .expect("source output subscription");
    sink.subscribe(SubscriptionAction::SubscribeOutput, 0, source.subscriber(0))
        .expect("sink input subscription");

    source.activate().expect("source should activate");
    assert!(wait_until(|| source.stats().num_work_calls == 4));
    for _ in 0..20 {
        assert_eq!(source.subscribers(PortDirection::Output, 0), vec!["sink:0".to_string()]);
        assert_eq!(source.stats().num_work_calls, 4);
    }

    sink.activate().expect("sink should activate");
    assert!(wait_until(|| source.stats().num_work_calls > 4));

    shutdown_and_join(vec![source, sink]);
}
