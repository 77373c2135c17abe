use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use blockflow_framework::logging::init_tracing;
use blockflow_framework::{FrameworkError, Worker};

mod common;

use common::{
    CountingSource, IDLE, RecordingSink, SinkLog, TEST_TIMEOUT, shutdown_all, topology,
    wait_until, worker_config,
};

#[test]
fn source_to_sink_quiesces_with_matching_byte_counts() -> Result<()> {
    init_tracing();
    let log = Arc::new(SinkLog::default());
    let source = Worker::spawn("source", CountingSource::new(10_000), &worker_config())?;
    let sink = Worker::spawn("sink", RecordingSink::new(Arc::clone(&log)), &worker_config())?;

    let topology = topology();
    topology.connect(&source, 0, &sink, 0)?;
    topology.commit()?;
    assert_eq!(topology.breaker_count(), 0);

    assert!(wait_until(|| log.elements() == 10_000));
    assert!(topology.wait_inactive(IDLE, Duration::from_secs(1))?);
    let produced = source.stats()?.bytes_produced;
    let consumed = sink.stats()?.bytes_consumed;
    assert_eq!(produced, 40_000);
    assert_eq!(consumed, produced);
    assert_eq!(log.out_of_order.load(Ordering::Relaxed), 0);

    topology.disconnect_all();
    topology.commit()?;
    shutdown_all(&[&source, &sink])?;
    Ok(())
}

#[test]
fn flows_into_a_nested_topology_get_a_breaker_pair() -> Result<()> {
    init_tracing();
    let log = Arc::new(SinkLog::default());
    let source = Worker::spawn("source", CountingSource::new(5_000), &worker_config())?;
    let sink = Worker::spawn("sink", RecordingSink::new(Arc::clone(&log)), &worker_config())?;

    let inner = topology();
    inner.connect(&inner, "in", &sink, 0)?;
    let outer = topology();
    outer.connect(&source, 0, &inner, "in")?;
    outer.commit()?;

    assert_eq!(outer.breaker_count(), 2);
    let flows = outer.active_flows();
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].src, "source");
    assert_eq!(flows[0].dst, "sink");
    assert!(flows[0].crosses_scope);
    // The source feeds the egress breaker, never the sink directly.
    let subscribers = source.output(0)?.subscribers;
    assert_eq!(subscribers.len(), 1);
    assert!(subscribers[0].contains("egress"), "{subscribers:?}");

    assert!(wait_until(|| log.elements() == 5_000));
    assert!(outer.wait_inactive(IDLE, TEST_TIMEOUT)?);
    assert_eq!(sink.stats()?.bytes_consumed, source.stats()?.bytes_produced);
    assert_eq!(log.out_of_order.load(Ordering::Relaxed), 0);

    outer.disconnect_all();
    outer.commit()?;
    assert_eq!(outer.breaker_count(), 0);
    assert!(outer.active_flows().is_empty());
    assert!(source.output(0)?.subscribers.is_empty());
    shutdown_all(&[&source, &sink])?;
    Ok(())
}

#[test]
fn disconnect_all_deactivates_workers_on_commit() -> Result<()> {
    init_tracing();
    let log = Arc::new(SinkLog::default());
    let source = Worker::spawn("source", CountingSource::new(u64::MAX), &worker_config())?;
    let sink = Worker::spawn("sink", RecordingSink::new(Arc::clone(&log)), &worker_config())?;

    let topology = topology();
    topology.connect(&source, 0, &sink, 0)?;
    topology.commit()?;
    assert!(wait_until(|| log.elements() > 0));

    topology.disconnect_all();
    assert_eq!(topology.active_flows().len(), 1, "edits wait for commit");
    topology.commit()?;
    assert!(topology.active_flows().is_empty());
    assert!(sink.input(0)?.subscribers.is_empty());

    let calls = source.stats()?.num_work_calls;
    thread::sleep(Duration::from_millis(50));
    assert_eq!(source.stats()?.num_work_calls, calls);

    shutdown_all(&[&source, &sink])?;
    Ok(())
}

#[test]
fn dropping_a_committed_topology_detaches_its_workers() -> Result<()> {
    init_tracing();
    let log = Arc::new(SinkLog::default());
    let source = Worker::spawn("source", CountingSource::new(u64::MAX), &worker_config())?;
    let sink = Worker::spawn("sink", RecordingSink::new(Arc::clone(&log)), &worker_config())?;

    let inner = topology();
    inner.connect(&inner, "in", &sink, 0)?;
    let outer = topology();
    outer.connect(&source, 0, &inner, "in")?;
    outer.commit()?;
    assert!(wait_until(|| log.elements() > 0));
    assert_eq!(source.output(0)?.subscribers.len(), 1);

    drop(outer);
    drop(inner);
    assert!(source.output(0)?.subscribers.is_empty());
    assert!(sink.input(0)?.subscribers.is_empty());
    let calls = source.stats()?.num_work_calls;
    thread::sleep(Duration::from_millis(50));
    assert_eq!(source.stats()?.num_work_calls, calls);

    shutdown_all(&[&source, &sink])?;
    Ok(())
}

#[test]
fn connect_validates_ports_and_rejects_duplicates() -> Result<()> {
    init_tracing();
    let log = Arc::new(SinkLog::default());
    let source = Worker::spawn("source", CountingSource::new(1), &worker_config())?;
    let sink = Worker::spawn("sink", RecordingSink::new(log), &worker_config())?;
    let topology = topology();

    let err = topology
        .connect(&source, "nope", &sink, 0)
        .expect_err("unknown output port");
    assert!(matches!(err, FrameworkError::IncompatibleEndpoints { .. }), "{err}");
    let err = topology
        .connect(&sink, 0, &source, 0)
        .expect_err("ports used in the wrong direction");
    assert!(matches!(err, FrameworkError::IncompatibleEndpoints { .. }), "{err}");
    let err = topology
        .connect(&topology, "in", &topology, "out")
        .expect_err("boundary to boundary");
    assert!(matches!(err, FrameworkError::IncompatibleEndpoints { .. }), "{err}");

    // Index 1 does not exist yet but is allocated on subscribe.
    topology.connect(&source, 1, &sink, 0)?;
    let err = topology
        .connect(&source, 1, &sink, 0)
        .expect_err("duplicate flow");
    assert!(matches!(err, FrameworkError::FlowExists(_)), "{err}");
    topology.disconnect(&source, 1, &sink, 0)?;
    let err = topology
        .disconnect(&source, 1, &sink, 0)
        .expect_err("flow already removed");
    assert!(matches!(err, FrameworkError::FlowMissing(_)), "{err}");

    shutdown_all(&[&source, &sink])?;
    Ok(())
}
