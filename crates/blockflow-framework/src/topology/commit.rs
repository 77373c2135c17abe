use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::FrameworkError;
use crate::port::PortId;
use crate::topology::Topology;
use crate::topology::breaker::BreakerPair;
use crate::topology::flatten::{Link, flatten};
use crate::topology::flow::FlowInfo;
use crate::worker::messages::SubscriptionAction;
use crate::worker::{Worker, WorkerId};

/// One subscribe pair between two worker ports.
pub(crate) struct Segment {
    src: Worker,
    src_port: PortId,
    dst: Worker,
    dst_port: PortId,
}

impl Segment {
    pub(crate) fn new(src: &Worker, src_port: PortId, dst: &Worker, dst_port: PortId) -> Self {
        Self {
            src: src.clone(),
            src_port,
            dst: dst.clone(),
            dst_port,
        }
    }

    /// Subscribes both sides; the first is rolled back if the second fails.
    fn subscribe(&self) -> Result<(), FrameworkError> {
        let downstream = self.dst.subscriber(&self.dst_port);
        let upstream = self.src.subscriber(&self.src_port);
        let src_port = &self.src_port;
        let dst_port = &self.dst_port;
        self.src
            .subscribe(SubscriptionAction::SubscribeInput, src_port, downstream.clone())?;
        let Err(err) = self
            .dst
            .subscribe(SubscriptionAction::SubscribeOutput, dst_port, upstream)
        else {
            return Ok(());
        };
        let rollback = self
            .src
            .subscribe(SubscriptionAction::UnsubscribeInput, src_port, downstream);
        if let Err(rollback) = rollback {
            warn!(segment = %self, error = %rollback, "failed to roll back subscription");
        }
        Err(err)
    }

    /// Unsubscribes both sides, reporting the first failure.
    fn unsubscribe(&self) -> Result<(), FrameworkError> {
        let upstream = self.src.subscriber(&self.src_port);
        let downstream = self.dst.subscriber(&self.dst_port);
        let src_result = self.src.subscribe(
            SubscriptionAction::UnsubscribeInput,
            &self.src_port,
            downstream,
        );
        let dst_result = self.dst.subscribe(
            SubscriptionAction::UnsubscribeOutput,
            &self.dst_port,
            upstream,
        );
        src_result.and(dst_result)
    }

    fn unsubscribe_detached(&self) -> Result<(), FrameworkError> {
        let upstream = self.src.subscriber(&self.src_port);
        let downstream = self.dst.subscriber(&self.dst_port);
        let src_result = self.src.subscribe_detached(
            SubscriptionAction::UnsubscribeInput,
            &self.src_port,
            downstream,
        );
        let dst_result = self.dst.subscribe_detached(
            SubscriptionAction::UnsubscribeOutput,
            &self.dst_port,
            upstream,
        );
        src_result.and(dst_result)
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.src.name(),
            self.src_port,
            self.dst.name(),
            self.dst_port
        )
    }
}

/// A link whose subscriptions have all been acknowledged.
pub(crate) struct ActiveLink {
    link: Link,
    segments: Vec<Segment>,
    pub(crate) breakers: Option<BreakerPair>,
}

impl ActiveLink {
    fn establish(link: Link, config: &WorkerConfig) -> Result<Self, FrameworkError> {
        let breakers = if link.crosses_scope() {
            Some(BreakerPair::spawn(&link, config)?)
        } else {
            None
        };
        let segments = match &breakers {
            Some(pair) => pair.segments(&link),
            None => vec![Segment::new(
                &link.src,
                link.src_port.clone(),
                &link.dst,
                link.dst_port.clone(),
            )],
        };

        for (done, segment) in segments.iter().enumerate() {
            if let Err(err) = segment.subscribe() {
                for established in &segments[..done] {
                    if let Err(rollback) = established.unsubscribe() {
                        warn!(segment = %established, error = %rollback, "rollback failed");
                    }
                }
                if let Some(pair) = &breakers {
                    pair.shutdown();
                }
                return Err(err);
            }
        }
        Ok(Self {
            link,
            segments,
            breakers,
        })
    }

    fn release(&self) {
        for segment in &self.segments {
            if let Err(err) = segment.unsubscribe() {
                warn!(%segment, error = %err, "failed to unsubscribe segment");
            }
        }
    }

    /// Queues the unsubscribes without waiting for acknowledgements.
    fn detach(&self) {
        for segment in &self.segments {
            if let Err(err) = segment.unsubscribe_detached() {
                debug!(%segment, error = %err, "worker gone before detach");
            }
        }
    }

    fn workers(&self) -> impl Iterator<Item = &Worker> {
        self.segments
            .iter()
            .flat_map(|segment| [&segment.src, &segment.dst])
    }

    pub(crate) fn info(&self) -> FlowInfo {
        FlowInfo {
            src: self.link.src.name().to_string(),
            src_port: self.link.src_port.to_name(),
            dst: self.link.dst.name().to_string(),
            dst_port: self.link.dst_port.to_name(),
            crosses_scope: self.breakers.is_some(),
        }
    }
}

impl Topology {
    /// Applies declared flows to the live workers.
    ///
    /// Removed links are unsubscribed first, then new links are subscribed
    /// (through a breaker pair when they cross hierarchy levels). Workers
    /// that join the live set are activated, workers that leave it are
    /// deactivated, and breakers of removed links are shut down. The first
    /// error is returned after every step has been attempted.
    pub fn commit(&self) -> Result<(), FrameworkError> {
        let desired = flatten(self.scope(), self.flows());
        let config = &self.config().worker;
        let mut state = self.inner.state.lock();

        let stale: Vec<_> = state
            .active
            .keys()
            .filter(|key| !desired.contains_key(*key))
            .cloned()
            .collect();
        let mut retired = Vec::new();
        for key in stale {
            if let Some(active) = state.active.remove(&key) {
                active.release();
                debug!(flow = %active.info(), "link removed");
                retired.extend(active.breakers);
            }
        }

        let mut first_error = None;
        let mut added = 0usize;
        for (key, link) in desired {
            if state.active.contains_key(&key) {
                continue;
            }
            match ActiveLink::establish(link, config) {
                Ok(active) => {
                    debug!(flow = %active.info(), "link established");
                    state.active.insert(key, active);
                    added += 1;
                },
                Err(err) => {
                    warn!(topology = %self.scope(), error = %err, "failed to establish link");
                    first_error.get_or_insert(err);
                },
            }
        }

        let wanted: BTreeMap<WorkerId, Worker> = state
            .active
            .values()
            .flat_map(ActiveLink::workers)
            .map(|worker| (worker.id(), worker.clone()))
            .collect();
        for (id, worker) in &wanted {
            if state.running.contains_key(id) {
                continue;
            }
            if let Err(err) = worker.activate() {
                warn!(worker = worker.name(), error = %err, "failed to activate worker");
                first_error.get_or_insert(err);
            }
        }
        for (id, worker) in &state.running {
            if wanted.contains_key(id) {
                continue;
            }
            if let Err(err) = worker.deactivate() {
                warn!(worker = worker.name(), error = %err, "failed to deactivate worker");
            }
        }
        state.running = wanted;
        let links = state.active.len();
        drop(state);

        for pair in &retired {
            pair.shutdown();
        }
        info!(
            topology = %self.scope(),
            links,
            added,
            retired = retired.len(),
            "topology committed"
        );
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Releases links and workers of a topology that is going away.
pub(crate) fn teardown(
    active: impl Iterator<Item = ActiveLink>,
    running: impl Iterator<Item = Worker>,
) {
    let active: Vec<ActiveLink> = active.collect();
    for link in &active {
        link.detach();
    }
    for worker in running {
        if let Err(err) = worker.deactivate() {
            debug!(worker = worker.name(), error = %err, "deactivate during teardown failed");
        }
    }
    for pair in active.iter().filter_map(|link| link.breakers.as_ref()) {
        pair.shutdown();
    }
}
