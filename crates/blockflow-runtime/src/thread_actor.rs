use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tokio::sync::oneshot;

pub trait Actor: Send + 'static {}

impl<T> Actor for T where T: Send + 'static {}

pub trait Message: Send + 'static {
    type Response: Send + 'static;
}

pub struct ActorContext<A: Actor> {
    stop_requested: bool,
    rearm_requested: bool,
    self_ref: Option<ActorRef<A>>,
    _marker: PhantomData<fn() -> A>,
}

impl<A: Actor> ActorContext<A> {
    fn new() -> Self {
        Self {
            stop_requested: false,
            rearm_requested: false,
            self_ref: None,
            _marker: PhantomData,
        }
    }

    pub fn stop(&mut self) {
        self.stop_requested = true;
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Requests a [`Tick::tick`] pass right after the current message or tick.
    ///
    /// Only honored by actors started with [`spawn_ticking_actor_named`].
    pub fn rearm(&mut self) {
        self.rearm_requested = true;
    }

    pub fn is_rearm_requested(&self) -> bool {
        self.rearm_requested
    }

    pub fn actor_ref(&self) -> ActorRef<A> {
        self.self_ref
            .as_ref()
            .expect("actor_ref is only available while handling a message")
            .clone()
    }

    fn enter_message(&mut self, self_ref: ActorRef<A>) {
        self.self_ref = Some(self_ref);
    }

    fn leave_message(&mut self) {
        self.self_ref = None;
    }
}

pub trait Handler<M>: Actor + Sized
where
    M: Message,
{
    fn handle(&mut self, message: M, ctx: &mut ActorContext<Self>) -> M::Response;
}

/// Periodic work for actors driven by [`spawn_ticking_actor_named`].
///
/// A tick runs after the mailbox stays idle for the configured interval, or
/// after any message or tick that called [`ActorContext::rearm`]. No self
/// reference is available while ticking.
pub trait Tick: Actor + Sized {
    fn tick(&mut self, ctx: &mut ActorContext<Self>);
}

trait Envelope<A: Actor>: Send + 'static {
    fn handle(self: Box<Self>, actor: &mut A, ctx: &mut ActorContext<A>);
}

struct CastEnvelope<M, A>
where
    M: Message<Response = ()>,
    A: Handler<M>,
{
    message: M,
    self_ref: ActorRef<A>,
    _marker: PhantomData<fn() -> A>,
}

impl<M, A> Envelope<A> for CastEnvelope<M, A>
where
    M: Message<Response = ()>,
    A: Handler<M>,
{
    fn handle(self: Box<Self>, actor: &mut A, ctx: &mut ActorContext<A>) {
        ctx.enter_message(self.self_ref.clone());
        actor.handle(self.message, ctx);
        ctx.leave_message();
    }
}

struct TellEnvelope<M, A>
where
    M: Message,
    A: Handler<M>,
{
    message: M,
    self_ref: ActorRef<A>,
    _marker: PhantomData<fn() -> A>,
}

impl<M, A> Envelope<A> for TellEnvelope<M, A>
where
    M: Message,
    A: Handler<M>,
{
    fn handle(self: Box<Self>, actor: &mut A, ctx: &mut ActorContext<A>) {
        ctx.enter_message(self.self_ref.clone());
        let _ = actor.handle(self.message, ctx);
        ctx.leave_message();
    }
}

struct CallEnvelope<M, A>
where
    M: Message,
    A: Handler<M>,
{
    message: M,
    response_tx: oneshot::Sender<M::Response>,
    self_ref: ActorRef<A>,
    _marker: PhantomData<fn() -> A>,
}

impl<M, A> Envelope<A> for CallEnvelope<M, A>
where
    M: Message,
    A: Handler<M>,
{
    fn handle(self: Box<Self>, actor: &mut A, ctx: &mut ActorContext<A>) {
        ctx.enter_message(self.self_ref.clone());
        let response = actor.handle(self.message, ctx);
        ctx.leave_message();
        let _ = self.response_tx.send(response);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastError {
    MailboxClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallError {
    MailboxClosed,
    Timeout,
    ActorStopped,
}

pub struct ActorRef<A: Actor> {
    tx: Sender<Box<dyn Envelope<A>>>,
}

impl<A: Actor> Clone for ActorRef<A> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<A: Actor> ActorRef<A> {
    pub fn cast<M>(&self, message: M) -> Result<(), CastError>
    where
        M: Message<Response = ()>,
        A: Handler<M>,
    {
        let envelope: Box<dyn Envelope<A>> = Box::new(CastEnvelope::<M, A> {
            message,
            self_ref: self.clone(),
            _marker: PhantomData,
        });
        self.tx.send(envelope).map_err(|_| CastError::MailboxClosed)
    }

    /// Delivers a message that normally expects a reply, without a reply address.
    ///
    /// The handler runs as usual and its response is dropped.
    pub fn tell<M>(&self, message: M) -> Result<(), CastError>
    where
        M: Message,
        A: Handler<M>,
    {
        let envelope: Box<dyn Envelope<A>> = Box::new(TellEnvelope::<M, A> {
            message,
            self_ref: self.clone(),
            _marker: PhantomData,
        });
        self.tx.send(envelope).map_err(|_| CastError::MailboxClosed)
    }

    pub fn call<M>(&self, message: M, timeout: Duration) -> Result<M::Response, CallError>
    where
        M: Message,
        A: Handler<M>,
    {
        crate::block_on(self.call_async(message, timeout))
    }

    pub async fn call_async<M>(
        &self,
        message: M,
        timeout: Duration,
    ) -> Result<M::Response, CallError>
    where
        M: Message,
        A: Handler<M>,
    {
        let response_rx = self.send_call(message)?;
        match tokio::time::timeout(timeout, response_rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(CallError::ActorStopped),
            Err(_) => Err(CallError::Timeout),
        }
    }

    fn send_call<M>(&self, message: M) -> Result<oneshot::Receiver<M::Response>, CallError>
    where
        M: Message,
        A: Handler<M>,
    {
        let (response_tx, response_rx) = oneshot::channel();
        let envelope: Box<dyn Envelope<A>> = Box::new(CallEnvelope::<M, A> {
            message,
            response_tx,
            self_ref: self.clone(),
            _marker: PhantomData,
        });
        self.tx
            .send(envelope)
            .map_err(|_| CallError::MailboxClosed)?;
        Ok(response_rx)
    }
}

pub fn spawn_actor<A: Actor>(actor: A) -> std::io::Result<(ActorRef<A>, JoinHandle<()>)> {
    spawn_actor_named(actor, "blockflow-thread-actor")
}

pub fn spawn_actor_named<A: Actor>(
    actor: A,
    thread_name: impl Into<String>,
) -> std::io::Result<(ActorRef<A>, JoinHandle<()>)> {
    let (tx, rx) = crossbeam_channel::unbounded::<Box<dyn Envelope<A>>>();
    let actor_ref = ActorRef { tx };
    let join = thread::Builder::new()
        .name(thread_name.into())
        .spawn(move || run_actor_loop(actor, rx))?;
    Ok((actor_ref, join))
}

/// Spawns an actor that also ticks when idle for `idle_interval` or when rearmed.
pub fn spawn_ticking_actor_named<A: Tick>(
    actor: A,
    thread_name: impl Into<String>,
    idle_interval: Duration,
) -> std::io::Result<(ActorRef<A>, JoinHandle<()>)> {
    let (tx, rx) = crossbeam_channel::unbounded::<Box<dyn Envelope<A>>>();
    let actor_ref = ActorRef { tx };
    let join = thread::Builder::new()
        .name(thread_name.into())
        .spawn(move || run_ticking_actor_loop(actor, rx, idle_interval))?;
    Ok((actor_ref, join))
}

fn run_actor_loop<A: Actor>(mut actor: A, rx: Receiver<Box<dyn Envelope<A>>>) {
    let mut ctx = ActorContext::<A>::new();
    while let Ok(envelope) = rx.recv() {
        let result = catch_unwind(AssertUnwindSafe(|| {
            envelope.handle(&mut actor, &mut ctx);
        }));
        if result.is_err() {
            break;
        }
        if ctx.is_stop_requested() {
            break;
        }
    }
}

fn run_ticking_actor_loop<A: Tick>(
    mut actor: A,
    rx: Receiver<Box<dyn Envelope<A>>>,
    idle_interval: Duration,
) {
    let mut ctx = ActorContext::<A>::new();
    loop {
        // One message and at most one tick per turn keeps a self-rearming
        // actor responsive to its mailbox.
        let envelope = if ctx.is_rearm_requested() {
            match rx.try_recv() {
                Ok(envelope) => Some(envelope),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break,
            }
        } else {
            match rx.recv_timeout(idle_interval) {
                Ok(envelope) => Some(envelope),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        };
        let idle = envelope.is_none();
        let result = catch_unwind(AssertUnwindSafe(|| {
            if let Some(envelope) = envelope {
                envelope.handle(&mut actor, &mut ctx);
            }
            if idle || ctx.is_rearm_requested() {
                ctx.rearm_requested = false;
                actor.tick(&mut ctx);
            }
        }));
        if result.is_err() {
            break;
        }
        if ctx.is_stop_requested() {
            break;
        }
    }
}
