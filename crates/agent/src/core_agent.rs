//! Running agents and streaming their events.
//!
//! An [`Agent`] does its work in [`Agent::run`] and reports progress through
//! an [`AgentContext`]. [`run_stream`] runs it on its own task and hands the
//! caller an [`EventStream`] that yields every event in order, ending with
//! exactly one `result`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use lingoclaw_core::error::AgentError;
use lingoclaw_core::message::Message;
use lingoclaw_core::{AgentEvent, Error, Session};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::loop_runner::{LoopOutcome, ToolLoop};

/// A unit of agent work with a typed input and result payload.
#[async_trait]
pub trait Agent: Send + Sync + 'static {
    type Input: DeserializeOwned + Send + 'static;
    type Output: Serialize + Send + 'static;

    fn name(&self) -> &'static str;

    /// Do the work. The returned value becomes the run's `result` event.
    async fn run(
        &self,
        ctx: &AgentContext<Self::Output>,
        input: Self::Input,
    ) -> Result<Self::Output, Error>;
}

/// Per-run handle an agent uses to report progress.
pub struct AgentContext<R> {
    tx: mpsc::UnboundedSender<AgentEvent<R>>,
    session: Session,
}

impl<R: Send + 'static> AgentContext<R> {
    pub fn new(session: Session) -> (Self, mpsc::UnboundedReceiver<AgentEvent<R>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, session }, rx)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Enqueue an event. Never blocks.
    pub fn event(&self, event: AgentEvent<R>) {
        if let Err(e) = self.tx.send(event) {
            // The reader is gone and this task is about to be aborted.
            debug!(kind = e.0.kind(), "Dropping event, stream closed");
        }
    }

    pub fn message(&self, emoji: &str, message: impl Into<String>) {
        self.event(AgentEvent::message(emoji, message));
    }

    pub fn thinking(&self) {
        self.event(AgentEvent::thinking());
    }

    pub(crate) fn finish(&self, output: R) {
        self.event(AgentEvent::Result(output));
    }

    /// Run `tool_loop` on the current task, forwarding its progress as events.
    pub async fn run_stream_events(
        &self,
        tool_loop: &ToolLoop,
        messages: Vec<Message>,
    ) -> Result<LoopOutcome, Error> {
        tool_loop
            .run(messages, &mut |native| {
                if let Some(event) = native.to_agent_event() {
                    self.event(event);
                }
            })
            .await
    }
}

/// Run `agent` on a new task and stream its events.
pub fn run_stream<A: Agent>(agent: Arc<A>, session: Session, input: A::Input) -> EventStream<A::Output> {
    let (ctx, rx) = AgentContext::new(session);
    let name = agent.name();
    let handle = tokio::spawn(async move {
        let output = agent.run(&ctx, input).await?;
        ctx.finish(output);
        Ok::<(), Error>(())
    });
    debug!(agent = name, "Agent run started");
    EventStream {
        rx,
        handle: Some(handle),
        state: State::Streaming,
    }
}

enum State {
    Streaming,
    /// The result was delivered; only the task outcome is left.
    Joining,
    /// The queue closed without a result.
    Failing,
    Done,
}

/// Events of one run, in order, ending with `result`.
///
/// After the result the producer task is joined; if it failed, the failure
/// is yielded once as `Err`. If the task ends without producing a result its
/// error is yielded instead. Dropping the stream aborts the task.
pub struct EventStream<R> {
    rx: mpsc::UnboundedReceiver<AgentEvent<R>>,
    handle: Option<JoinHandle<Result<(), Error>>>,
    state: State,
}

impl<R> EventStream<R> {
    fn poll_task(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        let Some(handle) = self.handle.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let joined = std::task::ready!(Pin::new(handle).poll(cx));
        self.handle = None;
        Poll::Ready(match joined {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Agent task did not finish");
                Err(AgentError::TaskFailed(e.to_string()).into())
            }
        })
    }
}

impl<R> Stream for EventStream<R> {
    type Item = Result<AgentEvent<R>, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match this.state {
                State::Streaming => match std::task::ready!(this.rx.poll_recv(cx)) {
                    Some(event) => {
                        if event.is_result() {
                            this.state = State::Joining;
                        }
                        return Poll::Ready(Some(Ok(event)));
                    }
                    None => this.state = State::Failing,
                },
                State::Joining => {
                    let joined = std::task::ready!(this.poll_task(cx));
                    this.state = State::Done;
                    if let Err(e) = joined {
                        return Poll::Ready(Some(Err(e)));
                    }
                }
                State::Failing => {
                    let joined = std::task::ready!(this.poll_task(cx));
                    this.state = State::Done;
                    let err = joined.err().unwrap_or_else(|| AgentError::NoResult.into());
                    return Poll::Ready(Some(Err(err)));
                }
                State::Done => return Poll::Ready(None),
            }
        }
    }
}

impl<R> Drop for EventStream<R> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take()
            && !handle.is_finished()
        {
            debug!("Event stream dropped, aborting agent task");
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use lingoclaw_core::testing::ScriptedProvider;
    use lingoclaw_memory::TestBed;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn session() -> Session {
        TestBed::new(Arc::new(ScriptedProvider::default())).session
    }

    /// Emits `steps` messages, then returns `steps` or fails.
    struct Counter {
        steps: u32,
        fail: bool,
        panic: bool,
    }

    #[async_trait]
    impl Agent for Counter {
        type Input = ();
        type Output = u32;

        fn name(&self) -> &'static str {
            "counter"
        }

        async fn run(&self, ctx: &AgentContext<u32>, _input: ()) -> Result<u32, Error> {
            for i in 0..self.steps {
                ctx.message("🔢", i.to_string());
                tokio::task::yield_now().await;
            }
            if self.panic {
                panic!("boom");
            }
            if self.fail {
                return Err(AgentError::InvalidInput("bad".into()).into());
            }
            Ok(self.steps)
        }
    }

    fn counter(steps: u32) -> Arc<Counter> {
        Arc::new(Counter {
            steps,
            fail: false,
            panic: false,
        })
    }

    #[tokio::test]
    async fn events_arrive_in_order_with_result_last() {
        let events: Vec<_> = run_stream(counter(3), session(), ()).collect().await;
        assert_eq!(events.len(), 4);
        for (i, e) in events[..3].iter().enumerate() {
            assert_eq!(
                e.as_ref().unwrap(),
                &AgentEvent::message("🔢", i.to_string())
            );
        }
        assert_eq!(events[3].as_ref().unwrap(), &AgentEvent::Result(3));
    }

    #[tokio::test]
    async fn failure_before_result_is_yielded_once() {
        let agent = Arc::new(Counter {
            steps: 2,
            fail: true,
            panic: false,
        });
        let events: Vec<_> = run_stream(agent, session(), ()).collect().await;
        assert_eq!(events.len(), 3);
        assert!(events[..2].iter().all(|e| e.is_ok()));
        let err = events[2].as_ref().unwrap_err();
        assert_eq!(err.error_type(), "bad_request");
    }

    #[tokio::test]
    async fn panic_is_reported_as_task_failure() {
        let agent = Arc::new(Counter {
            steps: 1,
            fail: false,
            panic: true,
        });
        let events: Vec<_> = run_stream(agent, session(), ()).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1],
            Err(Error::Agent(AgentError::TaskFailed(_)))
        ));
    }

    struct Forever {
        dropped: Arc<AtomicBool>,
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Agent for Forever {
        type Input = ();
        type Output = ();

        fn name(&self) -> &'static str {
            "forever"
        }

        async fn run(&self, ctx: &AgentContext<()>, _input: ()) -> Result<(), Error> {
            let _guard = SetOnDrop(self.dropped.clone());
            loop {
                ctx.thinking();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }

    #[tokio::test]
    async fn dropping_the_stream_aborts_the_task() {
        let dropped = Arc::new(AtomicBool::new(false));
        let agent = Arc::new(Forever {
            dropped: dropped.clone(),
        });
        let mut stream = run_stream(agent, session(), ());
        assert!(stream.next().await.unwrap().is_ok());
        drop(stream);

        for _ in 0..100 {
            if dropped.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("agent task kept running after the stream was dropped");
    }

    #[tokio::test]
    async fn nothing_follows_the_result() {
        let mut stream = run_stream(counter(0), session(), ());
        assert!(stream.next().await.unwrap().unwrap().is_result());
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }

    /// Replays a model turn the way the reasoning loop reports it.
    struct Replay;

    #[async_trait]
    impl Agent for Replay {
        type Input = ();
        type Output = Vec<String>;

        fn name(&self) -> &'static str {
            "replay"
        }

        async fn run(&self, ctx: &AgentContext<Vec<String>>, _input: ()) -> Result<Vec<String>, Error> {
            ctx.thinking();
            ctx.event(AgentEvent::chunk("Hel"));
            ctx.event(AgentEvent::chunk("lo"));
            ctx.event(AgentEvent::stream_end());
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn streamed_turn_arrives_verbatim() {
        let mut stream = run_stream(Arc::new(Replay), session(), ());
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event.unwrap());
        }
        assert_eq!(
            events,
            vec![
                AgentEvent::thinking(),
                AgentEvent::chunk("Hel"),
                AgentEvent::chunk("lo"),
                AgentEvent::stream_end(),
                AgentEvent::Result(vec![]),
            ]
        );
        assert!(stream.next().await.is_none());
    }

    /// Emits `label-0`, `label-1`, ... yielding between each.
    struct Labelled {
        label: &'static str,
        steps: u32,
    }

    #[async_trait]
    impl Agent for Labelled {
        type Input = ();
        type Output = String;

        fn name(&self) -> &'static str {
            self.label
        }

        async fn run(&self, ctx: &AgentContext<String>, _input: ()) -> Result<String, Error> {
            for i in 0..self.steps {
                ctx.message("🏷", format!("{}-{i}", self.label));
                tokio::task::yield_now().await;
            }
            Ok(self.label.to_string())
        }
    }

    async fn drain(label: &'static str, steps: u32) -> Vec<AgentEvent<String>> {
        let agent = Arc::new(Labelled { label, steps });
        let mut stream = run_stream(agent, session(), ());
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event.unwrap());
            tokio::task::yield_now().await;
        }
        events
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_runs_do_not_interleave() {
        let (a, b) = tokio::join!(
            tokio::spawn(drain("a", 50)),
            tokio::spawn(drain("b", 50))
        );
        for (label, events) in [("a", a.unwrap()), ("b", b.unwrap())] {
            assert_eq!(events.len(), 51);
            for (i, event) in events[..50].iter().enumerate() {
                assert_eq!(event, &AgentEvent::message("🏷", format!("{label}-{i}")));
            }
            assert_eq!(events[50], AgentEvent::Result(label.to_string()));
        }
    }
}
