//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;

use crate::error::{ConnectionError, LlmError};
use crate::events::{EventFilter, WorldEvent, WorldEventBus};
use crate::llms::{LlmMessage, LlmOptions, LlmProvider, TextStream};
use crate::subscription::ClientConnection;

// ---------------------------------------------------------------------------
// ScriptedLlm
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Step {
    Chunks(Vec<String>),
    Fail(LlmError),
}

#[derive(Debug, Default)]
struct Script {
    steps: VecDeque<Step>,
    fallback: Option<String>,
    delay: Option<Duration>,
    calls: Vec<Vec<LlmMessage>>,
}

/// LLM double that plays back queued replies, then a fallback.
///
/// With an empty queue and no fallback every call returns an empty reply.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLlm {
    script: Arc<Mutex<Script>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.push(Step::Chunks(vec![text.into()]));
        self
    }

    pub fn with_chunks<I, S>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Step::Chunks(chunks.into_iter().map(Into::into).collect()));
        self
    }

    pub fn with_failure(self, error: LlmError) -> Self {
        self.push(Step::Fail(error));
        self
    }

    /// Reply used once the queue is exhausted.
    pub fn with_fallback(self, text: impl Into<String>) -> Self {
        self.script.lock().fallback = Some(text.into());
        self
    }

    /// Sleep before every reply.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.script.lock().delay = Some(delay);
        self
    }

    pub fn push_reply(&self, text: impl Into<String>) {
        self.push(Step::Chunks(vec![text.into()]));
    }

    pub fn call_count(&self) -> usize {
        self.script.lock().calls.len()
    }

    /// Context passed to each call, oldest first.
    pub fn calls(&self) -> Vec<Vec<LlmMessage>> {
        self.script.lock().calls.clone()
    }

    fn push(&self, step: Step) {
        self.script.lock().steps.push_back(step);
    }

    async fn next_step(&self, messages: Vec<LlmMessage>) -> Step {
        let (step, delay) = {
            let mut script = self.script.lock();
            script.calls.push(messages);
            let fallback = script.fallback.clone();
            let step = script
                .steps
                .pop_front()
                .unwrap_or_else(|| Step::Chunks(fallback.into_iter().collect()));
            (step, script.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        step
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn generate(
        &self,
        messages: Vec<LlmMessage>,
        _options: &LlmOptions,
    ) -> Result<String, LlmError> {
        match self.next_step(messages).await {
            Step::Chunks(chunks) => Ok(chunks.concat()),
            Step::Fail(e) => Err(e),
        }
    }

    async fn stream(
        &self,
        messages: Vec<LlmMessage>,
        _options: &LlmOptions,
    ) -> Result<TextStream, LlmError> {
        match self.next_step(messages).await {
            Step::Chunks(chunks) => Ok(stream::iter(chunks.into_iter().map(Ok)).boxed()),
            Step::Fail(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingConnection
// ---------------------------------------------------------------------------

/// Client connection that keeps every frame it is sent.
#[derive(Debug)]
pub struct RecordingConnection {
    frames: Mutex<Vec<String>>,
    errors: Mutex<Vec<ConnectionError>>,
    open: AtomicBool,
    fail_sends: AtomicBool,
}

impl Default for RecordingConnection {
    fn default() -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
        }
    }
}

impl RecordingConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn closed() -> Arc<Self> {
        let conn = Self::default();
        conn.open.store(false, Ordering::SeqCst);
        Arc::new(conn)
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    pub fn events(&self) -> Vec<WorldEvent> {
        self.frames
            .lock()
            .iter()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect()
    }

    pub fn errors(&self) -> Vec<ConnectionError> {
        self.errors.lock().clone()
    }
}

impl ClientConnection for RecordingConnection {
    fn send(&self, frame: String) -> Result<(), ConnectionError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ConnectionError::Send("simulated failure".into()));
        }
        if !self.open.load(Ordering::SeqCst) {
            return Err(ConnectionError::Closed);
        }
        self.frames.lock().push(frame);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn on_error(&self, error: &ConnectionError) {
        self.errors.lock().push(error.clone());
    }
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// Records everything published on a bus.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<WorldEvent>>>,
}

impl EventLog {
    pub fn attach(bus: &WorldEventBus) -> Self {
        let log = Self::default();
        let sink = log.events.clone();
        bus.subscribe(
            "test-log",
            EventFilter::All,
            move |event: &WorldEvent| sink.lock().push(event.clone()),
        );
        log
    }

    pub fn events(&self) -> Vec<WorldEvent> {
        self.events.lock().clone()
    }

    /// `message` events only.
    pub fn messages(&self) -> Vec<WorldEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.as_message().is_some())
            .collect()
    }

    /// Actions of `system` events, in order.
    pub fn system_actions(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|e| e.as_system().map(|s| s.action.clone()))
            .collect()
    }
}
