use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;

use super::{ConnectionHeaders, SpeechTransport, TransportConnection};
use crate::error::{Result, VolcError};
use crate::speech::frame::{self, Compression, MessageType, Serialization};

/// What the scripted peer does on the next `receive_next`.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Frame(Vec<u8>),
    Close,
    Hang,
}

impl Step {
    pub(crate) fn event(code: u32, payload: &[u8]) -> Self {
        let bytes = frame::encode(
            MessageType::AudioOnlyResponse,
            Serialization::Raw,
            Compression::None,
            code,
            payload,
        )
        .expect("test frame should encode");
        Self::Frame(bytes)
    }
}

#[derive(Default)]
pub(crate) struct Observed {
    pub(crate) sent: Mutex<Vec<Vec<u8>>>,
    pub(crate) headers: Mutex<Option<ConnectionHeaders>>,
    pub(crate) open_calls: AtomicUsize,
    pub(crate) close_calls: AtomicUsize,
}

impl Observed {
    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }
}

pub(crate) struct ScriptedTransport {
    steps: Vec<Step>,
    fail_open: Option<String>,
    pub(crate) observed: Arc<Observed>,
}

impl ScriptedTransport {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            fail_open: None,
            observed: Arc::new(Observed::default()),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            steps: Vec::new(),
            fail_open: Some(message.to_string()),
            observed: Arc::new(Observed::default()),
        }
    }
}

#[async_trait]
impl SpeechTransport for ScriptedTransport {
    async fn open(
        &self,
        _url: &str,
        headers: &ConnectionHeaders,
    ) -> Result<Box<dyn TransportConnection>> {
        self.observed.open_calls.fetch_add(1, Ordering::SeqCst);
        *self.observed.headers.lock().unwrap() = Some(headers.clone());
        if let Some(message) = &self.fail_open {
            return Err(VolcError::Connect(message.clone()));
        }
        Ok(Box::new(ScriptedConnection {
            steps: self.steps.clone().into(),
            observed: Arc::clone(&self.observed),
            closed: false,
        }))
    }
}

struct ScriptedConnection {
    steps: VecDeque<Step>,
    observed: Arc<Observed>,
    closed: bool,
}

#[async_trait]
impl TransportConnection for ScriptedConnection {
    async fn send(&mut self, frame: Vec<u8>) -> Result<()> {
        if self.closed {
            return Err(VolcError::ConnectionClosed("send after close".into()));
        }
        self.observed.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn receive_next(&mut self) -> Result<Vec<u8>> {
        if self.closed {
            return Err(VolcError::ConnectionClosed("connection closed".into()));
        }
        match self.steps.pop_front() {
            Some(Step::Frame(bytes)) => Ok(bytes),
            Some(Step::Hang) => std::future::pending().await,
            Some(Step::Close) | None => {
                self.closed = true;
                Err(VolcError::ConnectionClosed("closed by peer".into()))
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.observed.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
