//! Scripted inference backend
//!
//! Replays a fixed list of replies, then repeats a default one. An optional
//! gate parks every call until the test releases it, so in-flight state can be
//! observed.

use async_trait::async_trait;
use insight_ai::services::{BackendError, InferenceBackend, PromptPayload};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// One scripted backend reply
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// Network-level failure with this message
    Fail(String),
}

impl Reply {
    pub fn json(value: serde_json::Value) -> Self {
        Reply::Text(value.to_string())
    }

    fn into_result(self) -> Result<String, BackendError> {
        match self {
            Reply::Text(text) => Ok(text),
            Reply::Fail(message) => Err(BackendError::Network(message)),
        }
    }
}

pub struct ScriptedBackend {
    script: Mutex<VecDeque<Reply>>,
    default_reply: Reply,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    gate: Option<Arc<Notify>>,
    entered: Arc<Notify>,
}

impl ScriptedBackend {
    /// Always answer with `reply`
    pub fn always(reply: Reply) -> Self {
        Self::scripted(Vec::new(), reply)
    }

    /// Answer with `script` in order, then `default_reply` forever
    pub fn scripted(script: Vec<Reply>, default_reply: Reply) -> Self {
        Self {
            script: Mutex::new(script.into()),
            default_reply,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            gate: None,
            entered: Arc::new(Notify::new()),
        }
    }

    /// Park every call until `gate` is notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Notified each time a call reaches the backend
    pub fn entered(&self) -> Arc<Notify> {
        Arc::clone(&self.entered)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompt texts received, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn complete(&self, payload: &PromptPayload) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(payload.text.clone());

        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.default_reply.clone()).into_result()
    }
}
