//! Test doubles for the session collaborators.

use async_trait::async_trait;
use linglear_types::{
    ChannelHandle, ChannelMessage, HiddenContext, LinglearError, Navigator, Result, SessionView,
    SilentTransport,
};
use serde_json::{Value, json};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::mpsc;

use crate::message::MESSAGE_TYPE;

pub const ORIGIN: &str = "https://linglear.com";

/// How the mock provider answers a hidden context.
#[derive(Clone)]
pub enum Script {
    /// Deliver these messages after `delay`.
    Reply(Duration, Vec<ChannelMessage>),
    /// Never answer.
    Silence,
    /// Fail to open the context at all.
    Fail,
}

pub fn tokens_message(access: &str, id: &str) -> ChannelMessage {
    ChannelMessage::new(
        ORIGIN,
        json!({"type": MESSAGE_TYPE, "accessToken": access, "idToken": id}),
    )
}

pub fn error_message(code: &str) -> ChannelMessage {
    ChannelMessage::new(
        ORIGIN,
        json!({"type": MESSAGE_TYPE, "error": code, "errorDescription": "no session"}),
    )
}

pub fn foreign_message(data: Value) -> ChannelMessage {
    ChannelMessage::new("https://evil.example", data)
}

/// A transport that follows a script and counts hidden contexts.
pub struct MockTransport {
    script: Mutex<Script>,
    opened: AtomicUsize,
    live: Arc<AtomicUsize>,
    urls: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            opened: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
            urls: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(messages: Vec<ChannelMessage>) -> Arc<Self> {
        Self::new(Script::Reply(Duration::from_millis(50), messages))
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    /// Contexts opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Contexts opened and not yet torn down.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

struct MockContext {
    live: Arc<AtomicUsize>,
    keep_open: Option<mpsc::UnboundedSender<ChannelMessage>>,
}

impl HiddenContext for MockContext {
    fn close(&mut self) {
        if self.keep_open.take().is_some() {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl SilentTransport for MockTransport {
    async fn open(&self, url: &str) -> Result<ChannelHandle> {
        let script = self.script.lock().unwrap().clone();
        if matches!(script, Script::Fail) {
            return Err(LinglearError::Auth("popup blocked".into()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());

        let (tx, rx) = mpsc::unbounded_channel();
        if let Script::Reply(delay, messages) = script {
            let tx = tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                for m in messages {
                    let _ = tx.send(m);
                }
            });
        }
        Ok(ChannelHandle::new(
            rx,
            Box::new(MockContext {
                live: Arc::clone(&self.live),
                keep_open: Some(tx),
            }),
        ))
    }
}

/// Records every UI update.
#[derive(Default)]
pub struct RecordingView {
    pub events: Mutex<Vec<String>>,
}

impl RecordingView {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.events.lock().unwrap().last().cloned()
    }
}

impl SessionView for RecordingView {
    fn show_logged_in(&self, identity: &str) {
        self.events.lock().unwrap().push(format!("in:{identity}"));
    }

    fn show_logged_out(&self, notice: Option<&str>) {
        self.events
            .lock()
            .unwrap()
            .push(format!("out:{}", notice.unwrap_or_default()));
    }
}

/// Records navigations and history rewrites.
#[derive(Default)]
pub struct RecordingNavigator {
    pub navigations: Mutex<Vec<String>>,
    pub replacements: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn replacements(&self) -> Vec<String> {
        self.replacements.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &str) {
        self.navigations.lock().unwrap().push(url.to_string());
    }

    fn replace_url(&self, url: &str) {
        self.replacements.lock().unwrap().push(url.to_string());
    }
}
