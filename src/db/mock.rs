//! Scripted connector for exercising the runner and evaluators without a server

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ConnectionError, ConnectionHandle, Connector, Session};

/// Scripted reply to a statement
#[derive(Debug, Clone)]
pub enum Reply {
    Value(Option<String>),
    Fail(String),
    Hang,
}

impl Reply {
    pub fn value(v: &str) -> Self {
        Reply::Value(Some(v.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub enum ConnectMode {
    #[default]
    Ok,
    Fail(String),
    Hang,
}

#[derive(Default)]
struct Inner {
    replies: Mutex<Vec<(String, Reply)>>,
    connect_mode: Mutex<ConnectMode>,
    kill_reply: Mutex<Option<Reply>>,
    queries: Mutex<Vec<String>>,
    kills: Mutex<Vec<String>>,
    next_id: AtomicU64,
    opened: AtomicUsize,
    closed: AtomicUsize,
    dropped: AtomicUsize,
}

/// Connector whose sessions answer from a script keyed by SQL fragment
#[derive(Clone, Default)]
pub struct MockConnector {
    inner: Arc<Inner>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer any statement containing `fragment` with `reply`.
    ///
    /// Later registrations for the same fragment replace earlier ones.
    pub fn on(&self, fragment: &str, reply: Reply) -> &Self {
        let mut replies = self.inner.replies.lock();
        replies.retain(|(f, _)| f != fragment);
        replies.push((fragment.to_string(), reply));
        self
    }

    pub fn connect_mode(&self, mode: ConnectMode) -> &Self {
        *self.inner.connect_mode.lock() = mode;
        self
    }

    pub fn kill_reply(&self, reply: Reply) -> &Self {
        *self.inner.kill_reply.lock() = Some(reply);
        self
    }

    /// Diagnostic statements executed, in order
    pub fn queries(&self) -> Vec<String> {
        self.inner.queries.lock().clone()
    }

    /// KILL statements received by administrative sessions
    pub fn kills(&self) -> Vec<String> {
        self.inner.kills.lock().clone()
    }

    pub fn opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Sessions whose socket is gone, by close or by drop
    pub fn dropped(&self) -> usize {
        self.inner.dropped.load(Ordering::SeqCst)
    }

    fn reply_for(&self, sql: &str) -> Reply {
        self.inner
            .replies
            .lock()
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Reply::Fail(format!("no scripted reply for: {}", sql)))
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn Session>, ConnectionError> {
        let mode = self.inner.connect_mode.lock().clone();
        match mode {
            ConnectMode::Ok => {}
            ConnectMode::Fail(msg) => return Err(ConnectionError::Connect(msg)),
            ConnectMode::Hang => std::future::pending::<()>().await,
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            connector: self.clone(),
            handle: ConnectionHandle(id),
        }))
    }
}

struct MockSession {
    connector: MockConnector,
    handle: ConnectionHandle,
}

impl MockSession {
    async fn answer(reply: Reply) -> Result<Option<String>, ConnectionError> {
        match reply {
            Reply::Value(v) => Ok(v),
            Reply::Fail(msg) => Err(ConnectionError::Database(msg)),
            Reply::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

#[async_trait]
impl Session for MockSession {
    fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    async fn query_first_value(&mut self, sql: &str) -> Result<Option<String>, ConnectionError> {
        self.connector.inner.queries.lock().push(sql.to_string());
        let reply = self.connector.reply_for(sql);
        Self::answer(reply).await
    }

    async fn execute(&mut self, sql: &str) -> Result<(), ConnectionError> {
        if sql.starts_with("KILL") {
            self.connector.inner.kills.lock().push(sql.to_string());
            let reply = self
                .connector
                .inner
                .kill_reply
                .lock()
                .clone()
                .unwrap_or(Reply::Value(None));
            return Self::answer(reply).await.map(|_| ());
        }
        self.query_first_value(sql).await.map(|_| ())
    }

    async fn close(&mut self) {
        self.connector.inner.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.connector.inner.dropped.fetch_add(1, Ordering::SeqCst);
    }
}
