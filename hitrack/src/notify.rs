//! User-facing notifications (the snackbar messages of the dashboard).
//!
//! The service keeps a bounded queue of recent notifications and fans each new one out to
//! subscribers. Subscriber channels are bounded too; a subscriber that falls behind misses
//! messages rather than blocking the sender.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);
pub const DEFAULT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Error,
    Warning,
    Info,
}

impl Level {
    /// Unknown names are treated as `success`
    pub fn from_name(name: &str) -> Level {
        match name {
            "error" => Level::Error,
            "warning" => Level::Warning,
            "info" => Level::Info,
            _ => Level::Success,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Success => "success",
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Info => "info",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    pub level: Level,
    pub message: String,
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct Subscription {
    pub id: u64,
    receiver: mpsc::Receiver<Notification>,
}

impl Subscription {
    /// Waits for the next notification. Returns `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Notification> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Debug)]
struct Inner {
    capacity: usize,
    next_id: u64,
    next_subscriber: u64,
    queue: VecDeque<Notification>,
    subscribers: Vec<(u64, mpsc::Sender<Notification>)>,
}

#[derive(Debug)]
pub struct NotificationService {
    inner: Mutex<Inner>,
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NotificationService {
    pub fn new(capacity: usize) -> Self {
        NotificationService {
            inner: Mutex::new(Inner {
                capacity: capacity.max(1),
                next_id: 0,
                next_subscriber: 0,
                queue: VecDeque::new(),
                subscribers: Vec::new(),
            }),
        }
    }

    pub fn notify(&self, level: Level, message: &str, timeout: Duration) -> u64 {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = inner.next_id;
        inner.next_id += 1;
        let notification = Notification {
            id,
            level,
            message: message.to_string(),
            timeout,
        };
        if inner.queue.len() == inner.capacity {
            inner.queue.pop_front();
        }
        inner.queue.push_back(notification.clone());
        inner.subscribers.retain(|(_, tx)| match tx.try_send(notification.clone()) {
            Err(mpsc::error::TrySendError::Closed(_)) => false,
            _ => true,
        });
        id
    }

    pub fn success(&self, message: &str) -> u64 {
        self.notify(Level::Success, message, DEFAULT_TIMEOUT)
    }

    pub fn error(&self, message: &str) -> u64 {
        self.notify(Level::Error, message, DEFAULT_TIMEOUT)
    }

    pub fn warning(&self, message: &str) -> u64 {
        self.notify(Level::Warning, message, DEFAULT_TIMEOUT)
    }

    pub fn info(&self, message: &str) -> u64 {
        self.notify(Level::Info, message, DEFAULT_TIMEOUT)
    }

    pub fn subscribe(&self) -> Subscription {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let (tx, receiver) = mpsc::channel(inner.capacity);
        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.push((id, tx));
        Subscription { id, receiver }
    }

    /// Drops the subscriber's channel; its `recv` returns `None` after draining
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sid, _)| *sid != id);
        inner.subscribers.len() != before
    }

    /// Notifications still queued, oldest first
    pub fn pending(&self) -> Vec<Notification> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.queue.iter().cloned().collect()
    }

    pub fn dismiss(&self, id: u64) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = inner.queue.len();
        inner.queue.retain(|n| n.id != id);
        inner.queue.len() != before
    }
}

#[test]
fn test_queue_is_bounded() {
    let service = NotificationService::new(2);
    let first = service.success("one");
    service.warning("two");
    service.error("three");
    let pending = service.pending();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].message, "two");
    assert_eq!(pending[1].level, Level::Error);
    assert!(!service.dismiss(first));
    assert!(service.dismiss(pending[0].id));
    assert_eq!(service.pending().len(), 1);
}

#[test]
fn test_level_fallback() {
    assert_eq!(Level::from_name("warning"), Level::Warning);
    assert_eq!(Level::from_name("shout"), Level::Success);
    assert_eq!(Level::Info.to_string(), "info");
}

#[tokio::test]
async fn test_subscribe_unsubscribe() {
    let service = NotificationService::new(4);
    let mut a = service.subscribe();
    let mut b = service.subscribe();
    service.info("hello");
    assert_eq!(a.recv().await.map(|n| n.message), Some("hello".to_string()));

    assert!(service.unsubscribe(b.id));
    assert!(!service.unsubscribe(b.id));
    service.error("after");
    assert_eq!(a.try_recv().map(|n| n.level), Some(Level::Error));
    // b still gets what was sent before unsubscribing, then nothing
    assert_eq!(b.recv().await.map(|n| n.message), Some("hello".to_string()));
    assert_eq!(b.recv().await, None);
}

#[tokio::test]
async fn test_slow_subscriber_misses_messages() {
    let service = NotificationService::new(1);
    let mut sub = service.subscribe();
    service.info("first");
    service.info("second");
    assert_eq!(sub.try_recv().map(|n| n.message), Some("first".to_string()));
    assert_eq!(sub.try_recv(), None);
    drop(sub);
    service.info("third");
    assert!(!service.unsubscribe(0));
}
