//! Append-only logs that replay their history to late subscribers.
//!
//! A [`ReplayLog`] is a `Vec` behind a mutex plus a [`watch`] channel that
//! publishes the current length. Each subscriber holds a
//! [`ReplayCursor`]: an index into the log that starts at zero. Reading
//! walks the cursor forward; when it catches up, it waits for the length
//! to change.
//!
//! ```text
//!   entries: [ e0 | e1 | e2 | e3 ]          ← appended in arrival order
//!               ▲              ▲
//!          new cursor      older cursor
//! ```
//!
//! Because entries are never removed or reordered, every cursor sees the
//! exact same sequence no matter when it was created.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::lock;

struct Inner<T> {
    entries: Mutex<Vec<T>>,
    len: watch::Sender<usize>,
}

/// An append-only, replayable sequence of entries.
///
/// Cloning the log is cheap and yields another handle to the same entries.
pub struct ReplayLog<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ReplayLog<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> Default for ReplayLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> ReplayLog<T> {
    /// Creates an empty log.
    pub fn new() -> Self {
        let (len, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(Vec::new()),
                len,
            }),
        }
    }

    /// Appends an entry and wakes every waiting cursor.
    pub fn append(&self, entry: T) {
        let mut entries = lock(&self.inner.entries);
        entries.push(entry);
        // Published while still holding the lock so lengths are
        // announced in the same order entries were pushed.
        self.inner.len.send_replace(entries.len());
    }

    /// Number of entries appended so far.
    pub fn len(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    /// Returns `true` if nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of every entry appended so far.
    pub fn snapshot(&self) -> Vec<T> {
        lock(&self.inner.entries).clone()
    }

    /// Returns a cursor positioned at the very first entry.
    pub fn subscribe(&self) -> ReplayCursor<T> {
        ReplayCursor {
            inner: Arc::clone(&self.inner),
            len: self.inner.len.subscribe(),
            position: 0,
        }
    }
}

/// One subscriber's read position in a [`ReplayLog`].
pub struct ReplayCursor<T> {
    inner: Arc<Inner<T>>,
    len: watch::Receiver<usize>,
    position: usize,
}

impl<T: Clone> ReplayCursor<T> {
    /// Returns the next entry if one is available, without waiting.
    pub fn try_next(&mut self) -> Option<T> {
        let entries = lock(&self.inner.entries);
        let entry = entries.get(self.position).cloned()?;
        self.position += 1;
        Some(entry)
    }

    /// Returns the next entry, waiting for one to be appended if the
    /// cursor has caught up.
    pub async fn next(&mut self) -> T {
        loop {
            if let Some(entry) = self.try_next() {
                return entry;
            }
            // The cursor holds the log alive, so the sender can't be
            // dropped while we wait.
            if self.len.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Returns every entry the cursor hasn't read yet.
    pub fn drain_available(&mut self) -> Vec<T> {
        let entries = lock(&self.inner.entries);
        let unread = entries
            .get(self.position..)
            .map(<[T]>::to_vec)
            .unwrap_or_default();
        self.position += unread.len();
        unread
    }

    /// How many entries this cursor has consumed.
    pub fn position(&self) -> usize {
        self.position
    }
}
