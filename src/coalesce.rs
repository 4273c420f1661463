//! Coalescing (debounce) windows
//!
//! A [`CoalescingWindow`] turns a burst of events into one downstream action.
//! Every [`touch`](CoalescingWindow::touch) pushes the deadline out by the
//! quiescence window, but never past `max_delay` after the first touch, so a
//! continuous stream of events still gets flushed.
//!
//! The window is driven by `tokio::time`, so it works in any actor loop:
//!
//! ```ignore
//! tokio::select! {
//!     _ = window.expired(), if window.is_armed() => {
//!         window.clear();
//!         flush();
//!     }
//!     // ...
//! }
//! ```

use std::time::Duration;

use tokio::time::{self, Instant};

/// Upper bound on how long a window can be extended, as a multiple of the window
const DEFAULT_MAX_DELAY_FACTOR: u32 = 10;

#[derive(Debug, Clone)]
pub struct CoalescingWindow {
    window: Duration,
    max_delay: Duration,
    opened_at: Option<Instant>,
    deadline: Option<Instant>,
}

impl CoalescingWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            max_delay: window * DEFAULT_MAX_DELAY_FACTOR,
            opened_at: None,
            deadline: None,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay.max(self.window);
        self
    }

    /// Register pending work, opening the window or extending it
    pub fn touch(&mut self) {
        let now = Instant::now();
        let opened_at = *self.opened_at.get_or_insert(now);
        let cap = opened_at + self.max_delay;
        self.deadline = Some((now + self.window).min(cap));
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Close the window after its work was flushed
    pub fn clear(&mut self) {
        self.opened_at = None;
        self.deadline = None;
    }

    /// Resolves when the window's deadline passes; never resolves while unarmed
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}
