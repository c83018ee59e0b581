//! Page-driving capability consumed by the engine.
//!
//! The engine only needs this contract, not a particular browser stack:
//! [`CdpDriver`] implements it against a real Chrome session, and the test
//! suite implements it with a scripted fake.

mod cdp;

pub use cdp::CdpDriver;

use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// Element geometry in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Center point, for coordinate-based interaction.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// A zero-area box means the element is not laid out and cannot be
    /// clicked by coordinate.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Minimal surface the engine needs from a live page.
///
/// All waits are bounded; a wait that exceeds its timeout surfaces as
/// [`crate::Error::Timeout`]. There is no separate cancellation signal.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to a URL and let the page settle.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Clear and fill an input field.
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Click an element by selector.
    async fn click(&self, selector: &str) -> Result<()>;

    /// Evaluate a script against the live DOM and return its JSON value.
    async fn evaluate(&self, js: &str) -> Result<serde_json::Value>;

    /// Bounded wait for a selector to appear.
    async fn wait_for(&self, selector: &str, timeout_ms: u64) -> Result<()>;

    /// Fixed settle delay for asynchronous client-side rendering.
    async fn settle(&self, ms: u64);

    /// Read element geometry; `None` if the element does not exist.
    async fn bounding_box(&self, selector: &str) -> Result<Option<Rect>>;

    /// Simulate a pointer click at viewport coordinates.
    async fn click_at(&self, x: f64, y: f64) -> Result<()>;

    /// Focus the element and dispatch a key-activation sequence
    /// (keydown/keypress/keyup).
    async fn dispatch_key(&self, selector: &str, key: &str) -> Result<()>;

    /// Capture a screenshot of the current page.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Release the underlying browser session.
    async fn close(self: Box<Self>) -> Result<()>;
}
