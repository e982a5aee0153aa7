use async_trait::async_trait;
use serde_json::Value;

use crate::error::DriverError;
use crate::models::Viewport;

/// The page operations replay and live analysis need.
///
/// Selectors are recorder selectors (`#id`, `aria/Name`, `xpath/..`,
/// `pierce/..`, `text/..`); implementations translate them. Methods take
/// `&self` so one driver can be shared with extensions behind an `Arc`.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Start the browser and open a blank page
    async fn open(&self) -> Result<(), DriverError>;

    /// Tear the browser down. Safe to call when nothing is open.
    async fn close(&self) -> Result<(), DriverError>;

    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    /// Whether the selector currently resolves to an element
    async fn exists(&self, selector: &str) -> Result<bool, DriverError>;

    async fn click(&self, selector: &str) -> Result<(), DriverError>;

    /// Empty an input's value
    async fn clear(&self, selector: &str) -> Result<(), DriverError>;

    /// Click the element to focus it, then type text into it
    async fn type_text(&self, selector: &str, text: &str) -> Result<(), DriverError>;

    /// Type text into whatever has focus without clicking it first
    async fn send_keys(&self, text: &str) -> Result<(), DriverError>;

    /// Press and release a key on whatever has focus
    async fn press_key(&self, key: &str) -> Result<(), DriverError>;

    /// Run a script in the page and return its JSON result
    async fn evaluate(&self, script: &str) -> Result<Value, DriverError>;

    async fn set_viewport(&self, viewport: &Viewport) -> Result<(), DriverError>;

    /// PNG bytes of the visible viewport
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;
}
