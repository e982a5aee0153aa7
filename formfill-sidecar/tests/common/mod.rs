//! Shared test scaffolding: a scripted page driver that records every call.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use formfill_sidecar::browser::selectors::element_expression;
use formfill_sidecar::browser::PageDriver;
use formfill_sidecar::error::DriverError;
use formfill_sidecar::models::Viewport;

/// A fake page: a set of selectors that resolve, plus a log of what was done to them.
#[derive(Debug, Default)]
pub struct FakeDriver {
    pub present: Mutex<HashSet<String>>,
    pub typed: Mutex<HashMap<String, String>>,
    pub checked: Mutex<HashMap<String, bool>>,
    /// Values written by script (selects, date inputs)
    pub scripted: Mutex<HashMap<String, String>>,
    /// Probe results returned to the live analyzer, by selector
    pub probes: Mutex<HashMap<String, Value>>,
    pub calls: Mutex<Vec<String>>,
    /// Last element clicked or cleared, where `send_keys` lands
    pub focused: Mutex<Option<String>>,
    pub url: Mutex<String>,
    /// Navigations land here instead of the requested URL
    pub redirect: Mutex<Option<String>>,
    /// Selectors whose actions fail with an automation error
    pub failing: Mutex<HashSet<String>>,
    /// Acting on this selector kills the session
    pub lose_session_on: Mutex<Option<String>>,
    /// Clicking the key removes the listed selectors (a banner closing, a dropdown option consumed)
    pub click_removes: Mutex<HashMap<String, Vec<String>>>,
    /// Clicking the key makes the listed selectors appear (a dropdown opening)
    pub click_reveals: Mutex<HashMap<String, Vec<String>>>,
    pub action_delay: Mutex<Duration>,
    pub fail_open: AtomicBool,
    pub opened: AtomicBool,
    pub closed: AtomicBool,
}

impl FakeDriver {
    pub fn with_fields(selectors: &[&str]) -> Self {
        let driver = Self::default();
        driver.add(selectors);
        driver
    }

    pub fn add(&self, selectors: &[&str]) {
        let mut present = self.present.lock().unwrap();
        for s in selectors {
            present.insert(s.to_string());
        }
    }

    pub fn remove(&self, selector: &str) {
        self.present.lock().unwrap().remove(selector);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn typed(&self, selector: &str) -> Option<String> {
        self.typed.lock().unwrap().get(selector).cloned()
    }

    pub fn is_checked(&self, selector: &str) -> bool {
        self.checked.lock().unwrap().get(selector).copied().unwrap_or(false)
    }

    pub fn scripted(&self, selector: &str) -> Option<String> {
        self.scripted.lock().unwrap().get(selector).cloned()
    }

    pub fn set_probe(&self, selector: &str, probe: Value) {
        self.probes.lock().unwrap().insert(selector.to_string(), probe);
    }

    fn log(&self, entry: String) {
        self.calls.lock().unwrap().push(entry);
    }

    async fn act(&self, selector: &str) -> Result<(), DriverError> {
        let delay = *self.action_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.lose_session_on.lock().unwrap().as_deref() == Some(selector) {
            return Err(DriverError::SessionLost("target closed".to_string()));
        }
        if self.failing.lock().unwrap().contains(selector) {
            return Err(DriverError::Automation(format!("element {} is not interactable", selector)));
        }
        if !self.present.lock().unwrap().contains(selector) {
            return Err(DriverError::ElementNotFound(selector.to_string()));
        }
        Ok(())
    }

    /// Which known selector a generated script addresses
    fn script_target(&self, script: &str) -> Option<String> {
        let present = self.present.lock().unwrap();
        let probes = self.probes.lock().unwrap();
        present
            .iter()
            .chain(probes.keys())
            .find(|s| script.contains(&element_expression(s)))
            .cloned()
    }
}

/// Pull the JSON string literal assigned to `el.value` or compared as `wanted`
fn embedded_value(script: &str, marker: &str) -> Option<String> {
    let start = script.find(marker)? + marker.len();
    let rest = &script[start..];
    let end = rest.find(['\n', ';'])?;
    let literal = rest[..end].trim();
    let literal = literal.strip_suffix(".trim().toLowerCase()").unwrap_or(literal);
    serde_json::from_str(literal).ok()
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn open(&self) -> Result<(), DriverError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(DriverError::Automation("Chrome executable not found".to_string()));
        }
        self.opened.store(true, Ordering::SeqCst);
        *self.url.lock().unwrap() = "about:blank".to_string();
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.log(format!("navigate {}", url));
        let landed = self.redirect.lock().unwrap().clone().unwrap_or_else(|| url.to_string());
        *self.url.lock().unwrap() = landed;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn exists(&self, selector: &str) -> Result<bool, DriverError> {
        if self.lose_session_on.lock().unwrap().as_deref() == Some(selector) {
            return Err(DriverError::SessionLost("target closed".to_string()));
        }
        Ok(self.present.lock().unwrap().contains(selector))
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        self.act(selector).await?;
        self.log(format!("click {}", selector));
        *self.focused.lock().unwrap() = Some(selector.to_string());

        let mut checked = self.checked.lock().unwrap();
        let state = checked.entry(selector.to_string()).or_insert(false);
        *state = !*state;
        drop(checked);

        if let Some(gone) = self.click_removes.lock().unwrap().get(selector) {
            let mut present = self.present.lock().unwrap();
            for s in gone {
                present.remove(s);
            }
        }
        if let Some(shown) = self.click_reveals.lock().unwrap().get(selector) {
            let mut present = self.present.lock().unwrap();
            for s in shown {
                present.insert(s.clone());
            }
        }
        Ok(())
    }

    async fn clear(&self, selector: &str) -> Result<(), DriverError> {
        self.act(selector).await?;
        self.typed.lock().unwrap().remove(selector);
        *self.focused.lock().unwrap() = Some(selector.to_string());
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        self.act(selector).await?;
        self.log(format!("type {} {}", selector, text));
        *self.focused.lock().unwrap() = Some(selector.to_string());
        self.typed
            .lock()
            .unwrap()
            .entry(selector.to_string())
            .or_default()
            .push_str(text);
        Ok(())
    }

    async fn send_keys(&self, text: &str) -> Result<(), DriverError> {
        let Some(selector) = self.focused.lock().unwrap().clone() else {
            return Err(DriverError::Automation("nothing has focus".to_string()));
        };
        self.act(&selector).await?;
        self.log(format!("keys {}", text));
        self.typed.lock().unwrap().entry(selector).or_default().push_str(text);
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), DriverError> {
        self.log(format!("key {}", key));
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DriverError> {
        let Some(target) = self.script_target(script) else {
            return Ok(Value::Null);
        };

        if script.contains("tagName: tag") {
            return Ok(self.probes.lock().unwrap().get(&target).cloned().unwrap_or(Value::Null));
        }
        if !self.present.lock().unwrap().contains(&target) {
            return Ok(Value::Null);
        }
        if script.contains("return !!el.checked") {
            return Ok(json!(self.is_checked(&target)));
        }
        if script.contains("el.options") {
            let wanted = embedded_value(script, "const wanted = ").unwrap_or_default();
            self.log(format!("select {} {}", target, wanted));
            self.scripted.lock().unwrap().insert(target, wanted);
            return Ok(json!(true));
        }
        if let Some(value) = embedded_value(script, "el.value = ") {
            self.log(format!("set {} {}", target, value));
            self.scripted.lock().unwrap().insert(target, value);
            return Ok(json!(true));
        }
        Ok(json!(true))
    }

    async fn set_viewport(&self, viewport: &Viewport) -> Result<(), DriverError> {
        self.log(format!("viewport {}x{}", viewport.width, viewport.height));
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        Ok(vec![0x89, 0x50, 0x4E, 0x47]) // PNG magic bytes
    }
}

/// A Chrome DevTools Recorder export of a small signup form
pub fn signup_recording() -> Value {
    json!({
        "title": "Create account",
        "steps": [
            { "type": "setViewport", "width": 1440, "height": 900 },
            { "type": "navigate", "url": "https://www.shop.example.com/register",
              "assertedEvents": [ { "type": "navigation", "url": "https://www.shop.example.com/register" } ] },
            { "type": "click", "selectors": [["aria/Email address"], ["#email"]] },
            { "type": "change", "value": "jane@example.com", "selectors": [["aria/Email address"], ["#email"]] },
            { "type": "change", "value": "Jane", "selectors": [["#first-name"], ["xpath///*[@id=\"first-name\"]"]] },
            { "type": "change", "value": "2000", "selectors": [["#postcode"]] },
            { "type": "change", "value": "blue", "selectors": [["#favourite-colour"]] },
            { "type": "keyDown", "key": "Tab" },
            { "type": "keyUp", "key": "Tab" },
            { "type": "hover", "selectors": [["#help"]] },
            { "type": "click", "selectors": [["#submit"]] }
        ]
    })
}
