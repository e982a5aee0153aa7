use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures_util::StreamExt;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::driver::PageDriver;
use super::selectors::with_element;
use crate::error::DriverError;
use crate::models::Viewport;

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);
const TARGET_ATTRIBUTE: &str = "data-formfill-target";

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    pub viewport: Viewport,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
        }
    }
}

/// Manages browser lifecycle and the single page a replay drives
pub struct BrowserManager {
    options: BrowserOptions,
    browser: Arc<Mutex<Option<Browser>>>,
    page: Arc<Mutex<Option<Page>>>,
    /// Prevents concurrent launches from starting two Chrome instances
    launch_lock: Mutex<()>,
    next_target: AtomicU64,
}

impl BrowserManager {
    pub fn new(options: BrowserOptions) -> Self {
        Self {
            options,
            browser: Arc::new(Mutex::new(None)),
            page: Arc::new(Mutex::new(None)),
            launch_lock: Mutex::new(()),
            next_target: AtomicU64::new(1),
        }
    }

    async fn page(&self) -> Result<Page, DriverError> {
        self.page
            .lock()
            .await
            .clone()
            .ok_or_else(|| DriverError::SessionLost("No page available".to_string()))
    }

    /// Mark the element a selector resolves to and return a CSS selector for it.
    ///
    /// Recorder selectors (aria, xpath, shadow-piercing) are resolved in the
    /// page; the tag lets chromiumoxide address the same node for native input.
    async fn target(&self, page: &Page, selector: &str) -> Result<String, DriverError> {
        let id = self.next_target.fetch_add(1, Ordering::Relaxed);
        let script = with_element(
            selector,
            &format!("el.setAttribute('{}', '{}'); return true;", TARGET_ATTRIBUTE, id),
        );

        let tagged = evaluate_on(page, &script).await?;
        if tagged == Value::Bool(true) {
            Ok(format!("[{}=\"{}\"]", TARGET_ATTRIBUTE, id))
        } else {
            Err(DriverError::ElementNotFound(selector.to_string()))
        }
    }

    async fn apply_viewport(page: &Page, viewport: &Viewport) -> Result<(), DriverError> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width as i64)
            .height(viewport.height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| DriverError::Automation(format!("Failed to build viewport params: {}", e)))?;

        page.execute(params)
            .await
            .map_err(|e| map_cdp(e, "Failed to set viewport"))?;
        Ok(())
    }
}

impl Default for BrowserManager {
    fn default() -> Self {
        Self::new(BrowserOptions::default())
    }
}

/// Connection-level failures end the session; everything else is a step failure
fn map_cdp(error: CdpError, context: &str) -> DriverError {
    match error {
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
            DriverError::SessionLost(format!("{}: {}", context, error))
        }
        CdpError::NotFound => DriverError::ElementNotFound(context.to_string()),
        other => DriverError::Automation(format!("{}: {}", context, other)),
    }
}

async fn evaluate_on(page: &Page, script: &str) -> Result<Value, DriverError> {
    let result = page
        .evaluate(script)
        .await
        .map_err(|e| map_cdp(e, "Failed to evaluate script"))?;
    Ok(result.value().cloned().unwrap_or(Value::Null))
}

#[async_trait]
impl PageDriver for BrowserManager {
    async fn open(&self) -> Result<(), DriverError> {
        let _launch_guard = self.launch_lock.lock().await;

        self.close().await.ok();

        let viewport = self.options.viewport.clone();
        let mut config = BrowserConfig::builder()
            .window_size(viewport.width as u32, viewport.height as u32);
        if !self.options.headless {
            config = config.with_head();
        }
        config = config
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-default-apps")
            .arg("--disable-extensions");

        let config = config
            .build()
            .map_err(|e| DriverError::SessionLost(format!("Failed to build browser config: {}", e)))?;

        let (mut browser, mut handler) = timeout(LAUNCH_TIMEOUT, Browser::launch(config))
            .await
            .map_err(|_| {
                DriverError::SessionLost(format!(
                    "Browser launch timeout ({}s) - Chrome may not be installed or is unresponsive",
                    LAUNCH_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| DriverError::SessionLost(format!("Failed to launch browser: {}", e)))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                tracing::trace!("Browser event: {:?}", event);
            }
        });

        let default_pages = browser
            .pages()
            .await
            .map_err(|e| map_cdp(e, "Failed to get pages"))?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| map_cdp(e, "Failed to create page"))?;

        for default_page in default_pages {
            if let Err(e) = default_page.close().await {
                tracing::warn!("Failed to close default page: {}", e);
            }
        }

        Self::apply_viewport(&page, &viewport).await?;

        *self.browser.lock().await = Some(browser);
        *self.page.lock().await = Some(page);

        tracing::info!(
            "Browser launched ({}, {}x{})",
            if self.options.headless { "headless" } else { "headed" },
            viewport.width,
            viewport.height
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        let mut page_guard = self.page.lock().await;
        let mut browser_guard = self.browser.lock().await;

        if let Some(page) = page_guard.take() {
            let _ = page.close().await;
        }
        if let Some(mut browser) = browser_guard.take() {
            let _ = browser.close().await;
            tracing::info!("Browser closed");
        }
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let page = self.page().await?;
        page.goto(url)
            .await
            .map_err(|e| map_cdp(e, &format!("Failed to navigate to {}", url)))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        let page = self.page().await?;
        page.url()
            .await
            .map_err(|e| map_cdp(e, "Failed to get URL"))?
            .ok_or_else(|| DriverError::Automation("URL is None".to_string()))
    }

    async fn exists(&self, selector: &str) -> Result<bool, DriverError> {
        let page = self.page().await?;
        let found = evaluate_on(&page, &with_element(selector, "return true;")).await?;
        Ok(found == Value::Bool(true))
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        let page = self.page().await?;
        let target = self.target(&page, selector).await?;

        let element = page
            .find_element(target.as_str())
            .await
            .map_err(|e| map_cdp(e, &format!("Failed to find element '{}'", selector)))?;
        element
            .click()
            .await
            .map_err(|e| map_cdp(e, &format!("Failed to click element '{}'", selector)))?;
        Ok(())
    }

    async fn clear(&self, selector: &str) -> Result<(), DriverError> {
        let page = self.page().await?;
        let script = with_element(
            selector,
            "el.focus(); el.value = ''; el.dispatchEvent(new Event('input', { bubbles: true })); return true;",
        );
        match evaluate_on(&page, &script).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(DriverError::ElementNotFound(selector.to_string())),
        }
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        let page = self.page().await?;
        let target = self.target(&page, selector).await?;

        let element = page
            .find_element(target.as_str())
            .await
            .map_err(|e| map_cdp(e, &format!("Failed to find element '{}'", selector)))?;
        element
            .click()
            .await
            .map_err(|e| map_cdp(e, &format!("Failed to focus element '{}'", selector)))?;
        element
            .type_str(text)
            .await
            .map_err(|e| map_cdp(e, &format!("Failed to type into element '{}'", selector)))?;
        Ok(())
    }

    async fn send_keys(&self, text: &str) -> Result<(), DriverError> {
        let page = self.page().await?;

        let mut buf = [0u8; 4];
        for c in text.chars() {
            let ch: &str = c.encode_utf8(&mut buf);
            let down = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::KeyDown)
                .key(ch)
                .text(ch)
                .build();
            let up = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::KeyUp)
                .key(ch)
                .build();
            for params in [down, up] {
                let params =
                    params.map_err(|e| DriverError::Automation(format!("Failed to build key event: {:?}", e)))?;
                page.execute(params)
                    .await
                    .map_err(|e| map_cdp(e, &format!("Failed to send key '{}'", ch)))?;
            }
        }
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), DriverError> {
        let page = self.page().await?;

        for event_type in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let params = DispatchKeyEventParams::builder()
                .r#type(event_type)
                .key(key)
                .build()
                .map_err(|e| DriverError::Automation(format!("Failed to build key event: {:?}", e)))?;
            page.execute(params)
                .await
                .map_err(|e| map_cdp(e, &format!("Failed to press key '{}'", key)))?;
        }
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DriverError> {
        let page = self.page().await?;
        evaluate_on(&page, script).await
    }

    async fn set_viewport(&self, viewport: &Viewport) -> Result<(), DriverError> {
        let page = self.page().await?;
        Self::apply_viewport(&page, viewport).await
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        let page = self.page().await?;
        page.screenshot(
            chromiumoxide::page::ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .build(),
        )
        .await
        .map_err(|e| map_cdp(e, "Failed to take screenshot"))
    }
}
