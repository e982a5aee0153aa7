//! Live field analysis: open the trained page and work out how each mapped
//! control wants to be filled.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::browser::selectors::with_element;
use crate::browser::PageDriver;
use crate::error::{DriverError, SessionError};
use crate::models::{FieldMapping, FillStrategy, MappingSet, MappingSource};

/// Element facts gathered by the probe script
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldProbe {
    pub tag_name: String,
    pub input_type: String,
    pub role: String,
    pub input_mode: String,
    pub pattern: Option<String>,
    pub has_popup: String,
    pub in_custom_dropdown: bool,
    pub options_count: usize,
}

const PROBE_BODY: &str = r#"
    const attr = (name) => (el.getAttribute(name) || '').toLowerCase();
    const tag = el.tagName.toLowerCase();
    return {
        tagName: tag,
        inputType: tag === 'input' ? (attr('type') || 'text') : '',
        role: attr('role'),
        inputMode: attr('inputmode'),
        pattern: el.getAttribute('pattern'),
        hasPopup: attr('aria-haspopup'),
        inCustomDropdown: !!el.closest('[role="listbox"], [role="combobox"], [class*="dropdown"], [class*="select"]'),
        optionsCount: tag === 'select' ? el.options.length : 0,
    };
"#;

/// Script that returns a `FieldProbe` for `selector`, or `null` when it does not resolve
pub fn probe_script(selector: &str) -> String {
    with_element(selector, PROBE_BODY)
}

/// Pick the fill strategy a probed control needs
pub fn strategy_for(probe: &FieldProbe) -> FillStrategy {
    let tag = probe.tag_name.as_str();

    if tag == "select" {
        return FillStrategy::DropdownSelect;
    }

    let popup_list = matches!(probe.has_popup.as_str(), "listbox" | "menu");
    let dropdown_trigger = matches!(tag, "button" | "div" | "span") && probe.in_custom_dropdown;
    if matches!(probe.role.as_str(), "listbox" | "combobox") || popup_list || dropdown_trigger {
        return FillStrategy::CustomDropdown;
    }

    if tag != "input" {
        return FillStrategy::DirectType;
    }

    match probe.input_type.as_str() {
        "date" | "datetime-local" | "month" | "week" | "time" => FillStrategy::JsDateInput,
        "checkbox" => FillStrategy::CheckboxClick,
        "radio" => FillStrategy::RadioClick,
        "tel" => FillStrategy::CharByChar,
        _ if is_masked(probe) => FillStrategy::CharByChar,
        _ => FillStrategy::DirectType,
    }
}

/// Inputs whose value is shaped by a digit mask as it is typed
fn is_masked(probe: &FieldProbe) -> bool {
    let Some(pattern) = probe.pattern.as_deref().filter(|p| !p.is_empty()) else {
        return false;
    };
    matches!(probe.input_mode.as_str(), "tel" | "numeric")
        || pattern.contains("\\d")
        || pattern.contains("[0-9]")
}

pub struct LiveFieldAnalyzer {
    element_timeout: Duration,
    poll_interval: Duration,
}

impl LiveFieldAnalyzer {
    pub fn new() -> Self {
        Self {
            element_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(250),
        }
    }

    pub fn with_timeout(mut self, element_timeout: Duration) -> Self {
        self.element_timeout = element_timeout;
        self
    }

    /// Refine fill strategies by probing each mapping on the live page.
    ///
    /// The driver must already be open. `url` defaults to the set's
    /// `source_url`. Mappings whose selectors no longer resolve keep their
    /// strategy and are flagged stale; everything else is left as trained.
    pub async fn analyze(
        &self,
        driver: &dyn PageDriver,
        set: &MappingSet,
        url: Option<&str>,
    ) -> Result<MappingSet, SessionError> {
        let url = url.unwrap_or(&set.source_url);
        driver.navigate(url).await.map_err(|e| match e {
            DriverError::SessionLost(detail) => SessionError::BrowserLost(detail),
            other => SessionError::BrowserLaunch(format!("Could not open {}: {}", url, other)),
        })?;

        let mut analyzed = set.clone();
        let mut resolved = 0;
        for mapping in analyzed.mappings.iter_mut() {
            match self.probe(driver, mapping).await? {
                Some(probe) => {
                    let strategy = strategy_for(&probe);
                    tracing::debug!("{} -> {} ({})", mapping.selector, strategy.as_str(), probe.tag_name);
                    mapping.fill_strategy = strategy;
                    mapping.source = MappingSource::LiveAnalysis;
                    mapping.stale = false;
                    resolved += 1;
                }
                None => {
                    tracing::warn!("Selector {} did not resolve on {}, marking stale", mapping.selector, url);
                    mapping.stale = true;
                }
            }
        }

        tracing::info!(
            "Analyzed {}: {}/{} selectors resolved",
            analyzed.origin,
            resolved,
            analyzed.mappings.len()
        );
        Ok(analyzed)
    }

    /// Probe the selector chain until one candidate answers or the wait runs out
    async fn probe(&self, driver: &dyn PageDriver, mapping: &FieldMapping) -> Result<Option<FieldProbe>, SessionError> {
        let deadline = Instant::now() + self.element_timeout;
        loop {
            for selector in mapping.selector_chain() {
                match driver.evaluate(&probe_script(selector)).await {
                    Ok(value) if !value.is_null() => {
                        if let Ok(probe) = serde_json::from_value::<FieldProbe>(value) {
                            return Ok(Some(probe));
                        }
                    }
                    Ok(_) => {}
                    Err(DriverError::SessionLost(detail)) => return Err(SessionError::BrowserLost(detail)),
                    Err(e) => tracing::debug!("Probe of {} failed: {}", selector, e),
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl Default for LiveFieldAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
