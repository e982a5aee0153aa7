use chrono::NaiveDate;
use serde_json::Value;
use std::time::Duration;

use crate::browser::selectors::with_element;
use crate::browser::PageDriver;
use crate::config::ReplayOptions;
use crate::error::DriverError;
use crate::models::FillStrategy;

/// Time for a custom dropdown to render its options after opening
const DROPDOWN_SETTLE: Duration = Duration::from_millis(300);

/// Set `value` on the control at `selector` the way `strategy` requires
pub async fn fill(
    driver: &dyn PageDriver,
    selector: &str,
    strategy: FillStrategy,
    value: &str,
    options: &ReplayOptions,
) -> Result<(), DriverError> {
    match strategy {
        FillStrategy::DirectType => {
            driver.clear(selector).await?;
            driver.type_text(selector, value).await
        }
        FillStrategy::CharByChar => type_slowly(driver, selector, value, options.char_delay).await,
        FillStrategy::DropdownSelect => select_option(driver, selector, value).await,
        FillStrategy::CustomDropdown => pick_custom_option(driver, selector, value).await,
        FillStrategy::JsDateInput => set_date(driver, selector, value).await,
        FillStrategy::CheckboxClick => set_checked(driver, selector, is_truthy(value), true).await,
        FillStrategy::RadioClick => set_checked(driver, selector, is_truthy(value), false).await,
    }
}

/// Masked inputs reformat on every keystroke, so feed them one key at a time.
/// The field is focused once; clicking again would move the caret.
async fn type_slowly(driver: &dyn PageDriver, selector: &str, value: &str, delay: Duration) -> Result<(), DriverError> {
    driver.click(selector).await?;
    driver.clear(selector).await?;
    let mut buf = [0u8; 4];
    for c in value.chars() {
        driver.send_keys(c.encode_utf8(&mut buf)).await?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    Ok(())
}

const SELECT_OPTION: &str = r#"
    const wanted = __VALUE__.trim().toLowerCase();
    const options = Array.from(el.options || []);
    const norm = (s) => (s || '').trim().toLowerCase();
    const match = options.find(o => norm(o.value) === wanted)
        || options.find(o => norm(o.text) === wanted)
        || options.find(o => norm(o.text).startsWith(wanted));
    if (!match) return false;
    el.value = match.value;
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
"#;

async fn select_option(driver: &dyn PageDriver, selector: &str, value: &str) -> Result<(), DriverError> {
    let script = with_element(selector, &SELECT_OPTION.replace("__VALUE__", &js_string(value)));
    match driver.evaluate(&script).await? {
        Value::Bool(true) => Ok(()),
        Value::Null => Err(DriverError::ElementNotFound(selector.to_string())),
        _ => Err(DriverError::Automation(format!("No option matching '{}' in {}", value, selector))),
    }
}

/// Open a scripted dropdown and click the entry whose text is `value`
async fn pick_custom_option(driver: &dyn PageDriver, selector: &str, value: &str) -> Result<(), DriverError> {
    driver.click(selector).await?;
    tokio::time::sleep(DROPDOWN_SETTLE).await;

    let quoted = value.replace('"', "\\\"");
    let candidates = [
        format!("aria/{}[role=\"option\"]", value),
        format!("[role=\"option\"][data-value=\"{}\"]", quoted),
        format!("[data-value=\"{}\"]", quoted),
        format!("text/{}", value),
    ];
    for option in &candidates {
        if driver.exists(option).await? {
            return driver.click(option).await;
        }
    }
    Err(DriverError::Automation(format!("Option '{}' not found after opening {}", value, selector)))
}

const SET_VALUE: &str = r#"
    el.value = __VALUE__;
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
"#;

/// Native date pickers ignore typed input, so write the ISO value directly
async fn set_date(driver: &dyn PageDriver, selector: &str, value: &str) -> Result<(), DriverError> {
    let iso = to_iso_date(value).unwrap_or_else(|| value.trim().to_string());
    let script = with_element(selector, &SET_VALUE.replace("__VALUE__", &js_string(&iso)));
    match driver.evaluate(&script).await? {
        Value::Null => Err(DriverError::ElementNotFound(selector.to_string())),
        _ => Ok(()),
    }
}

/// Click a checkbox or radio only when its state differs from the wanted one.
/// A radio cannot be cleared by clicking it, so a falsey value leaves it alone.
async fn set_checked(driver: &dyn PageDriver, selector: &str, wanted: bool, can_clear: bool) -> Result<(), DriverError> {
    let checked = match driver.evaluate(&with_element(selector, "return !!el.checked;")).await? {
        Value::Bool(checked) => checked,
        Value::Null => return Err(DriverError::ElementNotFound(selector.to_string())),
        other => return Err(DriverError::Automation(format!("Unexpected checked state {}", other))),
    };

    if checked == wanted || (!wanted && !can_clear) {
        return Ok(());
    }
    driver.click(selector).await
}

/// Interpret a profile value as a checkbox state. Any other non-empty value
/// (a radio's option label, say) counts as selecting the control.
pub fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_lowercase().as_str(),
        "" | "false" | "no" | "n" | "0" | "off" | "unchecked"
    )
}

/// Convert common date spellings to the `YYYY-MM-DD` form date inputs accept
pub fn to_iso_date(value: &str) -> Option<String> {
    const FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%B %d, %Y", "%d %B %Y"];
    let trimmed = value.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .map(|date| date.format("%Y-%m-%d").to_string())
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}
