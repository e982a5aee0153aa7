//! Translation of recorder selector syntax into page-side lookups.
//!
//! Recorder exports mix plain CSS with prefixed forms (`aria/`, `xpath/`,
//! `pierce/`, `text/`). Every form is turned into a JavaScript expression that
//! evaluates to the matching element or `null`, so one code path can resolve,
//! probe and act on any candidate.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    Css,
    Aria,
    Xpath,
    Pierce,
    Text,
}

/// Split a recorder selector into its kind and body
pub fn parse(selector: &str) -> (SelectorKind, &str) {
    let selector = selector.trim();
    if let Some(body) = selector.strip_prefix("aria/") {
        (SelectorKind::Aria, body)
    } else if let Some(body) = selector.strip_prefix("xpath/") {
        (SelectorKind::Xpath, body)
    } else if let Some(body) = selector.strip_prefix("pierce/") {
        (SelectorKind::Pierce, body)
    } else if let Some(body) = selector.strip_prefix("text/") {
        (SelectorKind::Text, body)
    } else {
        (SelectorKind::Css, selector)
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Accessible name with any trailing `[role="..."]` qualifier removed
fn aria_name(body: &str) -> (&str, Option<&str>) {
    if let Some(start) = body.rfind("[role=\"") {
        if body.ends_with("\"]") {
            let role = &body[start + 7..body.len() - 2];
            return (body[..start].trim(), Some(role));
        }
    }
    (body.trim(), None)
}

const ARIA_LOOKUP: &str = r#"((name, role) => {
    const norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
    const wanted = norm(name);
    const nameOf = (el) => {
        const direct = el.getAttribute('aria-label');
        if (direct) return direct;
        const by = el.getAttribute('aria-labelledby');
        if (by) {
            const text = by.split(/\s+/).map(id => document.getElementById(id)).filter(Boolean).map(n => n.textContent).join(' ');
            if (text.trim()) return text;
        }
        if (el.labels && el.labels.length) return Array.from(el.labels).map(l => l.textContent).join(' ');
        if (el.id) {
            const label = document.querySelector('label[for="' + CSS.escape(el.id) + '"]');
            if (label) return label.textContent;
        }
        return el.getAttribute('placeholder') || el.getAttribute('title') || '';
    };
    const pool = document.querySelectorAll('input, select, textarea, button, a, [role], [aria-label], [contenteditable="true"]');
    for (const el of pool) {
        if (role && el.getAttribute('role') && el.getAttribute('role') !== role) continue;
        if (norm(nameOf(el)) === wanted) return el;
    }
    return null;
})"#;

const PIERCE_LOOKUP: &str = r#"((sel) => {
    const visit = (root) => {
        const hit = root.querySelector(sel);
        if (hit) return hit;
        for (const el of root.querySelectorAll('*')) {
            if (el.shadowRoot) {
                const found = visit(el.shadowRoot);
                if (found) return found;
            }
        }
        return null;
    };
    return visit(document);
})"#;

const TEXT_LOOKUP: &str = r#"((text) => {
    const wanted = text.replace(/\s+/g, ' ').trim();
    const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_ELEMENT);
    let best = null;
    while (walker.nextNode()) {
        const el = walker.currentNode;
        if ((el.textContent || '').replace(/\s+/g, ' ').trim() === wanted) best = el;
    }
    return best;
})"#;

/// JavaScript expression evaluating to the element addressed by `selector`, or `null`
pub fn element_expression(selector: &str) -> String {
    let (kind, body) = parse(selector);
    match kind {
        SelectorKind::Css => format!("document.querySelector({})", js_string(body)),
        SelectorKind::Xpath => format!(
            "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
            js_string(body)
        ),
        SelectorKind::Pierce => format!("{}({})", PIERCE_LOOKUP, js_string(body)),
        SelectorKind::Text => format!("{}({})", TEXT_LOOKUP, js_string(body)),
        SelectorKind::Aria => {
            let (name, role) = aria_name(body);
            let role = role.map(js_string).unwrap_or_else(|| "null".to_string());
            format!("{}({}, {})", ARIA_LOOKUP, js_string(name), role)
        }
    }
}

/// Wrap a function body so it runs against the resolved element.
///
/// `body` sees the element as `el` and is only run when it exists; the
/// script returns `null` otherwise.
pub fn with_element(selector: &str, body: &str) -> String {
    format!(
        "(() => {{ try {{ const el = {}; if (!el) return null; {} }} catch (e) {{ return null; }} }})()",
        element_expression(selector),
        body
    )
}
