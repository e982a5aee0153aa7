use std::time::Duration;

use crate::models::StepKind;

/// Settle time after each executed step, by step kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pacing {
    pub after_navigate: Duration,
    pub after_change: Duration,
    pub after_click: Duration,
    pub after_other: Duration,
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            after_navigate: Duration::ZERO,
            after_change: Duration::ZERO,
            after_click: Duration::ZERO,
            after_other: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, kind: &StepKind) -> Duration {
        match kind {
            StepKind::Navigate => self.after_navigate,
            StepKind::Change => self.after_change,
            StepKind::Click => self.after_click,
            StepKind::KeyEvent | StepKind::SetViewport => self.after_other,
            StepKind::Unsupported(_) => Duration::ZERO,
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            after_navigate: Duration::from_millis(1500),
            after_change: Duration::from_millis(500),
            after_click: Duration::from_millis(300),
            after_other: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_loads_wait_longest() {
        let pacing = Pacing::default();
        assert!(pacing.delay_for(&StepKind::Navigate) > pacing.delay_for(&StepKind::Click));
        assert!(pacing.delay_for(&StepKind::Change) > pacing.delay_for(&StepKind::Click));
        assert_eq!(pacing.delay_for(&StepKind::Unsupported("hover".to_string())), Duration::ZERO);
    }
}
