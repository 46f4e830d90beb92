//! Signals from the hosting environment: page visibility and autoplay policy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// "Is the document currently visible"
pub trait Visibility: Send + Sync {
    fn is_visible(&self) -> bool;
}

/// Visibility flag shared between the environment and the controller
#[derive(Debug, Clone)]
pub struct SharedVisibility {
    visible: Arc<AtomicBool>,
}

impl SharedVisibility {
    pub fn new(visible: bool) -> Self {
        Self {
            visible: Arc::new(AtomicBool::new(visible)),
        }
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Relaxed);
    }
}

impl Default for SharedVisibility {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Visibility for SharedVisibility {
    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }
}

/// Best-effort probe for whether unattended playback may start
pub trait AutoplayProbe {
    fn can_autoplay(&self) -> bool;
}

impl<F: Fn() -> bool> AutoplayProbe for F {
    fn can_autoplay(&self) -> bool {
        self()
    }
}

/// Fixed autoplay answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoplayPolicy {
    Allowed,
    Blocked,
}

impl AutoplayProbe for AutoplayPolicy {
    fn can_autoplay(&self) -> bool {
        matches!(self, AutoplayPolicy::Allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_visibility() {
        let visibility = SharedVisibility::default();
        let observer = visibility.clone();
        assert!(observer.is_visible());

        visibility.set_visible(false);
        assert!(!observer.is_visible());
    }

    #[test]
    fn test_autoplay_probes() {
        assert!(AutoplayPolicy::Allowed.can_autoplay());
        assert!(!AutoplayPolicy::Blocked.can_autoplay());
        assert!((|| true).can_autoplay());
    }
}
