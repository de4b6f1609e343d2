//! One-time service resolution
//!
//! Detours resolve the framework's collaborators on their first call rather
//! than at install time. Resolution runs exactly once even when the first
//! presents arrive concurrently; late arrivals block until it finishes and
//! then see the same outcome. A failed resolution is never retried.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use framehook_engine::Framework;

/// Produces the framework's collaborators, or `None` if unavailable
pub type ServiceResolver = Box<dyn Fn() -> Option<Arc<Framework>> + Send + Sync>;

pub struct ServiceCell {
    resolver: ServiceResolver,
    resolved: OnceLock<Option<Arc<Framework>>>,
    failure_logged: AtomicBool,
}

impl ServiceCell {
    pub fn new(resolver: ServiceResolver) -> Self {
        Self {
            resolver,
            resolved: OnceLock::new(),
            failure_logged: AtomicBool::new(false),
        }
    }

    /// Collaborators, resolving them on first use
    pub fn get(&self) -> Option<&Framework> {
        let resolved = self.resolved.get_or_init(|| {
            let framework = (self.resolver)();
            if framework.is_some() {
                tracing::info!("Framework services resolved");
            }
            framework
        });

        match resolved {
            Some(framework) => Some(framework.as_ref()),
            None => {
                if !self.failure_logged.swap(true, Ordering::Relaxed) {
                    tracing::error!("Framework services unavailable, passing frames through");
                }
                None
            }
        }
    }

    /// Whether resolution has run, successfully or not
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }
}
