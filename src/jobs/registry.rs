use crate::jobs::JobHandler;
use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of job handlers by kind
#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: JobHandler>(&mut self, handler: H) {
        self.handlers.insert(handler.kind(), Arc::new(handler));
    }

    pub fn handler(&self, kind: &str) -> Result<Arc<dyn JobHandler>> {
        self.handlers
            .get(kind)
            .cloned()
            .ok_or_else(|| anyhow!("No handler registered for job kind: {}", kind))
    }

    pub fn registered_kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }
}
