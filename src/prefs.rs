//! Standing target-language preferences per (scope, user). The chat layer
//! usually backs this with its own settings storage; the default keeps
//! preferences in context memory so a bare engine still works.

use std::sync::Arc;

use async_trait::async_trait;

use crate::memory::ContextMemory;

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get_preference(&self, scope: &str, user: &str) -> Option<String>;
    async fn set_preference(&self, scope: &str, user: &str, code: &str);
}

/// Context-memory-backed preference store. Records carry no TTL: a standing
/// preference outlives conversational context.
pub struct MemoryPreferences {
    memory: Arc<ContextMemory>,
}

impl MemoryPreferences {
    pub fn new(memory: Arc<ContextMemory>) -> Self {
        Self { memory }
    }

    fn namespace(scope: &str) -> String {
        format!("prefs:{scope}")
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferences {
    async fn get_preference(&self, scope: &str, user: &str) -> Option<String> {
        self.memory
            .get(&Self::namespace(scope), user)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    async fn set_preference(&self, scope: &str, user: &str, code: &str) {
        self.memory.set(
            &Self::namespace(scope),
            user,
            serde_json::json!(code),
            None,
            None,
        );
    }
}
