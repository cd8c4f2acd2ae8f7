//! Translation policy tree: guild < channel < user, most-specific wins as a
//! whole. Lookup is pure in-memory; a missing policy means engine defaults,
//! never an error. A policy whose fallback language is blocked by its own
//! blocked set is rejected at write time.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Scope/channel/user-attached translation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Substitute target when the resolved one is blocked.
    pub fallback_lang: String,
    /// Whether source auto-detection runs for this scope.
    pub auto_detect: bool,
    /// Provider ids tried in order before the static default ordering.
    pub preferred_providers: Vec<String>,
    /// Language codes that must never be targeted.
    pub blocked_langs: HashSet<String>,
    /// Whether inline translate commands are honored in this scope.
    pub inline_commands: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            fallback_lang: "en".to_string(),
            auto_detect: true,
            preferred_providers: Vec::new(),
            blocked_langs: HashSet::new(),
            inline_commands: true,
        }
    }
}

impl Policy {
    pub fn allows(&self, code: &str) -> bool {
        !self.blocked_langs.contains(code)
    }

    fn validate(&self) -> Result<(), PolicyError> {
        if !self.allows(&self.fallback_lang) {
            return Err(PolicyError::FallbackBlocked {
                lang: self.fallback_lang.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum PolicyError {
    /// The fallback language is in the policy's own blocked set.
    FallbackBlocked { lang: String },
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::FallbackBlocked { lang } => {
                write!(f, "fallback language {lang:?} is blocked by the same policy")
            }
        }
    }
}

/// In-memory policy repository with most-specific-wins resolution.
pub struct PolicyStore {
    scope: RwLock<HashMap<String, Policy>>,
    channel: RwLock<HashMap<(String, String), Policy>>,
    user: RwLock<HashMap<(String, String), Policy>>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self {
            scope: RwLock::new(HashMap::new()),
            channel: RwLock::new(HashMap::new()),
            user: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve the effective policy. The first level with an explicit entry
    /// wins outright; there is no field-level merging.
    pub fn get(&self, scope: &str, channel: Option<&str>, user: Option<&str>) -> Option<Policy> {
        if let (Some(_), Some(user)) = (channel, user) {
            if let Some(p) = self
                .user
                .read()
                .get(&(scope.to_string(), user.to_string()))
            {
                return Some(p.clone());
            }
        }
        if let Some(channel) = channel {
            if let Some(p) = self
                .channel
                .read()
                .get(&(scope.to_string(), channel.to_string()))
            {
                return Some(p.clone());
            }
        }
        self.scope.read().get(scope).cloned()
    }

    pub fn set_scope(&self, scope: &str, policy: Policy) -> Result<(), PolicyError> {
        policy.validate()?;
        self.scope.write().insert(scope.to_string(), policy);
        Ok(())
    }

    pub fn set_channel(
        &self,
        scope: &str,
        channel: &str,
        policy: Policy,
    ) -> Result<(), PolicyError> {
        policy.validate()?;
        self.channel
            .write()
            .insert((scope.to_string(), channel.to_string()), policy);
        Ok(())
    }

    pub fn set_user(&self, scope: &str, user: &str, policy: Policy) -> Result<(), PolicyError> {
        policy.validate()?;
        self.user
            .write()
            .insert((scope.to_string(), user.to_string()), policy);
        Ok(())
    }

    pub fn remove_scope(&self, scope: &str) {
        self.scope.write().remove(scope);
    }

    pub fn remove_channel(&self, scope: &str, channel: &str) {
        self.channel
            .write()
            .remove(&(scope.to_string(), channel.to_string()));
    }

    pub fn remove_user(&self, scope: &str, user: &str) {
        self.user
            .write()
            .remove(&(scope.to_string(), user.to_string()));
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}
