//! Client configuration
//!
//! `LogtoConfig` is assembled with builder methods and then frozen inside the
//! client. Scopes are normalized on every write so the reserved scopes are
//! always requested.

use logto_auth::{DEFAULT_PROMPT, RESERVED_SCOPES};

/// Configuration for one Logto application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogtoConfig {
    endpoint: String,
    app_id: String,
    scopes: Vec<String>,
    resources: Vec<String>,
    prompt: String,
    using_persist_storage: bool,
}

impl LogtoConfig {
    /// Config for a tenant endpoint and application id, with default scopes
    /// and the `consent` prompt.
    pub fn new(endpoint: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            app_id: app_id.into(),
            scopes: with_reserved_scopes(std::iter::empty::<String>()),
            resources: Vec::new(),
            prompt: DEFAULT_PROMPT.to_string(),
            using_persist_storage: false,
        }
    }

    /// Additional scopes to request; reserved scopes are always kept first.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = with_reserved_scopes(scopes);
        self
    }

    /// API resource indicators to request access to.
    pub fn with_resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources = Vec::new();
        for resource in resources {
            let resource = resource.into();
            if !self.resources.contains(&resource) {
                self.resources.push(resource);
            }
        }
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Whether the host should keep tokens in durable storage across restarts.
    pub fn with_persist_storage(mut self, persist: bool) -> Self {
        self.using_persist_storage = persist;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn using_persist_storage(&self) -> bool {
        self.using_persist_storage
    }
}

/// Reserved scopes followed by `scopes`, order preserving, without duplicates.
pub fn with_reserved_scopes<I, S>(scopes: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut merged: Vec<String> = RESERVED_SCOPES.iter().map(|s| s.to_string()).collect();
    for scope in scopes {
        let scope = scope.into();
        if !scope.is_empty() && !merged.contains(&scope) {
            merged.push(scope);
        }
    }
    merged
}
