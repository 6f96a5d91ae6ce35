//! Agent registry and dispatch.
//!
//! Maps agent names to implementations so a worktree's agent override (or
//! the engine default) can be resolved at dispatch time. Built-in agents
//! are registered lazily on first lookup; tests register doubles through
//! [`AgentRunner::register`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::{Agent, ClaudeCodeAgent, OpenCodeAgent};
use crate::{Error, Result};

/// Registry of available agents, keyed by name.
#[derive(Default)]
pub struct AgentRunner {
    registry: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRunner {
    /// Create an empty registry. Built-in agents are added on demand by
    /// [`AgentRunner::with_builtin_agents`] or explicit registration.
    pub fn new() -> Self {
        Self {
            registry: HashMap::new(),
        }
    }

    /// Create a registry with the built-in CLI agents that are actually
    /// installed on this machine. An agent whose binary is missing is
    /// simply not registered; resolving it later reports the available set.
    pub fn with_builtin_agents() -> Self {
        let mut runner = Self::new();
        if let Ok(agent) = ClaudeCodeAgent::new() {
            runner.register(Arc::new(agent));
        }
        if let Ok(agent) = OpenCodeAgent::new() {
            runner.register(Arc::new(agent));
        }
        runner
    }

    /// Register an agent under its own name. Replaces any previous entry.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.registry.insert(agent.name().to_string(), agent);
    }

    /// Resolve an agent by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Agent>> {
        self.registry.get(name).cloned().ok_or_else(|| {
            let mut available: Vec<&str> = self.registry.keys().map(String::as_str).collect();
            available.sort_unstable();
            Error::UnknownAgent {
                name: name.to_string(),
                available: if available.is_empty() {
                    "none".to_string()
                } else {
                    available.join(", ")
                },
            }
        })
    }

    /// Names of all registered agents.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}
