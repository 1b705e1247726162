//! Permission gate boundary
//!
//! Tool execution is authorized by an external trust gate. The delegation
//! core resolves the gate before running and treats its absence as a fatal
//! configuration error; it does not implement permission logic itself.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

/// Context handed to the gate alongside each check.
#[derive(Debug, Clone)]
pub struct PermissionContext {
    /// Call id of the delegation issuing the tool call
    pub call_id: String,
    /// Agent type of the delegate issuing the tool call
    pub agent_type: String,
    /// Nesting depth of the delegate
    pub depth: u32,
}

/// Authorizes individual tool executions.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Check whether `tool_name` may run with `input`.
    ///
    /// Returns `Ok(())` when granted; `Err(Error::PermissionDenied)` otherwise.
    async fn check(
        &self,
        tool_name: &str,
        input: &JsonValue,
        context: &PermissionContext,
    ) -> Result<()>;
}

/// Gate that grants everything. Default for trusted environments and tests.
pub struct AllowAllGate;

#[async_trait]
impl PermissionGate for AllowAllGate {
    async fn check(
        &self,
        _tool_name: &str,
        _input: &JsonValue,
        _context: &PermissionContext,
    ) -> Result<()> {
        Ok(())
    }
}

/// Gate that denies a fixed set of tool names. Useful for tests and for
/// hard-blocking tools regardless of allow-lists.
pub struct DenyListGate {
    denied: Vec<String>,
}

impl DenyListGate {
    pub fn new(denied: Vec<String>) -> Self {
        Self { denied }
    }
}

#[async_trait]
impl PermissionGate for DenyListGate {
    async fn check(
        &self,
        tool_name: &str,
        _input: &JsonValue,
        _context: &PermissionContext,
    ) -> Result<()> {
        if self.denied.iter().any(|d| d == tool_name) {
            return Err(Error::PermissionDenied {
                tool: tool_name.to_string(),
                reason: "tool is deny-listed".to_string(),
            });
        }
        Ok(())
    }
}
