// src/policy.rs
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;

use crate::types::UserOperation;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorshipDecision {
    pub is_sponsored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sponsorship_info: Option<serde_json::Value>,
}

impl SponsorshipDecision {
    pub fn sponsored(info: serde_json::Value) -> Self {
        Self { is_sponsored: true, reason: None, sponsorship_info: Some(info) }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self { is_sponsored: false, reason: Some(reason.into()), sponsorship_info: None }
    }
}

/// Sponsorship policy hook. Deployments substitute a real engine here
/// (sender allowlist, contract allowlist, rate limiting); the signing core
/// never looks inside the decision.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    async fn evaluate(&self, op: &UserOperation, chain_id: u64) -> SponsorshipDecision;
}

/// Sponsors every operation. Placeholder for deployments without policy
/// requirements; reports which checks were skipped so callers can tell.
pub struct PermissiveEngine;

#[async_trait]
impl PolicyEngine for PermissiveEngine {
    async fn evaluate(&self, _op: &UserOperation, chain_id: u64) -> SponsorshipDecision {
        SponsorshipDecision::sponsored(json!({
            "chainId": chain_id,
            "policiesApplied": [],
        }))
    }
}
