//! Built-in task executor.
//!
//! Produces typed outputs for each action type after a configurable
//! delay. It stands in for the document pipeline and the vendor and
//! compliance services, which live outside this workspace.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use parley_core::{
    ActionType, AgentAction, ComplianceReport, TaskOutput, Vendor,
};

use crate::traits::TaskExecutor;

/// Task executor that simulates work with a fixed latency.
#[derive(Debug, Clone)]
pub struct SimulatedTaskExecutor {
    latency: Duration,
}

impl SimulatedTaskExecutor {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    fn output_for(action: &AgentAction) -> TaskOutput {
        match action.action_type {
            ActionType::IdentifyVendors => TaskOutput::VendorList {
                vendors: vec![
                    Vendor {
                        name: "Northwind Federal Solutions".to_string(),
                        cage_code: Some("7X2K9".to_string()),
                        small_business: true,
                    },
                    Vendor {
                        name: "Contoso Government Services".to_string(),
                        cage_code: Some("4R8T1".to_string()),
                        small_business: false,
                    },
                    Vendor {
                        name: "Fabrikam Systems".to_string(),
                        cage_code: None,
                        small_business: true,
                    },
                ],
            },
            ActionType::MonitorCompliance => TaskOutput::ComplianceScore {
                report: ComplianceReport {
                    score: 87,
                    issues: vec!["Small business subcontracting plan not attached".to_string()],
                    recommendations: vec![
                        "Attach the subcontracting plan before submission".to_string(),
                    ],
                },
            },
            ActionType::GenerateDocuments => TaskOutput::Documents {
                names: vec![
                    "Statement of Work".to_string(),
                    "Independent Government Cost Estimate".to_string(),
                    "Market Research Report".to_string(),
                ],
            },
            ActionType::GatherMarketResearch => TaskOutput::Text {
                text: "Found 12 comparable awards in the last 24 months".to_string(),
            },
            ActionType::ScheduleReviews => TaskOutput::Text {
                text: "Technical and legal reviews scheduled for next week".to_string(),
            },
            ActionType::SubmitForApproval => TaskOutput::Text {
                text: "Package routed to the contracting officer".to_string(),
            },
        }
    }
}

impl Default for SimulatedTaskExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(1500))
    }
}

#[async_trait]
impl TaskExecutor for SimulatedTaskExecutor {
    async fn run(&self, action: &AgentAction) -> anyhow::Result<TaskOutput> {
        debug!(action = ?action.action_type, "Running simulated task");
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(Self::output_for(action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_output_variant_follows_action_type() {
        let executor = SimulatedTaskExecutor::new(Duration::ZERO);

        let vendors = executor
            .run(&AgentAction::new(ActionType::IdentifyVendors))
            .await
            .unwrap();
        assert!(matches!(vendors, TaskOutput::VendorList { ref vendors } if vendors.len() == 3));

        let compliance = executor
            .run(&AgentAction::new(ActionType::MonitorCompliance))
            .await
            .unwrap();
        assert!(matches!(compliance, TaskOutput::ComplianceScore { .. }));

        let research = executor
            .run(&AgentAction::new(ActionType::GatherMarketResearch))
            .await
            .unwrap();
        assert!(matches!(research, TaskOutput::Text { .. }));
    }
}
