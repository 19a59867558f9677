//! Leave approval flow: chain resolution, numbering, the request state
//! machine and the read-side queries.

pub mod chain;
pub mod engine;
pub mod numbering;
pub mod query;

pub use chain::{ApprovalChainBuilder, ApprovalOrder};
pub use engine::{LeaveForm, LeaveWorkflow};
pub use numbering::{NumberingStrategy, RequestNumbering};
pub use query::{LeaveQueries, LeaveQuery, QueryRole};

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub apply_number_prefix: String,
    pub numbering: NumberingStrategy,
    pub numbering_max_attempts: u32,
    pub approval_order: ApprovalOrder,
    pub max_page_size: u64,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            apply_number_prefix: "XJ".to_string(),
            numbering: NumberingStrategy::Counter,
            numbering_max_attempts: 5,
            approval_order: ApprovalOrder::Forward,
            max_page_size: 100,
        }
    }
}
