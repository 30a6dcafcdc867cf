//! Workflow handlers
//!
//! One handler per workflow family. The engine dispatches to the first
//! registered handler claiming a type.

pub mod event;
pub mod http;
pub mod integration;
pub mod messaging;
pub mod pipeline;
pub mod scheduler;
pub mod statemachine;

pub use event::*;
pub use http::*;
pub use integration::*;
pub use messaging::*;
pub use pipeline::*;
pub use scheduler::*;
pub use statemachine::*;

use std::sync::Arc;

use crate::handler::{WireContext, WorkflowHandler};

/// The seven core handlers, in dispatch order
#[must_use]
pub fn default_handlers(ctx: &WireContext) -> Vec<Arc<dyn WorkflowHandler>> {
    vec![
        Arc::new(HttpWorkflowHandler::new(ctx.clone())),
        Arc::new(MessagingWorkflowHandler::new()),
        Arc::new(StateMachineWorkflowHandler::new()),
        Arc::new(SchedulerWorkflowHandler::new()),
        Arc::new(EventWorkflowHandler::new()),
        Arc::new(PipelineWorkflowHandler::new(ctx.pipelines.clone())),
        Arc::new(IntegrationWorkflowHandler::new()),
    ]
}
