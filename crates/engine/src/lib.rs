//! `engine` crate — core domain models, DAG validation and scheduling, the
//! workflow runner, status broadcasting, and the workflow store.

pub mod models;
pub mod error;
pub mod dag;
pub mod events;
pub mod runner;
pub mod store;
pub mod templates;

pub use models::{
    Edge, ExecutionRecord, ExecutionState, Graph, Node, NodeResult, RunStatus,
    TerminationReason, Workflow, WorkflowDraft, WorkflowPatch,
};
pub use error::{GraphError, RunError, StoreError};
pub use dag::{order, validate, validate_dag, ValidatedGraph};
pub use events::{RunEvent, StatusBroadcaster};
pub use runner::{FailurePolicy, PreparedRun, RunOptions, RunSnapshot, RunnerConfig, WorkflowRunner};
pub use store::{SqlWorkflowStore, WorkflowStore};
