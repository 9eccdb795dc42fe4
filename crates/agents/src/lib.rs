//! `agents` crate — the `AgentExecutor` capability and its implementations.
//!
//! The engine never spawns processes itself; every node is dispatched through
//! an [`AgentExecutor`] trait object.

pub mod catalog;
pub mod error;
pub mod mock;
pub mod process;
pub mod timeout;
pub mod traits;

pub use catalog::{AgentCatalog, AgentInfo};
pub use error::ExecutorError;
pub use process::{ProcessExecutor, ProcessExecutorConfig};
pub use timeout::TimeoutExecutor;
pub use traits::{AgentExecutor, AgentOutput};
