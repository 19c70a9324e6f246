// src/stage/mod.rs

//! Pipeline stages as scheduled tasks.
//!
//! - [`table`] holds the hand-written stage dependency table.
//! - [`assembler`] turns that table into a [`crate::dag::TaskGraph`].
//! - [`executor`] is what each task node runs: it opens a run context and
//!   asks the pipeline runner to execute the node's stages.

pub mod assembler;
pub mod executor;
pub mod table;

pub use assembler::{GraphAssembler, StageOverrides};
pub use executor::{Invocation, StageExecutor};
pub use table::DependencyTable;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use crate::dag::{RetryPolicy, TaskGraph};
    use crate::errors::{Result, StagedagError};
    use crate::pipeline::{PipelineRunner, RunContext, Session};

    use super::{DependencyTable, GraphAssembler};

    /// Runner for graph-shape tests; nothing in those tests executes a stage.
    #[derive(Debug)]
    pub(crate) struct NoopRunner;

    impl PipelineRunner for NoopRunner {
        fn configure(&self, _package: &str) -> Result<()> {
            Ok(())
        }

        fn open_session(&self, _context: &RunContext) -> Result<Box<dyn Session>> {
            Err(StagedagError::ConfigError("noop runner cannot open sessions".into()))
        }
    }

    pub(crate) fn assembler(retry: RetryPolicy) -> GraphAssembler {
        GraphAssembler::new("pkg", RunContext::new(".", "test"), Arc::new(NoopRunner))
            .with_default_retry(retry)
    }

    pub(crate) fn graph_from_table(table: &DependencyTable, retry: RetryPolicy) -> TaskGraph {
        assembler(retry)
            .assemble(table)
            .expect("test table should assemble")
    }
}
