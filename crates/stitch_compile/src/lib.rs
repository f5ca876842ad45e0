//! Incremental compile orchestration.
//!
//! A [`CompileTask`] is derived from a resolved module task, detected against
//! its stored baseline, and handed to a [`Compiler`] in full or incremental
//! mode. The baseline is only replaced after the compiler succeeds.

#![warn(missing_docs)]

pub mod compiler;
pub mod error;
pub mod naming;
pub mod orchestrator;
pub mod process;
pub mod task;

pub use compiler::{ChangedFile, CompileMode, CompileReport, CompileRequest, Compiler};
pub use error::CompileError;
pub use naming::NamingRule;
pub use orchestrator::{CompileOrchestrator, CompileOutcome};
pub use process::ProcessCompiler;
pub use task::{CompileTask, CLASSPATH_PROPERTY, SOURCES_PROPERTY};
