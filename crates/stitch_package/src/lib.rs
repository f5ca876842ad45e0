//! Packaging of compiled outputs and the cross-module merge rendezvous.
//!
//! Each module packages its freshly compiled outputs into a fragment and
//! reports it to a shared [`Rendezvous`]. When every module of the build
//! has reported, the distinct fragments are merged into one artifact.

#![warn(missing_docs)]

pub mod error;
pub mod packager;
pub mod rendezvous;

pub use error::{MergeError, PackageError};
pub use packager::{package_module, ModuleArtifact, Packager, ProcessPackager};
pub use rendezvous::{Rendezvous, ReportOutcome};
