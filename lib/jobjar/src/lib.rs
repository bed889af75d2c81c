pub mod api;
pub mod bootstrap;
pub mod codec;
pub mod constants;
pub mod container;
pub mod context;
pub mod error;
pub mod host;
pub mod io;
pub mod job;
pub mod launcher;
pub mod packager;
pub mod proxy;
pub mod registry;
pub mod runner;
pub mod runtime;
pub mod sort;
pub mod stats;
pub mod utils;
pub mod value;
pub mod writable;
pub mod writer;

pub use api::{CompareLogic, Emitter, MapLogic, PartitionLogic, ProjectionComparator, ProjectionPartitioner, ReduceLogic, Values};
pub use context::{Counters, TaskContext};
pub use error::JobjarError;
pub use job::{JobDescription, JobSpec};
pub use packager::{PackageConfig, PackagedArtifact, Packager};
pub use registry::JobRegistry;
pub use runner::JobRunner;
pub use runtime::{JobSubmission, LocalCluster};
pub use stats::JobReport;
pub use value::Value;
pub use writable::Writable;
