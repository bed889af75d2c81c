//! Centralized environment variable names, default values and fixed artifact paths.

// Environment variable names
pub const ENV_KEEP_INTERMEDIATES: &str = "JOBJAR_KEEP_INTERMEDIATES";
pub const ENV_LOCAL_THREADS: &str = "JOBJAR_LOCAL_THREADS";
pub const ENV_NUM_REDUCERS: &str = "JOBJAR_NUM_REDUCERS";
pub const ENV_MAX_ATTEMPTS: &str = "JOBJAR_MAX_ATTEMPTS";
pub const ENV_FLUSH_BYTES: &str = "JOBJAR_FLUSH_BYTES";
pub const ENV_WRITER_QUEUE_CAP: &str = "JOBJAR_WRITER_QUEUE_CAP";
/// Directory the runner treats as the unpacked artifact root
pub const ENV_ARTIFACT_ROOT: &str = "JOBJAR_ARTIFACT_ROOT";

// Defaults
pub const DEFAULT_NUM_REDUCERS: usize = 1;
// Local mode does not retry, same as a single-node host
pub const DEFAULT_MAX_ATTEMPTS: usize = 1;
pub const DEFAULT_FLUSH_BYTES: usize = 4 * 1024 * 1024; // 4 MiB
pub const DEFAULT_WRITER_QUEUE_CAP: usize = 1024;

// Artifact layout
/// Directory every embedded library is placed under.
pub const LIBRARY_ROOT: &str = "gems";
/// Directory holding the embedded runtime and extra archives.
pub const ARCHIVE_DIR: &str = "lib";
/// Generated bootstrap script, loaded first by the runner.
pub const BOOTSTRAP_PATH: &str = "setup_load_path";
/// Fixed location of the job runner inside the artifact.
pub const ENTRY_POINT_PATH: &str = "jobjar/job_runner";
pub const MANIFEST_PATH: &str = "META-INF/manifest.json";
/// Name the support library is embedded under.
pub const SUPPORT_LIBRARY_NAME: &str = "jobjar";
pub const SUPPORT_LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Descriptor written into the support library's `lib` directory.
pub const SUPPORT_DESCRIPTOR: &str = "jobjar.toml";

// Host output layout
pub const TEMPORARY_DIR: &str = "_temporary";
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Counter group the engine reports its own record counts under.
pub const FRAMEWORK_COUNTER_GROUP: &str = "framework";
