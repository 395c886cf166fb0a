use thiserror::Error;

/// Errors that can occur while discovering the host topology.
///
/// These are all soft failures from the caller's perspective: `Topology`
/// falls back to conservative defaults rather than ever surfacing one of
/// these through `discover()`. The variants remain public so that
/// lower-level parsing helpers can report precisely what went wrong in
/// logs.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("failed to read sysfs path {path}: {source}")]
    SysfsRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse sysfs value at {path}: {value:?}")]
    SysfsParse { path: String, value: String },

    #[error("sysfs reported no hardware contexts under {0}")]
    EmptyHierarchy(String),

    #[error("host topology has no usable hardware contexts")]
    NoHardwareContexts,
}
