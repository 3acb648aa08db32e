//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.
//! A run where every resource was created, updated or skipped exits 0.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Values error - a value file or --set argument could not be used
pub const VALUES_ERROR: i32 = 2;

/// Template error - rendering failed or did not converge
pub const TEMPLATE_ERROR: i32 = 3;

/// Manifest error - the rendered output is not a valid resource stream
pub const MANIFEST_ERROR: i32 = 4;

/// IO error - template file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Cluster error - credentials could not be loaded or the server was unreachable
pub const CLUSTER_ERROR: i32 = 6;

/// Partial failure - the apply ran but at least one resource failed
pub const PARTIAL_FAILURE: i32 = 7;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
