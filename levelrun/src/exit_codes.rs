//! Stable exit codes for the levelrun CLI.

/// Success, or partial success with at least one output produced.
pub const OK: i32 = 0;
/// Run aborted (missing archive, corrupt archive, organize conflict, missing
/// solution without waiting, cleanup violation) or invalid invocation/config.
pub const ABORTED: i32 = 1;
/// Partial success where no input produced output.
pub const NO_OUTPUT: i32 = 2;
/// Paused waiting for a solution; re-run to continue.
pub const PAUSED: i32 = 3;
