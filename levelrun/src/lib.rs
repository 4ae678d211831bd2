//! Per-level automation for coding-contest rounds.
//!
//! `levelrun <N>` unpacks `level{N}.zip`, turns the statement into an assistant
//! prompt, routes sample files into `Inputs/`/`Outputs/`, obtains a solution (a
//! human, an AI CLI, or a template), runs it on every input and cleans up. The
//! crate keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (classification, naming, state
//!   machine rules, containment checks). No I/O.
//! - **[`io`]**: Side-effecting components (filesystem, archives, child
//!   processes, assistants). Collaborators sit behind traits so tests can
//!   script them.
//!
//! [`workflow`] coordinates both to implement one run; [`report`] turns the
//! result into terminal output and an exit code.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod report;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workflow;
