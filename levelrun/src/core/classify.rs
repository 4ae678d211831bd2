//! Deterministic classification and naming of contest files.

use std::path::Path;

use crate::core::types::{Bucket, Level};

const INPUT_EXTENSION: &str = "in";
const OUTPUT_EXTENSION: &str = "out";
const ACTUAL_SUFFIX: &str = ".actual";

/// Classify a staged file into `Inputs` / `Outputs` by extension.
///
/// - `.in` files are sample or judge inputs.
/// - `.out` files are the expected outputs shipped for samples.
/// - Everything else (statement, images, stray files) stays in staging.
///
/// Extension matching is ASCII case-insensitive.
pub fn classify(file_name: &str) -> Option<Bucket> {
    let extension = Path::new(file_name).extension()?.to_str()?;
    if extension.eq_ignore_ascii_case(INPUT_EXTENSION) {
        Some(Bucket::Inputs)
    } else if extension.eq_ignore_ascii_case(OUTPUT_EXTENSION) {
        Some(Bucket::Outputs)
    } else {
        None
    }
}

/// Name a file gets once routed: prefixed with `level{N}_` unless it already is,
/// so files of different rounds never collide in the shared directories.
///
/// A routed `.in`/`.out` extension is lowercased, so `x.IN` lands as
/// `level{N}_x.in` and the runner sees it like any other input.
pub fn routed_name(level: Level, file_name: &str) -> String {
    let prefix = level.file_prefix();
    let name = match classify(file_name) {
        Some(Bucket::Inputs) => format!("{}.{INPUT_EXTENSION}", stem(file_name)),
        Some(Bucket::Outputs) => format!("{}.{OUTPUT_EXTENSION}", stem(file_name)),
        None => file_name.to_string(),
    };
    if name.starts_with(&prefix) {
        name
    } else {
        format!("{prefix}{name}")
    }
}

/// File name without its final extension (`level1_2.in` -> `level1_2`).
pub fn stem(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    }
}

/// Output name derived from an input name (`level1_2.in` -> `level1_2.out`).
pub fn output_name_for_input(input_name: &str) -> String {
    format!("{}.{OUTPUT_EXTENSION}", stem(input_name))
}

/// Where a produced output goes when `<stem>.out` is a shipped sample.
pub fn actual_output_name(input_name: &str) -> String {
    format!("{}{ACTUAL_SUFFIX}.{OUTPUT_EXTENSION}", stem(input_name))
}

/// True for outputs written by the solution runner next to a sample.
pub fn is_actual_output(file_name: &str) -> bool {
    stem(file_name).ends_with(ACTUAL_SUFFIX)
}
