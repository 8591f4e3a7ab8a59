//! Asynchronous utilities for use with Tokio.
//!
//! Most of the async plumbing lives in the OCR pipeline itself. What's left
//! here is shared by several modules: checking the output of external
//! commands, and reading and writing records.

use std::{process::Output, sync::LazyLock};

use regex::Regex;

use crate::prelude::*;

pub mod io;

/// A default error regex for checking command output.
pub static DEFAULT_ERROR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error").expect("failed to compile regex"));

/// Report any command failures, and include any error output.
///
/// The output of standard error and standard output will be logged at
/// appropriate levels. And standard error may be optionally checked against a
/// predicate to determine if the command failed, for tools which print errors
/// but exit successfully.
pub fn check_for_command_failure(
    command_name: &str,
    output: &Output,
    is_error_line: Option<&dyn Fn(&str) -> bool>,
) -> Result<()> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    trace!(
        command_name = command_name,
        output = %String::from_utf8_lossy(&output.stdout),
        "Standard output from command"
    );
    if !stderr.trim().is_empty() {
        debug!(
            command_name = command_name,
            output = %stderr,
            "Standard error from command",
        );
    }

    if output.status.success() {
        if let Some(is_error_line) = is_error_line {
            if stderr.lines().any(is_error_line) {
                return Err(anyhow!(
                    "{} printed error output:\n{}",
                    command_name,
                    stderr,
                ));
            }
        }
        Ok(())
    } else if let Some(exit_code) = output.status.code() {
        Err(anyhow!(
            "{} failed with exit code {} and error output:\n{}",
            command_name,
            exit_code,
            stderr,
        ))
    } else {
        Err(anyhow!(
            "{} was terminated by a signal, with error output:\n{}",
            command_name,
            stderr,
        ))
    }
}
