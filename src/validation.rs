//! Field-level validation for request and response records.
//!
//! Validators report every failing field at once, so that a caller can fix
//! all their mistakes in one pass.

use std::{error, fmt};

use schemars::JsonSchema;

use crate::prelude::*;

/// A problem with one field.
#[derive(Clone, Debug, JsonSchema, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// The field, using the same name as in the serialized record. Nested
    /// fields use dotted paths, like `mcqs[2].answer`.
    pub field: String,

    /// A human-readable message.
    pub message: String,
}

/// Every problem found while validating a record.
#[derive(Clone, Debug, Default, JsonSchema, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    /// The individual field errors, in the order they were found.
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Record a problem with `field`.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Record a problem with `field` if `failed` is true.
    pub fn check(
        &mut self,
        failed: bool,
        field: impl Into<String>,
        message: impl Into<String>,
    ) {
        if failed {
            self.add(field, message);
        }
    }

    /// Were there no problems?
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Convert to a [`Result`], failing if any problems were recorded.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, err) in self.errors.iter().enumerate() {
            if idx > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", err.message)?;
        }
        Ok(())
    }
}

impl error::Error for ValidationErrors {}

/// A record which can check its own contents.
pub trait Validate {
    /// Check every field, returning all the problems found.
    fn validate(&self) -> Result<(), ValidationErrors>;
}
