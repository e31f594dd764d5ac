//! Question and SQL validation.
//!
//! Rejections are ordinary outcomes carrying a reason. Infrastructure failures
//! inside a validator never reject: the validator logs and lets the request
//! through.

pub mod post_validator;
pub mod pre_validator;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use post_validator::PostValidator;
pub use pre_validator::PreValidator;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub reason: String,
}

impl ValidationOutcome {
    pub fn accept(reason: impl Into<String>) -> Self {
        Self {
            valid: true,
            reason: reason.into(),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStage {
    PreValidation,
    PostValidation,
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationStage::PreValidation => write!(f, "pre-validation"),
            ValidationStage::PostValidation => write!(f, "post-validation"),
        }
    }
}
