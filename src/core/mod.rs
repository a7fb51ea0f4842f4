//! Core domain types.
//!
//! The classification record lives here, outside the agent layer, so the
//! `validate` command and library callers can check saved records without
//! touching any provider code.

pub mod record;

pub use record::{
    Classification, ClassificationRecord, CycleStage, EvaluatedDomain, Methodology,
    SchemaViolation, SdgGoal, UnknownLabel,
};
