//! Rebuilds each student's academic journeys, milestones and overall
//! progression from raw enrollment history.
//!
//! The pipeline per student is: group enrollments by term, classify each
//! term, segment terms into periods, evaluate graduation per period, then
//! assemble journeys and fold them into a progression. [`batch`] runs that
//! pipeline for many students against a [`store::ProgressionStore`].

pub mod batch;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod course;
pub mod db;
pub mod engine;
pub mod error;
pub mod graduation;
pub mod journey;
pub mod major;
pub mod models;
pub mod registry;
pub mod report;
pub mod segment;
pub mod store;
pub mod telemetry;

pub use engine::ProgressionEngine;
pub use error::{EngineError, StoreError};
pub use models::{EnrollmentRecord, Journey, Milestone, Progression, StudentOutput};
