//! Bounded-parallel rebuild of many students.
//!
//! Every student runs on its own task so an error or a panic is attributed
//! to that student and the batch keeps going. Cancelling stops new students
//! from starting; the ones already running finish and commit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::engine::ProgressionEngine;
use crate::error::{EngineError, StoreError};
use crate::store::ProgressionStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudentOutcome {
    Built,
    InsufficientData,
    Failed(String),
    Skipped,
}

#[derive(Debug, thiserror::Error)]
pub enum StudentError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub built: usize,
    pub insufficient_data: Vec<Uuid>,
    pub failed: Vec<(Uuid, String)>,
    pub skipped: usize,
}

impl BatchSummary {
    pub fn processed(&self) -> usize {
        self.built + self.insufficient_data.len() + self.failed.len()
    }

    fn record(&mut self, student_id: Uuid, outcome: StudentOutcome) {
        match outcome {
            StudentOutcome::Built => self.built += 1,
            StudentOutcome::InsufficientData => self.insufficient_data.push(student_id),
            StudentOutcome::Failed(reason) => self.failed.push((student_id, reason)),
            StudentOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Rebuilds one student: load, compute, then replace the stored output.
pub async fn rebuild_student<S: ProgressionStore + ?Sized>(
    store: &S,
    engine: &ProgressionEngine,
    student_id: Uuid,
    as_of: NaiveDate,
) -> Result<StudentOutcome, StudentError> {
    let enrollments = store.enrollments(student_id).await?;

    match engine.build(student_id, &enrollments, as_of) {
        Ok(output) => {
            store.replace_output(&output).await?;
            Ok(StudentOutcome::Built)
        }
        Err(EngineError::InsufficientData(_)) => {
            tracing::warn!(
                student_id = %student_id,
                "No enrollments on record, clearing previous progression"
            );
            store.clear_output(student_id).await?;
            Ok(StudentOutcome::InsufficientData)
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn run_batch<S>(
    store: Arc<S>,
    engine: ProgressionEngine,
    students: Vec<Uuid>,
    as_of: NaiveDate,
    concurrency: usize,
    cancel: CancellationToken,
) -> BatchSummary
where
    S: ProgressionStore + 'static,
{
    let total = students.len();
    let completed = Arc::new(AtomicUsize::new(0));

    tracing::info!(
        students = total,
        concurrency,
        as_of = %as_of,
        "Starting progression rebuild"
    );

    let outcomes: Vec<(Uuid, StudentOutcome)> = stream::iter(students)
        .map(|student_id| {
            let store = store.clone();
            let engine = engine.clone();
            let cancel = cancel.clone();
            let completed = completed.clone();

            async move {
                if cancel.is_cancelled() {
                    return (student_id, StudentOutcome::Skipped);
                }

                let handle = tokio::spawn(async move {
                    rebuild_student(store.as_ref(), &engine, student_id, as_of).await
                });

                let outcome = match handle.await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(err)) => {
                        tracing::error!(student_id = %student_id, error = %err, "Student rebuild failed");
                        StudentOutcome::Failed(err.to_string())
                    }
                    Err(join_err) => {
                        tracing::error!(student_id = %student_id, error = %join_err, "Student worker aborted");
                        StudentOutcome::Failed(format!("worker aborted: {join_err}"))
                    }
                };

                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if done % 100 == 0 || done == total {
                    tracing::info!(progress = format!("{done}/{total}"), "Rebuild progress");
                }

                (student_id, outcome)
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut summary = BatchSummary::default();
    for (student_id, outcome) in outcomes {
        summary.record(student_id, outcome);
    }
    summary.insufficient_data.sort();
    summary.failed.sort();

    tracing::info!(
        built = summary.built,
        insufficient_data = summary.insufficient_data.len(),
        failed = summary.failed.len(),
        skipped = summary.skipped,
        "Progression rebuild finished"
    );

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SignatureCatalog;
    use crate::config::EngineSettings;
    use crate::models::{EnrollmentRecord, EnrollmentStatus, Term};
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn engine() -> ProgressionEngine {
        let catalog = SignatureCatalog::builtin().expect("builtin catalog");
        let registry = Arc::new(catalog.reference_registry());
        ProgressionEngine::new(Arc::new(catalog), registry, Arc::new(EngineSettings::default()))
    }

    fn history(student_id: Uuid) -> Vec<EnrollmentRecord> {
        let start_date = NaiveDate::from_ymd_opt(2021, 1, 11).unwrap();
        ["IR210", "IR220", "IR301"]
            .iter()
            .enumerate()
            .map(|(idx, code)| {
                let term_start = start_date + Duration::days(120 * idx as i64);
                EnrollmentRecord {
                    student_id,
                    course_code: code.to_string(),
                    term: Term {
                        code: format!("2021T{}", idx + 1),
                        start_date: term_start,
                        end_date: term_start + Duration::days(100),
                    },
                    grade: "A".to_string(),
                    credits: 3.0,
                    status: EnrollmentStatus::Completed,
                }
            })
            .collect()
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 6, 1).unwrap()
    }

    #[tokio::test]
    async fn one_failing_student_does_not_stop_the_batch() {
        let store = Arc::new(MemoryStore::new());
        let good = Uuid::from_u128(1);
        let broken = Uuid::from_u128(2);
        let empty = Uuid::from_u128(3);
        store.insert_enrollments(history(good)).unwrap();
        store.insert_enrollments(history(broken)).unwrap();
        store.insert_student(empty).unwrap();
        store.fail_writes_for(broken).unwrap();

        let students = store.student_ids().await.unwrap();
        let summary = run_batch(
            store.clone(),
            engine(),
            students,
            as_of(),
            2,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(summary.built, 1);
        assert_eq!(summary.insufficient_data, vec![empty]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, broken);
        assert!(store.output(good).unwrap().is_some());
        assert!(store.output(broken).unwrap().is_none());
    }

    #[tokio::test]
    async fn cancelled_batch_dispatches_nothing_new() {
        let store = Arc::new(MemoryStore::new());
        let student = Uuid::from_u128(5);
        store.insert_enrollments(history(student)).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = run_batch(store.clone(), engine(), vec![student], as_of(), 4, cancel).await;

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.processed(), 0);
        assert!(store.output(student).unwrap().is_none());
    }

    #[tokio::test]
    async fn rebuild_replaces_previous_output() {
        let store = MemoryStore::new();
        let student = Uuid::from_u128(8);
        store.insert_enrollments(history(student)).unwrap();
        let engine = engine();

        let first = rebuild_student(&store, &engine, student, as_of()).await.unwrap();
        let before = store.output(student).unwrap().expect("output");
        let second = rebuild_student(&store, &engine, student, as_of()).await.unwrap();
        let after = store.output(student).unwrap().expect("output");

        assert_eq!(first, StudentOutcome::Built);
        assert_eq!(second, StudentOutcome::Built);
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn full_rebuild_clears_students_whose_enrollments_are_gone() {
        let store = Arc::new(MemoryStore::new());
        let student = Uuid::from_u128(9);
        store.insert_enrollments(history(student)).unwrap();
        let engine = engine();
        rebuild_student(store.as_ref(), &engine, student, as_of()).await.unwrap();
        assert!(store.output(student).unwrap().is_some());

        store.remove_enrollments(student).unwrap();
        let students = store.student_ids().await.unwrap();
        assert_eq!(students, vec![student]);

        let summary = run_batch(
            store.clone(),
            engine,
            students,
            as_of(),
            2,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(summary.insufficient_data, vec![student]);
        assert!(store.output(student).unwrap().is_none());
    }
}
