use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::catalog::SignatureCatalog;
use crate::classify::ProgramTypeClassifier;
use crate::config::EngineSettings;
use crate::error::EngineError;
use crate::graduation::GraduationEvaluator;
use crate::journey::{fold_progression, JourneyAssembler};
use crate::major::MajorDetector;
use crate::models::{group_by_term, EnrollmentRecord, StudentOutput};
use crate::registry::MajorRegistry;
use crate::segment::{Period, PeriodSegmenter};

/// Per-student reconstruction. Holds only read-only shared state, so one
/// instance serves every worker of a batch.
#[derive(Clone)]
pub struct ProgressionEngine {
    catalog: Arc<SignatureCatalog>,
    registry: Arc<dyn MajorRegistry>,
    settings: Arc<EngineSettings>,
}

impl ProgressionEngine {
    pub fn new(
        catalog: Arc<SignatureCatalog>,
        registry: Arc<dyn MajorRegistry>,
        settings: Arc<EngineSettings>,
    ) -> Self {
        Self {
            catalog,
            registry,
            settings,
        }
    }

    pub fn periods(
        &self,
        student_id: Uuid,
        enrollments: &[EnrollmentRecord],
    ) -> Result<Vec<Period>, EngineError> {
        if enrollments.is_empty() {
            return Err(EngineError::InsufficientData(student_id));
        }
        if let Some(foreign) = enrollments
            .iter()
            .find(|record| record.student_id != student_id)
        {
            return Err(EngineError::ForeignEnrollment {
                expected: student_id,
                found: foreign.student_id,
            });
        }

        let settings = self.settings.as_ref();
        let registry = self.registry.as_ref();
        let detector = MajorDetector::new(&self.catalog, registry, settings);
        let classifier = ProgramTypeClassifier::new(&self.catalog, &detector, settings);
        let evaluator = GraduationEvaluator::new(&self.catalog, settings);
        let segmenter = PeriodSegmenter::new(&classifier, &detector, registry, &evaluator, settings);

        Ok(segmenter.segment(group_by_term(enrollments)))
    }

    /// Rebuilds the full output set. `as_of` stands in for "today" so runs
    /// are reproducible.
    pub fn build(
        &self,
        student_id: Uuid,
        enrollments: &[EnrollmentRecord],
        as_of: NaiveDate,
    ) -> Result<StudentOutput, EngineError> {
        let periods = self.periods(student_id, enrollments)?;

        let settings = self.settings.as_ref();
        let evaluator = GraduationEvaluator::new(&self.catalog, settings);
        let assembler = JourneyAssembler::new(&evaluator, settings);
        let (journeys, milestones) = assembler.assemble(student_id, &periods, as_of);
        let progression = fold_progression(student_id, &journeys)
            .ok_or(EngineError::InsufficientData(student_id))?;

        tracing::info!(
            student_id = %student_id,
            journeys = journeys.len(),
            milestones = milestones.len(),
            status = progression.current_status.as_str(),
            needs_review = progression.journeys_requiring_review,
            "Progression rebuilt"
        );

        Ok(StudentOutput {
            student_id,
            journeys,
            milestones,
            progression,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnrollmentStatus, Term};

    fn engine() -> ProgressionEngine {
        let catalog = SignatureCatalog::builtin().expect("builtin catalog");
        let registry = Arc::new(catalog.reference_registry());
        ProgressionEngine::new(Arc::new(catalog), registry, Arc::new(EngineSettings::default()))
    }

    #[test]
    fn empty_history_is_insufficient_data() {
        let student = Uuid::from_u128(1);
        let err = engine()
            .build(student, &[], NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData(id) if id == student));
    }

    #[test]
    fn rejects_rows_from_another_student() {
        let start_date = NaiveDate::from_ymd_opt(2022, 1, 10).unwrap();
        let record = EnrollmentRecord {
            student_id: Uuid::from_u128(2),
            course_code: "IR301".to_string(),
            term: Term {
                code: "2022T1".to_string(),
                start_date,
                end_date: start_date,
            },
            grade: "A".to_string(),
            credits: 3.0,
            status: EnrollmentStatus::Completed,
        };

        let err = engine()
            .build(Uuid::from_u128(1), &[record], start_date)
            .unwrap_err();
        assert!(matches!(err, EngineError::ForeignEnrollment { .. }));
    }
}
