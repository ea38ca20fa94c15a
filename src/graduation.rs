use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::catalog::SignatureCatalog;
use crate::config::EngineSettings;
use crate::course;
use crate::models::{EnrollmentRecord, EnrollmentStatus, ProgramType, TransitionStatus};
use crate::segment::Period;

/// Why a period counts as completed, if it does.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum GraduationVerdict {
    NotGraduated,
    ExitExam { course: String },
    CreditThreshold { credits: f64 },
    LanguageLevel { level: u32, threshold: u32 },
}

impl GraduationVerdict {
    pub fn graduated(&self) -> bool {
        !matches!(self, GraduationVerdict::NotGraduated)
    }

    pub fn inference_method(&self) -> &'static str {
        match self {
            GraduationVerdict::NotGraduated => "program_boundary",
            GraduationVerdict::ExitExam { .. } => "exit_exam_marker",
            GraduationVerdict::CreditThreshold { .. } => "credit_threshold",
            GraduationVerdict::LanguageLevel { .. } => "language_level_threshold",
        }
    }

    /// How much the completion milestone should be trusted.
    pub fn confidence(&self) -> f64 {
        match self {
            GraduationVerdict::NotGraduated => 0.0,
            GraduationVerdict::ExitExam { .. } => 0.9,
            GraduationVerdict::CreditThreshold { .. } => 0.8,
            GraduationVerdict::LanguageLevel { .. } => 0.85,
        }
    }
}

pub struct GraduationEvaluator<'a> {
    catalog: &'a SignatureCatalog,
    settings: &'a EngineSettings,
}

impl<'a> GraduationEvaluator<'a> {
    pub fn new(catalog: &'a SignatureCatalog, settings: &'a EngineSettings) -> Self {
        Self { catalog, settings }
    }

    pub fn evaluate(&self, period: &Period) -> GraduationVerdict {
        match period.program_type {
            ProgramType::Undergraduate => {
                if let Some(record) = period
                    .enrollments
                    .iter()
                    .find(|record| self.catalog.is_exit_exam(&course::normalize(&record.course_code)))
                {
                    return GraduationVerdict::ExitExam {
                        course: record.course_code.clone(),
                    };
                }
                self.credit_verdict(
                    &period.enrollments,
                    self.settings.undergraduate_credit_threshold,
                )
            }
            ProgramType::Graduate => {
                self.credit_verdict(&period.enrollments, self.settings.graduate_credit_threshold)
            }
            ProgramType::Language => {
                let program = period
                    .language_program
                    .as_deref()
                    .and_then(|code| self.catalog.language_program_by_code(code));
                match (program, period.language_level) {
                    (Some(program), Some(level)) if level >= program.completion_level => {
                        GraduationVerdict::LanguageLevel {
                            level,
                            threshold: program.completion_level,
                        }
                    }
                    _ => GraduationVerdict::NotGraduated,
                }
            }
        }
    }

    /// Sum of passing credits. With `count_repeated_courses_once` a course
    /// code taken more than once counts at its largest value.
    pub fn passing_credits(&self, enrollments: &[EnrollmentRecord]) -> f64 {
        let passing = enrollments.iter().filter(|record| self.counts(record));
        if !self.settings.count_repeated_courses_once {
            return passing.map(|record| record.credits).sum();
        }

        let mut by_course: BTreeMap<String, f64> = BTreeMap::new();
        for record in passing {
            let entry = by_course
                .entry(course::normalize(&record.course_code))
                .or_insert(0.0);
            *entry = entry.max(record.credits);
        }
        by_course.values().sum()
    }

    fn counts(&self, record: &EnrollmentRecord) -> bool {
        if self.catalog.is_passing(&record.grade) {
            return true;
        }
        self.settings.include_in_progress_credits
            && record.status == EnrollmentStatus::InProgress
            && record.grade.trim().is_empty()
    }

    fn credit_verdict(&self, enrollments: &[EnrollmentRecord], threshold: f64) -> GraduationVerdict {
        let credits = self.passing_credits(enrollments);
        if credits >= threshold {
            GraduationVerdict::CreditThreshold { credits }
        } else {
            GraduationVerdict::NotGraduated
        }
    }

    /// A graduated period is GRADUATED wherever it sits; otherwise the
    /// position in the history and the recency of the last term decide.
    pub fn transition_status(
        &self,
        period: &Period,
        is_last: bool,
        as_of: NaiveDate,
    ) -> TransitionStatus {
        if period.graduation.graduated() {
            TransitionStatus::Graduated
        } else if !is_last {
            TransitionStatus::ChangedProgram
        } else if self.is_recent(period.end_date, as_of) {
            TransitionStatus::Active
        } else {
            TransitionStatus::DroppedOut
        }
    }

    /// A window reaching past the calendar's range covers every date.
    fn is_recent(&self, end_date: NaiveDate, as_of: NaiveDate) -> bool {
        Duration::try_days(self.settings.recency_window_days)
            .and_then(|window| as_of.checked_sub_signed(window))
            .map_or(true, |cutoff| end_date >= cutoff)
    }
}
