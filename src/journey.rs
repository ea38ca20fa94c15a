use chrono::NaiveDate;
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::graduation::GraduationEvaluator;
use crate::models::{
    CurrentStatus, Journey, Milestone, MilestoneKind, PhaseSummary, ProgramType, Progression,
    TransitionStatus,
};
use crate::segment::Period;

pub struct JourneyAssembler<'a> {
    evaluator: &'a GraduationEvaluator<'a>,
    settings: &'a EngineSettings,
}

impl<'a> JourneyAssembler<'a> {
    pub fn new(evaluator: &'a GraduationEvaluator<'a>, settings: &'a EngineSettings) -> Self {
        Self {
            evaluator,
            settings,
        }
    }

    /// One journey per period plus its milestones. Ids are derived from the
    /// student id and position so a re-run reproduces them.
    pub fn assemble(
        &self,
        student_id: Uuid,
        periods: &[Period],
        as_of: NaiveDate,
    ) -> (Vec<Journey>, Vec<Milestone>) {
        let mut journeys = Vec::with_capacity(periods.len());
        let mut milestones = Vec::new();

        for (idx, period) in periods.iter().enumerate() {
            let next = periods.get(idx + 1);
            let sequence = idx as u32 + 1;
            let journey_id = journey_id(student_id, sequence);
            let transition_status =
                self.evaluator
                    .transition_status(period, next.is_none(), as_of);

            journeys.push(Journey {
                id: journey_id,
                student_id,
                sequence,
                program_type: period.program_type,
                program: period.major.clone(),
                start_date: period.start_date,
                stop_date: period.end_date,
                start_term: period.start_term.clone(),
                duration_terms: period.term_count,
                transition_status,
                confidence_score: period.confidence,
                requires_review: period.confidence < self.settings.review_threshold,
                language_level: period.language_level,
            });

            milestones.push(milestone(
                journey_id,
                MilestoneKind::ProgramStart,
                period.start_date,
                period.confidence,
                false,
                "first_enrollment",
            ));

            if period.graduated() {
                let kind = match period.program_type {
                    ProgramType::Language => MilestoneKind::CertificateEarned,
                    _ => MilestoneKind::DegreeEarned,
                };
                milestones.push(milestone(
                    journey_id,
                    kind,
                    period.end_date,
                    period.graduation.confidence().min(self.settings.confidence_cap),
                    true,
                    period.graduation.inference_method(),
                ));
            } else if let Some(next) = next {
                milestones.push(milestone(
                    journey_id,
                    MilestoneKind::MajorChange,
                    next.start_date,
                    next.confidence,
                    true,
                    "program_boundary",
                ));
            }
        }

        (journeys, milestones)
    }
}

pub fn journey_id(student_id: Uuid, sequence: u32) -> Uuid {
    Uuid::new_v5(&student_id, format!("journey:{sequence}").as_bytes())
}

fn milestone(
    journey_id: Uuid,
    kind: MilestoneKind,
    date: NaiveDate,
    confidence_score: f64,
    inferred: bool,
    inference_method: &'static str,
) -> Milestone {
    Milestone {
        id: Uuid::new_v5(&journey_id, kind.as_str().as_bytes()),
        journey_id,
        kind,
        date,
        confidence_score,
        inferred,
        inference_method,
    }
}

/// Folds chronologically ordered journeys into the per-student rollup.
/// Returns `None` for an empty slice.
pub fn fold_progression(student_id: Uuid, journeys: &[Journey]) -> Option<Progression> {
    let entry = journeys.first()?;
    let last = journeys.last()?;

    let mut language = PhaseSummary::default();
    let mut undergraduate = PhaseSummary::default();
    let mut graduate = PhaseSummary::default();
    let mut ba_completed_on = None;
    let mut ma_completed_on = None;
    let mut ba_major = None;
    let mut ma_program = None;

    for journey in journeys {
        let phase = match journey.program_type {
            ProgramType::Language => &mut language,
            ProgramType::Undergraduate => &mut undergraduate,
            ProgramType::Graduate => &mut graduate,
        };
        phase.start_date.get_or_insert(journey.start_date);
        phase.end_date = Some(journey.stop_date);
        phase.terms += journey.duration_terms;

        let graduated = journey.transition_status == TransitionStatus::Graduated;
        phase.completed |= graduated;

        match journey.program_type {
            ProgramType::Undergraduate => {
                if journey.program.is_some() {
                    ba_major = journey.program.clone();
                }
                if graduated && ba_completed_on.is_none() {
                    ba_completed_on = Some(journey.stop_date);
                }
            }
            ProgramType::Graduate => {
                if journey.program.is_some() {
                    ma_program = journey.program.clone();
                }
                if graduated && ma_completed_on.is_none() {
                    ma_completed_on = Some(journey.stop_date);
                }
            }
            ProgramType::Language => {}
        }
    }

    let time_to_ba_days = elapsed_days(undergraduate.start_date, ba_completed_on);
    let time_to_ma_days = elapsed_days(graduate.start_date, ma_completed_on);
    let current_status = current_status(last, &language, &undergraduate, &graduate);

    Some(Progression {
        student_id,
        entry_program_type: entry.program_type,
        entry_program: entry.program.clone(),
        entry_date: entry.start_date,
        entry_term: entry.start_term.clone(),
        language,
        undergraduate,
        graduate,
        ba_major,
        ma_program,
        time_to_ba_days,
        time_to_ma_days,
        total_terms: journeys.iter().map(|journey| journey.duration_terms).sum(),
        journeys_requiring_review: journeys
            .iter()
            .filter(|journey| journey.requires_review)
            .count() as u32,
        current_status,
    })
}

fn elapsed_days(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Option<i64> {
    match (start, end) {
        (Some(start), Some(end)) => Some((end - start).num_days()),
        _ => None,
    }
}

fn current_status(
    last: &Journey,
    language: &PhaseSummary,
    undergraduate: &PhaseSummary,
    graduate: &PhaseSummary,
) -> CurrentStatus {
    if last.transition_status == TransitionStatus::Active {
        return match last.program_type {
            ProgramType::Language => CurrentStatus::ActiveLanguage,
            ProgramType::Undergraduate => CurrentStatus::ActiveUndergraduate,
            ProgramType::Graduate => CurrentStatus::ActiveGraduate,
        };
    }

    if graduate.completed {
        CurrentStatus::GraduateCompleted
    } else if undergraduate.completed {
        CurrentStatus::UndergraduateCompleted
    } else if language.completed {
        CurrentStatus::LanguageCompleted
    } else {
        CurrentStatus::DroppedOut
    }
}
