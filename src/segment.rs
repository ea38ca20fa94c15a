//! Temporal segmentation of a student's terms into program periods.

use chrono::NaiveDate;

use crate::classify::{
    ProgramTypeClassifier, TermClassification, TermLabel, DEFAULT_TYPE_CONFIDENCE,
    LANGUAGE_LEVEL_CONFIDENCE,
};
use crate::config::EngineSettings;
use crate::graduation::{GraduationEvaluator, GraduationVerdict};
use crate::major::MajorDetector;
use crate::models::{EnrollmentRecord, ProgramType, TermGroup};
use crate::registry::{MajorRef, MajorRegistry};

/// A closed, contiguous run of terms in one program.
#[derive(Debug, Clone, PartialEq)]
pub struct Period {
    pub program_type: ProgramType,
    pub major: Option<MajorRef>,
    pub language_program: Option<String>,
    pub language_level: Option<u32>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_term: String,
    pub end_term: String,
    pub terms: Vec<String>,
    pub enrollments: Vec<EnrollmentRecord>,
    pub term_count: u32,
    pub confidence: f64,
    pub graduation: GraduationVerdict,
}

impl Period {
    pub fn graduated(&self) -> bool {
        self.graduation.graduated()
    }
}

/// A period still accepting terms. Only [`OpenPeriod::close`] turns it into
/// a [`Period`].
#[derive(Debug)]
pub struct OpenPeriod {
    program_type: ProgramType,
    key: Option<String>,
    language_level: Option<u32>,
    groups: Vec<TermGroup>,
}

impl OpenPeriod {
    fn open(classification: &TermClassification, pending: Vec<TermGroup>, group: TermGroup) -> Self {
        let mut groups = pending;
        groups.push(group);
        Self {
            program_type: classification.program_type(),
            key: classification.program_key().map(str::to_string),
            language_level: language_level(classification),
            groups,
        }
    }

    /// Same program type and same program. An unresolved major is a value
    /// of its own, so resolved and unresolved terms never share a period.
    fn accepts(&self, classification: &TermClassification) -> bool {
        classification.program_type() == self.program_type
            && classification.program_key() == self.key.as_deref()
    }

    fn extend(&mut self, classification: Option<&TermClassification>, group: TermGroup) {
        if let Some(level) = classification.and_then(language_level) {
            self.language_level = Some(level);
        }
        self.groups.push(group);
    }

    pub fn close(
        self,
        detector: &MajorDetector<'_>,
        registry: &dyn MajorRegistry,
        evaluator: &GraduationEvaluator<'_>,
        settings: &EngineSettings,
    ) -> Period {
        let (major, confidence, language_program) = match self.program_type {
            ProgramType::Language => {
                let confidence = if self.language_level.is_some() {
                    LANGUAGE_LEVEL_CONFIDENCE
                } else {
                    DEFAULT_TYPE_CONFIDENCE
                };
                let program = self.key.as_deref().and_then(|code| registry.by_code(code));
                (program, confidence, self.key.clone())
            }
            program_type => {
                let decision = detector.detect(program_type, &self.groups);
                match self.key.as_deref().and_then(|code| registry.by_code(code)) {
                    Some(major) => {
                        let confidence = decision.score_for(&major, settings);
                        (Some(major), confidence, None)
                    }
                    None => (decision.major.clone(), decision.confidence, None),
                }
            }
        };

        let first = &self.groups[0].term;
        let last = &self.groups[self.groups.len() - 1].term;
        let mut period = Period {
            program_type: self.program_type,
            major,
            language_program,
            language_level: self.language_level,
            start_date: first.start_date,
            end_date: last.end_date,
            start_term: first.code.clone(),
            end_term: last.code.clone(),
            terms: self.groups.iter().map(|group| group.term.code.clone()).collect(),
            enrollments: self
                .groups
                .iter()
                .flat_map(|group| group.enrollments.iter().cloned())
                .collect(),
            term_count: self.groups.len() as u32,
            confidence: confidence.clamp(0.0, settings.confidence_cap),
            graduation: GraduationVerdict::NotGraduated,
        };
        period.graduation = evaluator.evaluate(&period);
        period
    }
}

fn language_level(classification: &TermClassification) -> Option<u32> {
    match &classification.label {
        TermLabel::Language { level, .. } => *level,
        TermLabel::Academic { .. } => None,
    }
}

enum SegmentState {
    /// Leading terms nothing could be learned from wait here.
    NoCurrentPeriod { pending: Vec<TermGroup> },
    InPeriod(OpenPeriod),
}

pub struct PeriodSegmenter<'a> {
    classifier: &'a ProgramTypeClassifier<'a>,
    detector: &'a MajorDetector<'a>,
    registry: &'a dyn MajorRegistry,
    evaluator: &'a GraduationEvaluator<'a>,
    settings: &'a EngineSettings,
}

impl<'a> PeriodSegmenter<'a> {
    pub fn new(
        classifier: &'a ProgramTypeClassifier<'a>,
        detector: &'a MajorDetector<'a>,
        registry: &'a dyn MajorRegistry,
        evaluator: &'a GraduationEvaluator<'a>,
        settings: &'a EngineSettings,
    ) -> Self {
        Self {
            classifier,
            detector,
            registry,
            evaluator,
            settings,
        }
    }

    /// `groups` must be in chronological order (see `models::group_by_term`).
    pub fn segment(&self, groups: Vec<TermGroup>) -> Vec<Period> {
        let mut periods = Vec::new();
        let mut state = SegmentState::NoCurrentPeriod {
            pending: Vec::new(),
        };

        for group in groups {
            let classification = self.classifier.classify(&group);
            if let Some(classification) = &classification {
                tracing::debug!(
                    term = %group.term.code,
                    program_type = %classification.program_type(),
                    program = classification.program_key().unwrap_or("-"),
                    confidence = classification.confidence,
                    "Classified term"
                );
            }

            state = match (state, classification) {
                (SegmentState::NoCurrentPeriod { mut pending }, None) => {
                    pending.push(group);
                    SegmentState::NoCurrentPeriod { pending }
                }
                (SegmentState::NoCurrentPeriod { pending }, Some(classification)) => {
                    SegmentState::InPeriod(OpenPeriod::open(&classification, pending, group))
                }
                (SegmentState::InPeriod(mut open), None) => {
                    open.extend(None, group);
                    SegmentState::InPeriod(open)
                }
                (SegmentState::InPeriod(mut open), Some(classification)) => {
                    if open.accepts(&classification) {
                        open.extend(Some(&classification), group);
                        SegmentState::InPeriod(open)
                    } else {
                        periods.push(self.close(open));
                        SegmentState::InPeriod(OpenPeriod::open(&classification, Vec::new(), group))
                    }
                }
            };
        }

        match state {
            SegmentState::InPeriod(open) => periods.push(self.close(open)),
            SegmentState::NoCurrentPeriod { pending } if !pending.is_empty() => {
                let open = OpenPeriod {
                    program_type: ProgramType::Undergraduate,
                    key: None,
                    language_level: None,
                    groups: pending,
                };
                periods.push(self.close(open));
            }
            SegmentState::NoCurrentPeriod { .. } => {}
        }

        periods
    }

    fn close(&self, open: OpenPeriod) -> Period {
        let period = open.close(self.detector, self.registry, self.evaluator, self.settings);
        tracing::debug!(
            program_type = %period.program_type,
            major = period.major.as_ref().map(|m| m.code.as_str()).unwrap_or("-"),
            start_term = %period.start_term,
            terms = period.term_count,
            confidence = period.confidence,
            graduated = period.graduated(),
            "Closed period"
        );
        period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SignatureCatalog;
    use crate::models::{group_by_term, EnrollmentStatus, Term};
    use crate::registry::InMemoryRegistry;
    use chrono::Duration;
    use uuid::Uuid;

    fn term_rows(index: i64, codes: &[&str]) -> Vec<EnrollmentRecord> {
        let start_date = NaiveDate::from_ymd_opt(2019, 1, 7).unwrap() + Duration::days(120 * index);
        let term = Term {
            code: format!("T{index:02}"),
            start_date,
            end_date: start_date + Duration::days(105),
        };
        codes
            .iter()
            .map(|code| EnrollmentRecord {
                student_id: Uuid::nil(),
                course_code: code.to_string(),
                term: term.clone(),
                grade: "B".to_string(),
                credits: 3.0,
                status: EnrollmentStatus::Completed,
            })
            .collect()
    }

    fn segment(rows: Vec<EnrollmentRecord>) -> Vec<Period> {
        let catalog = SignatureCatalog::builtin().expect("builtin catalog");
        let registry: InMemoryRegistry = catalog.reference_registry();
        let settings = EngineSettings::default();
        let detector = MajorDetector::new(&catalog, &registry, &settings);
        let classifier = ProgramTypeClassifier::new(&catalog, &detector, &settings);
        let evaluator = GraduationEvaluator::new(&catalog, &settings);
        let segmenter =
            PeriodSegmenter::new(&classifier, &detector, &registry, &evaluator, &settings);
        segmenter.segment(group_by_term(&rows))
    }

    #[test]
    fn language_then_undergraduate_splits_into_two_periods() {
        let mut rows = term_rows(0, &["GESL-1", "GESL-1"]);
        rows.extend(term_rows(1, &["GESL-2"]));
        rows.extend(term_rows(2, &["IR210", "IR220"]));
        rows.extend(term_rows(3, &["IR301", "GEN101"]));

        let periods = segment(rows);
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].program_type, ProgramType::Language);
        assert_eq!(periods[0].term_count, 2);
        assert_eq!(periods[0].language_level, Some(2));
        assert_eq!(periods[1].major.as_ref().map(|m| m.code.as_str()), Some("IR"));
        assert_eq!(periods[1].terms, vec!["T02".to_string(), "T03".to_string()]);
    }

    #[test]
    fn change_of_major_closes_the_period() {
        let mut rows = term_rows(0, &["BUS201", "BUS210"]);
        rows.extend(term_rows(1, &["CS201", "CS210"]));

        let periods = segment(rows);
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].program_type, periods[1].program_type);
        assert_ne!(periods[0].major, periods[1].major);
    }

    #[test]
    fn change_of_language_program_closes_the_period() {
        let mut rows = term_rows(0, &["GESL-3"]);
        rows.extend(term_rows(1, &["IEAP-1"]));

        let periods = segment(rows);
        assert_eq!(periods.len(), 2);
        assert!(periods[0].graduated());
        assert!(!periods[1].graduated());
    }

    #[test]
    fn unresolved_term_between_two_majors_is_its_own_period() {
        let mut rows = term_rows(0, &["IR210", "IR220"]);
        rows.extend(term_rows(1, &["GEN101", "HIST110", "PHIL120", "ART101", "SOC110"]));
        rows.extend(term_rows(2, &["IR301", "IR310"]));

        let periods = segment(rows);
        let shape: Vec<(ProgramType, Option<&str>, u32)> = periods
            .iter()
            .map(|p| (p.program_type, p.major.as_ref().map(|m| m.code.as_str()), p.term_count))
            .collect();
        assert_eq!(
            shape,
            vec![
                (ProgramType::Undergraduate, Some("IR"), 1),
                (ProgramType::Undergraduate, None, 1),
                (ProgramType::Undergraduate, Some("IR"), 1),
            ]
        );
    }

    #[test]
    fn unresolved_open_period_does_not_adopt_a_later_major() {
        let mut rows = term_rows(0, &["GEN101", "HIST110"]);
        rows.extend(term_rows(1, &["IR210", "IR220"]));

        let periods = segment(rows);
        assert_eq!(periods.len(), 2);
        assert!(periods[0].major.is_none());
        assert_eq!(periods[1].major.as_ref().map(|m| m.code.as_str()), Some("IR"));
    }

    #[test]
    fn unclassifiable_leading_terms_join_the_first_period() {
        let mut rows = term_rows(0, &["COMEX"]);
        rows.extend(term_rows(1, &["IEAP-2"]));
        rows.extend(term_rows(2, &["????"]));

        let periods = segment(rows);
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].program_type, ProgramType::Language);
        assert_eq!(periods[0].start_term, "T00");
        assert_eq!(periods[0].end_term, "T02");
    }

    #[test]
    fn nothing_classifiable_still_yields_one_period() {
        let periods = segment(term_rows(0, &["COMEX", "1234"]));
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].program_type, ProgramType::Undergraduate);
        assert!(periods[0].major.is_none());
        assert_eq!(periods[0].confidence, 0.0);
    }
}
