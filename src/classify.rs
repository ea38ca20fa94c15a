use std::collections::BTreeMap;

use crate::catalog::SignatureCatalog;
use crate::config::EngineSettings;
use crate::course;
use crate::major::{MajorDecision, MajorDetector};
use crate::models::{ProgramType, TermGroup};

pub const LANGUAGE_LEVEL_CONFIDENCE: f64 = 0.9;
pub const DEFAULT_TYPE_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, PartialEq)]
pub enum TermLabel {
    Language {
        program: String,
        level: Option<u32>,
    },
    Academic {
        program_type: ProgramType,
        decision: MajorDecision,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TermClassification {
    pub label: TermLabel,
    pub confidence: f64,
}

impl TermClassification {
    pub fn program_type(&self) -> ProgramType {
        match &self.label {
            TermLabel::Language { .. } => ProgramType::Language,
            TermLabel::Academic { program_type, .. } => *program_type,
        }
    }

    /// Language program code, or the detected major's code.
    pub fn program_key(&self) -> Option<&str> {
        match &self.label {
            TermLabel::Language { program, .. } => Some(program.as_str()),
            TermLabel::Academic { decision, .. } => {
                decision.major.as_ref().map(|major| major.code.as_str())
            }
        }
    }
}

#[derive(Debug, Default)]
struct Buckets {
    language: BTreeMap<String, (usize, Option<u32>)>,
    undergraduate: usize,
    graduate: usize,
}

impl Buckets {
    fn language_total(&self) -> usize {
        self.language.values().map(|(count, _)| count).sum()
    }
}

pub struct ProgramTypeClassifier<'a> {
    catalog: &'a SignatureCatalog,
    detector: &'a MajorDetector<'a>,
    settings: &'a EngineSettings,
}

impl<'a> ProgramTypeClassifier<'a> {
    pub fn new(
        catalog: &'a SignatureCatalog,
        detector: &'a MajorDetector<'a>,
        settings: &'a EngineSettings,
    ) -> Self {
        Self {
            catalog,
            detector,
            settings,
        }
    }

    /// `None` when no course in the term yields a usable signal.
    pub fn classify(&self, group: &TermGroup) -> Option<TermClassification> {
        let buckets = self.bucket(group);
        let language = buckets.language_total();
        if language + buckets.undergraduate + buckets.graduate == 0 {
            return None;
        }

        let academic = buckets.undergraduate + buckets.graduate;
        let plurality = language > buckets.undergraduate && language > buckets.graduate;
        if language > 0 && (language >= academic || plurality) {
            let mut dominant: Option<(&String, usize, Option<u32>)> = None;
            for (program, (count, level)) in &buckets.language {
                if dominant.map_or(true, |(_, top, _)| *count > top) {
                    dominant = Some((program, *count, *level));
                }
            }
            let (program, _, level) = dominant?;
            let confidence = if level.is_some() {
                LANGUAGE_LEVEL_CONFIDENCE
            } else {
                DEFAULT_TYPE_CONFIDENCE
            };
            return Some(TermClassification {
                label: TermLabel::Language {
                    program: program.clone(),
                    level,
                },
                confidence,
            });
        }

        let program_type = if buckets.graduate > buckets.undergraduate {
            ProgramType::Graduate
        } else {
            ProgramType::Undergraduate
        };
        let decision = self
            .detector
            .detect(program_type, std::slice::from_ref(group));

        Some(TermClassification {
            label: TermLabel::Academic {
                program_type,
                decision,
            },
            confidence: DEFAULT_TYPE_CONFIDENCE,
        })
    }

    fn bucket(&self, group: &TermGroup) -> Buckets {
        let mut buckets = Buckets::default();
        for record in &group.enrollments {
            let Some(code) = course::parse(&record.course_code) else {
                tracing::debug!(
                    term = %group.term.code,
                    course = %record.course_code,
                    "Skipping unparseable course code"
                );
                continue;
            };

            if let Some(program) = self.catalog.language_program(&code.prefix) {
                let entry = buckets
                    .language
                    .entry(program.code.clone())
                    .or_insert((0, None));
                entry.0 += 1;
                entry.1 = entry.1.max(code.level);
                continue;
            }

            match code.level {
                Some(level) if level >= self.settings.graduate_level_floor => buckets.graduate += 1,
                Some(_) => buckets.undergraduate += 1,
                None => tracing::debug!(
                    term = %group.term.code,
                    course = %record.course_code,
                    "Course code carries no level, excluded from classification"
                ),
            }
        }
        buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnrollmentRecord, EnrollmentStatus, Term};
    use crate::registry::InMemoryRegistry;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn group(codes: &[&str]) -> TermGroup {
        let term = Term {
            code: "2023T1".to_string(),
            start_date: NaiveDate::from_ymd_opt(2023, 1, 9).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2023, 4, 28).unwrap(),
        };
        TermGroup {
            enrollments: codes
                .iter()
                .map(|code| EnrollmentRecord {
                    student_id: Uuid::nil(),
                    course_code: code.to_string(),
                    term: term.clone(),
                    grade: "A".to_string(),
                    credits: 3.0,
                    status: EnrollmentStatus::Completed,
                })
                .collect(),
            term,
        }
    }

    fn classify(codes: &[&str]) -> Option<TermClassification> {
        let catalog = SignatureCatalog::builtin().expect("builtin catalog");
        let registry: InMemoryRegistry = catalog.reference_registry();
        let settings = EngineSettings::default();
        let detector = MajorDetector::new(&catalog, &registry, &settings);
        ProgramTypeClassifier::new(&catalog, &detector, &settings).classify(&group(codes))
    }

    #[test]
    fn language_term_reports_program_and_top_level() {
        let result = classify(&["IEAP-3", "IEAP-4", "IEAP-4"]).expect("classified");
        assert_eq!(
            result.label,
            TermLabel::Language {
                program: "IEAP".to_string(),
                level: Some(4),
            }
        );
        assert_eq!(result.confidence, LANGUAGE_LEVEL_CONFIDENCE);
    }

    #[test]
    fn language_wins_ties_against_academic_courses() {
        let result = classify(&["GESL2", "GESL2", "IR101", "BUS501"]).expect("classified");
        assert_eq!(result.program_type(), ProgramType::Language);
    }

    #[test]
    fn academic_courses_outnumbering_language_win() {
        let result = classify(&["GESL2", "GESL2", "IR101", "IR102", "BUS501"]).expect("classified");
        assert_eq!(result.program_type(), ProgramType::Undergraduate);

        let plurality = classify(&["GESL2", "GESL2", "GESL3", "IR101", "IR102", "BUS501", "BUS510"])
            .expect("classified");
        assert_eq!(plurality.program_type(), ProgramType::Language);
    }

    #[test]
    fn graduate_needs_a_strict_majority_over_undergraduate() {
        let tied = classify(&["BUS301", "BUS501"]).expect("classified");
        assert_eq!(tied.program_type(), ProgramType::Undergraduate);

        let graduate = classify(&["BUS501", "BUS510", "BUS301"]).expect("classified");
        assert_eq!(graduate.program_type(), ProgramType::Graduate);
        assert_eq!(graduate.program_key(), Some("MBA"));
        assert_eq!(graduate.confidence, DEFAULT_TYPE_CONFIDENCE);
    }

    #[test]
    fn language_without_level_has_lower_confidence() {
        let result = classify(&["EHSS"]).expect("classified");
        assert_eq!(result.confidence, DEFAULT_TYPE_CONFIDENCE);
    }

    #[test]
    fn unusable_codes_leave_the_term_unclassified() {
        assert!(classify(&["", "1234", "COMEX"]).is_none());
    }
}
