//! Property tests over generated enrollment histories.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use uuid::Uuid;

use progression_builder::catalog::SignatureCatalog;
use progression_builder::config::EngineSettings;
use progression_builder::major::MajorDetector;
use progression_builder::models::{
    group_by_term, EnrollmentRecord, EnrollmentStatus, ProgramType, Term, TermGroup,
};
use progression_builder::registry::{InMemoryRegistry, MajorRegistry};
use progression_builder::ProgressionEngine;

const MIXED_COURSES: &[&str] = &[
    "IEAP-2", "IEAP-4", "GESL-1", "GESL-3", "EHSS", "W_EXPR-2", "IR210", "IR301", "POL302",
    "IR100", "BUS201", "BUS330", "ACCT201", "BUS100", "MGT110", "CS201", "CS350", "MATH251",
    "ENGL301", "LING201", "THM201", "GEN101", "HIST110", "ART101", "ENG101", "BUS501", "BUS510",
    "IR501", "TESOL501", "EXIT", "COMEX", "", "9999",
];

const UNDERGRADUATE_COURSES: &[&str] = &[
    "IR210", "IR301", "IR100", "POL100", "POL302", "BUS201", "BUS100", "ACCT201", "FIN301",
    "MGT110", "CS201", "CS100", "MATH100", "MATH251", "ENGL100", "ENGL301", "LING201", "EDUC301",
    "THM100", "THM201", "GEN101", "HIST110", "ART101", "SOC110",
];

const GRADES: &[&str] = &["A", "B+", "C", "D", "F", "W", "", "P"];

const CAP: f64 = 0.95;

fn fixture() -> (SignatureCatalog, InMemoryRegistry, EngineSettings) {
    let catalog = SignatureCatalog::builtin().expect("builtin catalog");
    let registry = catalog.reference_registry();
    (catalog, registry, EngineSettings::default())
}

fn engine() -> ProgressionEngine {
    let (catalog, registry, settings) = fixture();
    ProgressionEngine::new(Arc::new(catalog), Arc::new(registry), Arc::new(settings))
}

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 9, 1).unwrap()
}

fn term(index: usize) -> Term {
    let start_date = NaiveDate::from_ymd_opt(2018, 1, 8).unwrap() + Duration::days(120 * index as i64);
    Term {
        code: format!("T{index:02}"),
        start_date,
        end_date: start_date + Duration::days(105),
    }
}

fn record(student_id: Uuid, term: &Term, code: &str, grade: &str, credits: f64) -> EnrollmentRecord {
    EnrollmentRecord {
        student_id,
        course_code: code.to_string(),
        term: term.clone(),
        grade: grade.to_string(),
        credits,
        status: if grade.is_empty() {
            EnrollmentStatus::InProgress
        } else {
            EnrollmentStatus::Completed
        },
    }
}

/// Terms of (course, grade, credits) index triples drawn from `pool`.
fn arb_history(pool: &'static [&'static str]) -> impl Strategy<Value = Vec<EnrollmentRecord>> {
    let course = (0..pool.len(), 0..GRADES.len(), prop_oneof![Just(3.0), Just(4.0)]);
    prop::collection::vec(prop::collection::vec(course, 1..6), 1..9).prop_map(move |terms| {
        let student_id = Uuid::from_u128(42);
        terms
            .iter()
            .enumerate()
            .flat_map(|(idx, courses)| {
                let term = term(idx);
                courses
                    .iter()
                    .map(|(course, grade, credits)| {
                        record(student_id, &term, pool[*course], GRADES[*grade], *credits)
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn periods_partition_the_terms_in_order(rows in arb_history(MIXED_COURSES)) {
        let periods = engine().periods(Uuid::from_u128(42), &rows).expect("periods");
        let expected: Vec<String> = group_by_term(&rows)
            .into_iter()
            .map(|group| group.term.code)
            .collect();

        let covered: Vec<String> = periods
            .iter()
            .flat_map(|period| period.terms.iter().cloned())
            .collect();
        prop_assert_eq!(&covered, &expected);

        let counted: u32 = periods.iter().map(|period| period.term_count).sum();
        prop_assert_eq!(counted as usize, expected.len());

        for pair in periods.windows(2) {
            prop_assert!(pair[0].end_date < pair[1].start_date);
        }
        for period in &periods {
            prop_assert!(period.start_date <= period.end_date);
            prop_assert_eq!(period.term_count as usize, period.terms.len());
        }
    }

    #[test]
    fn confidence_never_leaves_the_capped_range(rows in arb_history(MIXED_COURSES)) {
        let student = Uuid::from_u128(42);
        let engine = engine();
        for period in engine.periods(student, &rows).expect("periods") {
            prop_assert!((0.0..=CAP).contains(&period.confidence));
        }

        let output = engine.build(student, &rows, as_of()).expect("built");
        for journey in &output.journeys {
            prop_assert!((0.0..=CAP).contains(&journey.confidence_score));
            prop_assert_eq!(journey.requires_review, journey.confidence_score < 0.7);
        }
        for milestone in &output.milestones {
            prop_assert!((0.0..=CAP).contains(&milestone.confidence_score));
        }

        let (catalog, registry, settings) = fixture();
        let detector = MajorDetector::new(&catalog, &registry, &settings);
        let groups = group_by_term(&rows);
        for program_type in [ProgramType::Undergraduate, ProgramType::Graduate] {
            let decision = detector.detect(program_type, &groups);
            prop_assert!((0.0..=CAP).contains(&decision.weighted_score));
            prop_assert!((0.0..=CAP).contains(&decision.confidence));
            for vote in &decision.votes {
                prop_assert!((0.0..=CAP).contains(&vote.confidence));
            }
        }
    }

    #[test]
    fn rebuilding_is_idempotent(rows in arb_history(MIXED_COURSES)) {
        let student = Uuid::from_u128(42);
        let first = engine().build(student, &rows, as_of()).expect("built");
        let second = engine().build(student, &rows, as_of()).expect("built");

        prop_assert_eq!(
            serde_json::to_string(&first).expect("encode"),
            serde_json::to_string(&second).expect("encode")
        );
        prop_assert_eq!(first, second);
    }

    #[test]
    fn another_signature_course_never_lowers_the_score(
        rows in arb_history(UNDERGRADUATE_COURSES),
        major_idx in 0usize..5,
        course_seed in any::<usize>(),
        term_seed in any::<usize>(),
    ) {
        let (catalog, registry, settings) = fixture();
        let detector = MajorDetector::new(&catalog, &registry, &settings);

        let table = catalog.table(ProgramType::Undergraduate).expect("undergraduate table");
        let definition = &table.majors()[major_idx % table.majors().len()];
        let major = registry.resolve(&definition.name).expect("major in registry");
        let signature = &definition.signature_courses[course_seed % definition.signature_courses.len()];

        let before: Vec<TermGroup> = group_by_term(&rows);
        let mut after = before.clone();
        let target = term_seed % after.len();
        let extra = record(Uuid::from_u128(42), &after[target].term, signature, "A", 3.0);
        after[target].enrollments.push(extra);

        let score_before = detector
            .detect(ProgramType::Undergraduate, &before)
            .score_for(&major, &settings);
        let score_after = detector
            .detect(ProgramType::Undergraduate, &after)
            .score_for(&major, &settings);
        prop_assert!(
            score_after + 1e-12 >= score_before,
            "score for {} fell from {} to {}",
            major.code,
            score_before,
            score_after
        );
    }
}
