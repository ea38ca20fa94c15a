use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::MajorRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramType {
    Language,
    Undergraduate,
    Graduate,
}

impl ProgramType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramType::Language => "language",
            ProgramType::Undergraduate => "undergraduate",
            ProgramType::Graduate => "graduate",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "language" => Some(Self::Language),
            "undergraduate" | "ba" => Some(Self::Undergraduate),
            "graduate" | "ma" => Some(Self::Graduate),
            _ => None,
        }
    }
}

impl fmt::Display for ProgramType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    InProgress,
    Completed,
    Withdrawn,
    Dropped,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::InProgress => "in_progress",
            EnrollmentStatus::Completed => "completed",
            EnrollmentStatus::Withdrawn => "withdrawn",
            EnrollmentStatus::Dropped => "dropped",
        }
    }

    /// Unknown labels fall back to `Completed`, the state legacy rows are in.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "in_progress" | "enrolled" | "active" => Self::InProgress,
            "withdrawn" => Self::Withdrawn,
            "dropped" => Self::Dropped,
            _ => Self::Completed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub code: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// One flat, pre-joined enrollment row. The engine never fetches anything
/// beyond what is carried here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub student_id: Uuid,
    pub course_code: String,
    pub term: Term,
    pub grade: String,
    pub credits: f64,
    pub status: EnrollmentStatus,
}

/// The enrollments of one term, in the order the engine walks them.
#[derive(Debug, Clone, PartialEq)]
pub struct TermGroup {
    pub term: Term,
    pub enrollments: Vec<EnrollmentRecord>,
}

/// Sorts by term start date, then term code, and groups rows per term.
pub fn group_by_term(enrollments: &[EnrollmentRecord]) -> Vec<TermGroup> {
    let mut sorted = enrollments.to_vec();
    sorted.sort_by(|a, b| {
        a.term
            .start_date
            .cmp(&b.term.start_date)
            .then_with(|| a.term.code.cmp(&b.term.code))
            .then_with(|| a.course_code.cmp(&b.course_code))
    });

    let mut groups: Vec<TermGroup> = Vec::new();
    for record in sorted {
        match groups.last_mut() {
            Some(group) if group.term.code == record.term.code => group.enrollments.push(record),
            _ => groups.push(TermGroup {
                term: record.term.clone(),
                enrollments: vec![record],
            }),
        }
    }
    groups
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionStatus {
    Active,
    Graduated,
    ChangedProgram,
    DroppedOut,
}

impl TransitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionStatus::Active => "ACTIVE",
            TransitionStatus::Graduated => "GRADUATED",
            TransitionStatus::ChangedProgram => "CHANGED_PROGRAM",
            TransitionStatus::DroppedOut => "DROPPED_OUT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Journey {
    pub id: Uuid,
    pub student_id: Uuid,
    pub sequence: u32,
    pub program_type: ProgramType,
    pub program: Option<MajorRef>,
    pub start_date: NaiveDate,
    pub stop_date: NaiveDate,
    pub start_term: String,
    pub duration_terms: u32,
    pub transition_status: TransitionStatus,
    pub confidence_score: f64,
    pub requires_review: bool,
    pub language_level: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneKind {
    ProgramStart,
    CertificateEarned,
    DegreeEarned,
    MajorChange,
}

impl MilestoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneKind::ProgramStart => "program_start",
            MilestoneKind::CertificateEarned => "certificate_earned",
            MilestoneKind::DegreeEarned => "degree_earned",
            MilestoneKind::MajorChange => "major_change",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Milestone {
    pub id: Uuid,
    pub journey_id: Uuid,
    pub kind: MilestoneKind,
    pub date: NaiveDate,
    pub confidence_score: f64,
    pub inferred: bool,
    pub inference_method: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseSummary {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub terms: u32,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrentStatus {
    ActiveLanguage,
    ActiveUndergraduate,
    ActiveGraduate,
    LanguageCompleted,
    UndergraduateCompleted,
    GraduateCompleted,
    DroppedOut,
}

impl CurrentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CurrentStatus::ActiveLanguage => "active in language program",
            CurrentStatus::ActiveUndergraduate => "active undergraduate",
            CurrentStatus::ActiveGraduate => "active graduate",
            CurrentStatus::LanguageCompleted => "language program completed",
            CurrentStatus::UndergraduateCompleted => "bachelor's degree earned",
            CurrentStatus::GraduateCompleted => "graduate degree earned",
            CurrentStatus::DroppedOut => "inactive without completion",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CurrentStatus::ActiveLanguage => "active_language",
            CurrentStatus::ActiveUndergraduate => "active_undergraduate",
            CurrentStatus::ActiveGraduate => "active_graduate",
            CurrentStatus::LanguageCompleted => "language_completed",
            CurrentStatus::UndergraduateCompleted => "undergraduate_completed",
            CurrentStatus::GraduateCompleted => "graduate_completed",
            CurrentStatus::DroppedOut => "dropped_out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progression {
    pub student_id: Uuid,
    pub entry_program_type: ProgramType,
    pub entry_program: Option<MajorRef>,
    pub entry_date: NaiveDate,
    pub entry_term: String,
    pub language: PhaseSummary,
    pub undergraduate: PhaseSummary,
    pub graduate: PhaseSummary,
    pub ba_major: Option<MajorRef>,
    pub ma_program: Option<MajorRef>,
    pub time_to_ba_days: Option<i64>,
    pub time_to_ma_days: Option<i64>,
    pub total_terms: u32,
    pub journeys_requiring_review: u32,
    pub current_status: CurrentStatus,
}

/// Everything one engine run produces for a student. Written as a unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentOutput {
    pub student_id: Uuid,
    pub journeys: Vec<Journey>,
    pub milestones: Vec<Milestone>,
    pub progression: Progression,
}

#[derive(Debug, Clone)]
pub struct ProgressionSummaryRow {
    pub student_id: Uuid,
    pub full_name: Option<String>,
    pub current_status: String,
    pub entry_program_type: String,
    pub ba_major: Option<String>,
    pub total_terms: i32,
    pub journeys_requiring_review: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: &str, term: &str, start: (i32, u32, u32)) -> EnrollmentRecord {
        let start_date = NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap();
        EnrollmentRecord {
            student_id: Uuid::nil(),
            course_code: code.to_string(),
            term: Term {
                code: term.to_string(),
                start_date,
                end_date: start_date + chrono::Duration::days(90),
            },
            grade: "A".to_string(),
            credits: 3.0,
            status: EnrollmentStatus::Completed,
        }
    }

    #[test]
    fn groups_terms_in_start_date_order() {
        let rows = vec![
            record("IR301", "2021T2", (2021, 5, 1)),
            record("IR101", "2021T1", (2021, 1, 10)),
            record("IR201", "2021T2", (2021, 5, 1)),
        ];

        let groups = group_by_term(&rows);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].term.code, "2021T1");
        assert_eq!(groups[1].enrollments.len(), 2);
    }

    #[test]
    fn same_start_date_breaks_ties_by_term_code() {
        let rows = vec![
            record("ENG101", "B", (2022, 1, 1)),
            record("ENG102", "A", (2022, 1, 1)),
        ];

        let groups = group_by_term(&rows);
        assert_eq!(groups[0].term.code, "A");
        assert_eq!(groups[1].term.code, "B");
    }

    #[test]
    fn status_labels_parse_leniently() {
        assert_eq!(EnrollmentStatus::parse("Enrolled"), EnrollmentStatus::InProgress);
        assert_eq!(EnrollmentStatus::parse("withdrawn"), EnrollmentStatus::Withdrawn);
        assert_eq!(EnrollmentStatus::parse(""), EnrollmentStatus::Completed);
    }
}
