//! Major detection over a set of academic enrollments.
//!
//! Three strategies vote independently and a combiner picks the winner. The
//! strategies are correlated (they read the same course list), so a major's
//! score is the best single weighted vote it received, never a sum.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::catalog::{SignatureCatalog, SignatureTable};
use crate::config::EngineSettings;
use crate::course::{self, CourseCode};
use crate::models::{ProgramType, TermGroup};
use crate::registry::{MajorRef, MajorRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStrategy {
    SignatureCourses,
    DepartmentFrequency,
    ConcentrationPattern,
}

impl DetectionStrategy {
    pub fn weight(&self, settings: &EngineSettings) -> f64 {
        match self {
            DetectionStrategy::SignatureCourses => settings.signature_weight,
            DetectionStrategy::DepartmentFrequency => settings.department_weight,
            DetectionStrategy::ConcentrationPattern => settings.concentration_weight,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionStrategy::SignatureCourses => "signature_courses",
            DetectionStrategy::DepartmentFrequency => "department_frequency",
            DetectionStrategy::ConcentrationPattern => "concentration_pattern",
        }
    }
}

/// A single strategy's vote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MajorMatch {
    pub major: MajorRef,
    pub confidence: f64,
    pub strategy: DetectionStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MajorDecision {
    pub major: Option<MajorRef>,
    pub confidence: f64,
    pub weighted_score: f64,
    pub is_certain: bool,
    pub votes: Vec<MajorMatch>,
}

impl MajorDecision {
    pub fn unresolved() -> Self {
        Self {
            major: None,
            confidence: 0.0,
            weighted_score: 0.0,
            is_certain: false,
            votes: Vec::new(),
        }
    }

    /// Best weighted vote `major` received, 0.0 when nobody proposed it.
    pub fn score_for(&self, major: &MajorRef, settings: &EngineSettings) -> f64 {
        self.votes
            .iter()
            .filter(|vote| &vote.major == major)
            .map(|vote| weighted(vote, settings))
            .fold(0.0, f64::max)
    }
}

fn weighted(vote: &MajorMatch, settings: &EngineSettings) -> f64 {
    (vote.confidence * vote.strategy.weight(settings)).min(settings.confidence_cap)
}

pub struct MajorDetector<'a> {
    catalog: &'a SignatureCatalog,
    registry: &'a dyn MajorRegistry,
    settings: &'a EngineSettings,
}

impl<'a> MajorDetector<'a> {
    pub fn new(
        catalog: &'a SignatureCatalog,
        registry: &'a dyn MajorRegistry,
        settings: &'a EngineSettings,
    ) -> Self {
        Self {
            catalog,
            registry,
            settings,
        }
    }

    /// `terms` must already be in chronological order.
    pub fn detect(&self, program_type: ProgramType, terms: &[TermGroup]) -> MajorDecision {
        let Some(table) = self.catalog.table(program_type) else {
            return MajorDecision::unresolved();
        };

        let codes = self.academic_codes(terms);
        let mut votes = Vec::new();

        if let Some(vote) =
            self.signature_vote(table, &codes, DetectionStrategy::SignatureCourses)
        {
            votes.push(vote);
        }
        if let Some(vote) = self.department_vote(table, &codes) {
            votes.push(vote);
        }
        if let Some(vote) = self.concentration_vote(table, terms) {
            votes.push(vote);
        }

        combine(votes, self.settings)
    }

    fn academic_codes(&self, terms: &[TermGroup]) -> Vec<CourseCode> {
        terms
            .iter()
            .flat_map(|group| group.enrollments.iter())
            .filter_map(|record| course::parse(&record.course_code))
            .filter(|code| code.level.is_some())
            .filter(|code| self.catalog.language_program(&code.prefix).is_none())
            .collect()
    }

    fn signature_vote(
        &self,
        table: &SignatureTable,
        codes: &[CourseCode],
        strategy: DetectionStrategy,
    ) -> Option<MajorMatch> {
        let distinct: BTreeSet<&str> = codes.iter().map(|code| code.normalized.as_str()).collect();

        let mut best: Option<(&str, usize)> = None;
        for (major, signatures) in table.signatures() {
            let matches = distinct
                .iter()
                .filter(|code| signatures.contains(**code))
                .count();
            if matches > 0 && best.map_or(true, |(_, count)| matches > count) {
                best = Some((major.name.as_str(), matches));
            }
        }

        let (name, matches) = best?;
        let confidence = (0.70 + 0.05 * matches as f64).min(0.95);
        self.resolve(name, confidence, strategy)
    }

    fn department_vote(&self, table: &SignatureTable, codes: &[CourseCode]) -> Option<MajorMatch> {
        if codes.is_empty() {
            return None;
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for code in codes {
            *counts.entry(code.prefix.as_str()).or_insert(0) += 1;
        }

        // Leaders that tie but map to the same major are not in conflict.
        let top = counts.values().copied().max()?;
        let mut leaders = counts
            .iter()
            .filter(|(_, count)| **count == top)
            .map(|(prefix, _)| table.major_for_department(prefix));
        let name = leaders.next()??;
        if leaders.any(|other| other != Some(name)) {
            return None;
        }

        let matched = codes
            .iter()
            .filter(|code| table.major_for_department(&code.prefix) == Some(name))
            .count();
        let share = matched as f64 / codes.len() as f64;
        let confidence = (share * 1.5).min(0.80);
        self.resolve(name, confidence, DetectionStrategy::DepartmentFrequency)
    }

    fn concentration_vote(&self, table: &SignatureTable, terms: &[TermGroup]) -> Option<MajorMatch> {
        let tail = concentration_window(terms.len(), self.settings.concentration_fraction);
        let codes = self.academic_codes(&terms[terms.len() - tail..]);
        self.signature_vote(table, &codes, DetectionStrategy::ConcentrationPattern)
    }

    fn resolve(&self, name: &str, confidence: f64, strategy: DetectionStrategy) -> Option<MajorMatch> {
        match self.registry.resolve(name) {
            Some(major) => Some(MajorMatch {
                major,
                confidence,
                strategy,
            }),
            None => {
                tracing::debug!(
                    major = name,
                    strategy = strategy.as_str(),
                    "Registry has no entry for detected major, dropping vote"
                );
                None
            }
        }
    }
}

/// Number of trailing terms the concentration strategy inspects.
pub fn concentration_window(term_count: usize, fraction: f64) -> usize {
    if term_count == 0 {
        return 0;
    }
    let window = (term_count as f64 * fraction - 1e-9).ceil() as usize;
    window.clamp(1, term_count)
}

/// Highest weighted vote wins; on a tie the earlier strategy keeps it.
pub fn combine(votes: Vec<MajorMatch>, settings: &EngineSettings) -> MajorDecision {
    let mut best: Option<(usize, f64)> = None;
    for (idx, vote) in votes.iter().enumerate() {
        let score = weighted(vote, settings);
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((idx, score));
        }
    }

    match best {
        Some((idx, score)) => MajorDecision {
            major: Some(votes[idx].major.clone()),
            confidence: score.min(settings.confidence_cap),
            weighted_score: score,
            is_certain: score >= settings.certainty_threshold,
            votes,
        },
        None => MajorDecision::unresolved(),
    }
}
