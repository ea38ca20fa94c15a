use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::course;
use crate::models::ProgramType;
use crate::registry::{InMemoryRegistry, MajorRef};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MajorDefinition {
    pub code: String,
    pub name: String,
    pub signature_courses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageProgramDefinition {
    pub code: String,
    pub name: String,
    pub completion_level: u32,
}

/// Serialized form of the catalog, as read from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDefinition {
    pub undergraduate_majors: Vec<MajorDefinition>,
    pub undergraduate_departments: Vec<(String, String)>,
    pub graduate_programs: Vec<MajorDefinition>,
    pub graduate_departments: Vec<(String, String)>,
    pub language_programs: Vec<LanguageProgramDefinition>,
    pub exit_exam_markers: Vec<String>,
    pub passing_grades: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unable to read catalog {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("department {prefix} maps to unknown major {major}")]
    UnknownDepartmentMajor { prefix: String, major: String },
    #[error("catalog defines {0} twice")]
    Duplicate(String),
}

/// Signature and department tables for one program level, indexed.
#[derive(Debug, Clone)]
pub struct SignatureTable {
    majors: Vec<MajorDefinition>,
    signatures: Vec<HashSet<String>>,
    departments: HashMap<String, String>,
}

impl SignatureTable {
    fn build(
        majors: Vec<MajorDefinition>,
        departments: Vec<(String, String)>,
    ) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for major in &majors {
            if !seen.insert(major.name.to_ascii_lowercase()) {
                return Err(CatalogError::Duplicate(major.name.clone()));
            }
        }

        let signatures = majors
            .iter()
            .map(|major| {
                major
                    .signature_courses
                    .iter()
                    .map(|code| course::normalize(code))
                    .collect()
            })
            .collect();

        let mut department_map = HashMap::new();
        for (prefix, major) in departments {
            if !majors.iter().any(|m| m.name == major) {
                return Err(CatalogError::UnknownDepartmentMajor { prefix, major });
            }
            let prefix = course::normalize(&prefix);
            if department_map.insert(prefix.clone(), major).is_some() {
                return Err(CatalogError::Duplicate(prefix));
            }
        }

        Ok(Self {
            majors,
            signatures,
            departments: department_map,
        })
    }

    /// Majors in catalog order, each with its normalized signature set.
    pub fn signatures(&self) -> impl Iterator<Item = (&MajorDefinition, &HashSet<String>)> {
        self.majors.iter().zip(self.signatures.iter())
    }

    pub fn major_for_department(&self, prefix: &str) -> Option<&str> {
        self.departments.get(prefix).map(String::as_str)
    }

    pub fn majors(&self) -> &[MajorDefinition] {
        &self.majors
    }
}

/// Immutable classification tables shared by every student in a batch.
#[derive(Debug, Clone)]
pub struct SignatureCatalog {
    undergraduate: SignatureTable,
    graduate: SignatureTable,
    language_programs: Vec<LanguageProgramDefinition>,
    exit_exam_markers: Vec<String>,
    passing_grades: HashSet<String>,
}

impl SignatureCatalog {
    pub fn from_definition(definition: CatalogDefinition) -> Result<Self, CatalogError> {
        let undergraduate = SignatureTable::build(
            definition.undergraduate_majors,
            definition.undergraduate_departments,
        )?;
        let graduate =
            SignatureTable::build(definition.graduate_programs, definition.graduate_departments)?;

        let mut language_programs = definition.language_programs;
        for program in language_programs.iter_mut() {
            program.code = course::normalize(&program.code);
        }
        // longest first so `W_EXPR` is tried before a shorter token it contains
        language_programs.sort_by(|a, b| b.code.len().cmp(&a.code.len()));

        Ok(Self {
            undergraduate,
            graduate,
            language_programs,
            exit_exam_markers: definition
                .exit_exam_markers
                .iter()
                .map(|marker| course::normalize(marker))
                .collect(),
            passing_grades: definition
                .passing_grades
                .iter()
                .map(|grade| grade.trim().to_ascii_uppercase())
                .collect(),
        })
    }

    /// The tables the registrar maintained before catalogs became files.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_definition(CatalogDefinition::default())
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let definition: CatalogDefinition = serde_json::from_str(&raw)?;
        Self::from_definition(definition)
    }

    pub fn table(&self, program_type: ProgramType) -> Option<&SignatureTable> {
        match program_type {
            ProgramType::Undergraduate => Some(&self.undergraduate),
            ProgramType::Graduate => Some(&self.graduate),
            ProgramType::Language => None,
        }
    }

    /// Language program whose token the department prefix carries.
    pub fn language_program(&self, prefix: &str) -> Option<&LanguageProgramDefinition> {
        self.language_programs
            .iter()
            .find(|program| prefix == program.code || prefix.starts_with(&program.code))
    }

    pub fn language_program_by_code(&self, code: &str) -> Option<&LanguageProgramDefinition> {
        self.language_programs.iter().find(|program| program.code == code)
    }

    pub fn is_exit_exam(&self, normalized_code: &str) -> bool {
        self.exit_exam_markers
            .iter()
            .any(|marker| normalized_code.contains(marker.as_str()))
    }

    pub fn is_passing(&self, grade: &str) -> bool {
        self.passing_grades
            .contains(&grade.trim().to_ascii_uppercase())
    }

    /// Every program named by the catalog, in the shape the registry serves.
    pub fn reference_majors(&self) -> Vec<MajorRef> {
        let academic = [
            (ProgramType::Undergraduate, &self.undergraduate),
            (ProgramType::Graduate, &self.graduate),
        ];
        let mut majors: Vec<MajorRef> = academic
            .iter()
            .flat_map(|(program_type, table)| {
                table.majors().iter().map(move |major| MajorRef {
                    code: major.code.clone(),
                    name: major.name.clone(),
                    program_type: *program_type,
                })
            })
            .collect();
        majors.extend(self.language_programs.iter().map(|program| MajorRef {
            code: program.code.clone(),
            name: program.name.clone(),
            program_type: ProgramType::Language,
        }));
        majors
    }

    pub fn reference_registry(&self) -> InMemoryRegistry {
        InMemoryRegistry::new(self.reference_majors())
    }
}

fn major(code: &str, name: &str, courses: &[&str]) -> MajorDefinition {
    MajorDefinition {
        code: code.to_string(),
        name: name.to_string(),
        signature_courses: courses.iter().map(|c| c.to_string()).collect(),
    }
}

fn departments(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(prefix, major)| (prefix.to_string(), major.to_string()))
        .collect()
}

impl Default for CatalogDefinition {
    fn default() -> Self {
        Self {
            undergraduate_majors: vec![
                major(
                    "IR",
                    "International Relations",
                    &[
                        "IR210", "IR220", "IR301", "IR310", "IR320", "IR340", "IR401", "IR410",
                        "IR480", "POL302",
                    ],
                ),
                major(
                    "BUS",
                    "Business Administration",
                    &[
                        "BUS201", "BUS210", "BUS250", "BUS301", "BUS330", "BUS360", "BUS410",
                        "BUS460", "ACCT201", "FIN301",
                    ],
                ),
                major(
                    "CS",
                    "Computer Science",
                    &[
                        "CS201", "CS210", "CS301", "CS320", "CS350", "CS410", "CS460", "MATH251",
                    ],
                ),
                major(
                    "TESOL",
                    "Teaching English to Speakers of Other Languages",
                    &[
                        "ENGL301", "ENGL310", "LING201", "LING310", "TESOL310", "TESOL401",
                        "EDUC301",
                    ],
                ),
                major(
                    "THM",
                    "Tourism and Hospitality Management",
                    &["THM201", "THM210", "THM301", "THM320", "THM410"],
                ),
            ],
            undergraduate_departments: departments(&[
                ("IR", "International Relations"),
                ("POL", "International Relations"),
                ("BUS", "Business Administration"),
                ("ACCT", "Business Administration"),
                ("FIN", "Business Administration"),
                ("MGT", "Business Administration"),
                ("CS", "Computer Science"),
                ("MATH", "Computer Science"),
                ("ENGL", "Teaching English to Speakers of Other Languages"),
                ("LING", "Teaching English to Speakers of Other Languages"),
                ("TESOL", "Teaching English to Speakers of Other Languages"),
                ("EDUC", "Teaching English to Speakers of Other Languages"),
                ("THM", "Tourism and Hospitality Management"),
            ]),
            graduate_programs: vec![
                major(
                    "MBA",
                    "Master of Business Administration",
                    &["BUS501", "BUS510", "BUS520", "BUS550", "BUS590", "ACCT510"],
                ),
                major(
                    "MIR",
                    "Master of International Relations",
                    &["IR501", "IR510", "IR520", "IR590"],
                ),
                major(
                    "MED",
                    "Master of Education in TESOL",
                    &["TESOL501", "TESOL510", "EDUC520"],
                ),
            ],
            graduate_departments: departments(&[
                ("BUS", "Master of Business Administration"),
                ("ACCT", "Master of Business Administration"),
                ("FIN", "Master of Business Administration"),
                ("IR", "Master of International Relations"),
                ("TESOL", "Master of Education in TESOL"),
                ("EDUC", "Master of Education in TESOL"),
            ]),
            language_programs: vec![
                LanguageProgramDefinition {
                    code: "IEAP".to_string(),
                    name: "Intensive English for Academic Purposes".to_string(),
                    completion_level: 4,
                },
                LanguageProgramDefinition {
                    code: "GESL".to_string(),
                    name: "General English as a Second Language".to_string(),
                    completion_level: 3,
                },
                LanguageProgramDefinition {
                    code: "EHSS".to_string(),
                    name: "English for High School Students".to_string(),
                    completion_level: 3,
                },
                LanguageProgramDefinition {
                    code: "W_EXPR".to_string(),
                    name: "Weekend Express English".to_string(),
                    completion_level: 2,
                },
            ],
            exit_exam_markers: vec!["EXIT".to_string(), "COMEX".to_string()],
            passing_grades: ["A+", "A", "A-", "B+", "B", "B-", "C+", "C", "C-", "D+", "D", "P"]
                .iter()
                .map(|grade| grade.to_string())
                .collect(),
        }
    }
}
