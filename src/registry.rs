use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::ProgramType;

/// Opaque handle to a catalog major or program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MajorRef {
    pub code: String,
    pub name: String,
    pub program_type: ProgramType,
}

/// Read-only lookup of majors. Loaded once per batch and shared.
pub trait MajorRegistry: Send + Sync {
    fn by_name(&self, name: &str) -> Option<MajorRef>;
    fn by_code(&self, code: &str) -> Option<MajorRef>;

    /// Name first, then code; strategies only ever need this.
    fn resolve(&self, key: &str) -> Option<MajorRef> {
        self.by_name(key).or_else(|| self.by_code(key))
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    by_name: HashMap<String, MajorRef>,
    by_code: HashMap<String, MajorRef>,
}

impl InMemoryRegistry {
    pub fn new(majors: impl IntoIterator<Item = MajorRef>) -> Self {
        let mut registry = Self::default();
        for major in majors {
            registry
                .by_name
                .insert(normalize(&major.name), major.clone());
            registry.by_code.insert(normalize(&major.code), major);
        }
        registry
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

impl MajorRegistry for InMemoryRegistry {
    fn by_name(&self, name: &str) -> Option<MajorRef> {
        self.by_name.get(&normalize(name)).cloned()
    }

    fn by_code(&self, code: &str) -> Option<MajorRef> {
        self.by_code.get(&normalize(code)).cloned()
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> InMemoryRegistry {
        InMemoryRegistry::new(vec![MajorRef {
            code: "IR".to_string(),
            name: "International Relations".to_string(),
            program_type: ProgramType::Undergraduate,
        }])
    }

    #[test]
    fn resolves_by_name_or_code_case_insensitively() {
        let registry = registry();
        assert!(registry.by_name("international relations").is_some());
        assert!(registry.by_code("ir").is_some());
        assert_eq!(
            registry.resolve("IR").map(|major| major.name),
            Some("International Relations".to_string())
        );
    }

    #[test]
    fn misses_return_none() {
        assert!(registry().resolve("Astrophysics").is_none());
    }
}
