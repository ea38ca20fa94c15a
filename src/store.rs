use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{EnrollmentRecord, StudentOutput};

/// Storage boundary for the batch runner. `replace_output` must be atomic:
/// a student's previous journeys, milestones and progression are discarded
/// and the new set written, or nothing changes.
#[async_trait]
pub trait ProgressionStore: Send + Sync {
    async fn student_ids(&self) -> Result<Vec<Uuid>, StoreError>;
    async fn enrollments(&self, student_id: Uuid) -> Result<Vec<EnrollmentRecord>, StoreError>;
    async fn replace_output(&self, output: &StudentOutput) -> Result<(), StoreError>;
    async fn clear_output(&self, student_id: Uuid) -> Result<(), StoreError>;
}

/// Process-local store for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    enrollments: Mutex<HashMap<Uuid, Vec<EnrollmentRecord>>>,
    outputs: Mutex<HashMap<Uuid, StudentOutput>>,
    failing: Mutex<Vec<Uuid>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_enrollments(&self, records: Vec<EnrollmentRecord>) -> Result<(), StoreError> {
        let mut enrollments = self.enrollments.lock().map_err(poisoned)?;
        for record in records {
            enrollments.entry(record.student_id).or_default().push(record);
        }
        Ok(())
    }

    /// Registers a student with no enrollments at all.
    pub fn insert_student(&self, student_id: Uuid) -> Result<(), StoreError> {
        self.enrollments
            .lock()
            .map_err(poisoned)?
            .entry(student_id)
            .or_default();
        Ok(())
    }

    /// Drops a student's enrollments while keeping any output already built.
    pub fn remove_enrollments(&self, student_id: Uuid) -> Result<(), StoreError> {
        self.enrollments.lock().map_err(poisoned)?.remove(&student_id);
        Ok(())
    }

    /// Makes every write for `student_id` fail, leaving prior output intact.
    pub fn fail_writes_for(&self, student_id: Uuid) -> Result<(), StoreError> {
        self.failing.lock().map_err(poisoned)?.push(student_id);
        Ok(())
    }

    pub fn output(&self, student_id: Uuid) -> Result<Option<StudentOutput>, StoreError> {
        Ok(self.outputs.lock().map_err(poisoned)?.get(&student_id).cloned())
    }

    fn check_writable(&self, student_id: Uuid) -> Result<(), StoreError> {
        if self.failing.lock().map_err(poisoned)?.contains(&student_id) {
            return Err(StoreError::Unavailable(format!(
                "writes rejected for student {student_id}"
            )));
        }
        Ok(())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".to_string())
}

#[async_trait]
impl ProgressionStore for MemoryStore {
    async fn student_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let mut ids: BTreeSet<Uuid> = self.enrollments.lock().map_err(poisoned)?.keys().copied().collect();
        ids.extend(self.outputs.lock().map_err(poisoned)?.keys().copied());
        Ok(ids.into_iter().collect())
    }

    async fn enrollments(&self, student_id: Uuid) -> Result<Vec<EnrollmentRecord>, StoreError> {
        Ok(self
            .enrollments
            .lock()
            .map_err(poisoned)?
            .get(&student_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_output(&self, output: &StudentOutput) -> Result<(), StoreError> {
        self.check_writable(output.student_id)?;
        self.outputs
            .lock()
            .map_err(poisoned)?
            .insert(output.student_id, output.clone());
        Ok(())
    }

    async fn clear_output(&self, student_id: Uuid) -> Result<(), StoreError> {
        self.check_writable(student_id)?;
        self.outputs.lock().map_err(poisoned)?.remove(&student_id);
        Ok(())
    }
}
