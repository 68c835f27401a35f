//! Subject list for the signed-in user.

use std::sync::Arc;

use classroom_shared::{RecordId, Role, Subject, User};
use parking_lot::RwLock;

use super::collection::Collection;
use super::{require_role, tracked, StoreStatus};
use crate::api_client::ApiClient;
use crate::error::StoreError;

/// Teachers see the subjects they teach, students see every subject.
#[derive(Debug, Clone)]
pub struct SubjectStore {
    api: ApiClient,
    viewer: User,
    subjects: Arc<RwLock<Collection<Subject>>>,
    status: Arc<RwLock<StoreStatus>>,
}

impl SubjectStore {
    pub fn new(api: ApiClient, viewer: User) -> Self {
        Self {
            api,
            viewer,
            subjects: Arc::default(),
            status: Arc::default(),
        }
    }

    pub fn viewer(&self) -> &User {
        &self.viewer
    }

    pub async fn fetch_subjects(&self) -> Result<(), StoreError> {
        let subjects = tracked(&self.status, "Failed to fetch subjects", self.api.subjects()).await?;
        tracing::debug!(count = subjects.len(), "fetched subjects");
        self.subjects.write().replace_all(subjects);
        Ok(())
    }

    pub async fn create_subject(&self, name: &str) -> Result<Subject, StoreError> {
        require_role(self.viewer.role, Role::Teacher)?;
        let subject = tracked(
            &self.status,
            "Failed to create subject",
            self.api.create_subject(name),
        )
        .await?;
        self.subjects.write().upsert(subject.clone());
        Ok(subject)
    }

    pub fn subject(&self, id: RecordId) -> Option<Subject> {
        self.subjects.read().get(id).cloned()
    }

    pub fn subjects(&self) -> Vec<Subject> {
        self.subjects.read().to_vec()
    }

    /// Subjects taught by the viewer. Empty for students.
    pub fn teacher_subjects(&self) -> Vec<Subject> {
        if self.viewer.role != Role::Teacher {
            return Vec::new();
        }
        self.subjects
            .read()
            .iter()
            .filter(|s| s.teacher_id == self.viewer.id)
            .cloned()
            .collect()
    }

    pub fn loading(&self) -> bool {
        self.status.read().loading
    }

    pub fn error(&self) -> Option<String> {
        self.status.read().error.clone()
    }

    pub fn clear_error(&self) {
        self.status.write().error = None;
    }

    pub fn clear(&self) {
        self.subjects.write().clear();
        *self.status.write() = StoreStatus::default();
    }

    #[cfg(test)]
    pub(crate) fn seed(&self, subjects: Vec<Subject>) {
        self.subjects.write().replace_all(subjects);
    }
}
