//! Assignments and submissions, kept current by fetches, local mutations and
//! live events.

use std::sync::Arc;

use chrono::NaiveDateTime;
use classroom_shared::{
    Assignment, NewAssignment, RecordId, Role, ServerEvent, Submission, User, ASSIGNMENT_CREATED,
    ASSIGNMENT_UPDATED, SUBMISSION_CREATED, SUBMISSION_GRADED,
};
use parking_lot::RwLock;

use super::collection::{Collection, Upsert};
use super::{require_role, tracked, Attachment, StoreStatus};
use crate::api_client::ApiClient;
use crate::error::StoreError;
use crate::ws::{listener, LiveClient};

#[derive(Debug, Default)]
struct AssignmentState {
    assignments: Collection<Assignment>,
    submissions: Collection<Submission>,
    /// Subject whose assignments are cached.
    subject_id: Option<RecordId>,
    /// Assignment whose submissions are cached (teachers).
    assignment_id: Option<RecordId>,
}

#[derive(Debug, Clone)]
pub struct AssignmentStore {
    api: ApiClient,
    viewer: User,
    state: Arc<RwLock<AssignmentState>>,
    status: Arc<RwLock<StoreStatus>>,
    attachment: Arc<Attachment>,
}

impl AssignmentStore {
    pub fn new(api: ApiClient, viewer: User) -> Self {
        Self {
            api,
            viewer,
            state: Arc::default(),
            status: Arc::default(),
            attachment: Arc::default(),
        }
    }

    pub fn viewer(&self) -> &User {
        &self.viewer
    }

    /// Load the assignments of a subject.
    ///
    /// For teachers `None` empties the cache; for students it does nothing.
    pub async fn fetch_assignments(&self, subject_id: Option<RecordId>) -> Result<(), StoreError> {
        let Some(subject_id) = subject_id else {
            if self.viewer.role == Role::Teacher {
                let mut state = self.state.write();
                state.assignments.clear();
                state.subject_id = None;
            }
            return Ok(());
        };

        let assignments = tracked(
            &self.status,
            "Failed to fetch assignments",
            self.api.assignments_for_subject(subject_id),
        )
        .await?;

        let mut state = self.state.write();
        state.assignments.replace_all(assignments);
        state.subject_id = Some(subject_id);
        Ok(())
    }

    /// Load the submissions of one assignment. Teachers only; a no-op otherwise.
    pub async fn fetch_submissions(&self, assignment_id: RecordId) -> Result<(), StoreError> {
        if self.viewer.role != Role::Teacher {
            return Ok(());
        }
        let submissions = tracked(
            &self.status,
            "Failed to fetch submissions",
            self.api.assignment_submissions(assignment_id),
        )
        .await?;

        let mut state = self.state.write();
        state.submissions.replace_all(submissions);
        state.assignment_id = Some(assignment_id);
        Ok(())
    }

    /// Load the viewer's own submissions. Students only; a no-op otherwise.
    pub async fn fetch_my_submissions(&self) -> Result<(), StoreError> {
        if self.viewer.role != Role::Student {
            return Ok(());
        }
        let submissions = tracked(
            &self.status,
            "Failed to fetch submissions",
            self.api.my_submissions(),
        )
        .await?;
        self.state.write().submissions.replace_all(submissions);
        Ok(())
    }

    pub async fn create_assignment(&self, new: &NewAssignment) -> Result<Assignment, StoreError> {
        require_role(self.viewer.role, Role::Teacher)?;
        let assignment = tracked(
            &self.status,
            "Failed to create assignment",
            self.api.create_assignment(new),
        )
        .await?;

        upsert_assignment(&mut self.state.write().assignments, assignment.clone());
        Ok(assignment)
    }

    /// Upload a file for an assignment and mark the cached assignment as
    /// submitted.
    pub async fn submit_assignment(
        &self,
        assignment_id: RecordId,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<Submission, StoreError> {
        require_role(self.viewer.role, Role::Student)?;
        let submission = tracked(
            &self.status,
            "Failed to submit assignment",
            self.api.submit_assignment(assignment_id, file_name, contents),
        )
        .await?;

        record_own_submission(&mut self.state.write(), submission.clone());
        Ok(submission)
    }

    pub async fn grade_submission(
        &self,
        submission_id: RecordId,
        grade: &str,
        feedback: Option<&str>,
    ) -> Result<Submission, StoreError> {
        require_role(self.viewer.role, Role::Teacher)?;
        let submission = tracked(
            &self.status,
            "Failed to grade submission",
            self.api.grade_submission(submission_id, grade, feedback),
        )
        .await?;

        self.state
            .write()
            .submissions
            .replace_existing(submission.clone());
        Ok(submission)
    }

    pub async fn download_submission(&self, submission_id: RecordId) -> Result<Vec<u8>, StoreError> {
        tracked(
            &self.status,
            "Failed to download submission",
            self.api.download_submission(submission_id),
        )
        .await
    }

    /// Reconcile one live event into the caches.
    pub fn apply(&self, event: &ServerEvent) {
        apply_event(&mut self.state.write(), &self.viewer, event);
    }

    /// Start following assignment and submission events from `client`.
    pub fn attach(&self, client: &LiveClient) {
        let listeners = [
            ASSIGNMENT_CREATED,
            ASSIGNMENT_UPDATED,
            SUBMISSION_CREATED,
            SUBMISSION_GRADED,
        ]
        .into_iter()
        .map(|event_type| {
            let state = Arc::clone(&self.state);
            let viewer = self.viewer.clone();
            let l = listener(move |event| {
                apply_event(&mut state.write(), &viewer, event);
                Ok(())
            });
            (event_type, l)
        })
        .collect();
        self.attachment.attach(client, listeners);
    }

    pub fn detach(&self) {
        self.attachment.detach();
    }

    // --- Derived views ---

    pub fn assignments(&self) -> Vec<Assignment> {
        self.state.read().assignments.to_vec()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.read().submissions.to_vec()
    }

    pub fn assignment(&self, id: RecordId) -> Option<Assignment> {
        self.state.read().assignments.get(id).cloned()
    }

    /// Assignments the student has not handed in yet.
    pub fn pending_assignments(&self) -> Vec<Assignment> {
        self.partition_by_submitted(false)
    }

    /// Assignments the student has handed in.
    pub fn submitted_assignments(&self) -> Vec<Assignment> {
        self.partition_by_submitted(true)
    }

    fn partition_by_submitted(&self, submitted: bool) -> Vec<Assignment> {
        if self.viewer.role != Role::Student {
            return Vec::new();
        }
        let state = self.state.read();
        state
            .assignments
            .iter()
            .filter(|a| has_submission(&state, a) == submitted)
            .cloned()
            .collect()
    }

    /// Assignments whose due date is before `now`.
    pub fn late_assignments(&self, now: NaiveDateTime) -> Vec<Assignment> {
        self.state
            .read()
            .assignments
            .iter()
            .filter(|a| a.is_past_due(now))
            .cloned()
            .collect()
    }

    pub fn assignments_by_subject(&self, subject_id: RecordId) -> Vec<Assignment> {
        self.state
            .read()
            .assignments
            .iter()
            .filter(|a| a.subject_id == subject_id)
            .cloned()
            .collect()
    }

    pub fn submission_for_assignment(&self, assignment_id: RecordId) -> Option<Submission> {
        self.state
            .read()
            .submissions
            .iter()
            .find(|s| s.assignment_id == assignment_id)
            .cloned()
    }

    /// A confirmed update referenced a record that was never cached; refetch.
    pub fn needs_refresh(&self) -> bool {
        let state = self.state.read();
        state.assignments.needs_refresh() || state.submissions.needs_refresh()
    }

    pub fn current_subject(&self) -> Option<RecordId> {
        self.state.read().subject_id
    }

    pub fn current_assignment(&self) -> Option<RecordId> {
        self.state.read().assignment_id
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

    pub fn clear_assignments(&self) {
        let mut state = self.state.write();
        state.assignments.clear();
        state.subject_id = None;
    }

    pub fn clear(&self) {
        *self.state.write() = AssignmentState::default();
        *self.status.write() = StoreStatus::default();
    }
}

fn has_submission(state: &AssignmentState, assignment: &Assignment) -> bool {
    assignment.submitted
        || state
            .submissions
            .iter()
            .any(|s| s.assignment_id == assignment.id)
}

/// Broadcast copies of an assignment carry no per-student fields; keep the
/// ones already cached.
fn carry_viewer_fields(existing: Option<&Assignment>, mut incoming: Assignment) -> Assignment {
    if let Some(existing) = existing {
        if incoming.my_submission.is_none() {
            incoming.my_submission = existing.my_submission.clone();
        }
        incoming.submitted |= existing.submitted;
    }
    incoming
}

fn upsert_assignment(cache: &mut Collection<Assignment>, incoming: Assignment) -> Upsert {
    let merged = carry_viewer_fields(cache.get(incoming.id), incoming);
    cache.upsert(merged)
}

fn record_own_submission(state: &mut AssignmentState, submission: Submission) {
    if let Some(assignment) = state.assignments.get_mut(submission.assignment_id) {
        assignment.submitted = true;
        assignment.my_submission = Some(submission.clone());
    }
    state.submissions.upsert(submission);
}

fn apply_event(state: &mut AssignmentState, viewer: &User, event: &ServerEvent) {
    match event {
        ServerEvent::AssignmentCreated(assignment) => {
            let relevant = state.subject_id == Some(assignment.subject_id)
                || state.assignments.contains(assignment.id);
            if relevant {
                let outcome = upsert_assignment(&mut state.assignments, assignment.clone());
                tracing::debug!(id = assignment.id, ?outcome, "assignment created");
            }
        }
        ServerEvent::AssignmentUpdated(assignment) => {
            if state.subject_id != Some(assignment.subject_id)
                && !state.assignments.contains(assignment.id)
            {
                return;
            }
            let merged = carry_viewer_fields(state.assignments.get(assignment.id), assignment.clone());
            state.assignments.replace_existing(merged);
        }
        ServerEvent::SubmissionCreated(submission) => match viewer.role {
            Role::Teacher => {
                if state.assignment_id != Some(submission.assignment_id) {
                    return;
                }
                if state.submissions.upsert(submission.clone()) == Upsert::Inserted {
                    if let Some(assignment) = state.assignments.get_mut(submission.assignment_id) {
                        assignment.submission_count += 1;
                    }
                }
            }
            Role::Student => {
                if submission.student_id == viewer.id {
                    record_own_submission(state, submission.clone());
                }
            }
        },
        ServerEvent::SubmissionGraded(submission) => {
            let relevant = match viewer.role {
                Role::Teacher => state.assignment_id == Some(submission.assignment_id),
                Role::Student => submission.student_id == viewer.id,
            };
            if !relevant {
                return;
            }
            state.submissions.replace_existing(submission.clone());
            if viewer.role == Role::Student {
                if let Some(assignment) = state.assignments.get_mut(submission.assignment_id) {
                    assignment.my_submission = Some(submission.clone());
                }
            }
        }
        ServerEvent::AttendanceMarked(_) | ServerEvent::Unknown { .. } => {}
    }
}
