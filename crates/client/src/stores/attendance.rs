//! Attendance records and derived statistics.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use classroom_shared::{
    AttendanceEntry, AttendanceRecord, AttendanceStatus, MarkAttendanceResponse, RecordId, Role,
    ServerEvent, User, ATTENDANCE_MARKED,
};
use parking_lot::RwLock;

use super::collection::Collection;
use super::{require_role, tracked, Attachment, StoreStatus};
use crate::api_client::ApiClient;
use crate::error::StoreError;
use crate::ws::{listener, LiveClient};

/// Optional inclusive date bounds for a teacher's attendance fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttendanceStats {
    pub total: u32,
    pub present: u32,
    pub absent: u32,
    /// Present share of total, rounded to the nearest whole percent.
    pub percentage: u32,
}

impl AttendanceStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AttendanceRecord>) -> Self {
        let mut stats = Self::default();
        for record in records {
            stats.total += 1;
            match record.status {
                AttendanceStatus::Present => stats.present += 1,
                AttendanceStatus::Absent => stats.absent += 1,
            }
        }
        stats.percentage = if stats.total == 0 {
            0
        } else {
            (f64::from(stats.present) / f64::from(stats.total) * 100.0).round() as u32
        };
        stats
    }
}

/// Records of one subject with their statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectAttendance {
    pub subject_id: RecordId,
    pub subject_name: Option<String>,
    pub records: Vec<AttendanceRecord>,
    pub stats: AttendanceStats,
}

#[derive(Debug, Default)]
struct AttendanceState {
    records: Collection<AttendanceRecord>,
    students: Vec<User>,
    subject_id: Option<RecordId>,
    range: DateRange,
}

#[derive(Debug, Clone)]
pub struct AttendanceStore {
    api: ApiClient,
    viewer: User,
    state: Arc<RwLock<AttendanceState>>,
    status: Arc<RwLock<StoreStatus>>,
    attachment: Arc<Attachment>,
}

impl AttendanceStore {
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

    /// Load attendance records.
    ///
    /// Teachers load one subject (`None` does nothing), optionally bounded by
    /// `range`; the per-student groups the server returns are flattened.
    /// Students load their own records, optionally for one subject.
    pub async fn fetch_attendance(
        &self,
        subject_id: Option<RecordId>,
        range: DateRange,
    ) -> Result<(), StoreError> {
        let records = match self.viewer.role {
            Role::Teacher => {
                let Some(subject_id) = subject_id else {
                    return Ok(());
                };
                let resp = tracked(
                    &self.status,
                    "Failed to fetch attendance",
                    self.api.subject_attendance(subject_id, range.start, range.end),
                )
                .await?;
                resp.attendance
                    .into_iter()
                    .flat_map(|group| group.records)
                    .collect::<Vec<_>>()
            }
            Role::Student => {
                let resp = tracked(
                    &self.status,
                    "Failed to fetch attendance",
                    self.api.my_attendance(subject_id),
                )
                .await?;
                resp.attendance
            }
        };

        tracing::debug!(count = records.len(), ?subject_id, "fetched attendance");
        let mut state = self.state.write();
        state.records.replace_all(records);
        state.subject_id = subject_id;
        state.range = range;
        Ok(())
    }

    /// Load the student roster. Teachers only; a no-op otherwise.
    pub async fn fetch_students(&self) -> Result<(), StoreError> {
        if self.viewer.role != Role::Teacher {
            return Ok(());
        }
        let students = tracked(&self.status, "Failed to fetch students", self.api.students()).await?;
        self.state.write().students = students;
        Ok(())
    }

    /// Mark a day's attendance, then reload the subject's records since the
    /// response only carries counts.
    pub async fn mark_attendance(
        &self,
        subject_id: RecordId,
        date: NaiveDate,
        entries: &[AttendanceEntry],
    ) -> Result<MarkAttendanceResponse, StoreError> {
        require_role(self.viewer.role, Role::Teacher)?;
        let resp = tracked(
            &self.status,
            "Failed to mark attendance",
            self.api.mark_attendance(subject_id, date, entries),
        )
        .await?;
        if let Some(errors) = resp.errors.as_ref().filter(|e| !e.is_empty()) {
            tracing::warn!(?errors, "some attendance entries were rejected");
        }

        let range = {
            let state = self.state.read();
            if state.subject_id == Some(subject_id) {
                state.range
            } else {
                DateRange::default()
            }
        };
        self.fetch_attendance(Some(subject_id), range).await?;
        Ok(resp)
    }

    /// Reconcile one live event into the cache.
    pub fn apply(&self, event: &ServerEvent) {
        apply_event(&mut self.state.write(), &self.viewer, event);
    }

    /// Start following attendance events from `client`.
    pub fn attach(&self, client: &LiveClient) {
        let state = Arc::clone(&self.state);
        let viewer = self.viewer.clone();
        let on_marked = listener(move |event| {
            apply_event(&mut state.write(), &viewer, event);
            Ok(())
        });
        self.attachment
            .attach(client, vec![(ATTENDANCE_MARKED, on_marked)]);
    }

    pub fn detach(&self) {
        self.attachment.detach();
    }

    // --- Derived views ---

    pub fn records(&self) -> Vec<AttendanceRecord> {
        self.state.read().records.to_vec()
    }

    pub fn students(&self) -> Vec<User> {
        self.state.read().students.clone()
    }

    /// The viewer's own records. Empty for teachers.
    pub fn my_attendance(&self) -> Vec<AttendanceRecord> {
        if self.viewer.role != Role::Student {
            return Vec::new();
        }
        self.records()
    }

    /// Records grouped by subject in ascending subject id order.
    pub fn attendance_by_subject(&self) -> Vec<SubjectAttendance> {
        let state = self.state.read();
        let mut groups: BTreeMap<RecordId, SubjectAttendance> = BTreeMap::new();
        for record in state.records.iter() {
            let group = groups
                .entry(record.subject_id)
                .or_insert_with(|| SubjectAttendance {
                    subject_id: record.subject_id,
                    subject_name: record.subject_name.clone(),
                    records: Vec::new(),
                    stats: AttendanceStats::default(),
                });
            group.records.push(record.clone());
        }
        groups
            .into_values()
            .map(|mut group| {
                group.stats = AttendanceStats::from_records(&group.records);
                group
            })
            .collect()
    }

    pub fn attendance_for_subject(&self, subject_id: RecordId) -> Vec<AttendanceRecord> {
        self.state
            .read()
            .records
            .iter()
            .filter(|r| r.subject_id == subject_id)
            .cloned()
            .collect()
    }

    pub fn attendance_for_date(&self, subject_id: RecordId, date: NaiveDate) -> Vec<AttendanceRecord> {
        self.state
            .read()
            .records
            .iter()
            .filter(|r| r.subject_id == subject_id && r.date == date)
            .cloned()
            .collect()
    }

    /// Statistics over one subject, or over everything cached.
    pub fn stats(&self, subject_id: Option<RecordId>) -> AttendanceStats {
        let state = self.state.read();
        AttendanceStats::from_records(
            state
                .records
                .iter()
                .filter(|r| subject_id.map_or(true, |id| r.subject_id == id)),
        )
    }

    pub fn needs_refresh(&self) -> bool {
        self.state.read().records.needs_refresh()
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
        *self.state.write() = AttendanceState::default();
        *self.status.write() = StoreStatus::default();
    }
}

fn apply_event(state: &mut AttendanceState, viewer: &User, event: &ServerEvent) {
    let ServerEvent::AttendanceMarked(marked) = event else {
        return;
    };
    let subject_matches = match viewer.role {
        Role::Teacher => state.subject_id == Some(marked.subject_id),
        Role::Student => state.subject_id.map_or(true, |id| id == marked.subject_id),
    };
    if !subject_matches {
        return;
    }

    let range = state.range;
    let mut applied = 0usize;
    for record in &marked.records {
        if viewer.role == Role::Student && record.student_id != viewer.id {
            continue;
        }
        if record.subject_id != marked.subject_id || !range.contains(record.date) {
            continue;
        }
        state.records.upsert(record.clone());
        applied += 1;
    }
    tracing::debug!(subject_id = marked.subject_id, applied, "attendance marked");
}

#[cfg(test)]
mod tests {
    use super::*;
    use classroom_shared::AttendanceMarked;

    fn user(id: RecordId, role: Role) -> User {
        User {
            id,
            email: format!("user{id}@school.test"),
            role,
            active: true,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
    }

    fn record(
        id: RecordId,
        subject_id: RecordId,
        student_id: RecordId,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> AttendanceRecord {
        AttendanceRecord {
            id,
            subject_id,
            subject_name: Some(format!("Subject {subject_id}")),
            student_id,
            student_email: None,
            date,
            status,
            marked_at: None,
        }
    }

    use AttendanceStatus::{Absent, Present};

    fn seeded(viewer: User, records: Vec<AttendanceRecord>) -> AttendanceStore {
        let store = AttendanceStore::new(ApiClient::new(), viewer);
        store.state.write().records.replace_all(records);
        store
    }

    #[test]
    fn percentage_rounds_to_nearest() {
        let records = vec![
            record(1, 1, 9, day(1), Present),
            record(2, 1, 9, day(2), Present),
            record(3, 1, 9, day(3), Absent),
        ];
        let stats = AttendanceStats::from_records(&records);
        assert_eq!(
            stats,
            AttendanceStats {
                total: 3,
                present: 2,
                absent: 1,
                percentage: 67
            }
        );
        assert_eq!(AttendanceStats::from_records(std::iter::empty()).percentage, 0);
    }

    #[test]
    fn groups_by_subject_in_id_order() {
        let store = seeded(
            user(9, Role::Student),
            vec![
                record(1, 5, 9, day(1), Present),
                record(2, 2, 9, day(1), Absent),
                record(3, 5, 9, day(2), Absent),
                record(4, 2, 9, day(2), Present),
                record(5, 2, 9, day(3), Present),
            ],
        );

        let groups = store.attendance_by_subject();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].subject_id, 2);
        assert_eq!(groups[0].subject_name.as_deref(), Some("Subject 2"));
        assert_eq!(groups[0].stats.total, 3);
        assert_eq!(groups[0].stats.percentage, 67);
        assert_eq!(groups[1].subject_id, 5);
        assert_eq!(groups[1].stats.percentage, 50);

        assert_eq!(store.stats(None).total, 5);
        assert_eq!(store.stats(Some(5)).present, 1);
        assert_eq!(store.attendance_for_subject(2).len(), 3);
        assert_eq!(store.attendance_for_date(5, day(2)).len(), 1);
        assert_eq!(store.my_attendance().len(), 5);
    }

    #[test]
    fn live_marking_upserts_by_record_id() {
        let store = seeded(user(1, Role::Teacher), vec![record(1, 3, 9, day(1), Absent)]);
        store.state.write().subject_id = Some(3);

        store.apply(&ServerEvent::AttendanceMarked(AttendanceMarked {
            subject_id: 3,
            records: vec![
                record(1, 3, 9, day(1), Present),
                record(2, 3, 10, day(1), Present),
            ],
        }));

        let records = store.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, Present);
        assert_eq!(store.stats(Some(3)).percentage, 100);
    }

    #[test]
    fn teacher_ignores_marking_for_other_subjects() {
        let store = seeded(user(1, Role::Teacher), Vec::new());
        store.state.write().subject_id = Some(3);
        store.apply(&ServerEvent::AttendanceMarked(AttendanceMarked {
            subject_id: 4,
            records: vec![record(7, 4, 9, day(1), Present)],
        }));
        assert!(store.records().is_empty());
    }

    #[test]
    fn student_only_takes_own_records() {
        let store = seeded(user(9, Role::Student), Vec::new());
        store.apply(&ServerEvent::AttendanceMarked(AttendanceMarked {
            subject_id: 4,
            records: vec![
                record(7, 4, 9, day(1), Present),
                record(8, 4, 10, day(1), Absent),
            ],
        }));
        let ids: Vec<_> = store.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![7]);
    }

    #[test]
    fn marking_outside_fetched_range_is_skipped() {
        let store = seeded(user(1, Role::Teacher), Vec::new());
        {
            let mut state = store.state.write();
            state.subject_id = Some(3);
            state.range = DateRange::between(day(1), day(7));
        }
        store.apply(&ServerEvent::AttendanceMarked(AttendanceMarked {
            subject_id: 3,
            records: vec![
                record(1, 3, 9, day(5), Present),
                record(2, 3, 9, day(20), Present),
            ],
        }));
        let ids: Vec<_> = store.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn students_cannot_mark() {
        let store = seeded(user(9, Role::Student), Vec::new());
        let err = store
            .mark_attendance(3, day(1), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::WrongRole { .. }));
        store.fetch_students().await.unwrap();
        assert!(store.students().is_empty());
    }
}
