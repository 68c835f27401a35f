//! Shared data models for the classroom portal API.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Server-assigned identifier, unique within one kind of record.
pub type RecordId = i64;

/// Records that carry a server-assigned id.
pub trait Identified {
    fn id(&self) -> RecordId;
}

macro_rules! identified {
    ($($ty:ty),* $(,)?) => {
        $(impl Identified for $ty {
            fn id(&self) -> RecordId {
                self.id
            }
        })*
    };
}

// --- Identity ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: RecordId,
    pub email: String,
    pub role: Role,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// Response of `/login` and `/register`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentUserResponse {
    pub user: User,
}

// --- Subjects ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subject {
    pub id: RecordId,
    pub name: String,
    pub teacher_id: RecordId,
    #[serde(default)]
    pub teacher_email: Option<String>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubjectRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub subject: Subject,
}

// --- Assignments ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub id: RecordId,
    pub subject_id: RecordId,
    #[serde(default)]
    pub subject_name: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub due_date: NaiveDateTime,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub submission_count: u32,
    /// Only present on the student listing.
    #[serde(default)]
    pub submitted: bool,
    /// Only present on the student listing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub my_submission: Option<Submission>,
}

impl Assignment {
    pub fn is_past_due(&self, now: NaiveDateTime) -> bool {
        self.due_date < now
    }
}

/// Fields a teacher supplies when creating an assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAssignment {
    pub subject_id: RecordId,
    pub title: String,
    pub description: Option<String>,
    pub due_date: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub assignment: Assignment,
}

// --- Submissions ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    pub id: RecordId,
    pub assignment_id: RecordId,
    pub student_id: RecordId,
    #[serde(default)]
    pub student_email: Option<String>,
    pub file_path: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub is_late: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub submission: Submission,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradeRequest {
    pub grade: String,
    #[serde(default)]
    pub feedback: Option<String>,
}

// --- Attendance ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttendanceRecord {
    pub id: RecordId,
    pub subject_id: RecordId,
    #[serde(default)]
    pub subject_name: Option<String>,
    pub student_id: RecordId,
    #[serde(default)]
    pub student_email: Option<String>,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub marked_at: Option<NaiveDateTime>,
}

/// One student's status in a mark-attendance request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttendanceEntry {
    pub student_id: RecordId,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkAttendanceRequest {
    pub subject_id: RecordId,
    pub date: NaiveDate,
    pub attendance_records: Vec<AttendanceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarkAttendanceResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub records_marked: u32,
    #[serde(default)]
    pub errors: Option<Vec<String>>,
}

/// Teacher view: attendance of one subject, grouped per student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectAttendanceResponse {
    pub subject: Subject,
    #[serde(default)]
    pub attendance: Vec<StudentAttendance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentAttendance {
    pub student: User,
    pub records: Vec<AttendanceRecord>,
}

/// Student view: own attendance, with server-side stats when filtered by subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MyAttendanceResponse {
    #[serde(default)]
    pub attendance: Vec<AttendanceRecord>,
    #[serde(default)]
    pub stats: Option<ReportedAttendanceStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportedAttendanceStats {
    pub total: u32,
    pub present: u32,
    pub absent: u32,
    pub percentage: f64,
}

identified!(User, Subject, Assignment, Submission, AttendanceRecord);
