//! HTTP API client with bearer-token authentication.

use chrono::NaiveDate;
use classroom_shared::{
    ApiError, Assignment, AssignmentResponse, AttendanceEntry, AuthResponse, CreateSubjectRequest,
    CurrentUserResponse, GradeRequest, LoginRequest, MarkAttendanceRequest,
    MarkAttendanceResponse, MyAttendanceResponse, NewAssignment, RecordId, RegisterRequest, Role,
    Subject, SubjectAttendanceResponse, SubjectResponse, Submission, SubmissionResponse, User,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Timestamp layout the portal server parses with `fromisoformat`.
const SERVER_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// HTTP client for the portal REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            token: None,
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Attach a bearer token to every request
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    fn authorize(&self, rb: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    /// Send a request, mapping non-success statuses to [`ApiError`].
    async fn execute(&self, rb: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let resp = self
            .authorize(rb)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;
        let err = ApiError::from_status(status, &text);
        tracing::debug!(status, error = %err, body = %text.trim(), "API request rejected");
        Err(err)
    }

    async fn json_body<TRes: DeserializeOwned>(resp: reqwest::Response) -> Result<TRes, ApiError> {
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;
        if text.is_empty() {
            serde_json::from_str("null").map_err(|e| ApiError::Deserialize(e.to_string()))
        } else {
            serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
        }
    }

    /// Make a GET request
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let resp = self.execute(self.client.get(self.url(path))).await?;
        Self::json_body(resp).await
    }

    /// Make a GET request with query parameters
    pub async fn get_json_with_query<TQuery: Serialize + ?Sized, TRes: DeserializeOwned>(
        &self,
        path: &str,
        query: &TQuery,
    ) -> Result<TRes, ApiError> {
        let resp = self
            .execute(self.client.get(self.url(path)).query(query))
            .await?;
        Self::json_body(resp).await
    }

    /// Make a POST request with JSON body
    pub async fn post_json<TReq: Serialize + ?Sized, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let resp = self
            .execute(self.client.post(self.url(path)).json(body))
            .await?;
        Self::json_body(resp).await
    }

    /// Make a PUT request with JSON body
    pub async fn put_json<TReq: Serialize + ?Sized, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let resp = self
            .execute(self.client.put(self.url(path)).json(body))
            .await?;
        Self::json_body(resp).await
    }

    /// Make a POST request with a multipart form body
    pub async fn post_multipart<TRes: DeserializeOwned>(
        &self,
        path: &str,
        form: Form,
    ) -> Result<TRes, ApiError> {
        let resp = self
            .execute(self.client.post(self.url(path)).multipart(form))
            .await?;
        Self::json_body(resp).await
    }

    /// Make a GET request and return the raw body
    pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, ApiError> {
        let resp = self.execute(self.client.get(self.url(path))).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;
        Ok(bytes.to_vec())
    }

    // --- Auth ---

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.post_json("/login", &body).await
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<AuthResponse, ApiError> {
        let body = RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            role,
        };
        self.post_json("/register", &body).await
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        let resp: CurrentUserResponse = self.get_json("/me").await?;
        Ok(resp.user)
    }

    // --- Subjects ---

    /// Subjects visible to the caller: taught subjects for teachers, all for students.
    pub async fn subjects(&self) -> Result<Vec<Subject>, ApiError> {
        self.get_json("/api/subjects").await
    }

    pub async fn create_subject(&self, name: &str) -> Result<Subject, ApiError> {
        let body = CreateSubjectRequest {
            name: name.to_string(),
        };
        let resp: SubjectResponse = self.post_json("/api/subjects", &body).await?;
        Ok(resp.subject)
    }

    // --- Assignments ---

    pub async fn assignments_for_subject(
        &self,
        subject_id: RecordId,
    ) -> Result<Vec<Assignment>, ApiError> {
        self.get_json(&format!("/api/assignments/{}", subject_id))
            .await
    }

    pub async fn create_assignment(&self, new: &NewAssignment) -> Result<Assignment, ApiError> {
        let form = Form::new()
            .text("subject_id", new.subject_id.to_string())
            .text("title", new.title.clone())
            .text("description", new.description.clone().unwrap_or_default())
            .text(
                "due_date",
                new.due_date.format(SERVER_DATETIME_FORMAT).to_string(),
            );
        let resp: AssignmentResponse = self.post_multipart("/api/assignments", form).await?;
        Ok(resp.assignment)
    }

    pub async fn assignment_submissions(
        &self,
        assignment_id: RecordId,
    ) -> Result<Vec<Submission>, ApiError> {
        self.get_json(&format!("/api/assignments/{}/submissions", assignment_id))
            .await
    }

    // --- Submissions ---

    pub async fn grade_submission(
        &self,
        submission_id: RecordId,
        grade: &str,
        feedback: Option<&str>,
    ) -> Result<Submission, ApiError> {
        let body = GradeRequest {
            grade: grade.to_string(),
            feedback: feedback.map(str::to_string),
        };
        let resp: SubmissionResponse = self
            .put_json(&format!("/api/submissions/{}/grade", submission_id), &body)
            .await?;
        Ok(resp.submission)
    }

    pub async fn submit_assignment(
        &self,
        assignment_id: RecordId,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<Submission, ApiError> {
        let form = Form::new()
            .text("assignment_id", assignment_id.to_string())
            .part("file", Part::bytes(contents).file_name(file_name.to_string()));
        let resp: SubmissionResponse = self.post_multipart("/api/submissions", form).await?;
        Ok(resp.submission)
    }

    pub async fn my_submissions(&self) -> Result<Vec<Submission>, ApiError> {
        self.get_json("/api/my-submissions").await
    }

    pub async fn download_submission(&self, submission_id: RecordId) -> Result<Vec<u8>, ApiError> {
        self.get_bytes(&format!("/api/download/{}", submission_id))
            .await
    }

    // --- Attendance ---

    pub async fn mark_attendance(
        &self,
        subject_id: RecordId,
        date: NaiveDate,
        entries: &[AttendanceEntry],
    ) -> Result<MarkAttendanceResponse, ApiError> {
        let body = MarkAttendanceRequest {
            subject_id,
            date,
            attendance_records: entries.to_vec(),
        };
        self.post_json("/api/attendance/mark", &body).await
    }

    pub async fn subject_attendance(
        &self,
        subject_id: RecordId,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<SubjectAttendanceResponse, ApiError> {
        let mut query = Vec::new();
        if let Some(start) = start_date {
            query.push(("start_date", start.to_string()));
        }
        if let Some(end) = end_date {
            query.push(("end_date", end.to_string()));
        }
        self.get_json_with_query(&format!("/api/attendance/{}", subject_id), &query)
            .await
    }

    pub async fn my_attendance(
        &self,
        subject_id: Option<RecordId>,
    ) -> Result<MyAttendanceResponse, ApiError> {
        let query: Vec<(&str, String)> = subject_id
            .map(|id| vec![("subject_id", id.to_string())])
            .unwrap_or_default();
        self.get_json_with_query("/api/my-attendance", &query).await
    }

    pub async fn students(&self) -> Result<Vec<User>, ApiError> {
        self.get_json("/api/students").await
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}
