//! Portal routes and the navigation guard.

use classroom_shared::{Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    // Landing page
    Home,

    // Auth routes
    Login,
    Register,

    // Teacher area
    TeacherDashboard,
    TeacherSubjects,
    TeacherAssignments,
    TeacherAttendance,

    // Student area
    StudentDashboard,
    StudentAssignments,
    StudentAttendance,
    StudentSubmissions,
}

impl Route {
    pub const ALL: [Route; 11] = [
        Route::Home,
        Route::Login,
        Route::Register,
        Route::TeacherDashboard,
        Route::TeacherSubjects,
        Route::TeacherAssignments,
        Route::TeacherAttendance,
        Route::StudentDashboard,
        Route::StudentAssignments,
        Route::StudentAttendance,
        Route::StudentSubmissions,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Login => "/auth/login",
            Route::Register => "/auth/register",
            Route::TeacherDashboard => "/teacher/dashboard",
            Route::TeacherSubjects => "/teacher/subjects",
            Route::TeacherAssignments => "/teacher/assignments",
            Route::TeacherAttendance => "/teacher/attendance",
            Route::StudentDashboard => "/student/dashboard",
            Route::StudentAssignments => "/student/assignments",
            Route::StudentAttendance => "/student/attendance",
            Route::StudentSubmissions => "/student/submissions",
        }
    }

    /// Match a path, ignoring a trailing slash.
    pub fn parse(path: &str) -> Option<Route> {
        let trimmed = path.trim_end_matches('/');
        let path = if trimmed.is_empty() { "/" } else { trimmed };
        Route::ALL.into_iter().find(|route| route.path() == path)
    }

    /// The role a route is reserved for, if any.
    pub fn role(&self) -> Option<Role> {
        match self {
            Route::Home | Route::Login | Route::Register => None,
            Route::TeacherDashboard
            | Route::TeacherSubjects
            | Route::TeacherAssignments
            | Route::TeacherAttendance => Some(Role::Teacher),
            Route::StudentDashboard
            | Route::StudentAssignments
            | Route::StudentAttendance
            | Route::StudentSubmissions => Some(Role::Student),
        }
    }

    pub fn requires_auth(&self) -> bool {
        self.role().is_some()
    }

    pub fn dashboard_for(role: Role) -> Route {
        match role {
            Role::Teacher => Route::TeacherDashboard,
            Role::Student => Route::StudentDashboard,
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Proceed,
    Redirect(Route),
}

/// Decide whether `user` may open `route`.
///
/// Signed-out users are sent to the login page; users in the wrong area are
/// sent to their own dashboard.
pub fn guard(route: Route, user: Option<&User>) -> Navigation {
    let Some(required) = route.role() else {
        return Navigation::Proceed;
    };
    match user {
        None => Navigation::Redirect(Route::Login),
        Some(user) if user.role != required => {
            Navigation::Redirect(Route::dashboard_for(user.role))
        }
        Some(_) => Navigation::Proceed,
    }
}
