use serde::Serialize;

use crate::model::SchoolSummary;
use crate::token::Session;

pub const LOGIN_PATH: &str = "/login";
const SCHOOL_PREFIX: &str = "/escuela/";

/// Outcome of a navigation check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "access", rename_all = "camelCase")]
pub enum Access {
    Allow,
    RedirectToLogin { from: String },
    Redirect { to: String },
}

pub fn home_path(session: &Session) -> String {
    match session {
        Session::Super => "/".to_string(),
        Session::School { cct } => format!("{SCHOOL_PREFIX}{cct}"),
    }
}

/// `.` or `..` segments, plain or percent-encoded.
fn has_dot_segment(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or("");
    path.split('/').any(|seg| {
        let seg = seg.to_ascii_lowercase().replace("%2e", ".");
        !seg.is_empty() && seg.chars().all(|c| c == '.')
    })
}

fn within(path: &str, base: &str) -> bool {
    if has_dot_segment(path) {
        return false;
    }
    match path.strip_prefix(base) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}

pub fn authorize(session: Option<&Session>, path: &str) -> Access {
    let path = if path.trim().is_empty() { "/" } else { path.trim() };
    let on_login = within(path, LOGIN_PATH);

    let Some(session) = session else {
        return if on_login {
            Access::Allow
        } else {
            Access::RedirectToLogin {
                from: path.to_string(),
            }
        };
    };

    if on_login {
        return Access::Redirect {
            to: home_path(session),
        };
    }

    match session {
        Session::Super => Access::Allow,
        Session::School { .. } => {
            let home = home_path(session);
            if within(path, &home) {
                Access::Allow
            } else {
                Access::Redirect { to: home }
            }
        }
    }
}

pub fn can_view_school(session: &Session, cct: &str) -> bool {
    match session {
        Session::Super => true,
        Session::School { cct: own } => own == cct,
    }
}

pub fn visible_schools<'a>(session: &Session, schools: &'a [SchoolSummary]) -> Vec<&'a SchoolSummary> {
    schools
        .iter()
        .filter(|s| can_view_school(session, &s.cct))
        .collect()
}
