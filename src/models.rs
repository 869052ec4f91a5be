//! Entity collections the console lists, and the few record fields it reads

use crate::config::ServiceKey;
use crate::errors::ConsoleError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A list-able collection. Every entity lives on exactly one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Students,
    Lecturers,
    Courses,
    Assignments,
    Submissions,
    Announcements,
    Quizzes,
    Materials,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Students,
        EntityKind::Lecturers,
        EntityKind::Courses,
        EntityKind::Assignments,
        EntityKind::Submissions,
        EntityKind::Announcements,
        EntityKind::Quizzes,
        EntityKind::Materials,
    ];

    pub fn service(&self) -> ServiceKey {
        match self {
            EntityKind::Students => ServiceKey::Students,
            EntityKind::Lecturers => ServiceKey::Lecturers,
            EntityKind::Courses => ServiceKey::Courses,
            EntityKind::Assignments => ServiceKey::Assignments,
            EntityKind::Submissions => ServiceKey::Submissions,
            EntityKind::Announcements => ServiceKey::Announcements,
            EntityKind::Quizzes => ServiceKey::Quizzes,
            EntityKind::Materials => ServiceKey::Materials,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.service().as_str()
    }

    pub fn collection_path(&self) -> String {
        format!("/api/{}", self.as_str())
    }

    /// Dashboard statistic this collection feeds.
    pub fn stat_name(&self) -> &'static str {
        match self {
            EntityKind::Students => "totalStudents",
            EntityKind::Lecturers => "totalLecturers",
            EntityKind::Courses => "totalCourses",
            EntityKind::Assignments => "totalAssignments",
            EntityKind::Submissions => "totalSubmissions",
            EntityKind::Announcements => "totalAnnouncements",
            EntityKind::Quizzes => "totalQuizzes",
            EntityKind::Materials => "totalMaterials",
        }
    }

    /// Record fields a search term is matched against.
    pub fn searchable_fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Students => &["firstName", "lastName", "email", "studentId"],
            EntityKind::Lecturers => &["firstName", "lastName", "email", "department"],
            EntityKind::Courses => &["courseCode", "courseName", "title", "description"],
            EntityKind::Assignments => &["title", "description", "courseCode"],
            EntityKind::Submissions => &["studentId", "assignmentTitle", "status"],
            EntityKind::Announcements => &["title", "content", "author"],
            EntityKind::Quizzes => &["title", "description", "courseCode"],
            EntityKind::Materials => &["title", "description", "fileName", "courseCode"],
        }
    }

    /// Only the student list pages its results; the others show every match.
    pub fn is_paginated(&self) -> bool {
        matches!(self, EntityKind::Students)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let service: ServiceKey = s
            .parse()
            .map_err(|_| ConsoleError::UnknownEntity(s.to_string()))?;
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.service() == service)
            .ok_or_else(|| ConsoleError::UnknownEntity(s.to_string()))
    }
}

/// Searchable strings of a JSON record, in field order. Numbers are
/// stringified; missing and null fields are skipped.
pub fn extract_fields(record: &Value, fields: &[&str]) -> Vec<String> {
    fields
        .iter()
        .filter_map(|field| match record.get(*field) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        })
        .collect()
}

/// Whether a submission has been graded. A `marks` of zero is a graded zero,
/// never "ungraded".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "score", rename_all = "lowercase")]
pub enum Grade {
    Ungraded,
    Graded(f64),
}

impl Grade {
    pub fn from_marks(marks: Option<&Value>) -> Self {
        match marks {
            Some(Value::Number(n)) => n.as_f64().map_or(Grade::Ungraded, Grade::Graded),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map_or(Grade::Ungraded, Grade::Graded),
            _ => Grade::Ungraded,
        }
    }

    pub fn of_submission(record: &Value) -> Self {
        Self::from_marks(record.get("marks"))
    }

    pub fn is_graded(&self) -> bool {
        matches!(self, Grade::Graded(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingSummary {
    pub graded: usize,
    pub ungraded: usize,
}

impl GradingSummary {
    pub fn from_submissions<'a>(records: impl IntoIterator<Item = &'a Value>) -> Self {
        records
            .into_iter()
            .fold(GradingSummary::default(), |mut summary, record| {
                if Grade::of_submission(record).is_graded() {
                    summary.graded += 1;
                } else {
                    summary.ungraded += 1;
                }
                summary
            })
    }
}
