use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("unknown term `{0}` (expected 1, 2 or 3)")]
    Term(String),
    #[error("unknown assessment component `{0}`")]
    Component(String),
    #[error("unknown attendance status `{0}`")]
    Status(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Term {
    First,
    Second,
    Third,
}

impl Term {
    pub const ALL: [Term; 3] = [Term::First, Term::Second, Term::Third];

    pub fn number(self) -> i16 {
        match self {
            Term::First => 1,
            Term::Second => 2,
            Term::Third => 3,
        }
    }

    pub fn from_number(number: i16) -> Option<Term> {
        match number {
            1 => Some(Term::First),
            2 => Some(Term::Second),
            3 => Some(Term::Third),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Term {}", self.number())
    }
}

impl FromStr for Term {
    type Err = ParseError;

    /// Accepts `2`, `term2`, `Term 2` and `term-2`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        let digits = normalized
            .trim_start_matches("term")
            .trim_start_matches([' ', '-', '_']);
        digits
            .parse::<i16>()
            .ok()
            .and_then(Term::from_number)
            .ok_or_else(|| ParseError::Term(raw.to_string()))
    }
}

impl TryFrom<String> for Term {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Term> for String {
    fn from(term: Term) -> Self {
        term.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Component {
    ClassWork,
    HomeWork,
    Quiz,
    Project,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::ClassWork,
        Component::HomeWork,
        Component::Quiz,
        Component::Project,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Component::ClassWork => "classWork",
            Component::HomeWork => "homeWork",
            Component::Quiz => "quiz",
            Component::Project => "project",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Component::ClassWork => "Class Work",
            Component::HomeWork => "Home Work",
            Component::Quiz => "Quiz",
            Component::Project => "Project",
        }
    }
}

impl FromStr for Component {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_lowercase().replace(['_', '-', ' '], "");
        Component::ALL
            .into_iter()
            .find(|component| component.key().to_ascii_lowercase() == wanted)
            .ok_or_else(|| ParseError::Component(raw.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Excused => "excused",
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "late" => Ok(AttendanceStatus::Late),
            "excused" => Ok(AttendanceStatus::Excused),
            _ => Err(ParseError::Status(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentScore {
    pub id: Uuid,
    pub student_id: String,
    pub class_id: String,
    pub subject_id: String,
    pub term: Term,
    pub component: Component,
    pub assessment_number: u32,
    pub score: f64,
    pub max_score: f64,
    pub recorded_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub component: Component,
    pub required_count: u32,
    pub max_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermConfig {
    pub academic_year: String,
    pub term: Term,
    pub components: Vec<ComponentConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamResult {
    pub id: Uuid,
    pub student_id: String,
    pub class_id: String,
    pub subject_id: String,
    pub term: Term,
    pub exam_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: String,
    pub class_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub admission_number: String,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub id: String,
    pub name: String,
    pub grade_level: String,
    pub section: String,
    pub academic_year: String,
    pub student_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSummary {
    pub class_work: f64,
    pub home_work: f64,
    pub quiz: f64,
    pub project: f64,
    pub total: f64,
    pub percentage: f64,
}

impl ComponentSummary {
    pub fn average(&self, component: Component) -> f64 {
        match component {
            Component::ClassWork => self.class_work,
            Component::HomeWork => self.home_work,
            Component::Quiz => self.quiz,
            Component::Project => self.project,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LetterGrade {
    pub grade: &'static str,
    pub remark: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectReportRow {
    pub subject_id: String,
    pub subject_name: String,
    pub ca_score: f64,
    pub exam_score: f64,
    pub total: f64,
    pub grade: &'static str,
    pub remark: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub total_days: usize,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub excused: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReportData {
    pub student_id: String,
    pub student_name: String,
    pub admission_number: String,
    pub class_id: String,
    pub class_name: String,
    pub grade_level: String,
    pub section: String,
    pub academic_year: String,
    pub term: Term,
    pub subjects: Vec<SubjectReportRow>,
    pub attendance: AttendanceSummary,
    pub overall_average: f64,
    pub overall_grade: &'static str,
    pub overall_remark: &'static str,
    pub generated_at: DateTime<Utc>,
}
