use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::models::{AssessmentScore, AttendanceRecord, ExamResult, Term, TermConfig};

pub const EXAM_MAX_SCORE: f64 = 100.0;

#[derive(Debug, Error, PartialEq)]
pub enum ScoreError {
    #[error("component `{component}` is not configured for {term} of {academic_year}")]
    UnknownComponent {
        component: &'static str,
        term: Term,
        academic_year: String,
    },
    #[error("score {score} is outside 0..={max_score}")]
    OutOfRange { score: f64, max_score: f64 },
    #[error("assessment number {number} is outside 1..={required}")]
    AssessmentNumber { number: u32, required: u32 },
    #[error("exam score {0} is outside 0..=100")]
    ExamOutOfRange(f64),
}

pub fn validate_score(entry: &AssessmentScore, config: &TermConfig) -> Result<(), ScoreError> {
    let rule = config
        .component(entry.component)
        .ok_or_else(|| ScoreError::UnknownComponent {
            component: entry.component.key(),
            term: config.term,
            academic_year: config.academic_year.clone(),
        })?;

    if !(0.0..=rule.max_score).contains(&entry.score) {
        return Err(ScoreError::OutOfRange {
            score: entry.score,
            max_score: rule.max_score,
        });
    }

    if entry.assessment_number == 0 || entry.assessment_number > rule.required_count {
        return Err(ScoreError::AssessmentNumber {
            number: entry.assessment_number,
            required: rule.required_count,
        });
    }

    Ok(())
}

pub fn validate_exam(result: &ExamResult) -> Result<(), ScoreError> {
    if (0.0..=EXAM_MAX_SCORE).contains(&result.exam_score) {
        Ok(())
    } else {
        Err(ScoreError::ExamOutOfRange(result.exam_score))
    }
}

fn same_score_key(a: &AssessmentScore, b: &AssessmentScore) -> bool {
    a.student_id == b.student_id
        && a.class_id == b.class_id
        && a.subject_id == b.subject_id
        && a.term == b.term
        && a.component == b.component
        && a.assessment_number == b.assessment_number
}

/// In-memory record set read by the report compositor.
#[derive(Debug, Clone, Default)]
pub struct Gradebook {
    pub scores: Vec<AssessmentScore>,
    pub exam_results: Vec<ExamResult>,
    pub attendance: Vec<AttendanceRecord>,
    pub term_configs: Vec<TermConfig>,
}

impl Gradebook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Falls back to the default layout when no config was recorded for the term.
    pub fn term_config(&self, academic_year: &str, term: Term) -> TermConfig {
        TermConfig::resolve(&self.term_configs, academic_year, term)
    }

    pub fn set_term_config(&mut self, config: TermConfig) {
        match self
            .term_configs
            .iter_mut()
            .find(|c| c.academic_year == config.academic_year && c.term == config.term)
        {
            Some(existing) => *existing = config,
            None => self.term_configs.push(config),
        }
    }

    /// Validates against the governing term config, then upserts by composite key.
    /// An update keeps the id of the entry it replaces.
    pub fn record_score(
        &mut self,
        academic_year: &str,
        mut entry: AssessmentScore,
    ) -> Result<Uuid, ScoreError> {
        let config = self.term_config(academic_year, entry.term);
        validate_score(&entry, &config)?;
        entry.max_score = config.max_score(entry.component);

        if let Some(existing) = self.scores.iter_mut().find(|s| same_score_key(s, &entry)) {
            debug!(id = %existing.id, score = entry.score, "updating assessment score");
            entry.id = existing.id;
            *existing = entry;
            return Ok(existing.id);
        }

        let id = entry.id;
        self.scores.push(entry);
        Ok(id)
    }

    pub fn record_exam(&mut self, mut result: ExamResult) -> Result<Uuid, ScoreError> {
        validate_exam(&result)?;

        if let Some(existing) = self.exam_results.iter_mut().find(|e| {
            e.student_id == result.student_id
                && e.class_id == result.class_id
                && e.subject_id == result.subject_id
                && e.term == result.term
        }) {
            result.id = existing.id;
            *existing = result;
            return Ok(existing.id);
        }

        let id = result.id;
        self.exam_results.push(result);
        Ok(id)
    }

    pub fn record_attendance(&mut self, record: AttendanceRecord) {
        self.attendance.push(record);
    }
}
