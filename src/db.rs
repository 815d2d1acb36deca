use std::io::Read;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::gradebook::{validate_exam, validate_score, Gradebook};
use crate::models::{
    AssessmentScore, AttendanceRecord, AttendanceStatus, ClassInfo, Component, ComponentConfig,
    ExamResult, Student, Subject, Term, TermConfig,
};
use crate::registry::SchoolRegistry;
use crate::seed;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let school = seed::mock_school()?;
    let mut tx = pool.begin().await?;

    for student in &school.students {
        sqlx::query(
            r#"
            INSERT INTO report_cards.students (id, first_name, last_name, admission_number)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                admission_number = EXCLUDED.admission_number
            "#,
        )
        .bind(&student.id)
        .bind(&student.first_name)
        .bind(&student.last_name)
        .bind(&student.admission_number)
        .execute(&mut *tx)
        .await?;
    }

    for subject in &school.subjects {
        sqlx::query(
            r#"
            INSERT INTO report_cards.subjects (id, name, code)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, code = EXCLUDED.code
            "#,
        )
        .bind(&subject.id)
        .bind(&subject.name)
        .bind(&subject.code)
        .execute(&mut *tx)
        .await?;
    }

    for (position, (grade_level, subject_id)) in school.offerings.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO report_cards.grade_subjects (grade_level, subject_id, position)
            VALUES ($1, $2, $3)
            ON CONFLICT (grade_level, subject_id) DO UPDATE SET position = EXCLUDED.position
            "#,
        )
        .bind(grade_level)
        .bind(subject_id)
        .bind(position as i32)
        .execute(&mut *tx)
        .await?;
    }

    for class in &school.classes {
        sqlx::query(
            r#"
            INSERT INTO report_cards.classes (id, name, grade_level, section, academic_year)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                grade_level = EXCLUDED.grade_level,
                section = EXCLUDED.section,
                academic_year = EXCLUDED.academic_year
            "#,
        )
        .bind(&class.id)
        .bind(&class.name)
        .bind(&class.grade_level)
        .bind(&class.section)
        .bind(&class.academic_year)
        .execute(&mut *tx)
        .await?;

        for (position, student_id) in class.student_ids.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO report_cards.class_enrollments (class_id, student_id, position)
                VALUES ($1, $2, $3)
                ON CONFLICT (class_id, student_id) DO UPDATE SET position = EXCLUDED.position
                "#,
            )
            .bind(&class.id)
            .bind(student_id)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }
    }

    for config in &school.book.term_configs {
        upsert_term_config(&mut tx, config).await?;
    }
    for score in &school.book.scores {
        upsert_score(&mut tx, score).await?;
    }
    for exam in &school.book.exam_results {
        upsert_exam(&mut tx, exam).await?;
    }
    for record in &school.book.attendance {
        let source_key = format!("seed-{}-{}", record.student_id, record.date);
        insert_attendance(&mut tx, record, &source_key).await?;
    }

    for (class, reports) in school.preview_reports() {
        info!(%class, reports, "seeded class reports");
    }

    tx.commit().await?;
    info!(
        students = school.students.len(),
        scores = school.book.scores.len(),
        "seed data written"
    );
    Ok(())
}

async fn upsert_term_config(
    tx: &mut Transaction<'_, Postgres>,
    config: &TermConfig,
) -> anyhow::Result<()> {
    for rule in &config.components {
        sqlx::query(
            r#"
            INSERT INTO report_cards.term_components
            (academic_year, term, component, required_count, max_score)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (academic_year, term, component) DO UPDATE
            SET required_count = EXCLUDED.required_count, max_score = EXCLUDED.max_score
            "#,
        )
        .bind(&config.academic_year)
        .bind(config.term.number())
        .bind(rule.component.key())
        .bind(i32::try_from(rule.required_count)?)
        .bind(rule.max_score)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn upsert_score(
    tx: &mut Transaction<'_, Postgres>,
    score: &AssessmentScore,
) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO report_cards.assessment_scores
        (id, student_id, class_id, subject_id, term, component, assessment_number,
         score, max_score, recorded_on)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (student_id, class_id, subject_id, term, component, assessment_number)
        DO UPDATE SET score = EXCLUDED.score,
                      max_score = EXCLUDED.max_score,
                      recorded_on = EXCLUDED.recorded_on
        "#,
    )
    .bind(score.id)
    .bind(&score.student_id)
    .bind(&score.class_id)
    .bind(&score.subject_id)
    .bind(score.term.number())
    .bind(score.component.key())
    .bind(i32::try_from(score.assessment_number)?)
    .bind(score.score)
    .bind(score.max_score)
    .bind(score.recorded_on)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

async fn upsert_exam(tx: &mut Transaction<'_, Postgres>, exam: &ExamResult) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO report_cards.exam_results
        (id, student_id, class_id, subject_id, term, exam_score)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (student_id, class_id, subject_id, term)
        DO UPDATE SET exam_score = EXCLUDED.exam_score
        "#,
    )
    .bind(exam.id)
    .bind(&exam.student_id)
    .bind(&exam.class_id)
    .bind(&exam.subject_id)
    .bind(exam.term.number())
    .bind(exam.exam_score)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

async fn insert_attendance(
    tx: &mut Transaction<'_, Postgres>,
    record: &AttendanceRecord,
    source_key: &str,
) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO report_cards.attendance_records
        (id, student_id, class_id, attended_on, status, source_key)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(record.id)
    .bind(&record.student_id)
    .bind(&record.class_id)
    .bind(record.date)
    .bind(record.status.as_str())
    .bind(source_key)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

#[derive(Debug, Deserialize)]
pub struct ScoreRow {
    pub student_id: String,
    pub class_id: String,
    pub subject_id: String,
    pub academic_year: String,
    pub term: String,
    pub component: String,
    pub assessment_number: u32,
    pub score: f64,
    pub recorded_on: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct ExamRow {
    pub student_id: String,
    pub class_id: String,
    pub subject_id: String,
    pub term: String,
    pub exam_score: f64,
}

#[derive(Debug, Deserialize)]
pub struct AttendanceRow {
    pub student_id: String,
    pub class_id: String,
    pub date: NaiveDate,
    pub status: String,
    pub source_key: Option<String>,
}

/// Reads every row up front so a malformed line aborts before anything is written.
pub fn read_rows<T, R>(reader: R) -> anyhow::Result<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
    R: Read,
{
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut rows = Vec::new();
    for (line, result) in reader.deserialize::<T>().enumerate() {
        rows.push(result.with_context(|| format!("invalid CSV record {}", line + 1))?);
    }
    Ok(rows)
}

impl ScoreRow {
    pub fn into_score(self) -> anyhow::Result<(String, AssessmentScore)> {
        let term: Term = self.term.parse()?;
        let component: Component = self.component.parse()?;
        Ok((
            self.academic_year,
            AssessmentScore {
                id: Uuid::new_v4(),
                student_id: self.student_id,
                class_id: self.class_id,
                subject_id: self.subject_id,
                term,
                component,
                assessment_number: self.assessment_number,
                score: self.score,
                max_score: 0.0,
                recorded_on: self.recorded_on,
            },
        ))
    }
}

impl ExamRow {
    pub fn into_exam(self) -> anyhow::Result<ExamResult> {
        Ok(ExamResult {
            id: Uuid::new_v4(),
            student_id: self.student_id,
            class_id: self.class_id,
            subject_id: self.subject_id,
            term: self.term.parse()?,
            exam_score: self.exam_score,
        })
    }
}

impl AttendanceRow {
    pub fn into_record(self) -> anyhow::Result<(AttendanceRecord, String)> {
        let source_key = self
            .source_key
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
        Ok((
            AttendanceRecord {
                id: Uuid::new_v4(),
                student_id: self.student_id,
                class_id: self.class_id,
                date: self.date,
                status: self.status.parse::<AttendanceStatus>()?,
            },
            source_key,
        ))
    }
}

#[instrument(skip(pool))]
pub async fn import_scores_csv(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows: Vec<ScoreRow> = read_rows(file)?;
    let configs = fetch_term_configs(pool).await?;
    let mut tx = pool.begin().await?;
    let mut written = 0usize;

    for (line, row) in rows.into_iter().enumerate() {
        let (academic_year, mut score) = row.into_score()?;
        let config = TermConfig::resolve(&configs, &academic_year, score.term);
        validate_score(&score, &config)
            .with_context(|| format!("score record {} rejected", line + 1))?;
        score.max_score = config.max_score(score.component);

        if upsert_score(&mut tx, &score).await? > 0 {
            written += 1;
        }
    }

    tx.commit().await?;
    Ok(written)
}

#[instrument(skip(pool))]
pub async fn import_exams_csv(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows: Vec<ExamRow> = read_rows(file)?;
    let mut tx = pool.begin().await?;
    let mut written = 0usize;

    for (line, row) in rows.into_iter().enumerate() {
        let exam = row.into_exam()?;
        validate_exam(&exam).with_context(|| format!("exam record {} rejected", line + 1))?;
        if upsert_exam(&mut tx, &exam).await? > 0 {
            written += 1;
        }
    }

    tx.commit().await?;
    Ok(written)
}

#[instrument(skip(pool))]
pub async fn import_attendance_csv(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows: Vec<AttendanceRow> = read_rows(file)?;
    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;

    for row in rows {
        let (record, source_key) = row.into_record()?;
        if insert_attendance(&mut tx, &record, &source_key).await? > 0 {
            inserted += 1;
        } else {
            warn!(%source_key, "attendance record already imported");
        }
    }

    tx.commit().await?;
    Ok(inserted)
}

pub async fn fetch_term_configs(pool: &PgPool) -> anyhow::Result<Vec<TermConfig>> {
    let rows = sqlx::query(
        "SELECT academic_year, term, component, required_count, max_score \
         FROM report_cards.term_components \
         ORDER BY academic_year, term",
    )
    .fetch_all(pool)
    .await?;

    let mut configs: Vec<TermConfig> = Vec::new();
    for row in rows {
        let academic_year: String = row.get("academic_year");
        let term = term_column(&row)?;
        let component: Component = row.get::<String, _>("component").parse()?;
        let rule = ComponentConfig {
            component,
            required_count: u32::try_from(row.get::<i32, _>("required_count"))?,
            max_score: row.get("max_score"),
        };

        match configs
            .iter_mut()
            .find(|c| c.academic_year == academic_year && c.term == term)
        {
            Some(config) => config.components.push(rule),
            None => configs.push(TermConfig {
                academic_year,
                term,
                components: vec![rule],
            }),
        }
    }

    // Keep components in their canonical order regardless of row order.
    for config in configs.iter_mut() {
        config
            .components
            .sort_by_key(|c| Component::ALL.iter().position(|k| *k == c.component));
    }

    Ok(configs)
}

fn term_column(row: &PgRow) -> anyhow::Result<Term> {
    let number: i16 = row.get("term");
    Term::from_number(number).with_context(|| format!("invalid term {number} in database"))
}

fn score_from_row(row: &PgRow) -> anyhow::Result<AssessmentScore> {
    Ok(AssessmentScore {
        id: row.get("id"),
        student_id: row.get("student_id"),
        class_id: row.get("class_id"),
        subject_id: row.get("subject_id"),
        term: term_column(row)?,
        component: row.get::<String, _>("component").parse()?,
        assessment_number: u32::try_from(row.get::<i32, _>("assessment_number"))?,
        score: row.get("score"),
        max_score: row.get("max_score"),
        recorded_on: row.get("recorded_on"),
    })
}

#[instrument(skip(pool))]
pub async fn load_registry(pool: &PgPool) -> anyhow::Result<SchoolRegistry> {
    let mut registry = SchoolRegistry::new();

    for row in sqlx::query("SELECT id, first_name, last_name, admission_number FROM report_cards.students")
        .fetch_all(pool)
        .await?
    {
        registry.insert_student(Student {
            id: row.get("id"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            admission_number: row.get("admission_number"),
        });
    }

    for row in sqlx::query("SELECT id, name, code FROM report_cards.subjects")
        .fetch_all(pool)
        .await?
    {
        registry.insert_subject(Subject {
            id: row.get("id"),
            name: row.get("name"),
            code: row.get("code"),
        });
    }

    for row in sqlx::query(
        "SELECT grade_level, subject_id FROM report_cards.grade_subjects \
         ORDER BY grade_level, position",
    )
    .fetch_all(pool)
    .await?
    {
        let grade_level: String = row.get("grade_level");
        let subject_id: String = row.get("subject_id");
        registry.offer_subject(&grade_level, &subject_id);
    }

    let classes = sqlx::query(
        "SELECT id, name, grade_level, section, academic_year FROM report_cards.classes",
    )
    .fetch_all(pool)
    .await?;

    for row in classes {
        let class_id: String = row.get("id");
        let student_ids: Vec<String> = sqlx::query(
            "SELECT student_id FROM report_cards.class_enrollments \
             WHERE class_id = $1 ORDER BY position",
        )
        .bind(&class_id)
        .fetch_all(pool)
        .await?
        .iter()
        .map(|r| r.get("student_id"))
        .collect();

        registry.insert_class(ClassInfo {
            id: class_id,
            name: row.get("name"),
            grade_level: row.get("grade_level"),
            section: row.get("section"),
            academic_year: row.get("academic_year"),
            student_ids,
        });
    }

    info!(students = registry.student_count(), "registry loaded");
    Ok(registry)
}

/// Records needed to report on one class for one term.
#[instrument(skip(pool))]
pub async fn load_gradebook(pool: &PgPool, class_id: &str, term: Term) -> anyhow::Result<Gradebook> {
    let mut book = Gradebook::new();
    book.term_configs = fetch_term_configs(pool).await?;

    let scores = sqlx::query(
        r#"
        SELECT s.id, s.student_id, s.class_id, s.subject_id, s.term, s.component,
               s.assessment_number, s.score, s.max_score, s.recorded_on
        FROM report_cards.assessment_scores s
        JOIN report_cards.class_enrollments e
          ON e.student_id = s.student_id AND e.class_id = $1
        WHERE s.term = $2
        ORDER BY s.recorded_on, s.assessment_number
        "#,
    )
    .bind(class_id)
    .bind(term.number())
    .fetch_all(pool)
    .await?;
    for row in scores {
        book.scores.push(score_from_row(&row)?);
    }

    let exams = sqlx::query(
        "SELECT id, student_id, class_id, subject_id, term, exam_score \
         FROM report_cards.exam_results WHERE class_id = $1 AND term = $2",
    )
    .bind(class_id)
    .bind(term.number())
    .fetch_all(pool)
    .await?;
    for row in exams {
        book.exam_results.push(ExamResult {
            id: row.get("id"),
            student_id: row.get("student_id"),
            class_id: row.get("class_id"),
            subject_id: row.get("subject_id"),
            term: term_column(&row)?,
            exam_score: row.get("exam_score"),
        });
    }

    let attendance = sqlx::query(
        "SELECT id, student_id, class_id, attended_on, status \
         FROM report_cards.attendance_records WHERE class_id = $1 ORDER BY attended_on",
    )
    .bind(class_id)
    .fetch_all(pool)
    .await?;
    for row in attendance {
        book.attendance.push(AttendanceRecord {
            id: row.get("id"),
            student_id: row.get("student_id"),
            class_id: row.get("class_id"),
            date: row.get("attended_on"),
            status: row.get::<String, _>("status").parse()?,
        });
    }

    Ok(book)
}

pub async fn fetch_student_scores(
    pool: &PgPool,
    student_id: &str,
    subject_id: &str,
    term: Term,
) -> anyhow::Result<Vec<AssessmentScore>> {
    let rows = sqlx::query(
        "SELECT id, student_id, class_id, subject_id, term, component, assessment_number, \
         score, max_score, recorded_on \
         FROM report_cards.assessment_scores \
         WHERE student_id = $1 AND subject_id = $2 AND term = $3",
    )
    .bind(student_id)
    .bind(subject_id)
    .bind(term.number())
    .fetch_all(pool)
    .await?;

    rows.iter().map(score_from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_rows_parse_with_loose_labels() {
        let data = "\
student_id,class_id,subject_id,academic_year,term,component,assessment_number,score,recorded_on
STU001, CLS001, SUB001, 2024-2025, Term 1, classWork, 2, 7.5, 2024-09-23
STU001,CLS001,SUB001,2024-2025,2,home_work,1,9,2025-01-20
";
        let rows: Vec<ScoreRow> = read_rows(data.as_bytes()).expect("valid csv");
        assert_eq!(rows.len(), 2);

        let (year, score) = rows.into_iter().next().expect("row").into_score().expect("valid row");
        assert_eq!(year, "2024-2025");
        assert_eq!(score.term, Term::First);
        assert_eq!(score.component, Component::ClassWork);
        assert_eq!(score.assessment_number, 2);
        assert_eq!(score.score, 7.5);
    }

    #[test]
    fn malformed_rows_report_their_position() {
        let data = "\
student_id,class_id,subject_id,term,exam_score
STU001,CLS001,SUB001,1,88
STU002,CLS001,SUB001,1,not-a-number
";
        let err = read_rows::<ExamRow, _>(data.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("invalid CSV record 2"));
    }

    #[test]
    fn unknown_components_are_rejected() {
        let row = ScoreRow {
            student_id: "STU001".to_string(),
            class_id: "CLS001".to_string(),
            subject_id: "SUB001".to_string(),
            academic_year: "2024-2025".to_string(),
            term: "1".to_string(),
            component: "essay".to_string(),
            assessment_number: 1,
            score: 5.0,
            recorded_on: NaiveDate::from_ymd_opt(2024, 9, 23).expect("valid date"),
        };
        assert!(row.into_score().is_err());
    }

    #[test]
    fn attendance_rows_get_generated_source_keys() {
        let data = "\
student_id,class_id,date,status,source_key
STU001,CLS001,2024-09-09,Late,register-0909-stu001
STU001,CLS001,2024-09-10,present,
";
        let rows: Vec<AttendanceRow> = read_rows(data.as_bytes()).expect("valid csv");
        let mut records = rows.into_iter().map(|r| r.into_record().expect("valid row"));

        let (first, key) = records.next().expect("first row");
        assert_eq!(first.status, AttendanceStatus::Late);
        assert_eq!(key, "register-0909-stu001");

        let (second, key) = records.next().expect("second row");
        assert_eq!(second.status, AttendanceStatus::Present);
        assert!(key.starts_with("import-"));
    }
}
