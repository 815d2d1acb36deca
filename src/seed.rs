use anyhow::Context;
use chrono::{Duration, NaiveDate};
use uuid::Uuid;

use crate::assessment::DEFAULT_ACADEMIC_YEAR;
use crate::gradebook::Gradebook;
use crate::models::{
    AssessmentScore, AttendanceRecord, AttendanceStatus, ClassInfo, ExamResult, Student, Subject,
    Term, TermConfig,
};
use crate::registry::SchoolRegistry;
use crate::report::generate_bulk_reports;

#[derive(Debug, Clone)]
pub struct MockSchool {
    pub students: Vec<Student>,
    pub classes: Vec<ClassInfo>,
    pub subjects: Vec<Subject>,
    /// (grade level, subject id) in offering order.
    pub offerings: Vec<(String, String)>,
    pub book: Gradebook,
}

impl MockSchool {
    pub fn registry(&self) -> SchoolRegistry {
        let mut registry = SchoolRegistry::new();
        for student in &self.students {
            registry.insert_student(student.clone());
        }
        for class in &self.classes {
            registry.insert_class(class.clone());
        }
        for subject in &self.subjects {
            registry.insert_subject(subject.clone());
        }
        for (grade_level, subject_id) in &self.offerings {
            registry.offer_subject(grade_level, subject_id);
        }
        registry
    }

    /// Report count per class for the marked term, checked before the seed is committed.
    pub fn preview_reports(&self) -> Vec<(String, usize)> {
        let registry = self.registry();
        self.classes
            .iter()
            .map(|class| {
                let reports = generate_bulk_reports(&registry, &self.book, &class.id, Term::First);
                (class.name.clone(), reports.len())
            })
            .collect()
    }
}

/// Spread of 4..=10 that differs per student, subject and assessment.
fn sample_score(student: usize, subject: usize, component: usize, number: u32) -> f64 {
    let seed = student * 7 + subject * 5 + component * 3 + number as usize;
    4.0 + (seed % 13) as f64 * 0.5
}

fn sample_status(student: usize, day: usize) -> AttendanceStatus {
    match (student * 3 + day * 5) % 17 {
        0 => AttendanceStatus::Absent,
        1 | 2 => AttendanceStatus::Late,
        3 => AttendanceStatus::Excused,
        _ => AttendanceStatus::Present,
    }
}

/// Two classes, three subjects per grade level, Term 1 fully marked.
pub fn mock_school() -> anyhow::Result<MockSchool> {
    let students: Vec<Student> = [
        ("STU001", "Avery", "Lee", "ADM-2019-001"),
        ("STU002", "Jules", "Moreno", "ADM-2019-002"),
        ("STU003", "Kiara", "Patel", "ADM-2019-003"),
        ("STU004", "Tomas", "Okafor", "ADM-2020-004"),
        ("STU005", "Mei", "Tanaka", "ADM-2020-005"),
        ("STU006", "Noah", "Asante", "ADM-2020-006"),
    ]
    .into_iter()
    .map(|(id, first, last, admission)| Student {
        id: id.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        admission_number: admission.to_string(),
    })
    .collect();

    let subjects: Vec<Subject> = [
        ("SUB001", "Mathematics", "MATH"),
        ("SUB002", "English Language", "ENG"),
        ("SUB003", "Integrated Science", "SCI"),
        ("SUB004", "Social Studies", "SOC"),
    ]
    .into_iter()
    .map(|(id, name, code)| Subject {
        id: id.to_string(),
        name: name.to_string(),
        code: code.to_string(),
    })
    .collect();

    let offerings: Vec<(String, String)> = [
        ("Grade 7", "SUB001"),
        ("Grade 7", "SUB002"),
        ("Grade 7", "SUB003"),
        ("Grade 8", "SUB001"),
        ("Grade 8", "SUB002"),
        ("Grade 8", "SUB004"),
    ]
    .into_iter()
    .map(|(grade, subject)| (grade.to_string(), subject.to_string()))
    .collect();

    let classes = vec![
        ClassInfo {
            id: "CLS001".to_string(),
            name: "7A".to_string(),
            grade_level: "Grade 7".to_string(),
            section: "A".to_string(),
            academic_year: DEFAULT_ACADEMIC_YEAR.to_string(),
            student_ids: vec!["STU001".into(), "STU002".into(), "STU003".into()],
        },
        ClassInfo {
            id: "CLS002".to_string(),
            name: "8B".to_string(),
            grade_level: "Grade 8".to_string(),
            section: "B".to_string(),
            academic_year: DEFAULT_ACADEMIC_YEAR.to_string(),
            student_ids: vec!["STU004".into(), "STU005".into(), "STU006".into()],
        },
    ];

    let mut book = Gradebook::new();
    for term in Term::ALL {
        book.set_term_config(TermConfig::default_for(DEFAULT_ACADEMIC_YEAR, term));
    }

    let term_start = NaiveDate::from_ymd_opt(2024, 9, 9).context("invalid date")?;
    let config = book.term_config(DEFAULT_ACADEMIC_YEAR, Term::First);

    for class in &classes {
        let offered: Vec<&String> = offerings
            .iter()
            .filter(|(grade, _)| *grade == class.grade_level)
            .map(|(_, subject)| subject)
            .collect();

        for (s_idx, student_id) in class.student_ids.iter().enumerate() {
            let student_no = s_idx + if class.id == "CLS001" { 0 } else { 3 };

            for (sub_idx, subject_id) in offered.iter().enumerate() {
                for (c_idx, rule) in config.components.iter().enumerate() {
                    for number in 1..=rule.required_count {
                        book.record_score(
                            DEFAULT_ACADEMIC_YEAR,
                            AssessmentScore {
                                id: Uuid::new_v4(),
                                student_id: student_id.clone(),
                                class_id: class.id.clone(),
                                subject_id: subject_id.to_string(),
                                term: Term::First,
                                component: rule.component,
                                assessment_number: number,
                                score: sample_score(student_no, sub_idx, c_idx, number)
                                    .min(rule.max_score),
                                max_score: rule.max_score,
                                recorded_on: term_start
                                    + Duration::weeks(i64::from(number) * 2 + c_idx as i64),
                            },
                        )?;
                    }
                }

                book.record_exam(ExamResult {
                    id: Uuid::new_v4(),
                    student_id: student_id.clone(),
                    class_id: class.id.clone(),
                    subject_id: subject_id.to_string(),
                    term: Term::First,
                    exam_score: 45.0 + ((student_no * 11 + sub_idx * 9) % 50) as f64,
                })?;
            }

            for day in 0..20 {
                book.record_attendance(AttendanceRecord {
                    id: Uuid::new_v4(),
                    student_id: student_id.clone(),
                    class_id: class.id.clone(),
                    date: term_start + Duration::days(day as i64 + (day as i64 / 5) * 2),
                    status: sample_status(student_no, day),
                });
            }
        }
    }

    Ok(MockSchool {
        students,
        classes,
        subjects,
        offerings,
        book,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_school_produces_full_reports_for_every_class() {
        let school = mock_school().expect("mock data is valid");
        let registry = school.registry();
        assert_eq!(registry.student_count(), 6);

        for class in &school.classes {
            let reports = generate_bulk_reports(&registry, &school.book, &class.id, Term::First);
            assert_eq!(reports.len(), 3);
            for report in reports {
                assert_eq!(report.subjects.len(), 3);
                assert_eq!(report.attendance.total_days, 20);
                assert!(report.subjects.iter().all(|s| s.exam_score > 0.0 && s.ca_score > 0.0));
            }
        }
    }

    #[test]
    fn preview_counts_every_enrolled_student() {
        let school = mock_school().expect("mock data is valid");
        assert_eq!(
            school.preview_reports(),
            vec![("7A".to_string(), 3), ("8B".to_string(), 3)]
        );
    }

    #[test]
    fn mock_scores_respect_component_maximums() {
        let school = mock_school().expect("mock data is valid");
        assert!(school
            .book
            .scores
            .iter()
            .all(|s| (0.0..=s.max_score).contains(&s.score)));
        // 6 students x 3 subjects x 12 assessments
        assert_eq!(school.book.scores.len(), 216);
        assert_eq!(school.book.exam_results.len(), 18);
    }
}
