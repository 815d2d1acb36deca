use std::collections::HashMap;
use std::fmt::Write;

use chrono::Utc;
use tracing::{debug, instrument};

use crate::assessment::student_summary;
use crate::gradebook::Gradebook;
use crate::grading::{letter_grade, round2, round_whole, GRADE_TABLE};
use crate::models::{
    AttendanceRecord, AttendanceStatus, AttendanceSummary, ExamResult, StudentReportData,
    SubjectReportRow, Term,
};
use crate::registry::SchoolRegistry;

pub const CA_WEIGHT: f64 = 30.0;
pub const EXAM_WEIGHT: f64 = 70.0;

/// Late arrivals count as attended.
pub fn summarize_attendance(
    student_id: &str,
    class_id: &str,
    records: &[AttendanceRecord],
) -> AttendanceSummary {
    let mut summary = AttendanceSummary::default();

    for record in records
        .iter()
        .filter(|r| r.student_id == student_id && r.class_id == class_id)
    {
        summary.total_days += 1;
        match record.status {
            AttendanceStatus::Present => summary.present += 1,
            AttendanceStatus::Absent => summary.absent += 1,
            AttendanceStatus::Late => summary.late += 1,
            AttendanceStatus::Excused => summary.excused += 1,
        }
    }

    if summary.total_days > 0 {
        let attended = (summary.present + summary.late) as f64;
        summary.percentage = round_whole(attended / summary.total_days as f64 * 100.0);
    }

    summary
}

/// First recorded result wins when a key was entered more than once.
fn find_exam<'a>(
    results: &'a [ExamResult],
    student_id: &str,
    class_id: &str,
    subject_id: &str,
    term: Term,
) -> Option<&'a ExamResult> {
    results.iter().find(|e| {
        e.student_id == student_id
            && e.class_id == class_id
            && e.subject_id == subject_id
            && e.term == term
    })
}

#[instrument(skip(registry, book))]
pub fn compute_student_report(
    registry: &SchoolRegistry,
    book: &Gradebook,
    student_id: &str,
    class_id: &str,
    term: Term,
) -> Option<StudentReportData> {
    let Some(student) = registry.student(student_id) else {
        debug!("student not found");
        return None;
    };
    let Some(class) = registry.class(class_id) else {
        debug!("class not found");
        return None;
    };

    let config = book.term_config(&class.academic_year, term);
    let subjects: Vec<SubjectReportRow> = registry
        .subjects_for_grade(&class.grade_level)
        .into_iter()
        .map(|subject| {
            let summary = student_summary(student_id, &subject.id, term, &book.scores, &config);
            let ca_score = round2(summary.percentage / 100.0 * CA_WEIGHT);
            let exam_score = find_exam(&book.exam_results, student_id, class_id, &subject.id, term)
                .map(|e| round2(e.exam_score / 100.0 * EXAM_WEIGHT))
                .unwrap_or(0.0);
            let total = round2(ca_score + exam_score);
            let grade = letter_grade(total);

            SubjectReportRow {
                subject_id: subject.id.clone(),
                subject_name: subject.name.clone(),
                ca_score,
                exam_score,
                total,
                grade: grade.grade,
                remark: grade.remark,
            }
        })
        .collect();

    let overall_average = if subjects.is_empty() {
        0.0
    } else {
        round2(subjects.iter().map(|s| s.total).sum::<f64>() / subjects.len() as f64)
    };
    let overall = letter_grade(overall_average);

    Some(StudentReportData {
        student_id: student.id.clone(),
        student_name: student.full_name(),
        admission_number: student.admission_number.clone(),
        class_id: class.id.clone(),
        class_name: class.name.clone(),
        grade_level: class.grade_level.clone(),
        section: class.section.clone(),
        academic_year: class.academic_year.clone(),
        term,
        subjects,
        attendance: summarize_attendance(student_id, class_id, &book.attendance),
        overall_average,
        overall_grade: overall.grade,
        overall_remark: overall.remark,
        generated_at: Utc::now(),
    })
}

pub fn generate_bulk_reports(
    registry: &SchoolRegistry,
    book: &Gradebook,
    class_id: &str,
    term: Term,
) -> Vec<StudentReportData> {
    let Some(class) = registry.class(class_id) else {
        return Vec::new();
    };

    class
        .student_ids
        .iter()
        .filter_map(|student_id| compute_student_report(registry, book, student_id, class_id, term))
        .collect()
}

/// Counts per letter grade in table order, omitting grades nobody received.
pub fn grade_distribution(reports: &[StudentReportData]) -> Vec<(&'static str, usize)> {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    for report in reports {
        *counts.entry(report.overall_grade).or_insert(0) += 1;
    }

    GRADE_TABLE
        .iter()
        .filter_map(|band| counts.get(band.grade).map(|count| (band.grade, *count)))
        .collect()
}

pub fn render_markdown(report: &StudentReportData) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Report Card: {}", report.student_name);
    let _ = writeln!(
        output,
        "{} ({} {}), admission no. {}, {} {}",
        report.class_name,
        report.grade_level,
        report.section,
        report.admission_number,
        report.academic_year,
        report.term
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Subjects");

    if report.subjects.is_empty() {
        let _ = writeln!(output, "No subjects offered at this grade level.");
    } else {
        let _ = writeln!(output, "| Subject | CA (30) | Exam (70) | Total (100) | Grade | Remark |");
        let _ = writeln!(output, "|---|---:|---:|---:|:---:|---|");
        for row in report.subjects.iter() {
            let _ = writeln!(
                output,
                "| {} | {:.2} | {:.2} | {:.2} | {} | {} |",
                row.subject_name, row.ca_score, row.exam_score, row.total, row.grade, row.remark
            );
        }
    }

    let attendance = &report.attendance;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Attendance");
    if attendance.total_days == 0 {
        let _ = writeln!(output, "No attendance recorded.");
    } else {
        let _ = writeln!(
            output,
            "- {} days: {} present, {} late, {} absent, {} excused ({:.0}%)",
            attendance.total_days,
            attendance.present,
            attendance.late,
            attendance.absent,
            attendance.excused,
            attendance.percentage
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Overall");
    let _ = writeln!(
        output,
        "- Average {:.2}, grade {} ({})",
        report.overall_average, report.overall_grade, report.overall_remark
    );
    let _ = writeln!(output, "- Generated {}", report.generated_at.format("%Y-%m-%d %H:%M UTC"));

    output
}

pub fn render_class_markdown(class_label: &str, term: Term, reports: &[StudentReportData]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Class Report: {} {}", class_label, term);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Grade Mix");

    let distribution = grade_distribution(reports);
    if distribution.is_empty() {
        let _ = writeln!(output, "No students could be reported for this class.");
    } else {
        for (grade, count) in distribution {
            let _ = writeln!(output, "- {}: {} students", grade, count);
        }
    }

    let mut ranked: Vec<&StudentReportData> = reports.iter().collect();
    ranked.sort_by(|a, b| {
        b.overall_average
            .partial_cmp(&a.overall_average)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Ranking");
    if ranked.is_empty() {
        let _ = writeln!(output, "No students could be reported for this class.");
    } else {
        for (position, report) in ranked.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}. {} ({}) average {:.2}, grade {}",
                position + 1,
                report.student_name,
                report.admission_number,
                report.overall_average,
                report.overall_grade
            );
        }
    }

    for report in reports {
        let _ = writeln!(output);
        output.push_str(&render_markdown(report));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssessmentScore, ClassInfo, Component, Student, Subject};
    use chrono::NaiveDate;
    use uuid::Uuid;

    const YEAR: &str = "2024-2025";

    fn registry() -> SchoolRegistry {
        let mut registry = SchoolRegistry::new();
        for (id, first, last) in [
            ("STU001", "Ama", "Mensah"),
            ("STU002", "Kofi", "Boateng"),
        ] {
            registry.insert_student(Student {
                id: id.to_string(),
                first_name: first.to_string(),
                last_name: last.to_string(),
                admission_number: format!("ADM-{id}"),
            });
        }
        registry.insert_subject(Subject {
            id: "SUB-MATH".to_string(),
            name: "Mathematics".to_string(),
            code: "MATH".to_string(),
        });
        registry.offer_subject("Grade 7", "SUB-MATH");
        registry.insert_class(ClassInfo {
            id: "CLS001".to_string(),
            name: "7A".to_string(),
            grade_level: "Grade 7".to_string(),
            section: "A".to_string(),
            academic_year: YEAR.to_string(),
            student_ids: vec![
                "STU002".to_string(),
                "STU404".to_string(),
                "STU001".to_string(),
            ],
        });
        registry
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 10, day).expect("valid date")
    }

    fn class_work(student_id: &str, number: u32, score: f64) -> AssessmentScore {
        AssessmentScore {
            id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            class_id: "CLS001".to_string(),
            subject_id: "SUB-MATH".to_string(),
            term: Term::First,
            component: Component::ClassWork,
            assessment_number: number,
            score,
            max_score: 10.0,
            recorded_on: date(1),
        }
    }

    fn exam(student_id: &str, score: f64) -> ExamResult {
        ExamResult {
            id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            class_id: "CLS001".to_string(),
            subject_id: "SUB-MATH".to_string(),
            term: Term::First,
            exam_score: score,
        }
    }

    fn attendance(student_id: &str, day: u32, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            class_id: "CLS001".to_string(),
            date: date(day),
            status,
        }
    }

    fn gradebook() -> Gradebook {
        let mut book = Gradebook::new();
        for (number, score) in [(1, 7.0), (2, 8.0), (3, 9.0), (4, 8.0)] {
            book.record_score(YEAR, class_work("STU001", number, score))
                .expect("valid score");
        }
        book.record_exam(exam("STU001", 80.0)).expect("valid exam");
        book
    }

    #[test]
    fn single_subject_report_blends_ca_and_exam() {
        let report = compute_student_report(&registry(), &gradebook(), "STU001", "CLS001", Term::First)
            .expect("student resolves");

        assert_eq!(report.subjects.len(), 1);
        let row = &report.subjects[0];
        // class work averages 8/10 against 40 configured points: 20%.
        assert_eq!(row.ca_score, 6.0);
        assert_eq!(row.exam_score, 56.0);
        assert_eq!(row.total, 62.0);
        assert_eq!((row.grade, row.remark), ("C", "Good"));
        assert_eq!(report.overall_average, 62.0);
        assert_eq!(report.overall_grade, "C");
        assert_eq!(report.student_name, "Ama Mensah");
        assert_eq!(report.academic_year, YEAR);
    }

    #[test]
    fn missing_exam_contributes_zero() {
        let mut book = gradebook();
        book.exam_results.clear();
        let report = compute_student_report(&registry(), &book, "STU001", "CLS001", Term::First)
            .expect("student resolves");
        assert_eq!(report.subjects[0].exam_score, 0.0);
        assert_eq!(report.subjects[0].total, 6.0);
        assert_eq!(report.overall_grade, "F");
    }

    #[test]
    fn duplicate_exam_results_use_first_entry() {
        let mut book = gradebook();
        book.exam_results.push(exam("STU001", 20.0));
        let report = compute_student_report(&registry(), &book, "STU001", "CLS001", Term::First)
            .expect("student resolves");
        assert_eq!(report.subjects[0].exam_score, 56.0);
    }

    #[test]
    fn unknown_student_or_class_yields_none() {
        let registry = registry();
        let book = gradebook();
        assert!(compute_student_report(&registry, &book, "STU404", "CLS001", Term::First).is_none());
        assert!(compute_student_report(&registry, &book, "STU001", "CLS404", Term::First).is_none());
    }

    #[test]
    fn recomputing_is_identical_apart_from_timestamp() {
        let registry = registry();
        let book = gradebook();
        let first = compute_student_report(&registry, &book, "STU001", "CLS001", Term::First)
            .expect("student resolves");
        let mut second = compute_student_report(&registry, &book, "STU001", "CLS001", Term::First)
            .expect("student resolves");
        second.generated_at = first.generated_at;
        assert_eq!(first, second);
    }

    #[test]
    fn attendance_counts_late_as_attended() {
        let records = vec![
            attendance("STU001", 1, AttendanceStatus::Present),
            attendance("STU001", 2, AttendanceStatus::Late),
            attendance("STU001", 3, AttendanceStatus::Absent),
            attendance("STU001", 4, AttendanceStatus::Excused),
            attendance("STU001", 7, AttendanceStatus::Present),
            attendance("STU001", 8, AttendanceStatus::Present),
            attendance("STU002", 1, AttendanceStatus::Absent),
        ];
        let summary = summarize_attendance("STU001", "CLS001", &records);
        assert_eq!(summary.total_days, 6);
        assert_eq!(
            (summary.present, summary.late, summary.absent, summary.excused),
            (3, 1, 1, 1)
        );
        // 4 of 6 days attended: 66.67% rounds to 67.
        assert_eq!(summary.percentage, 67.0);
    }

    #[test]
    fn attendance_without_records_is_zero() {
        let summary = summarize_attendance("STU001", "CLS001", &[]);
        assert_eq!(summary, AttendanceSummary::default());
    }

    #[test]
    fn bulk_reports_keep_enrolment_order_and_drop_unknown_students() {
        let reports = generate_bulk_reports(&registry(), &gradebook(), "CLS001", Term::First);
        let ids: Vec<_> = reports.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(ids, vec!["STU002", "STU001"]);
        assert_eq!(reports[0].overall_average, 0.0);
    }

    #[test]
    fn bulk_reports_for_unknown_class_are_empty() {
        assert!(generate_bulk_reports(&registry(), &gradebook(), "CLS404", Term::First).is_empty());
    }

    #[test]
    fn grade_distribution_follows_table_order() {
        let reports = generate_bulk_reports(&registry(), &gradebook(), "CLS001", Term::First);
        assert_eq!(grade_distribution(&reports), vec![("C", 1), ("F", 1)]);
    }

    #[test]
    fn markdown_lists_subjects_and_attendance() {
        let mut book = gradebook();
        book.record_attendance(attendance("STU001", 1, AttendanceStatus::Present));
        let report = compute_student_report(&registry(), &book, "STU001", "CLS001", Term::First)
            .expect("student resolves");
        let markdown = render_markdown(&report);

        assert!(markdown.starts_with("# Report Card: Ama Mensah"));
        assert!(markdown.contains("| Mathematics | 6.00 | 56.00 | 62.00 | C | Good |"));
        assert!(markdown.contains("- 1 days: 1 present, 0 late, 0 absent, 0 excused (100%)"));
        assert!(markdown.contains("- Average 62.00, grade C (Good)"));
    }

    #[test]
    fn class_markdown_ranks_by_average() {
        let reports = generate_bulk_reports(&registry(), &gradebook(), "CLS001", Term::First);
        let markdown = render_class_markdown("7A", Term::First, &reports);
        assert!(markdown.contains("1. Ama Mensah (ADM-STU001) average 62.00, grade C"));
        assert!(markdown.contains("2. Kofi Boateng (ADM-STU002) average 0.00, grade F"));
    }
}
