use std::collections::HashMap;

use crate::models::{ClassInfo, Student, Subject};

/// Reference data the report compositor resolves ids against.
#[derive(Debug, Clone, Default)]
pub struct SchoolRegistry {
    students: HashMap<String, Student>,
    classes: HashMap<String, ClassInfo>,
    subjects: HashMap<String, Subject>,
    grade_subjects: HashMap<String, Vec<String>>,
}

impl SchoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_student(&mut self, student: Student) {
        self.students.insert(student.id.clone(), student);
    }

    pub fn insert_class(&mut self, class: ClassInfo) {
        self.classes.insert(class.id.clone(), class);
    }

    pub fn insert_subject(&mut self, subject: Subject) {
        self.subjects.insert(subject.id.clone(), subject);
    }

    /// Appends in offering order; repeated offers are ignored.
    pub fn offer_subject(&mut self, grade_level: &str, subject_id: &str) {
        let offered = self.grade_subjects.entry(grade_level.to_string()).or_default();
        if !offered.iter().any(|id| id == subject_id) {
            offered.push(subject_id.to_string());
        }
    }

    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.get(id)
    }

    pub fn class(&self, id: &str) -> Option<&ClassInfo> {
        self.classes.get(id)
    }

    pub fn subject(&self, id: &str) -> Option<&Subject> {
        self.subjects.get(id)
    }

    pub fn subjects_for_grade(&self, grade_level: &str) -> Vec<&Subject> {
        self.grade_subjects
            .get(grade_level)
            .map(|ids| ids.iter().filter_map(|id| self.subject(id)).collect())
            .unwrap_or_default()
    }

    pub fn student_count(&self) -> usize {
        self.students.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(id: &str, name: &str) -> Subject {
        Subject {
            id: id.to_string(),
            name: name.to_string(),
            code: id.trim_start_matches("SUB-").to_string(),
        }
    }

    #[test]
    fn subjects_for_grade_keep_offering_order_and_skip_unknown_ids() {
        let mut registry = SchoolRegistry::new();
        registry.insert_subject(subject("SUB-SCI", "Science"));
        registry.insert_subject(subject("SUB-MATH", "Mathematics"));
        registry.offer_subject("Grade 7", "SUB-SCI");
        registry.offer_subject("Grade 7", "SUB-GONE");
        registry.offer_subject("Grade 7", "SUB-MATH");
        registry.offer_subject("Grade 7", "SUB-SCI");

        let names: Vec<_> = registry
            .subjects_for_grade("Grade 7")
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["Science", "Mathematics"]);
        assert!(registry.subjects_for_grade("Grade 9").is_empty());
    }

    #[test]
    fn subject_lookup_returns_inserted_record() {
        let mut registry = SchoolRegistry::new();
        registry.insert_subject(subject("SUB-MATH", "Mathematics"));
        let found = registry.subject("SUB-MATH").expect("subject inserted");
        assert_eq!(found.code, "MATH");
    }

    #[test]
    fn lookups_return_none_for_unknown_ids() {
        let registry = SchoolRegistry::new();
        assert!(registry.student("STU404").is_none());
        assert!(registry.class("CLS404").is_none());
        assert!(registry.subject("SUB404").is_none());
    }
}
