use crate::grading::round2;
use crate::models::{AssessmentScore, Component, ComponentConfig, ComponentSummary, Term, TermConfig};

pub const DEFAULT_MAX_SCORE: f64 = 10.0;
pub const DEFAULT_ACADEMIC_YEAR: &str = "2024-2025";

impl TermConfig {
    /// Four class work, four home work, three quizzes and one project, each out of 10.
    pub fn default_for(academic_year: &str, term: Term) -> TermConfig {
        let components = Component::ALL
            .into_iter()
            .map(|component| ComponentConfig {
                component,
                required_count: match component {
                    Component::ClassWork | Component::HomeWork => 4,
                    Component::Quiz => 3,
                    Component::Project => 1,
                },
                max_score: DEFAULT_MAX_SCORE,
            })
            .collect();

        TermConfig {
            academic_year: academic_year.to_string(),
            term,
            components,
        }
    }

    /// The recorded config for the year and term, else the default layout.
    pub fn resolve(configs: &[TermConfig], academic_year: &str, term: Term) -> TermConfig {
        configs
            .iter()
            .find(|c| c.academic_year == academic_year && c.term == term)
            .cloned()
            .unwrap_or_else(|| TermConfig::default_for(academic_year, term))
    }

    pub fn component(&self, component: Component) -> Option<&ComponentConfig> {
        self.components.iter().find(|c| c.component == component)
    }

    pub fn max_score(&self, component: Component) -> f64 {
        self.component(component).map(|c| c.max_score).unwrap_or(0.0)
    }

    pub fn total_max_score(&self) -> f64 {
        self.components.iter().map(|c| c.max_score).sum()
    }
}

pub fn component_average(
    student_id: &str,
    subject_id: &str,
    term: Term,
    component: Component,
    scores: &[AssessmentScore],
) -> f64 {
    let (sum, count) = scores
        .iter()
        .filter(|s| {
            s.student_id == student_id
                && s.subject_id == subject_id
                && s.term == term
                && s.component == component
        })
        .fold((0.0, 0usize), |(sum, count), s| (sum + s.score, count + 1));

    if count == 0 {
        0.0
    } else {
        round2(sum / count as f64)
    }
}

pub fn weighted_percentage(total: f64, config: &TermConfig) -> f64 {
    let max_total = config.total_max_score();
    if max_total > 0.0 {
        round2(total / max_total * 100.0)
    } else {
        0.0
    }
}

pub fn student_summary(
    student_id: &str,
    subject_id: &str,
    term: Term,
    scores: &[AssessmentScore],
    config: &TermConfig,
) -> ComponentSummary {
    let average = |component| component_average(student_id, subject_id, term, component, scores);
    let class_work = average(Component::ClassWork);
    let home_work = average(Component::HomeWork);
    let quiz = average(Component::Quiz);
    let project = average(Component::Project);
    let total = round2(class_work + home_work + quiz + project);

    ComponentSummary {
        class_work,
        home_work,
        quiz,
        project,
        total,
        percentage: weighted_percentage(total, config),
    }
}
