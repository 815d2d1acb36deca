use crate::models::LetterGrade;

#[derive(Debug, Clone, Copy)]
pub struct GradeBand {
    pub grade: &'static str,
    pub min_percentage: f64,
    pub max_percentage: f64,
    pub remark: &'static str,
}

/// Ordered, contiguous bands covering 0..=100.
pub const GRADE_TABLE: [GradeBand; 5] = [
    GradeBand {
        grade: "A",
        min_percentage: 80.0,
        max_percentage: 100.0,
        remark: "Excellent",
    },
    GradeBand {
        grade: "B",
        min_percentage: 70.0,
        max_percentage: 79.0,
        remark: "Very Good",
    },
    GradeBand {
        grade: "C",
        min_percentage: 60.0,
        max_percentage: 69.0,
        remark: "Good",
    },
    GradeBand {
        grade: "D",
        min_percentage: 50.0,
        max_percentage: 59.0,
        remark: "Pass",
    },
    GradeBand {
        grade: "F",
        min_percentage: 0.0,
        max_percentage: 49.0,
        remark: "Fail",
    },
];

const FALLBACK: LetterGrade = LetterGrade {
    grade: "F",
    remark: "Fail",
};

/// Half-up rounding to two decimals: `floor(100x + 0.5) / 100`.
pub fn round2(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

pub fn round_whole(x: f64) -> f64 {
    (x + 0.5).floor()
}

pub fn letter_grade(percentage: f64) -> LetterGrade {
    let rounded = round_whole(percentage);
    GRADE_TABLE
        .iter()
        .find(|band| rounded >= band.min_percentage && rounded <= band.max_percentage)
        .map(|band| LetterGrade {
            grade: band.grade,
            remark: band.remark,
        })
        .unwrap_or(FALLBACK)
}
