use serde::Serialize;

/// Credit hours assumed for a course record that does not carry its own.
pub const DEFAULT_CREDIT_HOURS: u32 = 3;

/// Lowest GPA point that still counts as a pass.
pub const PASSING_GPA: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeScaleEntry {
    pub min_percentage: f64,
    pub max_percentage: f64,
    pub letter: &'static str,
    pub gpa_point: f64,
}

const fn band(min: f64, max: f64, letter: &'static str, gpa_point: f64) -> GradeScaleEntry {
    GradeScaleEntry {
        min_percentage: min,
        max_percentage: max,
        letter,
        gpa_point,
    }
}

/// Ordered top-down; `max_percentage` is the displayed upper bound of each band.
pub const GRADE_SCALE: [GradeScaleEntry; 12] = [
    band(90.0, 100.0, "A+", 4.0),
    band(85.0, 89.99, "A", 4.0),
    band(80.0, 84.99, "A-", 3.7),
    band(75.0, 79.99, "B+", 3.3),
    band(70.0, 74.99, "B", 3.0),
    band(65.0, 69.99, "B-", 2.7),
    band(60.0, 64.99, "C+", 2.3),
    band(55.0, 59.99, "C", 2.0),
    band(50.0, 54.99, "C-", 1.7),
    band(45.0, 49.99, "D+", 1.3),
    band(40.0, 44.99, "D", 1.0),
    band(0.0, 39.99, "F", 0.0),
];

const FALLBACK: GradeScaleEntry = GRADE_SCALE[GRADE_SCALE.len() - 1];

/// Half-up rounding to 2 decimals: `Int(100*x + 0.5) / 100`.
pub fn round_2(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

pub fn calculate_percentage(marks: f64, total_marks: f64) -> f64 {
    if total_marks == 0.0 {
        return 0.0;
    }
    round_2(marks / total_marks * 100.0)
}

/// Band lookup. Percentages outside [0,100] (and NaN) match nothing and
/// land on the F band.
pub fn scale_entry(percentage: f64) -> &'static GradeScaleEntry {
    if !(0.0..=100.0).contains(&percentage) {
        return &FALLBACK;
    }
    GRADE_SCALE
        .iter()
        .find(|b| percentage >= b.min_percentage)
        .unwrap_or(&FALLBACK)
}

pub fn letter_grade(percentage: f64) -> &'static str {
    scale_entry(percentage).letter
}

pub fn gpa_point(percentage: f64) -> f64 {
    scale_entry(percentage).gpa_point
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeResult {
    pub percentage: f64,
    pub letter_grade: String,
    pub gpa_point: f64,
}

pub fn calculate_grade_details(marks: f64, total_marks: f64) -> GradeResult {
    let percentage = calculate_percentage(marks, total_marks);
    let entry = scale_entry(percentage);
    GradeResult {
        percentage,
        letter_grade: entry.letter.to_string(),
        gpa_point: entry.gpa_point,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CourseRecord {
    pub gpa_point: f64,
    pub credit_hours: Option<u32>,
}

impl CourseRecord {
    pub fn new(gpa_point: f64, credit_hours: u32) -> Self {
        Self {
            gpa_point,
            credit_hours: Some(credit_hours),
        }
    }

    fn effective_credit_hours(&self) -> u32 {
        self.credit_hours.unwrap_or(DEFAULT_CREDIT_HOURS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CgpaResult {
    pub cgpa: f64,
    pub total_credits: u64,
    pub total_quality_points: f64,
}

/// Credits sum as `u64`, so any number of `u32` credit hours fits.
pub fn calculate_cgpa(records: &[CourseRecord]) -> CgpaResult {
    let mut total_credits: u64 = 0;
    let mut total_quality_points: f64 = 0.0;
    for r in records {
        let hours = r.effective_credit_hours();
        total_credits += u64::from(hours);
        total_quality_points += r.gpa_point * f64::from(hours);
    }

    let cgpa = if total_credits > 0 {
        round_2(total_quality_points / total_credits as f64)
    } else {
        0.0
    };

    CgpaResult {
        cgpa,
        total_credits,
        total_quality_points: round_2(total_quality_points),
    }
}

/// Same weighting as `calculate_cgpa`, fed with one semester's courses.
pub fn calculate_semester_gpa(records: &[CourseRecord]) -> CgpaResult {
    calculate_cgpa(records)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "&'static str")]
pub enum Classification {
    Distinction,
    FirstClass,
    SecondClassUpper,
    SecondClassLower,
    ThirdClass,
    Pass,
    Fail,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Distinction => "Distinction",
            Self::FirstClass => "First Class",
            Self::SecondClassUpper => "Second Class Upper",
            Self::SecondClassLower => "Second Class Lower",
            Self::ThirdClass => "Third Class",
            Self::Pass => "Pass",
            Self::Fail => "Fail",
        }
    }
}

impl From<Classification> for &'static str {
    fn from(c: Classification) -> Self {
        c.as_str()
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn grade_classification(cgpa: f64) -> Classification {
    if cgpa >= 3.7 {
        Classification::Distinction
    } else if cgpa >= 3.3 {
        Classification::FirstClass
    } else if cgpa >= 3.0 {
        Classification::SecondClassUpper
    } else if cgpa >= 2.5 {
        Classification::SecondClassLower
    } else if cgpa >= 2.0 {
        Classification::ThirdClass
    } else if cgpa >= 1.0 {
        Classification::Pass
    } else {
        Classification::Fail
    }
}

pub fn is_passing(gpa_point: f64) -> bool {
    gpa_point >= PASSING_GPA
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_2_is_half_up() {
        assert_eq!(round_2(0.0), 0.0);
        assert_eq!(round_2(66.666), 66.67);
        assert_eq!(round_2(66.664), 66.66);
        assert_eq!(round_2(12.5), 12.5);
    }

    #[test]
    fn percentage_rounds_and_handles_zero_total() {
        assert_eq!(calculate_percentage(42.0, 50.0), 84.0);
        assert_eq!(calculate_percentage(2.0, 3.0), 66.67);
        assert_eq!(calculate_percentage(1.0, 3.0), 33.33);
        assert_eq!(calculate_percentage(17.0, 0.0), 0.0);
        assert_eq!(calculate_percentage(0.0, 0.0), 0.0);
    }

    #[test]
    fn band_boundaries_match_table() {
        let cases: &[(f64, &str, f64)] = &[
            (100.0, "A+", 4.0),
            (90.0, "A+", 4.0),
            (89.99, "A", 4.0),
            (85.0, "A", 4.0),
            (84.99, "A-", 3.7),
            (80.0, "A-", 3.7),
            (79.99, "B+", 3.3),
            (75.0, "B+", 3.3),
            (74.99, "B", 3.0),
            (70.0, "B", 3.0),
            (69.99, "B-", 2.7),
            (65.0, "B-", 2.7),
            (64.99, "C+", 2.3),
            (60.0, "C+", 2.3),
            (59.99, "C", 2.0),
            (55.0, "C", 2.0),
            (54.99, "C-", 1.7),
            (50.0, "C-", 1.7),
            (49.99, "D+", 1.3),
            (45.0, "D+", 1.3),
            (44.99, "D", 1.0),
            (40.0, "D", 1.0),
            (39.99, "F", 0.0),
            (0.0, "F", 0.0),
        ];
        for &(p, letter, gpa) in cases {
            assert_eq!(letter_grade(p), letter, "letter for {p}");
            assert_eq!(gpa_point(p), gpa, "gpa for {p}");
        }
    }

    #[test]
    fn every_percentage_in_range_hits_exactly_one_band() {
        for i in 0..=10_000 {
            let p = f64::from(i) / 100.0;
            let matching = GRADE_SCALE
                .iter()
                .filter(|b| p >= b.min_percentage && p <= b.max_percentage)
                .count();
            assert_eq!(matching, 1, "band count at {p}");
            let e = scale_entry(p);
            assert!(p >= e.min_percentage && p <= e.max_percentage);
        }
    }

    #[test]
    fn values_between_displayed_bounds_take_the_lower_band() {
        assert_eq!(letter_grade(89.995), "A");
        assert_eq!(letter_grade(89.9999), "A");
        assert_eq!(letter_grade(39.995), "F");
        assert_eq!(letter_grade(40.0), "D");
    }

    #[test]
    fn out_of_range_falls_back_to_f() {
        assert_eq!(letter_grade(-5.0), "F");
        assert_eq!(gpa_point(-0.01), 0.0);
        assert_eq!(letter_grade(100.01), "F");
        assert_eq!(gpa_point(150.0), 0.0);
        assert_eq!(letter_grade(f64::NAN), "F");
    }

    #[test]
    fn grade_details_compose() {
        let r = calculate_grade_details(90.0, 100.0);
        assert_eq!(r.percentage, 90.0);
        assert_eq!(r.letter_grade, "A+");
        assert_eq!(r.gpa_point, 4.0);

        let r = calculate_grade_details(42.0, 50.0);
        assert_eq!(r.percentage, 84.0);
        assert_eq!(r.letter_grade, "A-");
        assert_eq!(r.gpa_point, 3.7);

        let r = calculate_grade_details(10.0, 0.0);
        assert_eq!(r.percentage, 0.0);
        assert_eq!(r.letter_grade, "F");
    }

    #[test]
    fn grade_details_are_idempotent() {
        let a = calculate_grade_details(67.5, 80.0);
        let b = calculate_grade_details(67.5, 80.0);
        assert_eq!(a, b);
        assert_eq!(calculate_cgpa(&[CourseRecord::new(3.3, 4)]), calculate_cgpa(&[CourseRecord::new(3.3, 4)]));
    }

    #[test]
    fn cgpa_empty_is_zero() {
        let r = calculate_cgpa(&[]);
        assert_eq!(r.cgpa, 0.0);
        assert_eq!(r.total_credits, 0);
        assert_eq!(r.total_quality_points, 0.0);
    }

    #[test]
    fn cgpa_weights_by_credit_hours() {
        let r = calculate_cgpa(&[CourseRecord::new(4.0, 3), CourseRecord::new(3.0, 3)]);
        assert_eq!(r.cgpa, 3.5);
        assert_eq!(r.total_credits, 6);
        assert_eq!(r.total_quality_points, 21.0);

        let r = calculate_cgpa(&[CourseRecord::new(4.0, 4), CourseRecord::new(2.0, 1)]);
        assert_eq!(r.cgpa, 3.6);
        assert_eq!(r.total_credits, 5);
    }

    #[test]
    fn cgpa_defaults_missing_credit_hours_to_three() {
        let r = calculate_cgpa(&[
            CourseRecord {
                gpa_point: 3.7,
                credit_hours: None,
            },
            CourseRecord::new(2.0, 1),
        ]);
        assert_eq!(r.total_credits, 4);
        assert_eq!(r.total_quality_points, 13.1);
        assert_eq!(r.cgpa, 3.28);
    }

    #[test]
    fn cgpa_zero_credit_records_do_not_divide_by_zero() {
        let r = calculate_cgpa(&[CourseRecord::new(4.0, 0)]);
        assert_eq!(r.cgpa, 0.0);
        assert_eq!(r.total_credits, 0);
    }

    #[test]
    fn cgpa_sums_huge_credit_hours_without_overflow() {
        let r = calculate_cgpa(&[
            CourseRecord::new(4.0, u32::MAX),
            CourseRecord::new(4.0, 1),
        ]);
        assert_eq!(r.total_credits, u64::from(u32::MAX) + 1);
        assert_eq!(r.cgpa, 4.0);
    }

    #[test]
    fn semester_gpa_matches_cgpa() {
        let recs = [CourseRecord::new(3.3, 3), CourseRecord::new(2.7, 2)];
        assert_eq!(calculate_semester_gpa(&recs), calculate_cgpa(&recs));
    }

    #[test]
    fn classification_ladder() {
        assert_eq!(
            serde_json::to_value(Classification::SecondClassUpper).expect("serialize"),
            serde_json::json!("Second Class Upper")
        );
        assert_eq!(grade_classification(4.0), Classification::Distinction);
        assert_eq!(grade_classification(3.7), Classification::Distinction);
        assert_eq!(grade_classification(3.69), Classification::FirstClass);
        assert_eq!(grade_classification(3.5).as_str(), "First Class");
        assert_eq!(grade_classification(3.0), Classification::SecondClassUpper);
        assert_eq!(grade_classification(2.5), Classification::SecondClassLower);
        assert_eq!(grade_classification(2.0), Classification::ThirdClass);
        assert_eq!(grade_classification(1.0), Classification::Pass);
        assert_eq!(grade_classification(0.5).to_string(), "Fail");
    }

    #[test]
    fn passing_threshold() {
        assert!(is_passing(1.0));
        assert!(is_passing(4.0));
        assert!(!is_passing(0.99));
        assert!(!is_passing(0.0));
    }
}
