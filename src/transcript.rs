use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::grade::{
    calculate_cgpa, calculate_semester_gpa, grade_classification, is_passing, Classification,
    CourseRecord,
};

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptError {
    pub code: String,
    pub message: String,
}

impl TranscriptError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for TranscriptError {
    fn from(e: rusqlite::Error) -> Self {
        Self::new("db_query_failed", e.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptCourse {
    pub enrollment_id: String,
    pub subject_id: String,
    pub subject_code: String,
    pub subject_title: String,
    pub credit_hours: u32,
    pub marks: f64,
    pub total_marks: f64,
    pub percentage: f64,
    pub letter_grade: String,
    pub gpa_point: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCourse {
    pub enrollment_id: String,
    pub subject_code: String,
    pub semester: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterBlock {
    pub semester: String,
    pub courses: Vec<TranscriptCourse>,
    pub semester_gpa: f64,
    pub total_credits: u64,
    pub total_quality_points: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub student_id: String,
    pub roll_no: String,
    pub display_name: String,
    pub semesters: Vec<SemesterBlock>,
    pub pending: Vec<PendingCourse>,
    pub cgpa: f64,
    pub total_credits: u64,
    pub total_quality_points: f64,
    pub passed_credits: u32,
    pub classification: Classification,
}

fn records(courses: &[TranscriptCourse]) -> Vec<CourseRecord> {
    courses
        .iter()
        .map(|c| CourseRecord::new(c.gpa_point, c.credit_hours))
        .collect()
}

pub fn build_transcript(conn: &Connection, student_id: &str) -> Result<Transcript, TranscriptError> {
    let student: Option<(String, String, String)> = conn
        .query_row(
            "SELECT roll_no, first_name, last_name FROM students WHERE id = ?",
            [student_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let Some((roll_no, first_name, last_name)) = student else {
        return Err(TranscriptError::new("not_found", "student not found"));
    };

    let mut stmt = conn.prepare(
        "SELECT e.id, e.semester, e.marks, e.percentage, e.letter_grade, e.gpa_point,
                s.id, s.code, s.title, s.credit_hours, s.total_marks
         FROM enrollments e
         JOIN subjects s ON s.id = e.subject_id
         WHERE e.student_id = ?
         ORDER BY e.semester, s.code",
    )?;
    let mut rows = stmt.query([student_id])?;

    let mut semesters: Vec<SemesterBlock> = Vec::new();
    let mut pending: Vec<PendingCourse> = Vec::new();
    while let Some(row) = rows.next()? {
        let enrollment_id: String = row.get(0)?;
        let semester: String = row.get(1)?;
        let marks: Option<f64> = row.get(2)?;
        let percentage: Option<f64> = row.get(3)?;
        let letter_grade: Option<String> = row.get(4)?;
        let gpa_point: Option<f64> = row.get(5)?;
        let subject_code: String = row.get(7)?;

        let (Some(marks), Some(percentage), Some(letter_grade), Some(gpa_point)) =
            (marks, percentage, letter_grade, gpa_point)
        else {
            pending.push(PendingCourse {
                enrollment_id,
                subject_code,
                semester,
            });
            continue;
        };

        let credit_hours: i64 = row.get(9)?;
        let course = TranscriptCourse {
            enrollment_id,
            subject_id: row.get(6)?,
            subject_code,
            subject_title: row.get(8)?,
            credit_hours: u32::try_from(credit_hours).unwrap_or(0),
            marks,
            total_marks: row.get(10)?,
            percentage,
            letter_grade,
            gpa_point,
            passed: is_passing(gpa_point),
        };

        match semesters.last_mut() {
            Some(block) if block.semester == semester => block.courses.push(course),
            _ => semesters.push(SemesterBlock {
                semester,
                courses: vec![course],
                semester_gpa: 0.0,
                total_credits: 0,
                total_quality_points: 0.0,
            }),
        }
    }

    let mut all: Vec<CourseRecord> = Vec::new();
    let mut passed_credits: u32 = 0;
    for block in &mut semesters {
        let recs = records(&block.courses);
        let sem = calculate_semester_gpa(&recs);
        block.semester_gpa = sem.cgpa;
        block.total_credits = sem.total_credits;
        block.total_quality_points = sem.total_quality_points;
        passed_credits += block
            .courses
            .iter()
            .filter(|c| c.passed)
            .map(|c| c.credit_hours)
            .sum::<u32>();
        all.extend(recs);
    }
    let overall = calculate_cgpa(&all);

    Ok(Transcript {
        student_id: student_id.to_string(),
        roll_no,
        display_name: format!("{}, {}", last_name, first_name),
        semesters,
        pending,
        cgpa: overall.cgpa,
        total_credits: overall.total_credits,
        total_quality_points: overall.total_quality_points,
        passed_credits,
        classification: grade_classification(overall.cgpa),
    })
}
