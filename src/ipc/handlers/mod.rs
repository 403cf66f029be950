pub mod announcements;
pub mod backup;
pub mod core;
pub mod departments;
pub mod enrollments;
pub mod fees;
pub mod grades;
pub mod setup;
pub mod staff;
pub mod students;
pub mod subjects;
