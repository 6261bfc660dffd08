//! Role-specific front ends over the API client.
//!
//! A desk holds the state one browser page would hold: the last fetched
//! session list and, for students, the verification gate. Each action
//! awaits its requests serially.

pub mod student;
pub mod teacher;

pub use student::{MarkOutcome, StudentDesk, StudentView};
pub use teacher::{TeacherDesk, TeacherView};
