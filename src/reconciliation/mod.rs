pub mod classify;
pub mod late;
pub mod report;
