pub mod approval;
pub mod project;
pub mod report;
