pub mod admissions;
pub mod startups;
