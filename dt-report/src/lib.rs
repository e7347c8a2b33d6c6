// DT Report Library

pub mod models;
pub mod report;
pub mod settings;
