pub mod driver;
pub mod log;
pub mod ui;
