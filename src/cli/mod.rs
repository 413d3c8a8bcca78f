pub mod profile;
pub mod register;
pub mod setup;
pub mod summary;
pub mod ui;
