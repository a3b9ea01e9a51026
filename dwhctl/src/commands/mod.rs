pub mod provision;
pub mod tables;
pub mod teardown;
