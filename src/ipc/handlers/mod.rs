pub mod analytics;
pub mod backup_exchange;
pub mod core;
pub mod reports;
pub mod roster;
