pub mod audit_events;
pub mod tasks;
pub mod users;
