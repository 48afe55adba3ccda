pub mod prelude;

pub mod audit_logs;
pub mod incident_categories;
pub mod incidents;
pub mod users;
