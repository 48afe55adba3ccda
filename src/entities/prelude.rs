pub use super::audit_logs::Entity as AuditLogs;
pub use super::incident_categories::Entity as IncidentCategories;
pub use super::incidents::Entity as Incidents;
pub use super::users::Entity as Users;
