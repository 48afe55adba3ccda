pub mod audit;
pub use audit::AuditRecorder;

pub mod auth_service;
pub use auth_service::{
    AuthError, AuthService, LoginStage, OtpSetup, PendingLoginTicket, Registration,
};

pub mod auth_service_impl;
pub use auth_service_impl::SeaOrmAuthService;

pub mod category_service;
pub mod category_service_impl;
pub use category_service::{Category, CategoryError, CategoryInput, CategoryPatch, CategoryService};
pub use category_service_impl::SeaOrmCategoryService;

pub mod incident_service;
pub mod incident_service_impl;
pub use incident_service::{
    DashboardData, Incident, IncidentError, IncidentInput, IncidentPage, IncidentPatch,
    IncidentQuery, IncidentService,
};
pub use incident_service_impl::SeaOrmIncidentService;

pub mod lockout;
pub use lockout::LockoutPolicy;

pub mod notifier;
pub use notifier::{Notification, Notifier};

pub mod password;
pub mod policy;

pub mod rate_limit;
pub use rate_limit::{RateLimitAction, RateLimitDecision, RateLimiter};

pub mod reset_token;
pub mod sanitizer;

pub mod totp;
pub use totp::TotpManager;
