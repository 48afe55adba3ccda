mod audit;
mod users;

pub use audit::cmd_audit;
pub use users::{cmd_create_user, cmd_set_role};
