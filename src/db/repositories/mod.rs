pub mod audit;
pub mod category;
pub mod incident;
pub mod user;
