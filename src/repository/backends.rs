pub mod memory;
pub mod register;
pub mod sql;

pub use register::DatabaseConfigs;
