pub mod architecture;
pub mod config;
pub mod error;
pub mod results;
pub mod scenario;
pub mod scripting;
pub mod status;
pub mod types;
