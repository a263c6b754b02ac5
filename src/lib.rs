pub mod config;
pub mod errors;
pub mod gateway;
pub mod net;
pub mod shared_types;
pub mod wire_protocol;

pub use config::Config;
pub use gateway::Gateway;
pub use net::Driver;
