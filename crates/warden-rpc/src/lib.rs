pub mod api;
pub mod server;
pub mod types;

pub use api::WardenApiServer;
pub use server::RpcServer;
