pub mod log;
pub mod server;
pub mod tcp;
