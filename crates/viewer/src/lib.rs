pub mod clients;
pub mod config;
pub mod observer;
pub mod transports;
