pub mod commands;
pub mod context;
pub mod http;
pub mod iam;
pub mod locks;
pub mod provider;
pub mod resources;
pub mod runtime;
pub mod sigv4;
