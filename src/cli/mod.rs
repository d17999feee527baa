pub mod app;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod eval;
pub mod info;
pub mod navigate;
pub mod output;
pub mod runtime;
pub mod sessions;
