pub mod aggregate;
pub mod bootstrap;
pub mod build;
pub mod cli;
pub mod config;
pub mod discover;
pub mod error;
pub mod fetch;
pub mod github;
pub mod list;
pub mod model;
pub mod site;
pub mod store;
