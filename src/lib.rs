pub mod application;
pub mod build;
pub mod config;
pub mod domain;
pub mod infra;
