//! Site collaborators plugged into the build engine.

pub mod catalog;
pub mod changes;
pub mod css_audit;
pub mod error;
pub mod feed;
pub mod file_cache;
pub mod output;
pub mod render;
pub mod site;
