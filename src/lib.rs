//! bitbug: discover open GitHub issues by language and label.
//!
//! The library is the fetch/cache pipeline plus the filter and pagination
//! state that sits on top of it. The `bitbug` binary is a thin terminal
//! front-end over [`store::IssueStore`].

pub mod cache;
pub mod config;
pub mod errors;
pub mod filters;
pub mod github;
pub mod issue;
pub mod logging;
pub mod store;
pub mod ui;
