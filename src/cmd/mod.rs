//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `search` | `Search`         |
//! | `config` | `Config`         |

pub mod config;
pub mod search;

pub use config::cmd_config;
pub use search::cmd_search;
