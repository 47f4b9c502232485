//! Terminal presentation for `bitbug search`.

pub mod icons;
pub mod progress;
pub mod render;

pub use progress::FetchSpinner;
pub use render::{relative_time, render_diagnostics, render_issue, render_summary, terminal_width};
