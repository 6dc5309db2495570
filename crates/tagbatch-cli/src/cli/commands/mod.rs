//! CLI command handlers, one file per command.

mod completions;
mod man;
mod run;
mod status;

pub use completions::run_completions;
pub use man::run_man;
pub use run::run_batch;
pub use status::run_status;
