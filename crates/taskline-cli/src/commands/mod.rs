pub mod add;
pub mod common;
pub mod completions;
pub mod delete;
pub mod done;
pub mod edit;
pub mod list;
pub mod pending;
pub mod status;
pub mod sync;
pub mod watch;
