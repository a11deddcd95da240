pub mod dispatcher;
pub mod runner;

pub use dispatcher::{DispatchError, Dispatcher, DrainReport};
pub use runner::{run_watcher, watch_directory, PipelineError, WatchEvent};
