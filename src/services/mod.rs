//! Supporting services used by the job controller

pub mod io;
pub mod progress;

pub use io::FileIOService;
pub use progress::{
    progress_percent, status_label, ConsoleProgressReporter, NoOpProgressReporter, Phase,
    ProgressReporter, ProgressUpdate,
};
