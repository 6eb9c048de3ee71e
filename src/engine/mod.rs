mod controller;
mod fetcher;
mod handle;
mod merge;
mod planner;
mod poller;

pub use handle::{EventHistory, Records, subscribe};
pub use merge::{MergeReport, MergeStage};
pub use planner::plan_window;
