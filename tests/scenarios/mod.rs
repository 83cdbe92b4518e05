mod cancellation;
mod config_loading;
mod failure_handling;
mod progress_events;
