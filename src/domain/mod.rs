// Domain layer - filter, recovery, dashboard and display formatting models
pub mod dashboard;
pub mod filter;
pub mod format;
pub mod recovery;
pub mod widget;
