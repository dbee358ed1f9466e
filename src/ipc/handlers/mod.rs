pub mod calendar;
pub mod core;
pub mod enrollees;
pub mod payments;
pub mod schedules;
pub mod stats;
pub mod sync;
