//! Local replica of a fitness studio's roster, payments and class schedules,
//! kept in sync with an authoritative store through change feeds, plus the
//! derived views (payment validity, calendar grids, occupancy, monthly stats)
//! computed from it.

pub mod calendar;
pub mod config;
pub mod engine;
pub mod ipc;
pub mod model;
pub mod normalize;
pub mod occupancy;
pub mod reconcile;
pub mod remote;
pub mod replica;
pub mod stats;
pub mod validity;
pub mod views;
