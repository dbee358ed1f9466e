//! Counts of active enrollees bound to a schedule.
//!
//! Enrollees that carry an explicit `schedule_id` are matched on it exactly.
//! Older rows only have the free-text reference the roster form produced
//! (`"monday, wednesday 08:00-09:00"`); those fall back to a substring match
//! on `"{start}-{end}"`, which cannot tell apart two schedules sharing a time
//! range. Inactive enrollees never count.

use crate::model::{Enrollee, EntityId, Schedule};
use std::collections::HashMap;

/// Containment rule on the free-text reference only.
pub fn occupancy_by_time_range(start_time: &str, end_time: &str, enrollees: &[Enrollee]) -> usize {
    let key = format!("{}-{}", start_time, end_time);
    enrollees
        .iter()
        .filter(|e| e.is_active)
        .filter(|e| reference_matches(e, &key))
        .count()
}

fn reference_matches(enrollee: &Enrollee, key: &str) -> bool {
    enrollee
        .schedule
        .as_deref()
        .map(|s| s.contains(key))
        .unwrap_or(false)
}

fn binds_to(enrollee: &Enrollee, schedule: &Schedule) -> bool {
    match &enrollee.schedule_id {
        Some(id) => id == &schedule.id,
        None => reference_matches(enrollee, &schedule.time_range_key()),
    }
}

pub fn occupancy(schedule: &Schedule, enrollees: &[Enrollee]) -> usize {
    enrollees
        .iter()
        .filter(|e| e.is_active && binds_to(e, schedule))
        .count()
}

/// Occupancy for a whole set of schedules, built once per view.
#[derive(Debug, Clone, Default)]
pub struct OccupancyIndex {
    counts: HashMap<EntityId, usize>,
}

impl OccupancyIndex {
    pub fn build(schedules: &[Schedule], enrollees: &[Enrollee]) -> Self {
        let known: HashMap<&EntityId, &Schedule> = schedules.iter().map(|s| (&s.id, s)).collect();
        let mut counts: HashMap<EntityId, usize> =
            schedules.iter().map(|s| (s.id.clone(), 0)).collect();
        for e in enrollees.iter().filter(|e| e.is_active) {
            match &e.schedule_id {
                Some(id) => {
                    if known.contains_key(id) {
                        *counts.entry(id.clone()).or_insert(0) += 1;
                    }
                }
                None => {
                    for s in schedules {
                        if reference_matches(e, &s.time_range_key()) {
                            *counts.entry(s.id.clone()).or_insert(0) += 1;
                        }
                    }
                }
            }
        }
        Self { counts }
    }

    pub fn get(&self, schedule_id: &EntityId) -> usize {
        self.counts.get(schedule_id).copied().unwrap_or(0)
    }
}
