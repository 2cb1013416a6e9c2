//! Optimal publish-time computation from weekly slot tables
//!
//! The planner is pure arithmetic over a [`SlotTemplate`]: given a base
//! instant it finds the next recurring weekly slot, spaces bulk schedules by
//! a minimum gap, and staggers multi-platform assignments. It never fails —
//! an exhausted search window degrades to a deterministic next-day fallback.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::models::Platform;

/// Default search window in days for the next optimal slot
pub const DEFAULT_MAX_DAYS_AHEAD: u32 = 7;

// ============================================================================
// Weekly Slot
// ============================================================================

/// One recurring weekly publish slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySlot {
    /// Day of week, 0 = Monday .. 6 = Sunday
    pub weekday: u8,

    /// Hour of day (0-23)
    pub hour: u8,

    /// Minute of hour (0-59)
    pub minute: u8,
}

impl WeeklySlot {
    pub const fn new(weekday: u8, hour: u8, minute: u8) -> Self {
        Self {
            weekday,
            hour,
            minute,
        }
    }

    /// Validate field ranges
    pub fn validate(&self) -> Result<(), String> {
        if self.weekday > 6 {
            return Err(format!("weekday {} out of range 0-6", self.weekday));
        }
        if self.hour > 23 {
            return Err(format!("hour {} out of range 0-23", self.hour));
        }
        if self.minute > 59 {
            return Err(format!("minute {} out of range 0-59", self.minute));
        }
        Ok(())
    }
}

// ============================================================================
// Slot Template
// ============================================================================

/// Weekly recurring publish-time table per platform.
///
/// Keyed by lowercase platform name so config files can carry entries the
/// binary does not know about. A platform with no entry borrows the default
/// platform's table (logged as a warning) so scheduling still produces
/// sensible times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotTemplate {
    slots: HashMap<String, Vec<WeeklySlot>>,

    #[serde(default = "SlotTemplate::default_platform")]
    default_platform: Platform,
}

impl SlotTemplate {
    fn default_platform() -> Platform {
        Platform::Twitter
    }

    /// Create an empty template with the given fallback platform
    pub fn new(default_platform: Platform) -> Self {
        Self {
            slots: HashMap::new(),
            default_platform,
        }
    }

    /// Replace the slot list for a platform
    pub fn set_slots(&mut self, platform: Platform, slots: Vec<WeeklySlot>) {
        self.slots.insert(platform.as_str().to_string(), slots);
    }

    /// Builder-style variant of [`Self::set_slots`]
    pub fn with_slots(mut self, platform: Platform, slots: Vec<WeeklySlot>) -> Self {
        self.set_slots(platform, slots);
        self
    }

    /// Slot list for a platform, falling back to the default platform's list
    pub fn slots_for(&self, platform: Platform) -> &[WeeklySlot] {
        if let Some(slots) = self.slots.get(platform.as_str()) {
            return slots;
        }

        warn!(
            platform = %platform,
            fallback = %self.default_platform,
            "No slot template for platform, using default platform's slots"
        );
        self.slots
            .get(self.default_platform.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Validate every slot in the table
    pub fn validate(&self) -> Result<(), String> {
        for (platform, slots) in &self.slots {
            for slot in slots {
                slot.validate()
                    .map_err(|e| format!("{platform} slot invalid: {e}"))?;
            }
        }
        if !self.slots.contains_key(self.default_platform.as_str()) {
            return Err(format!(
                "default platform {} has no slot table",
                self.default_platform
            ));
        }
        Ok(())
    }
}

impl Default for SlotTemplate {
    /// Engagement-time defaults per platform.
    ///
    /// Weekday mornings/midday/evenings for Twitter, morning/evening plus
    /// weekend slots for Instagram, business hours only for LinkedIn.
    fn default() -> Self {
        let twitter = vec![
            WeeklySlot::new(0, 9, 0),
            WeeklySlot::new(1, 9, 0),
            WeeklySlot::new(2, 9, 0),
            WeeklySlot::new(3, 9, 0),
            WeeklySlot::new(4, 9, 0),
            WeeklySlot::new(0, 12, 0),
            WeeklySlot::new(1, 12, 0),
            WeeklySlot::new(2, 12, 0),
            WeeklySlot::new(3, 12, 0),
            WeeklySlot::new(4, 12, 0),
            WeeklySlot::new(0, 17, 0),
            WeeklySlot::new(1, 17, 0),
            WeeklySlot::new(2, 17, 0),
            WeeklySlot::new(3, 17, 0),
            WeeklySlot::new(4, 17, 0),
            WeeklySlot::new(5, 11, 0),
            WeeklySlot::new(6, 11, 0),
        ];

        let instagram = vec![
            WeeklySlot::new(0, 10, 30),
            WeeklySlot::new(1, 10, 30),
            WeeklySlot::new(2, 10, 30),
            WeeklySlot::new(3, 10, 30),
            WeeklySlot::new(4, 10, 30),
            WeeklySlot::new(0, 18, 0),
            WeeklySlot::new(1, 18, 0),
            WeeklySlot::new(2, 18, 0),
            WeeklySlot::new(3, 18, 0),
            WeeklySlot::new(4, 18, 0),
            WeeklySlot::new(5, 11, 0),
            WeeklySlot::new(5, 19, 0),
            WeeklySlot::new(6, 11, 0),
            WeeklySlot::new(6, 19, 0),
        ];

        // No weekend slots for LinkedIn
        let linkedin = vec![
            WeeklySlot::new(1, 10, 0),
            WeeklySlot::new(1, 14, 0),
            WeeklySlot::new(2, 10, 0),
            WeeklySlot::new(2, 14, 0),
            WeeklySlot::new(3, 10, 0),
            WeeklySlot::new(3, 14, 0),
            WeeklySlot::new(0, 11, 0),
            WeeklySlot::new(4, 11, 0),
        ];

        Self::new(Platform::Twitter)
            .with_slots(Platform::Twitter, twitter)
            .with_slots(Platform::Instagram, instagram)
            .with_slots(Platform::Linkedin, linkedin)
    }
}

// ============================================================================
// Time Slot Planner
// ============================================================================

/// Computes future publish times from a weekly slot table
#[derive(Debug, Clone, Default)]
pub struct TimeSlotPlanner {
    template: SlotTemplate,
}

impl TimeSlotPlanner {
    pub fn new(template: SlotTemplate) -> Self {
        Self { template }
    }

    pub fn template(&self) -> &SlotTemplate {
        &self.template
    }

    /// Next optimal publish time for a platform, strictly after `from_time`.
    ///
    /// Walks day offsets `0..=max_days_ahead` (the final offset wraps to the
    /// same weekday one week out, so a just-missed slot earlier today is
    /// found next week rather than skipped). Candidate times on each day are
    /// ordered by (hour, minute); on day zero only times strictly later than
    /// `from_time`'s time of day qualify. When the whole window is empty the
    /// planner falls back to `from_time + 1 day` truncated to the minute,
    /// which is still strictly in the future.
    pub fn get_optimal_time(
        &self,
        platform: Platform,
        from_time: DateTime<Utc>,
        max_days_ahead: u32,
    ) -> DateTime<Utc> {
        let slots = self.template.slots_for(platform);
        let current_weekday = from_time.weekday().num_days_from_monday();

        for day_offset in 0..=max_days_ahead {
            let target_weekday = (current_weekday + day_offset) % 7;

            let mut day_times: Vec<(u8, u8)> = slots
                .iter()
                .filter(|s| u32::from(s.weekday) == target_weekday)
                .map(|s| (s.hour, s.minute))
                .collect();
            day_times.sort_unstable();

            if day_offset == 0 {
                let (cur_hour, cur_minute) = (from_time.hour(), from_time.minute());
                day_times.retain(|&(h, m)| {
                    u32::from(h) > cur_hour
                        || (u32::from(h) == cur_hour && u32::from(m) > cur_minute)
                });
            }

            if let Some(&(hour, minute)) = day_times.first() {
                let date = (from_time + Duration::days(i64::from(day_offset))).date_naive();
                let optimal = date
                    .and_hms_opt(u32::from(hour), u32::from(minute), 0)
                    .expect("validated slot time")
                    .and_utc();

                debug!(
                    platform = %platform,
                    optimal = %optimal,
                    day_offset = day_offset,
                    "Next optimal time selected"
                );
                return optimal;
            }
        }

        // Window exhausted: deterministic next-day fallback, never an error.
        let fallback = (from_time + Duration::days(1))
            .with_second(0)
            .unwrap()
            .with_nanosecond(0)
            .unwrap();

        warn!(
            platform = %platform,
            max_days_ahead = max_days_ahead,
            fallback = %fallback,
            "No optimal slot within window, using next-day fallback"
        );
        fallback
    }

    /// Schedule for `count` posts on one platform.
    ///
    /// Each pick starts from a running cursor; when the optimal pick lands
    /// closer than `min_hours_between` to the previous one, the minimum gap
    /// wins and the pick is overridden to `previous + min_hours_between`.
    /// The returned sequence is non-decreasing.
    pub fn get_bulk_schedule(
        &self,
        platform: Platform,
        count: usize,
        from_time: DateTime<Utc>,
        min_hours_between: u32,
    ) -> Vec<DateTime<Utc>> {
        let min_gap = Duration::hours(i64::from(min_hours_between));
        let mut schedule: Vec<DateTime<Utc>> = Vec::with_capacity(count);
        let mut cursor = from_time;

        for _ in 0..count {
            let mut next = self.get_optimal_time(platform, cursor, DEFAULT_MAX_DAYS_AHEAD);

            if let Some(&previous) = schedule.last() {
                if next - previous < min_gap {
                    next = previous + min_gap;
                }
            }

            schedule.push(next);
            cursor = next + Duration::minutes(1);
        }

        schedule
    }

    /// Staggered assignment of one time per platform from a shared cursor.
    ///
    /// No two assignments are closer than `stagger_minutes`, even when the
    /// platforms' independently optimal slots coincide.
    pub fn get_multi_platform_schedule(
        &self,
        platforms: &[Platform],
        from_time: DateTime<Utc>,
        stagger_minutes: u32,
    ) -> Vec<(Platform, DateTime<Utc>)> {
        let stagger = Duration::minutes(i64::from(stagger_minutes));
        let mut schedule = Vec::with_capacity(platforms.len());
        let mut cursor = from_time;

        for &platform in platforms {
            let assigned = self.get_optimal_time(platform, cursor, DEFAULT_MAX_DAYS_AHEAD);
            schedule.push((platform, assigned));
            cursor = std::cmp::max(cursor + stagger, assigned + stagger);
        }

        schedule
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn monday(hour: u32, minute: u32) -> DateTime<Utc> {
        // 2024-06-03 is a Monday
        Utc.with_ymd_and_hms(2024, 6, 3, hour, minute, 0).unwrap()
    }

    fn sparse_template(slots: Vec<WeeklySlot>) -> TimeSlotPlanner {
        TimeSlotPlanner::new(
            SlotTemplate::new(Platform::Twitter).with_slots(Platform::Twitter, slots),
        )
    }

    #[test]
    fn test_optimal_time_same_day_future_slot() {
        let planner = TimeSlotPlanner::default();

        // Monday 08:00 -> first Twitter slot is Monday 09:00
        let optimal = planner.get_optimal_time(Platform::Twitter, monday(8, 0), 7);
        assert_eq!(optimal, monday(9, 0));
    }

    #[test]
    fn test_optimal_time_skips_passed_slot() {
        let planner = TimeSlotPlanner::default();

        // Monday 09:00 exactly: the 09:00 slot is not strictly later
        let optimal = planner.get_optimal_time(Platform::Twitter, monday(9, 0), 7);
        assert_eq!(optimal, monday(12, 0));
    }

    #[test]
    fn test_optimal_time_wraps_to_next_week() {
        // Only slot is Monday 09:00; asking from Monday 10:00 must yield the
        // following Monday 09:00, never a past time.
        let planner = sparse_template(vec![WeeklySlot::new(0, 9, 0)]);

        let optimal = planner.get_optimal_time(Platform::Twitter, monday(10, 0), 7);
        assert_eq!(optimal, monday(9, 0) + Duration::days(7));
        assert!(optimal > monday(10, 0));
    }

    #[test]
    fn test_optimal_time_fallback_when_no_slots() {
        let planner = sparse_template(vec![]);

        let from = monday(10, 23);
        let optimal = planner.get_optimal_time(Platform::Twitter, from, 7);
        assert_eq!(optimal, from + Duration::days(1));
        assert!(optimal > from);
    }

    #[test]
    fn test_optimal_time_strictly_future_across_week() {
        let planner = TimeSlotPlanner::default();

        for hour in 0..24 {
            for platform in Platform::ALL {
                let from = monday(hour, 30);
                let optimal = planner.get_optimal_time(platform, from, 7);
                assert!(optimal > from, "{platform} at hour {hour} returned {optimal}");
                assert_eq!(optimal.second(), 0);
            }
        }
    }

    #[test]
    fn test_unknown_template_falls_back_to_default_platform() {
        // Template only carries Twitter slots; LinkedIn borrows them.
        let planner = sparse_template(vec![WeeklySlot::new(2, 15, 0)]);

        let twitter = planner.get_optimal_time(Platform::Twitter, monday(8, 0), 7);
        let linkedin = planner.get_optimal_time(Platform::Linkedin, monday(8, 0), 7);
        assert_eq!(twitter, linkedin);
    }

    #[test]
    fn test_bulk_schedule_enforces_minimum_gap() {
        // Slots Monday 09:00 and 12:00 only; a 24h minimum gap overrides the
        // 12:00 optimum and every later optimum that lands too close.
        let planner = sparse_template(vec![WeeklySlot::new(0, 9, 0), WeeklySlot::new(0, 12, 0)]);

        let schedule = planner.get_bulk_schedule(Platform::Twitter, 3, monday(8, 0), 24);

        assert_eq!(schedule.len(), 3);
        assert_eq!(schedule[0], monday(9, 0));
        assert_eq!(schedule[1], monday(9, 0) + Duration::hours(24));
        for pair in schedule.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::hours(24));
        }
    }

    #[test]
    fn test_bulk_schedule_non_decreasing() {
        let planner = TimeSlotPlanner::default();
        let schedule = planner.get_bulk_schedule(Platform::Twitter, 8, monday(7, 45), 3);

        assert_eq!(schedule.len(), 8);
        for pair in schedule.windows(2) {
            assert!(pair[1] >= pair[0]);
            assert!(pair[1] - pair[0] >= Duration::hours(3));
        }
    }

    #[test]
    fn test_multi_platform_stagger_on_identical_slots() {
        // All three platforms share the same single slot, so the stagger is
        // the only thing keeping them apart.
        let shared = vec![WeeklySlot::new(0, 9, 0)];
        let planner = TimeSlotPlanner::new(
            SlotTemplate::new(Platform::Twitter)
                .with_slots(Platform::Twitter, shared.clone())
                .with_slots(Platform::Instagram, shared.clone())
                .with_slots(Platform::Linkedin, shared),
        );

        let schedule =
            planner.get_multi_platform_schedule(&Platform::ALL, monday(8, 0), 15);

        assert_eq!(schedule.len(), 3);
        for i in 0..schedule.len() {
            for j in (i + 1)..schedule.len() {
                let gap = (schedule[j].1 - schedule[i].1).abs();
                assert!(gap >= Duration::minutes(15));
            }
        }
    }

    #[test]
    fn test_multi_platform_preserves_caller_order() {
        let planner = TimeSlotPlanner::default();
        let platforms = [Platform::Linkedin, Platform::Twitter];
        let schedule = planner.get_multi_platform_schedule(&platforms, monday(8, 0), 15);

        assert_eq!(schedule[0].0, Platform::Linkedin);
        assert_eq!(schedule[1].0, Platform::Twitter);
    }

    #[test]
    fn test_default_template_valid() {
        assert!(SlotTemplate::default().validate().is_ok());
    }

    #[test]
    fn test_slot_validation() {
        assert!(WeeklySlot::new(7, 9, 0).validate().is_err());
        assert!(WeeklySlot::new(0, 24, 0).validate().is_err());
        assert!(WeeklySlot::new(0, 9, 60).validate().is_err());
        assert!(WeeklySlot::new(6, 23, 59).validate().is_ok());
    }

    #[test]
    fn test_template_json_roundtrip() {
        let template = SlotTemplate::default();
        let json = serde_json::to_string(&template).unwrap();
        let parsed: SlotTemplate = serde_json::from_str(&json).unwrap();

        for platform in Platform::ALL {
            assert_eq!(parsed.slots_for(platform), template.slots_for(platform));
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn optimal_time_strictly_future(
                offset_minutes in 0i64..20_160,
                platform_idx in 0usize..3,
            ) {
                let planner = TimeSlotPlanner::default();
                let from = monday(0, 0) + Duration::minutes(offset_minutes);
                let platform = Platform::ALL[platform_idx];

                let optimal = planner.get_optimal_time(platform, from, 7);
                prop_assert!(optimal > from);
            }

            #[test]
            fn bulk_schedule_gaps_hold(
                offset_minutes in 0i64..20_160,
                count in 1usize..10,
                min_gap_hours in 1u32..48,
            ) {
                let planner = TimeSlotPlanner::default();
                let from = monday(0, 0) + Duration::minutes(offset_minutes);

                let schedule =
                    planner.get_bulk_schedule(Platform::Twitter, count, from, min_gap_hours);

                prop_assert_eq!(schedule.len(), count);
                prop_assert!(schedule[0] > from);
                for pair in schedule.windows(2) {
                    prop_assert!(pair[1] - pair[0] >= Duration::hours(i64::from(min_gap_hours)));
                }
            }
        }
    }
}
