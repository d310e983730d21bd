//! clock.rs — region identifier → local wall-clock time.
//!
//! Contact-hour enforcement needs local time per lead, not UTC. We map the
//! CRM's region identifiers to a fixed UTC offset table with a coarse
//! northern-hemisphere DST adjustment (April through October). Unknown
//! regions fall back to [`FALLBACK_REGION`].

use chrono::{DateTime, Datelike, FixedOffset, TimeZone, Timelike, Utc};

pub const FALLBACK_REGION: &str = "UK";

struct RegionInfo {
    name: &'static str,
    base_offset_hours: i32,
    observes_dst: bool,
}

const REGIONS: &[RegionInfo] = &[
    RegionInfo { name: "UK", base_offset_hours: 0, observes_dst: true },
    RegionInfo { name: "IE", base_offset_hours: 0, observes_dst: true },
    RegionInfo { name: "US-EAST", base_offset_hours: -5, observes_dst: true },
    RegionInfo { name: "US-CENTRAL", base_offset_hours: -6, observes_dst: true },
    RegionInfo { name: "US-MOUNTAIN", base_offset_hours: -7, observes_dst: true },
    RegionInfo { name: "US-WEST", base_offset_hours: -8, observes_dst: true },
    RegionInfo { name: "UTC", base_offset_hours: 0, observes_dst: false },
];

fn region_info(region: &str) -> &'static RegionInfo {
    let wanted = region.trim().to_ascii_uppercase();
    REGIONS
        .iter()
        .find(|r| r.name == wanted)
        .unwrap_or_else(|| {
            REGIONS
                .iter()
                .find(|r| r.name == FALLBACK_REGION)
                .expect("fallback region present in table")
        })
}

/// Coarse seasonal adjustment: April..=October counts as DST.
fn dst_active(now: DateTime<Utc>) -> bool {
    (4..=10).contains(&now.month())
}

fn offset_for(region: &str, now: DateTime<Utc>) -> FixedOffset {
    let info = region_info(region);
    let mut hours = info.base_offset_hours;
    if info.observes_dst && dst_active(now) {
        hours += 1;
    }
    FixedOffset::east_opt(hours * 3600).expect("offset within valid range")
}

/// Local wall-clock time for the given region at instant `now`.
pub fn local_time(region: &str, now: DateTime<Utc>) -> DateTime<FixedOffset> {
    now.with_timezone(&offset_for(region, now))
}

/// Local hour-of-day in [0, 24).
pub fn local_hour(region: &str, now: DateTime<Utc>) -> u32 {
    local_time(region, now).hour()
}

/// Next occurrence (strictly after `now`) of `hour`:00 local time, as UTC.
/// Used to reschedule quiet-hours rejections for the next morning.
pub fn next_local_hour(region: &str, now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let offset = offset_for(region, now);
    let local_now = now.with_timezone(&offset);
    let mut candidate_date = local_now.date_naive();
    let mut candidate = offset
        .from_local_datetime(
            &candidate_date
                .and_hms_opt(hour, 0, 0)
                .expect("hour in range"),
        )
        .single()
        .expect("fixed offsets are unambiguous");
    if candidate <= local_now {
        candidate_date = candidate_date.succ_opt().expect("date in range");
        candidate = offset
            .from_local_datetime(
                &candidate_date
                    .and_hms_opt(hour, 0, 0)
                    .expect("hour in range"),
            )
            .single()
            .expect("fixed offsets are unambiguous");
    }
    candidate.with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_region_falls_back() {
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        assert_eq!(local_hour("??", now), local_hour(FALLBACK_REGION, now));
    }

    #[test]
    fn winter_vs_summer_offsets() {
        let winter = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let summer = Utc.with_ymd_and_hms(2025, 7, 15, 12, 0, 0).unwrap();
        assert_eq!(local_hour("UK", winter), 12);
        assert_eq!(local_hour("UK", summer), 13);
        assert_eq!(local_hour("US-EAST", winter), 7);
        assert_eq!(local_hour("US-EAST", summer), 8);
        // UTC region never shifts
        assert_eq!(local_hour("UTC", summer), 12);
    }

    #[test]
    fn next_eight_am_is_strictly_in_future() {
        // 22:00 UTC in winter = 22:00 UK local; next 8 AM is tomorrow morning.
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 22, 0, 0).unwrap();
        let next = next_local_hour("UK", now, 8);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 16, 8, 0, 0).unwrap());

        // 06:00 local: same-day 8 AM.
        let early = Utc.with_ymd_and_hms(2025, 1, 15, 6, 0, 0).unwrap();
        let next = next_local_hour("UK", early, 8);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap());
    }

    #[test]
    fn next_local_hour_respects_offset() {
        // 12:00 UTC in summer for US-EAST is 08:00 local; exactly-at-hour is
        // not "strictly after", so we get tomorrow's 8 AM local (12:00 UTC).
        let now = Utc.with_ymd_and_hms(2025, 7, 15, 12, 0, 0).unwrap();
        let next = next_local_hour("US-EAST", now, 8);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 7, 16, 12, 0, 0).unwrap());
    }
}
