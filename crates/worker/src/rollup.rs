//! Batch aggregation into rollup deltas.

use hitcount_store::{HitRow, PeriodKey, RefKey, Rollup};

const HOUR_FORMAT: &str = "%Y-%m-%d %H:00:00";
const DAY_FORMAT: &str = "%Y-%m-%d";

/// Aggregate a batch into per-hour and per-day increments.
///
/// Bot hits are left out. `total_unique` counts first visits.
pub fn aggregate(rows: &[HitRow]) -> Rollup {
    let mut rollup = Rollup::default();

    for row in rows.iter().filter(|r| !r.bot.is_bot()) {
        let hour = PeriodKey::new(
            row.site_id,
            row.path_id,
            row.created_at.format(HOUR_FORMAT).to_string(),
        );
        let day = PeriodKey::new(
            row.site_id,
            row.path_id,
            row.created_at.format(DAY_FORMAT).to_string(),
        );
        let unique = i64::from(row.first_visit);

        let counts = rollup.hit_counts.entry(hour.clone()).or_default();
        counts.total += 1;
        counts.total_unique += unique;

        let stats = rollup.hit_stats.entry(day.clone()).or_default();
        stats.total += 1;
        stats.total_unique += unique;

        let ref_key = RefKey {
            bucket: hour,
            referrer: row.referrer.clone(),
            ref_scheme: row.ref_scheme.map(|s| s.as_str().to_string()).unwrap_or_default(),
        };
        *rollup.ref_counts.entry(ref_key).or_default() += 1;

        if let Some(id) = row.browser_id {
            *rollup.browser_stats.entry((day.clone(), id)).or_default() += 1;
        }
        if let Some(id) = row.system_id {
            *rollup.system_stats.entry((day.clone(), id)).or_default() += 1;
        }
        *rollup
            .location_stats
            .entry((day.clone(), row.location.clone()))
            .or_default() += 1;
        *rollup.size_stats.entry((day, row.size.clone())).or_default() += 1;
    }

    rollup
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use hitcount_core::{Bot, RefScheme, SessionId};
    use hitcount_store::Totals;

    fn row(path_id: i64, hour: u32, first_visit: bool) -> HitRow {
        HitRow {
            site_id: 1,
            path_id,
            session: SessionId::from_bytes([1; 16]),
            bot: Bot::None,
            referrer: "www.example.com/start.html".into(),
            ref_scheme: Some(RefScheme::Http),
            size: String::new(),
            location: "NL".into(),
            first_visit,
            browser_id: Some(4),
            system_id: None,
            created_at: Utc.with_ymd_and_hms(2000, 10, 10, hour, 55, 36).unwrap(),
        }
    }

    #[test]
    fn test_counts_per_hour_and_day() {
        let rollup = aggregate(&[row(1, 20, true), row(1, 20, false), row(1, 21, false)]);

        assert_eq!(
            rollup.hit_counts.get(&PeriodKey::new(1, 1, "2000-10-10 20:00:00")),
            Some(&Totals { total: 2, total_unique: 1 })
        );
        assert_eq!(
            rollup.hit_counts.get(&PeriodKey::new(1, 1, "2000-10-10 21:00:00")),
            Some(&Totals { total: 1, total_unique: 0 })
        );
        assert_eq!(
            rollup.hit_stats.get(&PeriodKey::new(1, 1, "2000-10-10")),
            Some(&Totals { total: 3, total_unique: 1 })
        );
        assert_eq!(
            rollup.browser_stats.get(&(PeriodKey::new(1, 1, "2000-10-10"), 4)),
            Some(&3)
        );
        assert!(rollup.system_stats.is_empty());
        assert_eq!(rollup.ref_counts.values().sum::<i64>(), 3);
    }

    #[test]
    fn test_bots_are_excluded() {
        let mut bot = row(1, 20, true);
        bot.bot = Bot::Crawler;
        let rollup = aggregate(&[bot]);
        assert!(rollup.is_empty());
    }
}
