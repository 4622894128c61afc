//! Status aggregation
//!
//! Turns per-jail snapshots and ban timestamps into what the dashboard
//! shows: totals, a 24-hour ban timeline and the top-offender ranking.
//! Every function here is pure; `now` is always passed in.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use f2b_core::{Jail, Mode, Offender, StatusSnapshot, TimelineBucket, Totals};

/// Number of hourly buckets in the timeline.
pub const TIMELINE_HOURS: usize = 24;

pub const DEFAULT_TOP_OFFENDERS: usize = 10;

pub fn totals(jails: &[Jail]) -> Totals {
    jails.iter().fold(
        Totals {
            jails: jails.len(),
            ..Totals::default()
        },
        |mut t, jail| {
            t.currently_banned += jail.currently_banned();
            t.currently_failed += jail.currently_failed;
            t.total_banned += jail.total_banned;
            t.total_failed += jail.total_failed;
            t
        },
    )
}

/// Truncate to the start of the hour (UTC).
pub fn floor_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    let secs = t.timestamp().div_euclid(3600) * 3600;
    DateTime::from_timestamp(secs, 0).unwrap_or(t)
}

/// Hourly ban counts for the 24 hours ending with the current one, oldest
/// first. Hours without bans are present with a zero count.
pub fn timeline(events: &[DateTime<Utc>], now: DateTime<Utc>) -> Vec<TimelineBucket> {
    let current = floor_hour(now);
    let start = current - Duration::hours(TIMELINE_HOURS as i64 - 1);
    let end = current + Duration::hours(1);

    let mut counts = [0u32; TIMELINE_HOURS];
    for &event in events {
        if event < start || event >= end {
            continue;
        }
        let index = (floor_hour(event) - start).num_hours() as usize;
        counts[index] += 1;
    }

    counts
        .iter()
        .enumerate()
        .map(|(i, &count)| {
            let hour = start + Duration::hours(i as i64);
            TimelineBucket {
                hour,
                label: hour.format("%H:00").to_string(),
                count,
            }
        })
        .collect()
}

/// Where an offender's country comes from: the most recent ban, and on a
/// tie the lowest jail name.
type CountrySource<'a> = (Option<DateTime<Utc>>, Reverse<&'a str>, &'a str);

#[derive(Default)]
struct OffenderAcc<'a> {
    jails: BTreeSet<String>,
    last_banned: Option<DateTime<Utc>>,
    country: Option<CountrySource<'a>>,
}

/// Addresses ranked by how many jails hold them, then by most recent ban,
/// then by address. Same input, same order.
pub fn top_offenders(jails: &[Jail], limit: usize) -> Vec<Offender> {
    let mut by_ip: BTreeMap<&str, OffenderAcc> = BTreeMap::new();

    for jail in jails {
        for entry in jail.banned() {
            let acc = by_ip.entry(entry.ip.as_str()).or_default();
            acc.jails.insert(jail.name().to_string());
            acc.last_banned = acc.last_banned.max(entry.banned_at);
            if let Some(country) = entry.country.as_deref() {
                let source = (entry.banned_at, Reverse(jail.name()), country);
                if acc.country.map_or(true, |current| source > current) {
                    acc.country = Some(source);
                }
            }
        }
    }

    let mut offenders: Vec<Offender> = by_ip
        .into_iter()
        .map(|(ip, acc)| Offender {
            ip: ip.to_string(),
            jail_count: acc.jails.len(),
            jails: acc.jails.into_iter().collect(),
            last_banned: acc.last_banned,
            country: acc.country.map(|(_, _, country)| country.to_string()),
        })
        .collect();

    offenders.sort_by(rank);
    offenders.truncate(limit);
    offenders
}

/// `None` sorts below any time, so unknown ban times rank last.
fn rank(a: &Offender, b: &Offender) -> Ordering {
    b.jail_count
        .cmp(&a.jail_count)
        .then_with(|| b.last_banned.cmp(&a.last_banned))
        .then_with(|| a.ip.cmp(&b.ip))
}

/// Compose everything `/api/status` returns.
pub fn snapshot(
    mode: Mode,
    jails: Vec<Jail>,
    ban_events: &[DateTime<Utc>],
    now: DateTime<Utc>,
) -> StatusSnapshot {
    StatusSnapshot {
        mode,
        generated_at: now,
        totals: totals(&jails),
        timeline: timeline(ban_events, now),
        top_offenders: top_offenders(&jails, DEFAULT_TOP_OFFENDERS),
        jails,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use f2b_core::BannedAddress;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, s).unwrap()
    }

    fn jail(name: &str, bans: &[(&str, Option<DateTime<Utc>>)]) -> Jail {
        let mut j = Jail::new(name);
        for (ip, when) in bans {
            let mut entry = BannedAddress::new(*ip, name);
            entry.banned_at = *when;
            j.add_banned(entry);
        }
        j
    }

    #[test]
    fn test_floor_hour() {
        assert_eq!(floor_hour(at(13, 59, 59)), at(13, 0, 0));
        assert_eq!(floor_hour(at(13, 0, 0)), at(13, 0, 0));
        let with_nanos = at(7, 30, 0) + Duration::nanoseconds(5);
        assert_eq!(floor_hour(with_nanos), at(7, 0, 0));
    }

    #[test]
    fn test_timeline_always_24_buckets() {
        let now = at(15, 20, 0);
        let buckets = timeline(&[], now);
        assert_eq!(buckets.len(), 24);
        assert!(buckets.iter().all(|b| b.count == 0));
        assert_eq!(buckets[23].hour, at(15, 0, 0));
        assert_eq!(buckets[23].label, "15:00");
        assert_eq!(buckets[0].hour, at(15, 0, 0) - Duration::hours(23));
        for pair in buckets.windows(2) {
            assert_eq!(pair[1].hour - pair[0].hour, Duration::hours(1));
        }
    }

    #[test]
    fn test_timeline_hour_boundaries() {
        let now = at(15, 20, 0);
        let events = vec![
            at(14, 59, 59), // last second of 14:00
            at(15, 0, 0),   // first second of 15:00
            at(15, 59, 59), // still the current hour
            at(16, 0, 0),   // next hour: outside
            at(15, 0, 0) - Duration::hours(23), // oldest bucket, inclusive
            at(15, 0, 0) - Duration::hours(23) - Duration::seconds(1), // too old
        ];
        let buckets = timeline(&events, now);
        assert_eq!(buckets[22].count, 1);
        assert_eq!(buckets[23].count, 2);
        assert_eq!(buckets[0].count, 1);
        assert_eq!(buckets.iter().map(|b| b.count).sum::<u32>(), 4);
    }

    #[test]
    fn test_timeline_bucket_is_floor_of_timestamp() {
        let now = at(23, 5, 0);
        let t = at(9, 41, 7);
        let buckets = timeline(&[t], now);
        let hit = buckets.iter().find(|b| b.count == 1).unwrap();
        assert_eq!(hit.hour, floor_hour(t));
    }

    #[test]
    fn test_totals() {
        let mut a = jail("sshd", &[("1.1.1.1", None), ("2.2.2.2", None)]);
        a.currently_failed = 4;
        a.total_failed = 100;
        a.total_banned = 10;
        let mut b = jail("postfix", &[("3.3.3.3", None)]);
        b.total_banned = 1;

        let t = totals(&[a, b]);
        assert_eq!(t.jails, 2);
        assert_eq!(t.currently_banned, 3);
        assert_eq!(t.currently_failed, 4);
        assert_eq!(t.total_failed, 100);
        assert_eq!(t.total_banned, 11);
        assert_eq!(totals(&[]), Totals::default());
    }

    #[test]
    fn test_offender_ranking() {
        let jails = vec![
            jail(
                "sshd",
                &[
                    ("10.0.0.1", Some(at(1, 0, 0))),
                    ("10.0.0.2", Some(at(5, 0, 0))),
                    ("10.0.0.3", None),
                    ("10.0.0.9", Some(at(9, 0, 0))),
                ],
            ),
            jail(
                "recidive",
                &[("10.0.0.1", Some(at(2, 0, 0))), ("10.0.0.3", None)],
            ),
            jail("postfix", &[("10.0.0.1", None), ("10.0.0.0", None)]),
        ];

        let ranked = top_offenders(&jails, 10);
        let ips: Vec<&str> = ranked.iter().map(|o| o.ip.as_str()).collect();
        // 3 jails; then 2 jails; then 1 jail by recency; unknown times last, by address
        assert_eq!(ips, vec!["10.0.0.1", "10.0.0.3", "10.0.0.9", "10.0.0.2", "10.0.0.0"]);

        let top = &ranked[0];
        assert_eq!(top.jail_count, 3);
        assert_eq!(top.jails, vec!["postfix", "recidive", "sshd"]);
        assert_eq!(top.last_banned, Some(at(2, 0, 0)));
    }

    #[test]
    fn test_offender_ties_by_address() {
        let jails = vec![jail("sshd", &[("9.9.9.9", None), ("10.0.0.1", None), ("1.1.1.1", None)])];
        let ips: Vec<String> = top_offenders(&jails, 10).into_iter().map(|o| o.ip).collect();
        assert_eq!(ips, vec!["1.1.1.1", "10.0.0.1", "9.9.9.9"]);
    }

    #[test]
    fn test_offender_ranking_is_deterministic() {
        let forward = vec![
            jail("a", &[("1.1.1.1", Some(at(3, 0, 0))), ("2.2.2.2", Some(at(3, 0, 0)))]),
            jail("b", &[("2.2.2.2", Some(at(1, 0, 0))), ("3.3.3.3", None)]),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        let first = top_offenders(&forward, 10);
        assert_eq!(first, top_offenders(&forward, 10));
        assert_eq!(first, top_offenders(&reversed, 10));
    }

    #[test]
    fn test_offender_country_independent_of_jail_order() {
        let tagged = |name: &str, when: DateTime<Utc>, country: &str| {
            let mut j = Jail::new(name);
            j.add_banned(BannedAddress::new("1.1.1.1", name).at(when).with_country(country));
            j
        };

        // most recent ban wins
        let forward = vec![tagged("sshd", at(1, 0, 0), "NL"), tagged("postfix", at(4, 0, 0), "DE")];
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_eq!(top_offenders(&forward, 1)[0].country.as_deref(), Some("DE"));
        assert_eq!(top_offenders(&reversed, 1)[0].country.as_deref(), Some("DE"));

        // same time: lowest jail name wins
        let forward = vec![tagged("sshd", at(2, 0, 0), "NL"), tagged("postfix", at(2, 0, 0), "DE")];
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_eq!(top_offenders(&forward, 1)[0].country.as_deref(), Some("DE"));
        assert_eq!(top_offenders(&reversed, 1)[0].country.as_deref(), Some("DE"));
    }

    #[test]
    fn test_offender_limit() {
        let jails = vec![jail("sshd", &[("1.1.1.1", None), ("2.2.2.2", None), ("3.3.3.3", None)])];
        assert_eq!(top_offenders(&jails, 2).len(), 2);
        assert!(top_offenders(&jails, 0).is_empty());
    }

    #[test]
    fn test_snapshot() {
        let now = at(12, 0, 0);
        let jails = vec![jail("sshd", &[("1.1.1.1", Some(at(11, 30, 0)))])];
        let snap = snapshot(Mode::Live, jails, &[at(11, 30, 0)], now);
        assert_eq!(snap.mode, Mode::Live);
        assert_eq!(snap.generated_at, now);
        assert_eq!(snap.totals.currently_banned, 1);
        assert_eq!(snap.timeline.len(), 24);
        assert_eq!(snap.timeline[22].count, 1);
        assert_eq!(snap.top_offenders[0].ip, "1.1.1.1");
        assert_eq!(snap.jails.len(), 1);
    }
}
