//! Demo data
//!
//! Synthetic jails and ban history for machines without fail2ban. The shape
//! is exactly what the parser produces, so nothing downstream knows the
//! difference. Output is a pure function of `(seed, now)`.

use chrono::{DateTime, Duration, Utc};
use f2b_core::{BannedAddress, Jail};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Jail names are fixed so UI tests can rely on them.
pub const DEMO_JAILS: &[&str] = &[
    "sshd",
    "nginx-http-auth",
    "postfix",
    "dovecot",
    "apache-auth",
    "recidive",
];

const COUNTRIES: &[&str] = &["CN", "RU", "US", "BR", "IN", "KR", "DE", "FR", "VN", "ID"];

const MAX_BANS_PER_JAIL: usize = 8;

/// Addresses shared between jails, so some offenders span several.
const REPEAT_OFFENDERS: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct DemoData {
    pub jails: Vec<Jail>,
    /// Ban timestamps over the trailing 24 hours, oldest first.
    pub ban_events: Vec<DateTime<Utc>>,
}

impl DemoData {
    pub fn jail(&self, name: &str) -> Option<&Jail> {
        self.jails.iter().find(|j| j.name() == name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DemoGenerator {
    seed: u64,
}

impl DemoGenerator {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Seeded by the hour `now` falls in: stable within an hour, different
    /// across hours.
    pub fn for_hour(now: DateTime<Utc>) -> Self {
        Self::new(now.timestamp().div_euclid(3600) as u64)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn generate(&self, now: DateTime<Utc>) -> DemoData {
        let mut rng = StdRng::seed_from_u64(self.seed);

        let pool: Vec<(String, &str)> = (0..REPEAT_OFFENDERS)
            .map(|_| (random_ip(&mut rng), pick(&mut rng, COUNTRIES)))
            .collect();

        let mut jails = Vec::with_capacity(DEMO_JAILS.len());
        for &name in DEMO_JAILS {
            let mut jail = Jail::new(name);

            for _ in 0..rng.gen_range(0..=MAX_BANS_PER_JAIL) {
                let (ip, country) = if rng.gen_bool(0.3) {
                    let (ip, country) = &pool[rng.gen_range(0..pool.len())];
                    (ip.clone(), *country)
                } else {
                    (random_ip(&mut rng), pick(&mut rng, COUNTRIES))
                };
                let banned_at = now - Duration::minutes(rng.gen_range(1..=23 * 60));
                jail.add_banned(BannedAddress::new(ip, name).at(banned_at).with_country(country));
            }

            jail.currently_failed = rng.gen_range(0..=10);
            jail.total_failed = rng.gen_range(100..=5000);
            jail.total_banned = jail.currently_banned() + rng.gen_range(5..=50);
            jails.push(jail);
        }

        let mut ban_events = Vec::new();
        let current_hour = now - Duration::seconds(now.timestamp().rem_euclid(3600));
        for hours_ago in (0..24).rev() {
            let slot = current_hour - Duration::hours(hours_ago);
            for &name in DEMO_JAILS {
                let max = if name == "sshd" { 15 } else { 5 };
                for _ in 0..rng.gen_range(0..=max) {
                    let at = slot + Duration::seconds(rng.gen_range(0..3600));
                    ban_events.push(at.min(now));
                }
            }
        }
        ban_events.extend(
            jails
                .iter()
                .flat_map(|j| j.banned().iter().filter_map(|b| b.banned_at)),
        );
        ban_events.sort();

        DemoData { jails, ban_events }
    }
}

fn pick<'a, R: Rng>(rng: &mut R, items: &[&'a str]) -> &'a str {
    items[rng.gen_range(0..items.len())]
}

/// Something that looks like a public IPv4 address.
fn random_ip<R: Rng>(rng: &mut R) -> String {
    let first = loop {
        let octet: u8 = rng.gen_range(1..=223);
        if !matches!(octet, 10 | 127 | 172 | 192) {
            break octet;
        }
    };
    format!(
        "{}.{}.{}.{}",
        first,
        rng.gen_range(0..=255u8),
        rng.gen_range(0..=255u8),
        rng.gen_range(1..=254u8)
    )
}
