//! Parsing `fail2ban-client` output
//!
//! The client prints a box-drawing tree:
//!
//! ```text
//! Status for the jail: sshd
//! |- Filter
//! |  |- Currently failed:	3
//! |  |- Total failed:	118
//! |  `- File list:	/var/log/auth.log
//! `- Actions
//!    |- Currently banned:	2
//!    |- Total banned:	19
//!    `- Banned IP list:	203.0.113.7 2001:db8::42
//! ```
//!
//! Parsing is line-oriented and never fails: unknown lines are skipped,
//! missing sections leave their fields empty, and bad tokens are dropped.

use std::sync::OnceLock;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use f2b_core::validate::{is_address_token, validate_jail_name};
use f2b_core::{BannedAddress, Jail};
use regex::Regex;

/// Jail names from `fail2ban-client status`.
pub fn parse_jail_list(output: &str) -> Vec<String> {
    for raw in output.lines() {
        let Some((label, value)) = strip_tree_prefix(raw).split_once(':') else {
            continue;
        };
        if label.trim().eq_ignore_ascii_case("jail list") {
            return value
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|name| validate_jail_name(name).is_ok())
                .map(String::from)
                .collect();
        }
    }
    Vec::new()
}

/// One jail from `fail2ban-client status <jail>`.
///
/// The reported "Currently banned" counter is not trusted; the jail's count
/// always follows the parsed address list.
pub fn parse_jail_status(jail_name: &str, output: &str) -> Jail {
    let mut jail = Jail::new(jail_name);
    let mut in_banned_list = false;

    for raw in output.lines() {
        let line = strip_tree_prefix(raw);
        if line.is_empty() {
            in_banned_list = false;
            continue;
        }

        // Long ban lists may wrap onto unlabelled lines
        if in_banned_list && !has_tree_marker(raw) && starts_with_address(line) {
            push_addresses(&mut jail, line);
            continue;
        }
        in_banned_list = false;

        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        match label.trim().to_ascii_lowercase().as_str() {
            "currently failed" => jail.currently_failed = first_number(value).unwrap_or(0),
            "total failed" => jail.total_failed = first_number(value).unwrap_or(0),
            "total banned" => jail.total_banned = first_number(value).unwrap_or(0),
            "file list" => {
                jail.file_list = value.split_whitespace().map(String::from).collect();
            }
            "banned ip list" => {
                push_addresses(&mut jail, value);
                in_banned_list = true;
            }
            _ => {}
        }
    }

    jail
}

/// Ban times from `fail2ban-client get <jail> banip --with-time`, read as
/// local time.
pub fn parse_banned_with_time(output: &str) -> Vec<(String, DateTime<Utc>)> {
    parse_banned_with_time_in(output, &Local)
}

/// As [`parse_banned_with_time`], with the daemon's timezone given.
///
/// Lines look like `203.0.113.7 	2024-05-01 10:00:00 + 600 = 2024-05-01 10:10:00`.
pub fn parse_banned_with_time_in<Tz: TimeZone>(
    output: &str,
    tz: &Tz,
) -> Vec<(String, DateTime<Utc>)> {
    let mut result = Vec::new();

    for raw in output.lines() {
        let line = raw.trim().trim_matches(|c: char| matches!(c, '[' | ']' | '\'' | '"' | ','));
        let mut parts = line.splitn(2, char::is_whitespace);
        let (Some(ip), Some(rest)) = (parts.next(), parts.next()) else {
            continue;
        };
        if !is_address_token(ip) {
            continue;
        }
        let Some(stamp) = rest.trim_start().get(..19) else {
            continue;
        };
        let Ok(naive) = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S") else {
            continue;
        };
        if let Some(at) = tz.from_local_datetime(&naive).earliest() {
            result.push((ip.to_string(), at.with_timezone(&Utc)));
        }
    }

    result
}

/// Fill in `banned_at` for listed addresses. Returns how many matched.
pub fn attach_ban_times(jail: &mut Jail, times: &[(String, DateTime<Utc>)]) -> usize {
    times
        .iter()
        .filter(|(ip, at)| jail.set_ban_time(ip, *at))
        .count()
}

fn push_addresses(jail: &mut Jail, text: &str) {
    let name = jail.name().to_string();
    for token in text.split_whitespace().filter(|t| is_address_token(t)) {
        jail.add_banned(BannedAddress::new(token, name.as_str()));
    }
}

fn starts_with_address(line: &str) -> bool {
    line.split_whitespace().next().is_some_and(is_address_token)
}

/// Lines that carry a label start with `|-` or `` `- `` somewhere in their
/// indentation.
fn has_tree_marker(raw: &str) -> bool {
    let indent_end = raw
        .find(|c: char| !(c.is_whitespace() || matches!(c, '|' | '`' | '-')))
        .unwrap_or(raw.len());
    let indent = &raw[..indent_end];
    indent.contains("|-") || indent.contains("`-")
}

/// Strip the leading `|`, `` ` ``, `-` and whitespace the client draws.
fn strip_tree_prefix(line: &str) -> &str {
    line.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '|' | '`' | '-'))
        .trim_end()
}

fn first_number(value: &str) -> Option<u64> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let re = DIGITS.get_or_init(|| Regex::new(r"\d+").expect("static regex"));
    re.find(value)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GLOBAL_STATUS: &str = "Status\n\
|- Number of jail:\t3\n\
`- Jail list:\tnginx-http-auth, sshd, recidive\n";

    const SSHD_STATUS: &str = "Status for the jail: sshd\n\
|- Filter\n\
|  |- Currently failed:\t3\n\
|  |- Total failed:\t118\n\
|  `- File list:\t/var/log/auth.log\n\
`- Actions\n\
   |- Currently banned:\t3\n\
   |- Total banned:\t19\n\
   `- Banned IP list:\t203.0.113.7 198.51.100.23 2001:db8::42\n";

    const EMPTY_JAIL: &str = "Status for the jail: postfix\n\
|- Filter\n\
|  |- Currently failed:\t0\n\
|  |- Total failed:\t0\n\
|  `- Journal matches:\t_SYSTEMD_UNIT=postfix.service\n\
`- Actions\n\
   |- Currently banned:\t0\n\
   |- Total banned:\t0\n\
   `- Banned IP list:\t\n";

    #[test]
    fn test_parse_jail_list() {
        assert_eq!(
            parse_jail_list(GLOBAL_STATUS),
            vec!["nginx-http-auth", "sshd", "recidive"]
        );
    }

    #[test]
    fn test_jail_list_missing_or_empty() {
        assert!(parse_jail_list("").is_empty());
        assert!(parse_jail_list("Status\n|- Number of jail:\t0\n").is_empty());
        assert!(parse_jail_list("`- Jail list:\t\n").is_empty());
        assert!(parse_jail_list("garbage\n\u{0}\u{1}").is_empty());
    }

    #[test]
    fn test_jail_list_drops_bad_names() {
        assert_eq!(parse_jail_list("`- Jail list: sshd, -x, $(id), ok.jail"), vec!["sshd", "ok.jail"]);
    }

    #[test]
    fn test_parse_jail_status() {
        let jail = parse_jail_status("sshd", SSHD_STATUS);
        assert_eq!(jail.name(), "sshd");
        assert_eq!(jail.currently_failed, 3);
        assert_eq!(jail.total_failed, 118);
        assert_eq!(jail.total_banned, 19);
        assert_eq!(jail.currently_banned(), 3);
        assert_eq!(jail.file_list, vec!["/var/log/auth.log"]);
        assert_eq!(
            jail.banned_ips().collect::<Vec<_>>(),
            vec!["203.0.113.7", "198.51.100.23", "2001:db8::42"]
        );
        assert!(jail.banned().iter().all(|b| b.jail == "sshd" && b.banned_at.is_none()));
    }

    #[test]
    fn test_zero_bans_is_empty_not_error() {
        let jail = parse_jail_status("postfix", EMPTY_JAIL);
        assert_eq!(jail.currently_banned(), 0);
        assert!(jail.banned().is_empty());
        assert!(jail.file_list.is_empty());
    }

    #[test]
    fn test_n_jails_m_addresses() {
        let names = parse_jail_list(GLOBAL_STATUS);
        let outputs = [SSHD_STATUS, EMPTY_JAIL, SSHD_STATUS];
        let jails: Vec<Jail> = names
            .iter()
            .zip(outputs)
            .map(|(name, out)| parse_jail_status(name, out))
            .collect();

        assert_eq!(jails.len(), 3);
        let total: usize = jails.iter().map(|j| j.banned().len()).sum();
        assert_eq!(total, 6);
        for jail in &jails {
            assert_eq!(jail.currently_banned() as usize, jail.banned().len());
        }
    }

    #[test]
    fn test_reported_count_is_not_trusted() {
        let out = "`- Actions\n   |- Currently banned:\t7\n   `- Banned IP list:\t192.0.2.1\n";
        let jail = parse_jail_status("sshd", out);
        assert_eq!(jail.currently_banned(), 1);
    }

    #[test]
    fn test_wrapped_ban_list() {
        let out = "`- Actions\n\
   |- Total banned:\t4\n\
   `- Banned IP list:\t192.0.2.1 192.0.2.2\n\
   192.0.2.3\n\
   192.0.2.4 192.0.2.1\n";
        let jail = parse_jail_status("sshd", out);
        assert_eq!(
            jail.banned_ips().collect::<Vec<_>>(),
            vec!["192.0.2.1", "192.0.2.2", "192.0.2.3", "192.0.2.4"]
        );
    }

    #[test]
    fn test_malformed_and_truncated() {
        let truncated = "Status for the jail: sshd\n|- Filter\n|  |- Currently fa";
        let jail = parse_jail_status("sshd", truncated);
        assert_eq!(jail.currently_failed, 0);
        assert!(jail.banned().is_empty());

        let noisy = "ERROR: something odd\n|  |- Total failed: lots\n`- Banned IP list: not-an-ip 10.0.0.1 ???";
        let jail = parse_jail_status("sshd", noisy);
        assert_eq!(jail.total_failed, 0);
        assert_eq!(jail.banned_ips().collect::<Vec<_>>(), vec!["10.0.0.1"]);

        let jail = parse_jail_status("sshd", "");
        assert_eq!(jail.currently_banned(), 0);
    }

    #[test]
    fn test_parse_banned_with_time() {
        let out = "203.0.113.7 \t2024-05-01 10:00:00 + 600 = 2024-05-01 10:10:00\n\
2001:db8::42 \t2024-05-01 11:30:15 + 600 = 2024-05-01 11:40:15\n\
not an entry\n\
198.51.100.1 \tyesterday\n";
        let times = parse_banned_with_time_in(out, &Utc);
        assert_eq!(times.len(), 2);
        assert_eq!(times[0].0, "203.0.113.7");
        assert_eq!(times[0].1, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        assert_eq!(times[1].0, "2001:db8::42");
        assert_eq!(times[1].1, Utc.with_ymd_and_hms(2024, 5, 1, 11, 30, 15).unwrap());
    }

    #[test]
    fn test_parse_banned_with_time_offset() {
        let tz = chrono::FixedOffset::east_opt(2 * 3600).unwrap();
        let times = parse_banned_with_time_in("192.0.2.1 \t2024-05-01 10:00:00 + 600 = x", &tz);
        assert_eq!(times[0].1, Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_attach_ban_times() {
        let mut jail = parse_jail_status("sshd", SSHD_STATUS);
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let times = vec![
            ("203.0.113.7".to_string(), at),
            ("192.0.2.99".to_string(), at),
        ];
        assert_eq!(attach_ban_times(&mut jail, &times), 1);
        assert_eq!(jail.banned()[0].banned_at, Some(at));
        assert_eq!(jail.banned()[1].banned_at, None);
    }
}
