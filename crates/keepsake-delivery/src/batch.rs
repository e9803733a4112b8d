//! Pure batch planner: one recipient's messages + a cadence → release instants.
//!
//! No I/O. The caller supplies the reference instant, so the same inputs
//! always produce the same plan.

use chrono::{DateTime, Duration, Months, Utc};
use keepsake_core::types::Message;

use crate::cadence::{Cadence, Period, SortOrder};

#[derive(Debug, Clone)]
pub struct PlannedRelease {
    pub message: Message,
    pub release_at: DateTime<Utc>,
    /// True iff `release_at` falls on or before the reference calendar day.
    pub release_now: bool,
}

/// Plan releases for one recipient.
///
/// Messages are sorted by the rule's order (stable, so equal keys keep the
/// fetch order), then cut into consecutive groups of `quantity`; group `g`
/// releases at `now + g × period`. Without a rule every message is group 0.
pub fn plan(
    mut messages: Vec<Message>,
    cadence: &Cadence,
    now: DateTime<Utc>,
) -> Vec<PlannedRelease> {
    let Some(rule) = cadence.rule() else {
        return messages
            .into_iter()
            .map(|message| PlannedRelease {
                message,
                release_at: now,
                release_now: true,
            })
            .collect();
    };

    sort_messages(&mut messages, rule.order);
    let quantity = rule.quantity.max(1) as usize;

    messages
        .into_iter()
        .enumerate()
        .map(|(i, message)| {
            let group = (i / quantity) as u32;
            let release_at = group_instant(now, group, rule.period);
            PlannedRelease {
                message,
                release_at,
                release_now: is_release_now(release_at, now),
            }
        })
        .collect()
}

/// Stable sort by the cadence order.
pub fn sort_messages(messages: &mut [Message], order: SortOrder) {
    match order {
        SortOrder::CreatedAscending => messages.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        SortOrder::CreatedDescending => messages.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        // Case-insensitive; cached so each title is lowered once.
        SortOrder::TitleAscending => messages.sort_by_cached_key(|m| m.title.to_lowercase()),
    }
}

/// `now + group × period`. Months are calendar months, clamped to the end
/// of shorter months (Jan 31 + 1 month = Feb 28/29).
pub fn group_instant(now: DateTime<Utc>, group: u32, period: Period) -> DateTime<Utc> {
    match period {
        Period::Week => now
            .checked_add_signed(Duration::weeks(group as i64))
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
        Period::Month => now
            .checked_add_months(Months::new(group))
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
    }
}

/// Compare calendar days (UTC) only, so time-of-day never pushes a
/// same-day release into the future.
pub fn is_release_now(release_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    release_at.date_naive() <= now.date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cadence::CadenceRule;
    use chrono::TimeZone;
    use keepsake_core::types::{MessageStatus, Trigger};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn msg(id: &str, title: &str, created: DateTime<Utc>) -> Message {
        Message {
            id: id.into(),
            user_id: "u1".into(),
            title: title.into(),
            body: String::new(),
            attachments: vec![],
            created_at: created,
            status: MessageStatus::Draft,
            trigger: Trigger::Posthumous,
            release_date: None,
            release_event: None,
            sent_at: None,
        }
    }

    fn paced(quantity: u32, period: Period, order: SortOrder) -> Cadence {
        Cadence::Paced(CadenceRule {
            quantity,
            period,
            order,
        })
    }

    fn five_messages() -> Vec<Message> {
        ["A", "B", "C", "D", "E"]
            .iter()
            .enumerate()
            .map(|(i, id)| msg(id, id, at(2025, 1, 1 + i as u32, 9)))
            .collect()
    }

    #[test]
    fn two_per_week_groups_in_pairs() {
        let now = at(2026, 4, 6, 10);
        let plan = plan(
            five_messages(),
            &paced(2, Period::Week, SortOrder::CreatedAscending),
            now,
        );

        let summary: Vec<_> = plan
            .iter()
            .map(|p| (p.message.id.as_str(), p.release_now, p.release_at))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("A", true, now),
                ("B", true, now),
                ("C", false, now + Duration::days(7)),
                ("D", false, now + Duration::days(7)),
                ("E", false, now + Duration::days(14)),
            ]
        );
    }

    #[test]
    fn no_rule_releases_everything_now_in_fetch_order() {
        let now = at(2026, 4, 6, 10);
        let ids: Vec<_> = plan(five_messages(), &Cadence::AllAtOnce, now)
            .into_iter()
            .map(|p| {
                assert!(p.release_now);
                assert_eq!(p.release_at, now);
                p.message.id
            })
            .collect();
        assert_eq!(ids, vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn same_calendar_day_counts_as_now() {
        let now = at(2026, 4, 6, 23);
        assert!(is_release_now(at(2026, 4, 6, 0), now));
        assert!(is_release_now(at(2026, 4, 6, 23) + Duration::minutes(59), now));
        assert!(!is_release_now(at(2026, 4, 7, 0), now));
        assert!(is_release_now(at(2026, 4, 1, 12), now));
    }

    #[test]
    fn monthly_groups_use_calendar_months() {
        let now = at(2026, 1, 31, 8);
        assert_eq!(group_instant(now, 1, Period::Month), at(2026, 2, 28, 8));
        assert_eq!(group_instant(now, 2, Period::Month), at(2026, 3, 31, 8));
        assert_eq!(group_instant(now, 0, Period::Month), now);
    }

    #[test]
    fn created_descending_reverses_order() {
        let now = at(2026, 4, 6, 10);
        let ids: Vec<_> = plan(
            five_messages(),
            &paced(5, Period::Month, SortOrder::CreatedDescending),
            now,
        )
        .into_iter()
        .map(|p| p.message.id)
        .collect();
        assert_eq!(ids, vec!["E", "D", "C", "B", "A"]);
    }

    #[test]
    fn title_order_is_stable_for_equal_titles() {
        let now = at(2026, 4, 6, 10);
        let created = at(2025, 1, 1, 9);
        let messages = vec![
            msg("m1", "birthday", created),
            msg("m2", "Advice", created),
            msg("m3", "Birthday", created),
            msg("m4", "advice", created),
        ];
        let ids: Vec<_> = plan(
            messages,
            &paced(1, Period::Week, SortOrder::TitleAscending),
            now,
        )
        .into_iter()
        .map(|p| p.message.id)
        .collect();
        assert_eq!(ids, vec!["m2", "m4", "m1", "m3"]);
    }
}
