//! Cadence specification strings → pacing rules.
//!
//! Grammar (the only persisted format this engine owns):
//!
//! ```text
//! all_at_once
//! weekly | monthly                      legacy, 1 per period, oldest first
//! <N>_per_<week|month>[:<order>]        N >= 1
//! order := created_asc | created_desc | title_asc
//! ```
//!
//! Parsing never fails: anything unrecognised degrades to
//! [`Cadence::AllAtOnce`] and is logged as a data-quality signal.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Week,
    Month,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Week => write!(f, "week"),
            Period::Month => write!(f, "month"),
        }
    }
}

/// Release order within one recipient's messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    CreatedAscending,
    CreatedDescending,
    TitleAscending,
}

impl SortOrder {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "created_asc" | "created_ascending" => Some(SortOrder::CreatedAscending),
            "created_desc" | "created_descending" => Some(SortOrder::CreatedDescending),
            "title_asc" | "title_ascending" => Some(SortOrder::TitleAscending),
            _ => None,
        }
    }

    fn as_token(self) -> &'static str {
        match self {
            SortOrder::CreatedAscending => "created_asc",
            SortOrder::CreatedDescending => "created_desc",
            SortOrder::TitleAscending => "title_asc",
        }
    }
}

/// `quantity` messages every `period`, in `order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CadenceRule {
    pub quantity: u32,
    pub period: Period,
    pub order: SortOrder,
}

impl fmt::Display for CadenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_per_{}:{}",
            self.quantity,
            self.period,
            self.order.as_token()
        )
    }
}

/// A parsed cadence setting, built once and passed around by value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cadence {
    /// No pacing: every selected message releases immediately.
    #[default]
    AllAtOnce,
    Paced(CadenceRule),
}

impl Cadence {
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim().to_ascii_lowercase();
        match spec.as_str() {
            "all_at_once" | "" => return Cadence::AllAtOnce,
            "weekly" => return Cadence::paced(1, Period::Week, SortOrder::CreatedAscending),
            "monthly" => return Cadence::paced(1, Period::Month, SortOrder::CreatedAscending),
            _ => {}
        }

        match parse_canonical(&spec) {
            Some(rule) => Cadence::Paced(rule),
            None => {
                warn!(cadence = %spec, "unrecognised cadence, falling back to all_at_once");
                Cadence::AllAtOnce
            }
        }
    }

    /// Parse an optional stored setting; absence means all at once.
    pub fn from_setting(setting: Option<&str>) -> Self {
        setting.map(Cadence::parse).unwrap_or_default()
    }

    pub fn rule(&self) -> Option<&CadenceRule> {
        match self {
            Cadence::AllAtOnce => None,
            Cadence::Paced(rule) => Some(rule),
        }
    }

    fn paced(quantity: u32, period: Period, order: SortOrder) -> Self {
        Cadence::Paced(CadenceRule {
            quantity,
            period,
            order,
        })
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::AllAtOnce => write!(f, "all_at_once"),
            Cadence::Paced(rule) => rule.fmt(f),
        }
    }
}

/// `<N>_per_<week|month>[:<order>]`
fn parse_canonical(spec: &str) -> Option<CadenceRule> {
    let (head, order_token) = match spec.split_once(':') {
        Some((head, order)) => (head, Some(order)),
        None => (spec, None),
    };

    let (quantity, period) = head.split_once("_per_")?;
    let quantity: u32 = quantity.parse().ok().filter(|n| *n >= 1)?;
    let period = match period {
        "week" => Period::Week,
        "month" => Period::Month,
        _ => return None,
    };

    let order = match order_token {
        None => SortOrder::default(),
        Some(token) => SortOrder::from_token(token).unwrap_or_else(|| {
            debug!(order = token, "unknown cadence order, using created_asc");
            SortOrder::default()
        }),
    };

    Some(CadenceRule {
        quantity,
        period,
        order,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(quantity: u32, period: Period, order: SortOrder) -> Cadence {
        Cadence::Paced(CadenceRule {
            quantity,
            period,
            order,
        })
    }

    #[test]
    fn all_at_once_is_unpaced() {
        assert_eq!(Cadence::parse("all_at_once"), Cadence::AllAtOnce);
        assert_eq!(Cadence::from_setting(None), Cadence::AllAtOnce);
    }

    #[test]
    fn legacy_literals() {
        assert_eq!(
            Cadence::parse("weekly"),
            rule(1, Period::Week, SortOrder::CreatedAscending)
        );
        assert_eq!(
            Cadence::parse("monthly"),
            rule(1, Period::Month, SortOrder::CreatedAscending)
        );
    }

    #[test]
    fn canonical_form_with_order() {
        assert_eq!(
            Cadence::parse("3_per_month:title_asc"),
            rule(3, Period::Month, SortOrder::TitleAscending)
        );
        assert_eq!(
            Cadence::parse("2_per_week:created_desc"),
            rule(2, Period::Week, SortOrder::CreatedDescending)
        );
    }

    #[test]
    fn missing_or_bad_order_defaults_to_created_ascending() {
        assert_eq!(
            Cadence::parse("2_per_week"),
            rule(2, Period::Week, SortOrder::CreatedAscending)
        );
        assert_eq!(
            Cadence::parse("2_per_week:shuffle"),
            rule(2, Period::Week, SortOrder::CreatedAscending)
        );
    }

    #[test]
    fn garbage_degrades_to_all_at_once() {
        for spec in ["garbage", "0_per_week", "-1_per_week", "2_per_day", "two_per_week", "_per_"] {
            assert_eq!(Cadence::parse(spec), Cadence::AllAtOnce, "{spec}");
        }
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(Cadence::parse("weekly").to_string(), "1_per_week:created_asc");
        assert_eq!(Cadence::parse(" 4_PER_MONTH ").to_string(), "4_per_month:created_asc");
        assert_eq!(Cadence::AllAtOnce.to_string(), "all_at_once");
    }
}
