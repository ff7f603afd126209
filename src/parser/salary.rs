use std::sync::LazyLock;

use regex::Regex;

static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)(万|千|[kK])?").unwrap());

/// Monthly salary bounds in thousands of CNY.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SalaryRange {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Wan,
    Qian,
    K,
}

impl Unit {
    fn from_marker(marker: &str) -> Self {
        match marker {
            "万" => Unit::Wan,
            "千" => Unit::Qian,
            _ => Unit::K,
        }
    }

    // 千 and k are already the working scale.
    fn multiplier(self) -> f64 {
        match self {
            Unit::Wan => 10.0,
            Unit::Qian | Unit::K => 1.0,
        }
    }
}

/// Parse texts like `9k-13k`, `9千-1.3万`, `15-20万·13薪`, `20-30万/年`.
/// Returns `None` for negotiable salaries and texts without digits.
pub fn parse_salary(text: &str) -> Option<SalaryRange> {
    let text: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if text.is_empty() || text.contains("面议") {
        return None;
    }

    let (head, suffix) = match text.split_once('·') {
        Some((head, suffix)) => (head, Some(suffix)),
        None => (text.as_str(), None),
    };

    let amounts: Vec<(f64, Option<Unit>)> = AMOUNT_RE
        .captures_iter(head)
        .filter_map(|caps| {
            let value = caps[1].parse::<f64>().ok()?;
            Some((value, caps.get(2).map(|m| Unit::from_marker(m.as_str()))))
        })
        .collect();
    if amounts.is_empty() {
        return None;
    }

    // A bare number borrows the next explicit unit: "15-20万" is 15万-20万.
    let scaled: Vec<f64> = amounts
        .iter()
        .enumerate()
        .map(|(i, (value, unit))| {
            let unit = unit.or_else(|| amounts[i + 1..].iter().find_map(|(_, u)| *u));
            value * unit.map_or(1.0, Unit::multiplier)
        })
        .collect();

    let low = scaled[0];
    let high = scaled.get(1).copied().unwrap_or(low);
    let headline_in_wan = amounts.iter().any(|(_, u)| *u == Some(Unit::Wan));

    let mut min = low.min(high);
    let mut max = low.max(high);
    if is_annual(head, suffix, headline_in_wan, min) {
        min /= 12.0;
        max /= 12.0;
    }

    Some(SalaryRange {
        min: round2(min),
        max: round2(max),
        avg: round2((min + max) / 2.0),
    })
}

/// `年` before the `·` marks an annual figure outright. A `·N薪` suffix on a
/// 万 headline of 100k or more is an annual package; smaller 万 figures stay
/// monthly.
fn is_annual(head: &str, suffix: Option<&str>, headline_in_wan: bool, min: f64) -> bool {
    if head.contains('年') {
        return true;
    }
    let has_pay_months = suffix.is_some_and(|s| s.contains('薪'));
    has_pay_months && headline_in_wan && min >= 100.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn triple(text: &str) -> Option<(f64, f64, f64)> {
        parse_salary(text).map(|r| (r.min, r.max, r.avg))
    }

    #[test]
    fn k_range() {
        assert_eq!(triple("9k-13k"), Some((9.0, 13.0, 11.0)));
        assert_eq!(triple("9K - 13K"), Some((9.0, 13.0, 11.0)));
    }

    #[test]
    fn mixed_units() {
        assert_eq!(triple("9千-1.3万"), Some((9.0, 13.0, 11.0)));
        assert_eq!(triple("1万-1.5万·13薪"), Some((10.0, 15.0, 12.5)));
    }

    #[test]
    fn annual_package_with_suffix() {
        let r = parse_salary("15-20万·13薪").unwrap();
        assert_eq!(r.min, 12.5);
        assert_eq!(r.max, 16.67);
        assert_eq!(r.avg, 14.58);
    }

    #[test]
    fn explicit_year() {
        assert_eq!(triple("24-36万/年"), Some((20.0, 30.0, 25.0)));
    }

    #[test]
    fn year_after_separator_stays_monthly() {
        assert_eq!(triple("10-15k·年终奖"), Some((10.0, 15.0, 12.5)));
        assert_eq!(triple("1万-1.5万·年底双薪"), Some((10.0, 15.0, 12.5)));
    }

    #[test]
    fn single_value() {
        assert_eq!(triple("10k以上"), Some((10.0, 10.0, 10.0)));
    }

    #[test]
    fn negotiable_and_empty() {
        assert_eq!(triple("面议"), None);
        assert_eq!(triple("薪资面议"), None);
        assert_eq!(triple("待遇优厚"), None);
        assert_eq!(triple(""), None);
    }

    #[test]
    fn reversed_bounds_are_ordered() {
        assert_eq!(triple("13k-9k"), Some((9.0, 13.0, 11.0)));
    }

    proptest! {
        #[test]
        fn k_ranges_roundtrip(a in 1u32..200, span in 0u32..100) {
            let b = a + span;
            let r = parse_salary(&format!("{}k-{}k", a, b)).unwrap();
            prop_assert_eq!(r.min, a as f64);
            prop_assert_eq!(r.max, b as f64);
            prop_assert_eq!(r.avg, round2((a + b) as f64 / 2.0));
        }

        #[test]
        fn bounds_are_ordered_and_deterministic(text in "\\PC{0,24}") {
            let first = parse_salary(&text);
            prop_assert_eq!(first, parse_salary(&text));
            if let Some(r) = first {
                prop_assert!(r.min <= r.max);
                prop_assert!(r.min >= 0.0);
            }
        }
    }
}
