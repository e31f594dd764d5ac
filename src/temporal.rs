//! Temporal-expression contract.
//!
//! Relative time phrases map to exact filter shapes:
//! - rolling N days: `col >= today - N`, open-ended
//! - last week/month/year: the whole previous calendar period, never a
//!   rolling window
//! - this week/month/year: `col >= start of the current period`
//!
//! Each dialect supplies its own function vocabulary; the shapes are shared.

use crate::dialect::Dialect;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarUnit {
    Week,
    Month,
    Year,
}

impl CalendarUnit {
    pub const ALL: [CalendarUnit; 3] = [CalendarUnit::Week, CalendarUnit::Month, CalendarUnit::Year];

    pub fn name(&self) -> &'static str {
        match self {
            CalendarUnit::Week => "week",
            CalendarUnit::Month => "month",
            CalendarUnit::Year => "year",
        }
    }

    fn from_word(word: &str) -> Option<CalendarUnit> {
        match word {
            "week" | "minggu" | "pekan" => Some(CalendarUnit::Week),
            "month" | "bulan" => Some(CalendarUnit::Month),
            "year" | "tahun" => Some(CalendarUnit::Year),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemporalPhrase {
    RollingDays(u32),
    LastPeriod(CalendarUnit),
    ThisPeriod(CalendarUnit),
}

impl fmt::Display for TemporalPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemporalPhrase::RollingDays(n) => write!(f, "last {} days", n),
            TemporalPhrase::LastPeriod(unit) => write!(f, "last {}", unit.name()),
            TemporalPhrase::ThisPeriod(unit) => write!(f, "this {}", unit.name()),
        }
    }
}

/// Dialect-specific date functions.
pub trait TemporalVocabulary: Send + Sync {
    fn today(&self) -> String;

    fn period_start(&self, unit: CalendarUnit, expr: &str) -> String;

    fn minus_days(&self, expr: &str, days: u32) -> String;

    /// `expr` moved back by exactly one period.
    fn minus_period(&self, unit: CalendarUnit, expr: &str) -> String;

    /// Lowercase, whitespace-free fragments that show a period function was
    /// used for `unit`.
    fn period_markers(&self, unit: CalendarUnit) -> &'static [&'static str];
}

pub struct ClickHouseTemporal;

impl TemporalVocabulary for ClickHouseTemporal {
    fn today(&self) -> String {
        "today()".to_string()
    }

    // Weeks start on Monday (mode 1).
    fn period_start(&self, unit: CalendarUnit, expr: &str) -> String {
        match unit {
            CalendarUnit::Week => format!("toStartOfWeek({}, 1)", expr),
            CalendarUnit::Month => format!("toStartOfMonth({})", expr),
            CalendarUnit::Year => format!("toStartOfYear({})", expr),
        }
    }

    fn minus_days(&self, expr: &str, days: u32) -> String {
        format!("{} - {}", expr, days)
    }

    fn minus_period(&self, unit: CalendarUnit, expr: &str) -> String {
        match unit {
            CalendarUnit::Week => format!("{} - 7", expr),
            CalendarUnit::Month => format!("{} - INTERVAL 1 MONTH", expr),
            CalendarUnit::Year => format!("{} - INTERVAL 1 YEAR", expr),
        }
    }

    fn period_markers(&self, unit: CalendarUnit) -> &'static [&'static str] {
        match unit {
            CalendarUnit::Week => &["tostartofweek(", "tomonday("],
            CalendarUnit::Month => &["tostartofmonth("],
            CalendarUnit::Year => &["tostartofyear("],
        }
    }
}

pub struct MySqlTemporal;

impl TemporalVocabulary for MySqlTemporal {
    fn today(&self) -> String {
        "CURDATE()".to_string()
    }

    fn period_start(&self, unit: CalendarUnit, expr: &str) -> String {
        match unit {
            CalendarUnit::Week => format!("DATE_SUB({e}, INTERVAL WEEKDAY({e}) DAY)", e = expr),
            CalendarUnit::Month => format!("DATE_FORMAT({}, '%Y-%m-01')", expr),
            CalendarUnit::Year => format!("MAKEDATE(YEAR({}), 1)", expr),
        }
    }

    fn minus_days(&self, expr: &str, days: u32) -> String {
        format!("DATE_SUB({}, INTERVAL {} DAY)", expr, days)
    }

    fn minus_period(&self, unit: CalendarUnit, expr: &str) -> String {
        format!("DATE_SUB({}, INTERVAL 1 {})", expr, unit.name().to_uppercase())
    }

    fn period_markers(&self, unit: CalendarUnit) -> &'static [&'static str] {
        match unit {
            CalendarUnit::Week => &["weekday(", "yearweek("],
            CalendarUnit::Month => &["date_format(", "last_day("],
            CalendarUnit::Year => &["makedate("],
        }
    }
}

pub struct PostgresTemporal;

impl TemporalVocabulary for PostgresTemporal {
    fn today(&self) -> String {
        "CURRENT_DATE".to_string()
    }

    fn period_start(&self, unit: CalendarUnit, expr: &str) -> String {
        format!("DATE_TRUNC('{}', {})", unit.name(), expr)
    }

    fn minus_days(&self, expr: &str, days: u32) -> String {
        format!("{} - INTERVAL '{} days'", expr, days)
    }

    fn minus_period(&self, unit: CalendarUnit, expr: &str) -> String {
        format!("{} - INTERVAL '1 {}'", expr, unit.name())
    }

    fn period_markers(&self, unit: CalendarUnit) -> &'static [&'static str] {
        match unit {
            CalendarUnit::Week => &["date_trunc('week'"],
            CalendarUnit::Month => &["date_trunc('month'"],
            CalendarUnit::Year => &["date_trunc('year'"],
        }
    }
}

pub fn vocabulary_for(dialect: Dialect) -> Box<dyn TemporalVocabulary> {
    match dialect {
        Dialect::ClickHouse => Box::new(ClickHouseTemporal),
        Dialect::MySql => Box::new(MySqlTemporal),
        Dialect::PostgreSql => Box::new(PostgresTemporal),
    }
}

/// A generated filter that doesn't honor the contract for its phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalViolation {
    pub phrase: TemporalPhrase,
    pub message: String,
}

pub struct TemporalContract {
    vocabulary: Box<dyn TemporalVocabulary>,
}

impl TemporalContract {
    pub fn new(vocabulary: Box<dyn TemporalVocabulary>) -> Self {
        Self { vocabulary }
    }

    pub fn for_dialect(dialect: Dialect) -> Self {
        Self::new(vocabulary_for(dialect))
    }

    /// Canonical filter for `phrase` on `column`. Last-period filters use the
    /// half-open range form.
    pub fn render(&self, phrase: TemporalPhrase, column: &str) -> String {
        match phrase {
            TemporalPhrase::RollingDays(n) => self.render_rolling(column, n),
            TemporalPhrase::LastPeriod(unit) => self.render_last_period_range(column, unit),
            TemporalPhrase::ThisPeriod(unit) => self.render_this_period(column, unit),
        }
    }

    pub fn render_rolling(&self, column: &str, days: u32) -> String {
        let v = &self.vocabulary;
        format!("{} >= {}", column, v.minus_days(&v.today(), days))
    }

    /// `period_start(col) = period_start(today - 1 period)`
    pub fn render_last_period_equality(&self, column: &str, unit: CalendarUnit) -> String {
        let v = &self.vocabulary;
        format!(
            "{} = {}",
            v.period_start(unit, column),
            v.period_start(unit, &v.minus_period(unit, &v.today()))
        )
    }

    /// `col >= start of previous period AND col < start of current period`
    pub fn render_last_period_range(&self, column: &str, unit: CalendarUnit) -> String {
        let v = &self.vocabulary;
        let today = v.today();
        format!(
            "{col} >= {prev} AND {col} < {cur}",
            col = column,
            prev = v.period_start(unit, &v.minus_period(unit, &today)),
            cur = v.period_start(unit, &today)
        )
    }

    pub fn render_this_period(&self, column: &str, unit: CalendarUnit) -> String {
        let v = &self.vocabulary;
        format!("{} >= {}", column, v.period_start(unit, &v.today()))
    }

    /// Prompt section spelling out the contract with this dialect's functions.
    pub fn render_rules(&self) -> String {
        let col = "date_column";
        let mut lines = vec![
            "TEMPORAL FILTER RULES:".to_string(),
            format!(
                "- \"N hari terakhir\" / \"last N days\" is a rolling window: {}",
                self.render_rolling(col, 7).replace('7', "N")
            ),
        ];
        for (unit, indonesian) in [
            (CalendarUnit::Week, "minggu lalu"),
            (CalendarUnit::Month, "bulan lalu"),
            (CalendarUnit::Year, "tahun lalu"),
        ] {
            lines.push(format!(
                "- \"{}\" / \"last {}\" is the whole previous calendar {}: {}  (or: {})",
                indonesian,
                unit.name(),
                unit.name(),
                self.render_last_period_range(col, unit),
                self.render_last_period_equality(col, unit)
            ));
        }
        for (unit, indonesian) in [
            (CalendarUnit::Week, "minggu ini"),
            (CalendarUnit::Month, "bulan ini"),
            (CalendarUnit::Year, "tahun ini"),
        ] {
            lines.push(format!(
                "- \"{}\" / \"this {}\": {}",
                indonesian,
                unit.name(),
                self.render_this_period(col, unit)
            ));
        }
        lines.push(
            "- Never answer a previous calendar period with a rolling day window.".to_string(),
        );
        lines.join("\n")
    }

    /// Check generated SQL against the phrase found in the question.
    pub fn review(&self, phrase: TemporalPhrase, sql: &str) -> Result<(), TemporalViolation> {
        let normalized = normalize(sql);
        let v = &self.vocabulary;
        let has_marker =
            |unit: CalendarUnit| v.period_markers(unit).iter().any(|m| normalized.contains(m));

        let problem = match phrase {
            TemporalPhrase::RollingDays(_) => CalendarUnit::ALL
                .iter()
                .any(|u| has_marker(*u))
                .then(|| "rolling window expressed with a calendar period function".to_string()),
            TemporalPhrase::LastPeriod(unit) => {
                let shifted = normalize(&v.minus_period(unit, &v.today()));
                if !has_marker(unit) || !normalized.contains(&shifted) {
                    Some(format!(
                        "previous calendar {} must be filtered by period start, not a rolling window",
                        unit.name()
                    ))
                } else {
                    None
                }
            }
            TemporalPhrase::ThisPeriod(unit) => (!has_marker(unit) || !normalized.contains(">="))
                .then(|| format!("current {} must start at the period start", unit.name())),
        };

        match problem {
            Some(message) => Err(TemporalViolation { phrase, message }),
            None => Ok(()),
        }
    }
}

fn normalize(sql: &str) -> String {
    sql.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Find the first relative time phrase in a question (Indonesian or English).
///
/// Rolling windows win over calendar periods when both appear.
pub fn detect_phrase(question: &str) -> Option<TemporalPhrase> {
    let lowered = question.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    for (i, word) in words.iter().enumerate() {
        let n = match word.parse::<u32>() {
            Ok(n) => n,
            Err(_) => continue,
        };
        let next = words.get(i + 1).copied();
        let after = words.get(i + 2).copied();
        let prev = i.checked_sub(1).and_then(|p| words.get(p)).copied();
        if next == Some("hari") && after == Some("terakhir") {
            return Some(TemporalPhrase::RollingDays(n));
        }
        if matches!(prev, Some("last") | Some("past")) && matches!(next, Some("days") | Some("day")) {
            return Some(TemporalPhrase::RollingDays(n));
        }
    }

    for pair in words.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if let Some(unit) = CalendarUnit::from_word(a) {
            match b {
                "lalu" | "kemarin" => return Some(TemporalPhrase::LastPeriod(unit)),
                "ini" => return Some(TemporalPhrase::ThisPeriod(unit)),
                _ => {}
            }
        }
        if let Some(unit) = CalendarUnit::from_word(b) {
            match a {
                "last" | "previous" => return Some(TemporalPhrase::LastPeriod(unit)),
                "this" | "current" => return Some(TemporalPhrase::ThisPeriod(unit)),
                _ => {}
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clickhouse() -> TemporalContract {
        TemporalContract::for_dialect(Dialect::ClickHouse)
    }

    #[test]
    fn test_detect_phrases() {
        assert_eq!(
            detect_phrase("total penjualan 7 hari terakhir"),
            Some(TemporalPhrase::RollingDays(7))
        );
        assert_eq!(
            detect_phrase("sales in the last 30 days"),
            Some(TemporalPhrase::RollingDays(30))
        );
        assert_eq!(
            detect_phrase("penjualan minggu lalu per company"),
            Some(TemporalPhrase::LastPeriod(CalendarUnit::Week))
        );
        assert_eq!(
            detect_phrase("revenue last month"),
            Some(TemporalPhrase::LastPeriod(CalendarUnit::Month))
        );
        assert_eq!(
            detect_phrase("omzet tahun ini"),
            Some(TemporalPhrase::ThisPeriod(CalendarUnit::Year))
        );
        assert_eq!(detect_phrase("top companies by revenue"), None);
    }

    #[test]
    fn test_rolling_days_has_no_period_function() {
        let sql = clickhouse().render(TemporalPhrase::RollingDays(7), "created_date");
        assert_eq!(sql, "created_date >= today() - 7");
        assert!(!sql.contains("toStartOfWeek"));
    }

    #[test]
    fn test_last_week_forms() {
        let contract = clickhouse();
        assert_eq!(
            contract.render_last_period_equality("created_date", CalendarUnit::Week),
            "toStartOfWeek(created_date, 1) = toStartOfWeek(today() - 7, 1)"
        );
        assert_eq!(
            contract.render(TemporalPhrase::LastPeriod(CalendarUnit::Week), "created_date"),
            "created_date >= toStartOfWeek(today() - 7, 1) AND created_date < toStartOfWeek(today(), 1)"
        );
    }

    #[test]
    fn test_review_rejects_bare_rolling_for_last_week() {
        let contract = clickhouse();
        let phrase = TemporalPhrase::LastPeriod(CalendarUnit::Week);
        let bare = "SELECT SUM(grand_total) FROM internal.realtime_order WHERE created_date >= today() - 7";
        assert!(contract.review(phrase, bare).is_err());

        let good = format!(
            "SELECT SUM(grand_total) FROM internal.realtime_order WHERE {}",
            contract.render_last_period_equality("created_date", CalendarUnit::Week)
        );
        assert!(contract.review(phrase, &good).is_ok());
    }

    #[test]
    fn test_review_rejects_period_function_for_rolling() {
        let contract = clickhouse();
        let sql = "SELECT count() FROM t WHERE toStartOfWeek(created_date, 1) = toStartOfWeek(today(), 1)";
        assert!(contract.review(TemporalPhrase::RollingDays(7), sql).is_err());
        assert!(contract
            .review(TemporalPhrase::RollingDays(7), "SELECT count() FROM t WHERE created_date >= today() - 7")
            .is_ok());
    }

    #[test]
    fn test_every_rendered_form_passes_review() {
        let phrases = [
            TemporalPhrase::RollingDays(14),
            TemporalPhrase::LastPeriod(CalendarUnit::Week),
            TemporalPhrase::LastPeriod(CalendarUnit::Month),
            TemporalPhrase::LastPeriod(CalendarUnit::Year),
            TemporalPhrase::ThisPeriod(CalendarUnit::Month),
        ];
        for dialect in Dialect::ALL {
            let contract = TemporalContract::for_dialect(dialect);
            for phrase in phrases {
                let sql = format!("SELECT 1 FROM t WHERE {}", contract.render(phrase, "d"));
                assert!(
                    contract.review(phrase, &sql).is_ok(),
                    "{} {:?}: {}",
                    dialect,
                    phrase,
                    sql
                );
            }
        }
    }

    #[test]
    fn test_postgres_vocabulary() {
        let contract = TemporalContract::for_dialect(Dialect::PostgreSql);
        assert_eq!(
            contract.render_this_period("created_at", CalendarUnit::Month),
            "created_at >= DATE_TRUNC('month', CURRENT_DATE)"
        );
    }

    #[test]
    fn test_rules_mention_every_phrase() {
        let rules = clickhouse().render_rules();
        for phrase in ["hari terakhir", "minggu lalu", "bulan lalu", "tahun lalu", "minggu ini"] {
            assert!(rules.contains(phrase), "missing {}", phrase);
        }
        assert!(rules.contains("toStartOfMonth(today() - INTERVAL 1 MONTH)"));
    }
}
