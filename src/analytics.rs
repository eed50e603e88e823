//! Summary views derived from the full record set.
//!
//! Nothing here is stored on its own: every write rebuilds all views from
//! the merged records.

use crate::model::WastageRecord;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewName {
    OutletSummary,
    DepartmentSummary,
    ProductSummary,
    DailyTrend,
}

impl ViewName {
    pub const ALL: [ViewName; 4] = [
        ViewName::OutletSummary,
        ViewName::DepartmentSummary,
        ViewName::ProductSummary,
        ViewName::DailyTrend,
    ];

    pub fn sheet_name(self) -> &'static str {
        match self {
            Self::OutletSummary => "Outlet Summary",
            Self::DepartmentSummary => "Department Summary",
            Self::ProductSummary => "Product Summary",
            Self::DailyTrend => "Daily Trend",
        }
    }

    pub fn headers(self) -> &'static [&'static str] {
        match self {
            Self::OutletSummary => &["Outlet", "Incidents", "Total Wastage"],
            Self::DepartmentSummary => &["Department", "Incidents", "Total Wastage"],
            Self::ProductSummary => &["Product Name", "Incidents", "Total Wastage"],
            Self::DailyTrend => &["Date", "Amount Wasted"],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub key: String,
    pub incidents: usize,
    pub total_wastage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub amount_wasted: f64,
}

/// One derived table, borrowed from [`Analytics`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum View<'a> {
    Groups(&'a [GroupSummary]),
    Daily(&'a [DailyTotal]),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analytics {
    pub outlets: Vec<GroupSummary>,
    pub departments: Vec<GroupSummary>,
    pub products: Vec<GroupSummary>,
    pub daily: Vec<DailyTotal>,
}

impl Analytics {
    pub fn view(&self, name: ViewName) -> View<'_> {
        match name {
            ViewName::OutletSummary => View::Groups(&self.outlets),
            ViewName::DepartmentSummary => View::Groups(&self.departments),
            ViewName::ProductSummary => View::Groups(&self.products),
            ViewName::DailyTrend => View::Daily(&self.daily),
        }
    }

    /// Every view in sheet order.
    pub fn views(&self) -> impl Iterator<Item = (ViewName, View<'_>)> {
        ViewName::ALL.into_iter().map(move |name| (name, self.view(name)))
    }
}

/// Parses an amount as entered. Anything that is not a finite number is
/// `None`; callers count it as zero.
pub fn parse_amount(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn coerced_amount(record: &WastageRecord) -> f64 {
    parse_amount(&record.amount_wasted).unwrap_or_else(|| {
        warn!(
            entry_id = record.entry_id,
            amount = %record.amount_wasted,
            "amount wasted is not numeric, counted as 0"
        );
        0.0
    })
}

fn summarize<'a, F>(records: &'a [WastageRecord], amounts: &[f64], key_of: F) -> Vec<GroupSummary>
where
    F: Fn(&'a WastageRecord) -> &'a str,
{
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<GroupSummary> = Vec::new();
    for (r, amount) in records.iter().zip(amounts) {
        let key = key_of(r);
        let idx = *index.entry(key).or_insert_with(|| {
            groups.push(GroupSummary {
                key: key.to_string(),
                incidents: 0,
                total_wastage: 0.0,
            });
            groups.len() - 1
        });
        let group = &mut groups[idx];
        group.incidents += 1;
        group.total_wastage += amount;
    }
    // sort_by is stable: equal totals stay in first-seen order.
    groups.sort_by(|a, b| b.total_wastage.total_cmp(&a.total_wastage));
    groups
}

fn daily_trend(records: &[WastageRecord], amounts: &[f64]) -> Vec<DailyTotal> {
    let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for (r, amount) in records.iter().zip(amounts) {
        *by_date.entry(r.timestamp.date()).or_default() += amount;
    }
    by_date
        .into_iter()
        .map(|(date, amount_wasted)| DailyTotal {
            date,
            amount_wasted,
        })
        .collect()
}

pub struct AnalyticsBuilder;

impl AnalyticsBuilder {
    pub fn build(records: &[WastageRecord]) -> Analytics {
        let amounts: Vec<f64> = records.iter().map(coerced_amount).collect();
        Analytics {
            outlets: summarize(records, &amounts, |r| r.outlet.as_str()),
            departments: summarize(records, &amounts, |r| r.department.as_str()),
            products: summarize(records, &amounts, |r| r.product_name.as_str()),
            daily: daily_trend(records, &amounts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn at(ts: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(ts, crate::model::TIMESTAMP_FORMAT).unwrap()
    }

    fn rec(id: u64, ts: &str, dept: &str, outlet: &str, product: &str, amount: &str) -> WastageRecord {
        WastageRecord {
            entry_id: id,
            timestamp: at(ts),
            submitter_name: "Alice".into(),
            department: dept.into(),
            outlet: outlet.into(),
            product_name: product.into(),
            amount_wasted: amount.into(),
            notes: String::new(),
        }
    }

    #[test]
    fn empty_records_give_empty_views() {
        let analytics = AnalyticsBuilder::build(&[]);
        assert_eq!(analytics, Analytics::default());
        assert_eq!(analytics.views().count(), 4);
    }

    #[test]
    fn groups_are_sorted_by_total_descending() {
        let records = vec![
            rec(1, "2024-03-01 08:00:00", "Bakery", "Main Counter", "Bread", "3"),
            rec(2, "2024-03-01 08:00:00", "Bakery", "Main Counter", "Milk", "2"),
            rec(3, "2024-03-02 10:30:00", "Bar", "Kiosk 1", "Lemons", "7.5"),
            rec(4, "2024-03-02 11:00:00", "Kitchen", "Kiosk 2", "Bread", "1"),
        ];
        let analytics = AnalyticsBuilder::build(&records);

        let outlets: Vec<_> = analytics
            .outlets
            .iter()
            .map(|g| (g.key.as_str(), g.incidents, g.total_wastage))
            .collect();
        assert_eq!(
            outlets,
            [("Kiosk 1", 1, 7.5), ("Main Counter", 2, 5.0), ("Kiosk 2", 1, 1.0)]
        );

        let products: Vec<_> = analytics
            .products
            .iter()
            .map(|g| (g.key.as_str(), g.incidents, g.total_wastage))
            .collect();
        assert_eq!(
            products,
            [("Lemons", 1, 7.5), ("Bread", 2, 4.0), ("Milk", 1, 2.0)]
        );
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let records = vec![
            rec(1, "2024-03-01 08:00:00", "Bar", "Kiosk 2", "A", "2"),
            rec(2, "2024-03-01 08:00:00", "Kitchen", "Kiosk 1", "B", "2"),
            rec(3, "2024-03-01 08:00:00", "Bakery", "Mobile Unit", "C", "2"),
        ];
        let analytics = AnalyticsBuilder::build(&records);
        let keys: Vec<_> = analytics.departments.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, ["Bar", "Kitchen", "Bakery"]);
    }

    #[test]
    fn daily_trend_is_ascending_by_date() {
        let records = vec![
            rec(1, "2024-03-05 08:00:00", "Bakery", "Main Counter", "Bread", "1"),
            rec(2, "2024-03-01 23:59:59", "Bakery", "Main Counter", "Bread", "2"),
            rec(3, "2024-03-05 18:00:00", "Bakery", "Main Counter", "Bread", "4"),
        ];
        let daily = AnalyticsBuilder::build(&records).daily;
        let rows: Vec<_> = daily
            .iter()
            .map(|d| (d.date.to_string(), d.amount_wasted))
            .collect();
        assert_eq!(
            rows,
            [("2024-03-01".to_string(), 2.0), ("2024-03-05".to_string(), 5.0)]
        );
    }

    #[test]
    fn non_numeric_amounts_count_as_zero() {
        let records = vec![
            rec(1, "2024-03-01 08:00:00", "Bakery", "Main Counter", "Bread", "a tray"),
            rec(2, "2024-03-01 08:00:00", "Bakery", "Main Counter", "Bread", " 2.5 "),
            rec(3, "2024-03-01 08:00:00", "Bakery", "Main Counter", "Bread", "NaN"),
        ];
        let analytics = AnalyticsBuilder::build(&records);
        assert_eq!(analytics.products[0].incidents, 3);
        assert_eq!(analytics.products[0].total_wastage, 2.5);
        assert_eq!(analytics.daily[0].amount_wasted, 2.5);
    }

    #[test]
    fn build_is_deterministic() {
        let records = vec![
            rec(1, "2024-03-01 08:00:00", "Bakery", "Main Counter", "Bread", "3"),
            rec(2, "2024-03-02 08:00:00", "Bar", "Kiosk 1", "Ice", "3"),
        ];
        assert_eq!(AnalyticsBuilder::build(&records), AnalyticsBuilder::build(&records));
    }

    #[test]
    fn parse_amount_accepts_plain_numbers_only() {
        assert_eq!(parse_amount("3"), Some(3.0));
        assert_eq!(parse_amount(" 0.25 "), Some(0.25));
        assert_eq!(parse_amount("3kg"), None);
        assert_eq!(parse_amount("inf"), None);
        assert_eq!(parse_amount(""), None);
    }
}
