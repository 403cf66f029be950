use chrono::NaiveDate;
use serde::Serialize;

use crate::grade::round_2;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeCharges {
    pub tuition: f64,
    pub other_charges: f64,
    pub discount: f64,
}

impl FeeCharges {
    /// Never negative, even when the discount exceeds the charges.
    pub fn payable(&self) -> f64 {
        round_2((self.tuition + self.other_charges - self.discount).max(0.0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Voucher {
    pub payable: f64,
    pub days_overdue: i64,
    pub fine: f64,
    pub total: f64,
    pub paid: bool,
}

pub fn days_overdue(due: NaiveDate, as_of: NaiveDate) -> i64 {
    (as_of - due).num_days().max(0)
}

/// The fine is counted up to `paid_on` when set, otherwise up to `today`.
pub fn compute_voucher(
    charges: FeeCharges,
    due: NaiveDate,
    paid_on: Option<NaiveDate>,
    today: NaiveDate,
    late_fine_per_day: f64,
) -> Voucher {
    let payable = charges.payable();
    let days = days_overdue(due, paid_on.unwrap_or(today));
    let fine = round_2(late_fine_per_day.max(0.0) * days as f64);
    Voucher {
        payable,
        days_overdue: days,
        fine,
        total: round_2(payable + fine),
        paid: paid_on.is_some(),
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

pub fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSummary {
    pub voucher_count: usize,
    pub billed: f64,
    pub paid: f64,
    pub outstanding: f64,
}

pub fn summarize<'a, I>(vouchers: I) -> FeeSummary
where
    I: IntoIterator<Item = &'a Voucher>,
{
    let mut s = FeeSummary::default();
    for v in vouchers {
        s.voucher_count += 1;
        s.billed += v.total;
        if v.paid {
            s.paid += v.total;
        } else {
            s.outstanding += v.total;
        }
    }
    s.billed = round_2(s.billed);
    s.paid = round_2(s.paid);
    s.outstanding = round_2(s.outstanding);
    s
}
