//! Invoice arithmetic and document numbering. All amounts are integer cents.

use chrono::NaiveDate;
use rand::{distributions::Alphanumeric, Rng};

use crate::models::{LineItem, ProcedureLine, SuperbillLine};

pub fn subtotal_cents(items: &[LineItem]) -> i64 {
    items.iter().map(LineItem::total_cents).sum()
}

/// `max(subtotal - adjustment - paid, 0)`
pub fn amount_due_cents(subtotal: i64, insurance_adjustment: i64, amount_paid: i64) -> i64 {
    (subtotal - insurance_adjustment - amount_paid).max(0)
}

pub fn line_items_from_procedures(procedures: &[ProcedureLine]) -> Vec<LineItem> {
    procedures
        .iter()
        .map(|p| LineItem {
            description: format!("{} {}", p.code, p.description),
            quantity: p.units,
            unit_price_cents: p.unit_price_cents,
        })
        .collect()
}

pub fn superbill_lines(procedures: &[ProcedureLine]) -> Vec<SuperbillLine> {
    procedures
        .iter()
        .map(|p| SuperbillLine {
            code: p.code.clone(),
            description: p.description.clone(),
            units: p.units,
            unit_price_cents: p.unit_price_cents,
            line_total_cents: p.line_total_cents(),
        })
        .collect()
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| char::from(c).to_ascii_uppercase())
        .collect()
}

/// `INV-YYYYMMDD-XXXXXX`
pub fn invoice_number(date: NaiveDate) -> String {
    format!("INV-{}-{}", date.format("%Y%m%d"), random_suffix())
}

/// `CLM-YYYYMMDD-XXXXXX`
pub fn claim_number(date: NaiveDate) -> String {
    format!("CLM-{}-{}", date.format("%Y%m%d"), random_suffix())
}

/// Splits `amount_due` across the items in proportion to their totals so the
/// checkout lines sum exactly to what is owed. The last non-empty line takes
/// the rounding remainder.
pub fn checkout_shares(items: &[LineItem], amount_due: i64) -> Vec<(String, i64)> {
    let subtotal = subtotal_cents(items);
    if amount_due <= 0 || subtotal <= 0 {
        return Vec::new();
    }

    let billable: Vec<&LineItem> = items.iter().filter(|i| i.total_cents() > 0).collect();
    let mut shares = Vec::with_capacity(billable.len());
    let mut allocated = 0;

    for (idx, item) in billable.iter().enumerate() {
        let share = if idx + 1 == billable.len() {
            amount_due - allocated
        } else {
            item.total_cents() * amount_due / subtotal
        };
        allocated += share;
        if share > 0 {
            shares.push((item.description.clone(), share));
        }
    }
    shares
}
