//! Pure aggregation over fetched appointment and invoice rows.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use appointment_cell::{Appointment, AppointmentStatus, AppointmentType};
use billing_cell::{Invoice, InvoiceStatus};
use shared_utils::money::percentage;

use crate::models::{
    AgingBuckets, AppointmentCounts, LocationStats, MonthlyRevenue, NetworkOverview, Period, RevenueBreakdown,
    RevenueTotals,
};

pub fn billed_cents(invoice: &Invoice) -> i64 {
    if invoice.status == InvoiceStatus::Void {
        0
    } else {
        invoice.subtotal_cents
    }
}

pub fn collected_cents(invoice: &Invoice) -> i64 {
    if invoice.status == InvoiceStatus::Void {
        0
    } else {
        invoice.amount_paid_cents + invoice.insurance_adjustment_cents
    }
}

fn is_receivable(invoice: &Invoice) -> bool {
    matches!(invoice.status, InvoiceStatus::Open | InvoiceStatus::Overdue) && invoice.amount_due_cents > 0
}

pub fn revenue_totals(invoices: &[Invoice]) -> RevenueTotals {
    let mut totals = RevenueTotals::default();
    for invoice in invoices {
        totals.invoice_count += 1;
        totals.billed_cents += billed_cents(invoice);
        totals.collected_cents += collected_cents(invoice);
        if invoice.status != InvoiceStatus::Void {
            totals.insurance_adjustments_cents += invoice.insurance_adjustment_cents;
        }
        if is_receivable(invoice) {
            totals.outstanding_cents += invoice.amount_due_cents;
        }
    }
    totals.collection_rate = percentage(totals.collected_cents, totals.billed_cents);
    totals
}

/// Monthly series keyed by `YYYY-MM` of the invoice's creation, oldest first.
pub fn monthly_revenue(invoices: &[Invoice]) -> Vec<MonthlyRevenue> {
    let mut months: BTreeMap<String, MonthlyRevenue> = BTreeMap::new();
    for invoice in invoices {
        let key = invoice.created_at.format("%Y-%m").to_string();
        let entry = months.entry(key.clone()).or_insert_with(|| MonthlyRevenue {
            month: key,
            ..Default::default()
        });
        entry.billed_cents += billed_cents(invoice);
        entry.collected_cents += collected_cents(invoice);
    }
    months.into_values().collect()
}

/// Groups invoices by `key`, largest billed first.
pub fn breakdown_by<F>(invoices: &[Invoice], key: F) -> Vec<RevenueBreakdown>
where
    F: Fn(&Invoice) -> Option<Uuid>,
{
    let mut groups: HashMap<Option<Uuid>, RevenueBreakdown> = HashMap::new();
    for invoice in invoices {
        let id = key(invoice);
        let entry = groups.entry(id).or_insert_with(|| RevenueBreakdown {
            id,
            ..Default::default()
        });
        entry.billed_cents += billed_cents(invoice);
        entry.collected_cents += collected_cents(invoice);
        entry.invoice_count += 1;
    }

    let mut rows: Vec<RevenueBreakdown> = groups.into_values().collect();
    rows.sort_by(|a, b| b.billed_cents.cmp(&a.billed_cents).then_with(|| a.id.cmp(&b.id)));
    rows
}

pub fn status_counts(invoices: &[Invoice]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for invoice in invoices {
        *counts.entry(invoice.status.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Ages unpaid balances from the issue date, falling back to creation for rows
/// issued before `issued_at` was recorded.
pub fn aging_buckets(invoices: &[Invoice], now: DateTime<Utc>) -> AgingBuckets {
    let mut buckets = AgingBuckets::default();
    for invoice in invoices.iter().filter(|i| is_receivable(i)) {
        let issued = invoice.issued_at.unwrap_or(invoice.created_at);
        let age = (now - issued).num_days();
        let due = invoice.amount_due_cents;
        match age {
            i64::MIN..=30 => buckets.days_0_30_cents += due,
            31..=60 => buckets.days_31_60_cents += due,
            61..=90 => buckets.days_61_90_cents += due,
            _ => buckets.days_over_90_cents += due,
        }
    }
    buckets
}

pub fn appointment_counts(appointments: &[Appointment], now: DateTime<Utc>) -> AppointmentCounts {
    let mut counts = AppointmentCounts::default();
    for appointment in appointments {
        counts.total += 1;
        match appointment.status {
            AppointmentStatus::Completed => counts.completed += 1,
            AppointmentStatus::Cancelled => counts.cancelled += 1,
            AppointmentStatus::NoShow => counts.no_shows += 1,
            status if status.is_active() && appointment.starts_at > now => counts.upcoming += 1,
            _ => {},
        }
        if appointment.appointment_type == AppointmentType::Telemedicine {
            counts.telemedicine += 1;
        }
    }

    let total = counts.total as i64;
    counts.completion_rate = percentage(counts.completed as i64, total);
    counts.no_show_rate = percentage(counts.no_shows as i64, total);
    counts.telemedicine_share = percentage(counts.telemedicine as i64, total);
    counts
}

/// Physicians with at least one appointment that was not cancelled.
pub fn active_physicians(appointments: &[Appointment]) -> usize {
    appointments
        .iter()
        .filter(|a| a.status != AppointmentStatus::Cancelled)
        .map(|a| a.physician_id)
        .collect::<HashSet<_>>()
        .len()
}

pub const VIRTUAL_LOCATION: &str = "Virtual";

/// Builds per-location stats. Known locations come first in the given order,
/// then any location ids only seen on rows, then the virtual bucket.
pub fn network_overview(
    period: Period,
    appointments: &[Appointment],
    invoices: &[Invoice],
    locations: &[(Uuid, String)],
    now: DateTime<Utc>,
) -> NetworkOverview {
    let mut keys: Vec<Option<Uuid>> = locations.iter().map(|(id, _)| Some(*id)).collect();
    let seen = appointments
        .iter()
        .map(|a| a.location_id)
        .chain(invoices.iter().map(|i| i.location_id));
    for id in seen {
        if id.is_some() && !keys.contains(&id) {
            keys.push(id);
        }
    }
    if appointments.iter().any(|a| a.location_id.is_none()) || invoices.iter().any(|i| i.location_id.is_none()) {
        keys.push(None);
    }

    let names: HashMap<Uuid, &str> = locations.iter().map(|(id, name)| (*id, name.as_str())).collect();

    let stats = keys
        .into_iter()
        .map(|key| {
            let rows: Vec<Appointment> = appointments.iter().filter(|a| a.location_id == key).cloned().collect();
            let revenue = invoices
                .iter()
                .filter(|i| i.location_id == key)
                .map(collected_cents)
                .sum();
            let location_name = match key {
                Some(id) => names.get(&id).map(|n| n.to_string()).unwrap_or_else(|| id.to_string()),
                None => VIRTUAL_LOCATION.to_string(),
            };
            LocationStats {
                location_id: key,
                location_name,
                appointments: appointment_counts(&rows, now),
                active_physicians: active_physicians(&rows),
                revenue_collected_cents: revenue,
            }
        })
        .collect();

    NetworkOverview {
        period,
        locations: stats,
        totals: appointment_counts(appointments, now),
        active_physicians: active_physicians(appointments),
        revenue_collected_cents: invoices.iter().map(collected_cents).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).single().unwrap()
    }

    fn invoice(status: InvoiceStatus, subtotal: i64, paid: i64, adjustment: i64, created: DateTime<Utc>) -> Invoice {
        let due = if status == InvoiceStatus::Void { 0 } else { (subtotal - paid - adjustment).max(0) };
        Invoice {
            id: Uuid::new_v4(),
            invoice_number: "INV-20260101-ABC123".to_string(),
            patient_id: Uuid::new_v4(),
            encounter_id: None,
            physician_id: None,
            location_id: None,
            status,
            line_items: vec![],
            subtotal_cents: subtotal,
            insurance_adjustment_cents: adjustment,
            amount_paid_cents: paid,
            amount_due_cents: due,
            due_date: (created + Duration::days(30)).date_naive(),
            issued_at: Some(created),
            paid_at: None,
            stripe_checkout_session_id: None,
            created_at: created,
            updated_at: created,
        }
    }

    fn appointment(status: AppointmentStatus, kind: AppointmentType, physician: Uuid, starts: DateTime<Utc>) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            physician_id: physician,
            location_id: None,
            starts_at: starts,
            ends_at: starts + Duration::minutes(30),
            appointment_type: kind,
            status,
            reason: None,
            notes: None,
            cancellation_reason: None,
            checked_in_at: None,
            completed_at: None,
            created_at: starts,
            updated_at: starts,
        }
    }

    #[test]
    fn test_void_invoices_do_not_count_as_billed() {
        let now = at(2026, 3, 1);
        let invoices = vec![
            invoice(InvoiceStatus::Paid, 20_000, 15_000, 5_000, now),
            invoice(InvoiceStatus::Open, 10_000, 0, 0, now),
            invoice(InvoiceStatus::Void, 50_000, 0, 0, now),
        ];

        let totals = revenue_totals(&invoices);
        assert_eq!(totals.billed_cents, 30_000);
        assert_eq!(totals.collected_cents, 20_000);
        assert_eq!(totals.insurance_adjustments_cents, 5_000);
        assert_eq!(totals.outstanding_cents, 10_000);
        assert_eq!(totals.collection_rate, 66.7);
        assert_eq!(totals.invoice_count, 3);
    }

    #[test]
    fn test_empty_period_has_zero_rate() {
        let totals = revenue_totals(&[]);
        assert_eq!(totals.collection_rate, 0.0);
        assert_eq!(totals.billed_cents, 0);
    }

    #[test]
    fn test_monthly_series_is_ordered_by_month() {
        let invoices = vec![
            invoice(InvoiceStatus::Paid, 1_000, 1_000, 0, at(2026, 2, 10)),
            invoice(InvoiceStatus::Open, 2_000, 0, 0, at(2025, 12, 5)),
            invoice(InvoiceStatus::Paid, 3_000, 3_000, 0, at(2026, 2, 20)),
        ];

        let series = monthly_revenue(&invoices);
        let months: Vec<&str> = series.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, vec!["2025-12", "2026-02"]);
        assert_eq!(series[1].billed_cents, 4_000);
        assert_eq!(series[1].collected_cents, 4_000);
    }

    #[test]
    fn test_aging_uses_issue_date() {
        let now = at(2026, 6, 1);
        let invoices = vec![
            invoice(InvoiceStatus::Open, 1_000, 0, 0, now - Duration::days(10)),
            invoice(InvoiceStatus::Overdue, 2_000, 0, 0, now - Duration::days(45)),
            invoice(InvoiceStatus::Overdue, 3_000, 1_000, 0, now - Duration::days(75)),
            invoice(InvoiceStatus::Overdue, 4_000, 0, 0, now - Duration::days(200)),
            invoice(InvoiceStatus::Paid, 9_000, 9_000, 0, now - Duration::days(200)),
            invoice(InvoiceStatus::Draft, 9_000, 0, 0, now - Duration::days(5)),
        ];

        let buckets = aging_buckets(&invoices, now);
        assert_eq!(buckets.days_0_30_cents, 1_000);
        assert_eq!(buckets.days_31_60_cents, 2_000);
        assert_eq!(buckets.days_61_90_cents, 2_000);
        assert_eq!(buckets.days_over_90_cents, 4_000);
    }

    #[test]
    fn test_breakdown_groups_and_sorts() {
        let physician = Uuid::new_v4();
        let now = at(2026, 1, 15);
        let mut a = invoice(InvoiceStatus::Paid, 1_000, 1_000, 0, now);
        a.physician_id = Some(physician);
        let mut b = invoice(InvoiceStatus::Open, 4_000, 0, 0, now);
        b.physician_id = Some(physician);
        let c = invoice(InvoiceStatus::Open, 2_000, 0, 0, now);

        let rows = breakdown_by(&[a, b, c], |i| i.physician_id);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, Some(physician));
        assert_eq!(rows[0].billed_cents, 5_000);
        assert_eq!(rows[0].invoice_count, 2);
        assert_eq!(rows[1].id, None);
    }

    #[test]
    fn test_appointment_rates() {
        let now = at(2026, 4, 1);
        let doc = Uuid::new_v4();
        let other = Uuid::new_v4();
        let rows = vec![
            appointment(AppointmentStatus::Completed, AppointmentType::Telemedicine, doc, now - Duration::days(3)),
            appointment(AppointmentStatus::Completed, AppointmentType::InPerson, doc, now - Duration::days(2)),
            appointment(AppointmentStatus::NoShow, AppointmentType::InPerson, doc, now - Duration::days(1)),
            appointment(AppointmentStatus::Cancelled, AppointmentType::InPerson, other, now + Duration::days(1)),
            appointment(AppointmentStatus::Scheduled, AppointmentType::Telemedicine, doc, now + Duration::days(2)),
        ];

        let counts = appointment_counts(&rows, now);
        assert_eq!(counts.total, 5);
        assert_eq!(counts.completed, 2);
        assert_eq!(counts.no_shows, 1);
        assert_eq!(counts.cancelled, 1);
        assert_eq!(counts.upcoming, 1);
        assert_eq!(counts.completion_rate, 40.0);
        assert_eq!(counts.no_show_rate, 20.0);
        assert_eq!(counts.telemedicine_share, 40.0);
        assert_eq!(active_physicians(&rows), 1);
    }

    #[test]
    fn test_network_lists_known_locations_then_virtual() {
        let now = at(2026, 5, 1);
        let period = Period { from: now - Duration::days(30), to: now };
        let clinic = Uuid::new_v4();
        let doc = Uuid::new_v4();

        let mut office = appointment(AppointmentStatus::Completed, AppointmentType::InPerson, doc, now - Duration::days(2));
        office.location_id = Some(clinic);
        let remote = appointment(AppointmentStatus::Completed, AppointmentType::Telemedicine, doc, now - Duration::days(1));
        let mut paid = invoice(InvoiceStatus::Paid, 12_000, 12_000, 0, now - Duration::days(2));
        paid.location_id = Some(clinic);

        let idle = Uuid::new_v4();
        let locations = vec![(clinic, "Downtown".to_string()), (idle, "Uptown".to_string())];
        let overview = network_overview(period, &[office, remote], &[paid], &locations, now);

        let names: Vec<&str> = overview.locations.iter().map(|l| l.location_name.as_str()).collect();
        assert_eq!(names, vec!["Downtown", "Uptown", VIRTUAL_LOCATION]);
        assert_eq!(overview.locations[0].revenue_collected_cents, 12_000);
        assert_eq!(overview.locations[0].appointments.completion_rate, 100.0);
        assert_eq!(overview.locations[1].appointments.total, 0);
        assert_eq!(overview.locations[1].appointments.completion_rate, 0.0);
        assert_eq!(overview.locations[2].appointments.telemedicine_share, 100.0);
        assert_eq!(overview.totals.total, 2);
        assert_eq!(overview.active_physicians, 1);
        assert_eq!(overview.revenue_collected_cents, 12_000);
    }
}
