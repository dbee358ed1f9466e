use crate::model::{Enrollee, EntityId, Payment};
use crate::validity::{is_payment_valid, last_payment_index};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightEvolution {
    pub enrollee_id: EntityId,
    pub name: String,
    pub initial_weight: f64,
    pub current_weight: f64,
    pub weight_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStats {
    pub year: i32,
    pub month: u32,
    pub income: f64,
    pub payment_count: usize,
    pub active_enrollees: usize,
    pub overdue_enrollees: usize,
    pub with_pathology: usize,
    pub weight_evolution: Vec<WeightEvolution>,
}

pub fn monthly_income(payments: &[Payment], year: i32, month: u32) -> (f64, usize) {
    payments
        .iter()
        .filter(|p| p.payment_date.year() == year && p.payment_date.month() == month)
        .fold((0.0, 0), |(sum, n), p| (sum + p.amount, n + 1))
}

/// Initial weight against the most recent weight recorded with a payment.
/// Enrollees with neither value are left out.
pub fn weight_evolution(enrollees: &[Enrollee], payments: &[Payment]) -> Vec<WeightEvolution> {
    let mut out: Vec<WeightEvolution> = enrollees
        .iter()
        .filter_map(|e| {
            let initial = e.initial_weight.unwrap_or(0.0);
            let current = payments
                .iter()
                .filter(|p| p.enrollee_id == e.id)
                .filter_map(|p| p.current_weight.map(|w| (p.payment_date, w)))
                .max_by(|a, b| a.0.cmp(&b.0))
                .map(|(_, w)| w)
                .unwrap_or(initial);
            if initial == 0.0 && current == 0.0 {
                return None;
            }
            Some(WeightEvolution {
                enrollee_id: e.id.clone(),
                name: e.full_name(),
                initial_weight: initial,
                current_weight: current,
                weight_change: current - initial,
            })
        })
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.enrollee_id.cmp(&b.enrollee_id)));
    out
}

pub fn monthly_stats(
    enrollees: &[Enrollee],
    payments: &[Payment],
    year: i32,
    month: u32,
    today: NaiveDate,
) -> MonthlyStats {
    let (income, payment_count) = monthly_income(payments, year, month);
    let last = last_payment_index(payments);
    let active_enrollees = enrollees
        .iter()
        .filter(|e| is_payment_valid(last.get(&e.id).copied(), today))
        .count();
    MonthlyStats {
        year,
        month,
        income,
        payment_count,
        active_enrollees,
        overdue_enrollees: enrollees.len() - active_enrollees,
        with_pathology: enrollees.iter().filter(|e| e.has_pathology()).count(),
        weight_evolution: weight_evolution(enrollees, payments),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    fn payment(id: &str, who: &str, amount: f64, date: NaiveDate, weight: Option<f64>) -> Payment {
        Payment {
            id: id.into(),
            enrollee_id: who.into(),
            amount,
            payment_date: date,
            current_weight: weight,
            version: None,
        }
    }

    fn enrollee(id: &str, weight: Option<f64>, pathology: Option<&str>) -> Enrollee {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": id,
            "last_name": "Test",
            "initial_weight": weight,
            "pathology": pathology,
        }))
        .expect("enrollee")
    }

    #[test]
    fn income_only_counts_the_target_month() {
        let payments = vec![
            payment("1", "a", 100.0, d(2024, 2, 1), None),
            payment("2", "b", 50.5, d(2024, 2, 29), None),
            payment("3", "a", 999.0, d(2024, 3, 1), None),
            payment("4", "a", 999.0, d(2023, 2, 10), None),
        ];
        assert_eq!(monthly_income(&payments, 2024, 2), (150.5, 2));
    }

    #[test]
    fn weight_uses_latest_recorded_measurement() {
        let roster = vec![enrollee("a", Some(80.0), None), enrollee("b", None, None)];
        let payments = vec![
            payment("1", "a", 1.0, d(2024, 1, 1), Some(78.0)),
            payment("2", "a", 1.0, d(2024, 3, 1), Some(75.5)),
            payment("3", "a", 1.0, d(2024, 4, 1), None),
        ];
        let evo = weight_evolution(&roster, &payments);
        assert_eq!(evo.len(), 1);
        assert_eq!(evo[0].current_weight, 75.5);
        assert_eq!(evo[0].weight_change, -4.5);
    }

    #[test]
    fn monthly_stats_splits_active_and_overdue() {
        let roster = vec![
            enrollee("a", None, Some("asma")),
            enrollee("b", None, Some("  ")),
            enrollee("c", None, None),
        ];
        let payments = vec![
            payment("1", "a", 100.0, d(2024, 2, 10), None),
            payment("2", "b", 100.0, d(2023, 12, 1), None),
        ];
        let s = monthly_stats(&roster, &payments, 2024, 2, d(2024, 3, 1));
        assert_eq!(s.active_enrollees, 1);
        assert_eq!(s.overdue_enrollees, 2);
        assert_eq!(s.with_pathology, 1);
        assert_eq!(s.payment_count, 1);
    }
}
