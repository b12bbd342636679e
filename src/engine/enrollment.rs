use chrono::NaiveDate;

use crate::models::member::Member;

/// Decides whether a member belongs on a roster for a given date.
pub trait EnrollmentFilter {
    fn is_enrolled(&self, member: &Member, reference: NaiveDate) -> bool;
}

impl<F> EnrollmentFilter for F
where
    F: Fn(&Member, NaiveDate) -> bool,
{
    fn is_enrolled(&self, member: &Member, reference: NaiveDate) -> bool {
        self(member, reference)
    }
}

/// Default rule: enrolled iff one of the member's periods covers the date.
/// Members without any recorded history are treated as enrolled.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnrollmentHistory;

impl EnrollmentFilter for EnrollmentHistory {
    fn is_enrolled(&self, member: &Member, reference: NaiveDate) -> bool {
        member.enrollment.is_empty() || member.enrollment.iter().any(|p| p.covers(reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::member::EnrollmentPeriod;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn member(periods: Vec<EnrollmentPeriod>) -> Member {
        Member {
            id: 1,
            name: "A".to_string(),
            sort_key: "a".to_string(),
            baptized: true,
            age_category: "adult".to_string(),
            unit_id: Some(1),
            locality_id: Some(1),
            enrollment: periods,
        }
    }

    #[test]
    fn test_open_period_covers_later_dates() {
        let m = member(vec![EnrollmentPeriod { starts_on: date("2025-01-01"), ends_on: None }]);
        assert!(EnrollmentHistory.is_enrolled(&m, date("2026-10-18")));
        assert!(!EnrollmentHistory.is_enrolled(&m, date("2024-12-31")));
    }

    #[test]
    fn test_closed_period_is_inclusive() {
        let m = member(vec![EnrollmentPeriod {
            starts_on: date("2025-01-01"),
            ends_on: Some(date("2025-06-30")),
        }]);
        assert!(EnrollmentHistory.is_enrolled(&m, date("2025-06-30")));
        assert!(!EnrollmentHistory.is_enrolled(&m, date("2025-07-01")));
    }

    #[test]
    fn test_gap_between_periods() {
        let m = member(vec![
            EnrollmentPeriod { starts_on: date("2024-01-01"), ends_on: Some(date("2024-03-31")) },
            EnrollmentPeriod { starts_on: date("2024-09-01"), ends_on: None },
        ]);
        assert!(!EnrollmentHistory.is_enrolled(&m, date("2024-06-01")));
        assert!(EnrollmentHistory.is_enrolled(&m, date("2024-10-01")));
    }

    #[test]
    fn test_no_history_counts_as_enrolled() {
        assert!(EnrollmentHistory.is_enrolled(&member(Vec::new()), date("2026-01-01")));
    }

    #[test]
    fn test_closure_filter() {
        let never = |_: &Member, _: NaiveDate| false;
        assert!(!never.is_enrolled(&member(Vec::new()), date("2026-01-01")));
    }
}
