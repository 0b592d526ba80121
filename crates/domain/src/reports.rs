//! Dispatch reports for supervisors and managers.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatches::{Dispatch, DispatchStatus, DispatchType};
use crate::errors::Error;
use crate::roles::{authorize, Actor, Operation};

const RECENT_DAYS: i64 = 30;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "period", rename_all = "lowercase")]
pub enum ReportPeriod {
    Day { date: NaiveDate },
    Month { year: i32, month: u32 },
}

impl ReportPeriod {
    pub fn month(year: i32, month: u32) -> Result<Self, Error> {
        if !(1..=12).contains(&month) {
            return Err(Error::Validation {
                message: format!("Invalid month {month}"),
            });
        }
        Ok(ReportPeriod::Month { year, month })
    }

    /// Periods are matched against the UTC creation date.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let date = at.date_naive();
        match self {
            ReportPeriod::Day { date: day } => date == *day,
            ReportPeriod::Month { year, month } => date.year() == *year && date.month() == *month,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct DispatchReport {
    pub period: ReportPeriod,
    pub total: usize,
    pub by_status: BTreeMap<DispatchStatus, usize>,
    pub by_type: BTreeMap<DispatchType, usize>,
    pub resends: usize,
    pub incidents: usize,
    pub unresolved_incidents: usize,
}

pub fn dispatch_report(
    actor: &Actor,
    period: ReportPeriod,
    dispatches: &[Dispatch],
) -> Result<DispatchReport, Error> {
    authorize(actor, &Operation::ViewReports)?;

    let mut report = DispatchReport {
        period,
        total: 0,
        by_status: BTreeMap::new(),
        by_type: BTreeMap::new(),
        resends: 0,
        incidents: 0,
        unresolved_incidents: 0,
    };

    for dispatch in dispatches.iter().filter(|d| period.contains(d.created_at)) {
        report.total += 1;
        *report.by_status.entry(dispatch.status).or_default() += 1;
        *report.by_type.entry(dispatch.dispatch_type).or_default() += 1;
        if dispatch.original_dispatch_id.is_some() {
            report.resends += 1;
        }
        report.incidents += dispatch.incidents.len();
        report.unresolved_incidents += dispatch
            .incidents
            .iter()
            .filter(|incident| !incident.resolved)
            .count();
    }

    Ok(report)
}

/// Activity of one staff member, for user management.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct CreatorSummary {
    pub user_id: String,
    pub total: usize,
    pub last_30_days: usize,
    pub by_status: BTreeMap<DispatchStatus, usize>,
}

pub fn creator_summary(
    actor: &Actor,
    user_id: &str,
    now: DateTime<Utc>,
    dispatches: &[Dispatch],
) -> Result<CreatorSummary, Error> {
    authorize(actor, &Operation::ManageUsers)?;

    let since = now - Duration::days(RECENT_DAYS);
    let mut summary = CreatorSummary {
        user_id: user_id.to_string(),
        total: 0,
        last_30_days: 0,
        by_status: BTreeMap::new(),
    };

    for dispatch in dispatches
        .iter()
        .filter(|d| d.created_by.as_deref() == Some(user_id))
    {
        summary.total += 1;
        if dispatch.created_at >= since {
            summary.last_30_days += 1;
        }
        *summary.by_status.entry(dispatch.status).or_default() += 1;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::dispatches::{Incident, IncidentCategory};
    use crate::errors::ErrorKind;
    use crate::roles::Role;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn dispatch(
        id: &str,
        created_at: DateTime<Utc>,
        status: DispatchStatus,
        creator: &str,
    ) -> Dispatch {
        Dispatch {
            id: id.to_string(),
            created_at,
            updated_at: created_at,
            status,
            created_by: Some(creator.to_string()),
            ..Default::default()
        }
    }

    fn sample() -> Vec<Dispatch> {
        let mut resend = dispatch("D3", at(2024, 6, 10), DispatchStatus::Assigned, "op-2");
        resend.dispatch_type = DispatchType::Resend;
        resend.original_dispatch_id = Some("D2".to_string());
        resend.incidents = vec![
            Incident {
                id: 1,
                category: IncidentCategory::TrafficDelay,
                description: "jam".to_string(),
                reported_at: at(2024, 6, 10),
                resolved: true,
            },
            Incident {
                id: 2,
                category: IncidentCategory::AbsentCustomer,
                description: "nobody home".to_string(),
                reported_at: at(2024, 6, 10),
                resolved: false,
            },
        ];

        vec![
            dispatch("D1", at(2024, 6, 10), DispatchStatus::Finished, "op-1"),
            dispatch("D2", at(2024, 6, 9), DispatchStatus::Failed, "op-1"),
            resend,
            dispatch("D4", at(2024, 5, 31), DispatchStatus::Cancelled, "op-1"),
        ]
    }

    fn actor(role: Option<Role>) -> Actor {
        Actor::new("u".to_string(), role)
    }

    #[test]
    fn daily_report() {
        let period = ReportPeriod::Day {
            date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
        };
        let report = dispatch_report(&actor(Some(Role::Supervisor)), period, &sample()).unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.by_status.get(&DispatchStatus::Finished), Some(&1));
        assert_eq!(report.by_type.get(&DispatchType::Resend), Some(&1));
        assert_eq!(report.resends, 1);
        assert_eq!(report.incidents, 2);
        assert_eq!(report.unresolved_incidents, 1);
    }

    #[test]
    fn monthly_report() {
        let period = ReportPeriod::month(2024, 6).unwrap();
        let report = dispatch_report(&actor(Some(Role::Manager)), period, &sample()).unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.by_status.get(&DispatchStatus::Cancelled), None);

        assert!(ReportPeriod::month(2024, 13).is_err());
    }

    #[test]
    fn operators_cannot_view_reports() {
        let period = ReportPeriod::month(2024, 6).unwrap();

        let err = dispatch_report(&actor(Some(Role::Operator)), period, &sample()).unwrap_err();
        assert!(matches!(err, Error::InsufficientRole { .. }));

        let err = dispatch_report(&actor(None), period, &sample()).unwrap_err();
        assert!(matches!(err, Error::NoRole { .. }));
    }

    #[test]
    fn creator_summary_is_manager_only() {
        let now = at(2024, 6, 20);

        let summary =
            creator_summary(&actor(Some(Role::Manager)), "op-1", now, &sample()).unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.last_30_days, 3);
        assert_eq!(summary.by_status.get(&DispatchStatus::Failed), Some(&1));

        let later = at(2024, 7, 5);
        let summary =
            creator_summary(&actor(Some(Role::Manager)), "op-1", later, &sample()).unwrap();
        assert_eq!(summary.last_30_days, 2);

        let err = creator_summary(&actor(Some(Role::Supervisor)), "op-1", now, &sample())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }
}
