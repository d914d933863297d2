use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use rentflow::workflows::tenancy::{InMemoryLifecycle, SweepSummary};
use serde::Deserialize;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Runs every sweep on a fixed cadence against the clock's current date. The first tick
/// fires immediately so a restarted service catches up before taking traffic.
pub(crate) fn spawn_sweeper(lifecycle: InMemoryLifecycle, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let as_of = lifecycle.clock.today();
            let summary = lifecycle.run_sweeps(as_of);
            log_sweep(&summary);
        }
    })
}

pub(crate) fn log_sweep(summary: &SweepSummary) {
    let failures = summary.failure_count();
    if failures > 0 {
        warn!(
            as_of = %summary.payments.as_of,
            failures,
            "scheduled sweep finished with failures"
        );
    }
    info!(
        as_of = %summary.payments.as_of,
        applications_expired = summary.applications.transitioned.len(),
        schedules_backfilled = summary.schedules.transitioned.len(),
        leases_expired = summary.leases.transitioned.len(),
        entries_overdue = summary.payments.transitioned.len(),
        late_fees = summary.payments.late_fees.len(),
        "scheduled sweep finished"
    );
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn deserialize_optional_date<'de, D>(
    deserializer: D,
) -> Result<Option<NaiveDate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    opt.map(|value| parse_date(&value).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentflow::config::LifecycleConfig;
    use rentflow::workflows::tenancy::applications::{
        ApplicationDraft, ApplicationStatus, EmergencyContact,
    };
    use rentflow::workflows::tenancy::{
        Actor, ActorId, ApplicationId, FixedClock, Money, PropertyId,
    };

    #[test]
    fn parse_date_reports_the_bad_input() {
        assert_eq!(
            parse_date(" 2024-02-29 "),
            Ok(NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date"))
        );
        let err = parse_date("29/02/2024").expect_err("wrong format");
        assert!(err.contains("29/02/2024"));
    }

    #[tokio::test]
    async fn sweeper_expires_stale_applications_on_its_first_tick() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 10).expect("valid date");
        let clock = Arc::new(FixedClock::on(today));
        let lifecycle = InMemoryLifecycle::new(clock.clone(), &LifecycleConfig::default());
        lifecycle
            .catalog
            .register(PropertyId::new("prop-1"), ActorId::new("landlord-1"));
        let tenant = Actor::tenant("tenant-1");
        let draft = lifecycle
            .applications
            .create_draft(
                &tenant,
                ApplicationDraft {
                    property_id: PropertyId::new("prop-1"),
                    desired_move_in: NaiveDate::from_ymd_opt(2024, 1, 20).expect("valid date"),
                    lease_term_months: 12,
                    number_of_occupants: 1,
                    monthly_income: Money::from_units(3_000),
                    emergency_contact: Some(EmergencyContact {
                        name: "Ruth Ade".to_string(),
                        phone: "+1-555-0108".to_string(),
                        relationship: None,
                    }),
                    stage: None,
                },
            )
            .expect("draft");
        let id: ApplicationId = draft.record.id.clone();
        lifecycle
            .applications
            .submit(&tenant, &id)
            .expect("submitted");
        clock.set_date(NaiveDate::from_ymd_opt(2024, 1, 25).expect("valid date"));

        let handle = spawn_sweeper(lifecycle.clone(), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        let expired = lifecycle
            .applications
            .get(&tenant, &id)
            .expect("readable");
        assert_eq!(expired.record.status, ApplicationStatus::Expired);
    }
}
