use chrono::NaiveDate;
use serde::Serialize;

/// Outcome of one batch sweep. Failures are scoped to the record that raised them; the
/// sweep moves on to the next record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub as_of: NaiveDate,
    pub examined: usize,
    pub transitioned: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub late_fees: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            examined: 0,
            transitioned: Vec::new(),
            late_fees: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// A sweep that could not list its candidates at all.
    pub fn failed(as_of: NaiveDate, error: impl ToString) -> Self {
        let mut report = Self::new(as_of);
        report.record_failure("*", error);
        report
    }

    pub fn record_failure(&mut self, id: impl Into<String>, error: impl ToString) {
        self.failures.push(SweepFailure {
            id: id.into(),
            error: error.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub id: String,
    pub error: String,
}

/// Every sweep run in dependency order for a single `as_of` date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepSummary {
    pub applications: SweepReport,
    pub schedules: SweepReport,
    pub leases: SweepReport,
    pub payments: SweepReport,
}

impl SweepSummary {
    pub fn failure_count(&self) -> usize {
        [&self.applications, &self.schedules, &self.leases, &self.payments]
            .iter()
            .map(|report| report.failures.len())
            .sum()
    }
}
