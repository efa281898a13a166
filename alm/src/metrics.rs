//! OpenTelemetry instruments for the polling loops. Everything is reported to the global meter provider, so nothing is
//! exported unless the binary installs one.

use std::time::Duration;

use opentelemetry::{KeyValue, global};
use opentelemetry_semantic_conventions::{
    attribute::{ERROR_TYPE, MESSAGING_DESTINATION_NAME, MESSAGING_OPERATION_NAME, MESSAGING_SYSTEM},
    metric::MESSAGING_PROCESS_DURATION,
};

use crate::{message::Direction, status::Status};

pub const METER: &str = "alm";
/// Seconds from the start of tracking until a message reached a final status.
pub const FINAL_STATUS_DURATION: &str = "alm.message.final_status.duration";
/// What a poll found: `not_ready`, `pending` or `confirmed`.
pub const OUTCOME: &str = "alm.outcome";
pub const STATUS: &str = "alm.status";

/// A poll of one facet. `operation` names the facet.
pub struct Poll {
    pub operation: &'static str,
    pub direction: Direction,
    pub outcome: &'static str,
    /// Set when at least one query of the poll failed.
    pub error: Option<&'static str>,
}

impl Poll {
    fn attributes(&self) -> Vec<KeyValue> {
        let mut attributes = vec![
            KeyValue::new(MESSAGING_OPERATION_NAME, self.operation),
            KeyValue::new(MESSAGING_SYSTEM, "amb"),
            KeyValue::new(MESSAGING_DESTINATION_NAME, self.direction.name()),
            KeyValue::new(OUTCOME, self.outcome),
        ];
        if let Some(error) = self.error {
            attributes.push(KeyValue::new(ERROR_TYPE, error));
        }
        attributes
    }

    pub fn record(&self, elapsed: Duration) {
        global::meter(METER)
            .f64_histogram(MESSAGING_PROCESS_DURATION)
            .with_unit("s")
            .with_boundaries(vec![
                0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
            ])
            .build()
            .record(elapsed.as_secs_f64(), &self.attributes());
    }
}

pub fn record_final_status(direction: Direction, status: Status, elapsed: Duration) {
    global::meter(METER)
        .f64_histogram(FINAL_STATUS_DURATION)
        .with_unit("s")
        .with_boundaries(vec![
            5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0, 7200.0, 21600.0, 86400.0,
        ])
        .build()
        .record(
            elapsed.as_secs_f64(),
            &[
                KeyValue::new(MESSAGING_DESTINATION_NAME, direction.name()),
                KeyValue::new(STATUS, status.name()),
            ],
        );
}
