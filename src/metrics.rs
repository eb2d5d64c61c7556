//! Admission metrics
//!
//! Instruments are created lazily from the global meter, so they are no-ops
//! until [`crate::telemetry::init_telemetry`] installs an OTLP provider.

use std::time::Instant;

use once_cell::sync::Lazy;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};

static METER: Lazy<Meter> = Lazy::new(|| global::meter("podnet-admission"));

/// Counter of admission reviews handled
///
/// Labels:
/// - `outcome`: skipped, no_profile, mutated, error
/// - `error_kind`: set when outcome is error (see [`crate::Error::kind`])
pub static ADMISSIONS_TOTAL: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("podnet_admissions_total")
        .with_description("Total number of pod admission reviews handled")
        .with_unit("{admissions}")
        .build()
});

/// Histogram of admission handling time
///
/// Labels:
/// - `outcome`: skipped, no_profile, mutated, error
pub static ADMISSION_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("podnet_admission_duration_seconds")
        .with_description("Duration of pod admission handling in seconds")
        .with_unit("s")
        .build()
});

/// Times one admission and records it on completion
pub struct AdmissionTimer {
    start: Instant,
}

impl AdmissionTimer {
    /// Start timing an admission
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Record a successful admission with the given outcome label
    pub fn complete(self, outcome: &'static str) {
        let labels = [KeyValue::new("outcome", outcome)];
        ADMISSION_DURATION.record(self.start.elapsed().as_secs_f64(), &labels);
        ADMISSIONS_TOTAL.add(1, &labels);
    }

    /// Record a failed admission
    pub fn error(self, error_kind: &'static str) {
        ADMISSION_DURATION.record(
            self.start.elapsed().as_secs_f64(),
            &[KeyValue::new("outcome", "error")],
        );
        ADMISSIONS_TOTAL.add(
            1,
            &[
                KeyValue::new("outcome", "error"),
                KeyValue::new("error_kind", error_kind),
            ],
        );
    }
}
