//! Final-report boundary. Invoked once after the run has stopped.

use tracing::{info, warn};

use crate::error::ReportError;
use crate::metrics::MetricsSnapshot;

/// Turns the final snapshot into descriptive text, typically through an
/// external text-generation service.
pub trait ReportGenerator {
    fn generate(&self, snapshot: &MetricsSnapshot) -> Result<String, ReportError>;
}

/// Prompt handed to a text-generation backend.
pub fn report_prompt(snapshot: &MetricsSnapshot) -> String {
    format!(
        "Generate a final report on task processing metrics. Tasks produced: {}, \
         tasks processed: {}, tasks still in flight: {}. Explain whether all tasks \
         were processed successfully or if there is a discrepancy, and summarize \
         overall performance.",
        snapshot.produced, snapshot.processed, snapshot.in_flight
    )
}

/// Offline generator; describes the run without calling out anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct SummaryReport;

impl ReportGenerator for SummaryReport {
    fn generate(&self, snapshot: &MetricsSnapshot) -> Result<String, ReportError> {
        let verdict = if snapshot.is_balanced() {
            "All produced tasks were processed; the queue drained cleanly.".to_string()
        } else {
            let missing = snapshot.produced.saturating_sub(snapshot.processed);
            format!(
                "Discrepancy: {missing} task(s) produced but not processed, {} still in flight.",
                snapshot.in_flight
            )
        };
        Ok(format!(
            "Produced {} task(s), processed {}. {verdict}",
            snapshot.produced, snapshot.processed
        ))
    }
}

/// Best effort: a failing generator is logged and yields `None`.
pub fn publish_report(
    generator: &dyn ReportGenerator,
    snapshot: &MetricsSnapshot,
) -> Option<String> {
    match generator.generate(snapshot) {
        Ok(text) => {
            info!(chars = text.len(), "report generated");
            Some(text)
        }
        Err(err) => {
            warn!(error = %err, "report generation failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Offline;

    impl ReportGenerator for Offline {
        fn generate(&self, _snapshot: &MetricsSnapshot) -> Result<String, ReportError> {
            Err(ReportError::Unavailable("connection refused".into()))
        }
    }

    #[test]
    fn prompt_carries_all_counters() {
        let snapshot = MetricsSnapshot {
            produced: 12,
            processed: 11,
            in_flight: 1,
        };
        let prompt = report_prompt(&snapshot);
        assert!(prompt.contains("Tasks produced: 12"));
        assert!(prompt.contains("tasks processed: 11"));
        assert!(prompt.contains("in flight: 1"));
    }

    #[test]
    fn summary_describes_balance() {
        let balanced = MetricsSnapshot {
            produced: 5,
            processed: 5,
            in_flight: 0,
        };
        let text = publish_report(&SummaryReport, &balanced).expect("summary report");
        assert!(text.contains("drained cleanly"));

        let short = MetricsSnapshot {
            produced: 5,
            processed: 3,
            in_flight: 1,
        };
        let text = publish_report(&SummaryReport, &short).expect("summary report");
        assert!(text.contains("2 task(s) produced but not processed"));
    }

    #[test]
    fn failing_generator_is_swallowed() {
        let snapshot = MetricsSnapshot::default();
        assert!(publish_report(&Offline, &snapshot).is_none());
    }
}
