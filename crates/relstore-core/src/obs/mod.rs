//! Observability: in-process counters and the sink abstraction.
//!
//! Engine code never touches counter state directly; every measurement is a
//! `MetricsEvent` handed to a `MetricsSink`.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{CollectionCounters, EventOps, EventReport};
pub use sink::{MetricsCounters, MetricsEvent, MetricsSink, MutationKind};
