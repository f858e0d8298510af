//! Prometheus metric registry for status snapshots.
//!
//! Descriptors are created once at startup and shared by reference with the
//! HTTP handlers. Each render publishes one snapshot:
//!
//! - `fafgearclient_fafgeard_up`: 1 if the exchange succeeded, else 0
//! - `fafgearclient_server_<field>`: one gauge per payload field

use std::sync::{Mutex, PoisonError};

use prometheus::{IntGauge, Opts, Registry, TextEncoder};
use thiserror::Error;

use crate::collector::StatusSnapshot;
use crate::protocol::StatusField;

/// Metric namespace shared by every gauge.
pub const NAMESPACE: &str = "fafgearclient";

/// Subsystem of the per-field gauges.
const SERVER_SUBSYSTEM: &str = "server";

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Register(#[source] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    Encode(#[source] prometheus::Error),
}

struct Gauges {
    up: IntGauge,
    /// One gauge per field, in payload order.
    fields: Vec<IntGauge>,
}

/// Registry holding the exporter's gauges.
pub struct MetricsRegistry {
    registry: Registry,
    gauges: Mutex<Gauges>,
}

impl MetricsRegistry {
    /// Create and register all gauges.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let up = register_gauge(
            &registry,
            Opts::new("fafgeard_up", "Was the last status request successful.")
                .namespace(NAMESPACE),
        )?;

        let fields = StatusField::ALL
            .iter()
            .map(|field| {
                register_gauge(
                    &registry,
                    Opts::new(field.name(), field.help())
                        .namespace(NAMESPACE)
                        .subsystem(SERVER_SUBSYSTEM),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            registry,
            gauges: Mutex::new(Gauges { up, fields }),
        })
    }

    /// Publish `snapshot` and encode the registry in text format.
    ///
    /// Updating and encoding happen under one lock so concurrent scrapes
    /// never mix values from different snapshots.
    pub fn render(&self, snapshot: &StatusSnapshot) -> Result<String, MetricsError> {
        let gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);

        gauges.up.set(i64::from(snapshot.reachable()));
        for (gauge, (_, value)) in gauges.fields.iter().zip(snapshot.iter()) {
            gauge.set(value);
        }

        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .map_err(MetricsError::Encode)
    }
}

fn register_gauge(registry: &Registry, opts: Opts) -> Result<IntGauge, MetricsError> {
    let gauge = IntGauge::with_opts(opts).map_err(MetricsError::Register)?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(MetricsError::Register)?;
    Ok(gauge)
}
