// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Processor configuration.

use std::{sync::Arc, time::Duration};

use datastreams_sketch::{DDSketch, DEFAULT_RELATIVE_ACCURACY, LogarithmicMapping, QuantileSketch};
use datastreams_timesource::TimeSource;
use serde::Deserialize;

use crate::{exporter::RetryPolicy, processor::Processor};

/// Width of an aggregation window unless configured otherwise.
pub const DEFAULT_BUCKET_DURATION: Duration = Duration::from_secs(10);

pub(crate) type ExportEnabled = Arc<dyn Fn() -> bool + Send + Sync>;

/// Serializable processor settings, e.g. loaded from a config file.
///
/// Every field has a default, so a partial document is enough:
///
/// ```
/// use std::time::Duration;
/// use datastreams::ProcessorConfig;
///
/// let config: ProcessorConfig =
///     serde_json::from_str(r#"{"service": "checkout", "bucket_duration_ms": 5000}"#).unwrap();
/// assert_eq!(config.env, "");
/// let processor = config.builder().build();
/// assert_eq!(processor.bucket_duration(), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorConfig {
    /// Deployment environment reported in every payload.
    pub env: String,
    /// Service name reported in every payload.
    pub service: String,
    /// Library version reported in every payload.
    pub tracer_version: String,
    /// Language tag reported in every payload.
    pub lang: String,
    /// Width of an aggregation window.
    pub bucket_duration_ms: u64,
    /// Number of fully elapsed windows kept open for late observations.
    pub retained_windows: u32,
    /// Export tick interval. Defaults to the bucket duration.
    pub flush_interval_ms: Option<u64>,
    /// Name of the export thread.
    pub thread_name: String,
    /// Relative accuracy of the latency and size sketches.
    pub relative_accuracy: f64,
    /// Send attempts per payload, including the first one.
    pub max_attempts: u32,
    /// Base delay between send attempts.
    pub backoff_ms: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            env: String::new(),
            service: String::new(),
            tracer_version: env!("CARGO_PKG_VERSION").to_owned(),
            lang: "rust".to_owned(),
            bucket_duration_ms: DEFAULT_BUCKET_DURATION.as_millis() as u64,
            retained_windows: 0,
            flush_interval_ms: None,
            thread_name: "datastreams-export".to_owned(),
            relative_accuracy: DEFAULT_RELATIVE_ACCURACY,
            max_attempts: retry.max_attempts(),
            backoff_ms: retry.backoff().as_millis() as u64,
        }
    }
}

impl ProcessorConfig {
    /// Defaults, with `env` and `service` taken from `DD_ENV` and `DD_SERVICE` when set.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|name| std::env::var(name).ok())
    }

    fn with_env_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name| var(name).filter(|v: &String| !v.is_empty());
        if let Some(env) = non_empty("DD_ENV") {
            self.env = env;
        }
        if let Some(service) = non_empty("DD_SERVICE") {
            self.service = service;
        }
        self
    }

    /// A builder initialized from these settings.
    ///
    /// # Panics
    ///
    /// If a value is rejected by the matching [`ProcessorBuilder`] setter.
    pub fn builder(&self) -> ProcessorBuilder {
        let mut builder = ProcessorBuilder::new()
            .env(self.env.clone())
            .service(self.service.clone())
            .tracer_version(self.tracer_version.clone())
            .lang(self.lang.clone())
            .bucket_duration(Duration::from_millis(self.bucket_duration_ms))
            .retained_windows(self.retained_windows)
            .thread_name(self.thread_name.clone())
            .relative_accuracy(self.relative_accuracy)
            .retry_policy(RetryPolicy::new(
                self.max_attempts,
                Duration::from_millis(self.backoff_ms),
            ));
        if let Some(interval) = self.flush_interval_ms {
            builder = builder.flush_interval(Duration::from_millis(interval));
        }
        builder
    }
}

/// Builder for [`Processor`].
///
/// Setters panic on values that can't work, such as a zero bucket duration.
#[derive(Clone)]
pub struct ProcessorBuilder {
    pub(crate) env: String,
    pub(crate) service: String,
    pub(crate) tracer_version: String,
    pub(crate) lang: String,
    pub(crate) bucket_duration: Duration,
    pub(crate) retained_windows: u32,
    pub(crate) flush_interval: Option<Duration>,
    pub(crate) thread_name: String,
    pub(crate) mapping: LogarithmicMapping,
    pub(crate) retry: RetryPolicy,
    pub(crate) time_source: TimeSource,
    pub(crate) export_enabled: ExportEnabled,
}

impl Default for ProcessorBuilder {
    fn default() -> Self {
        let config = ProcessorConfig::default();
        Self {
            env: config.env,
            service: config.service,
            tracer_version: config.tracer_version,
            lang: config.lang,
            bucket_duration: DEFAULT_BUCKET_DURATION,
            retained_windows: config.retained_windows,
            flush_interval: None,
            thread_name: config.thread_name,
            mapping: LogarithmicMapping::default(),
            retry: RetryPolicy::default(),
            time_source: TimeSource::System,
            export_enabled: Arc::new(|| true),
        }
    }
}

impl std::fmt::Debug for ProcessorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorBuilder")
            .field("env", &self.env)
            .field("service", &self.service)
            .field("bucket_duration", &self.bucket_duration)
            .field("retained_windows", &self.retained_windows)
            .field("flush_interval", &self.flush_interval)
            .finish_non_exhaustive()
    }
}

impl ProcessorBuilder {
    /// Builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deployment environment reported in every payload.
    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.env = env.into();
        self
    }

    /// Service name reported in every payload.
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Library version reported in every payload. Defaults to this crate's version.
    pub fn tracer_version(mut self, version: impl Into<String>) -> Self {
        self.tracer_version = version.into();
        self
    }

    /// Language tag reported in every payload. Defaults to `rust`.
    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    /// Width of an aggregation window.
    ///
    /// Defaults to 10 seconds. Must be a whole, non-zero number of nanoseconds that fits in an
    /// `i64`.
    pub fn bucket_duration(mut self, duration: Duration) -> Self {
        assert!(
            !duration.is_zero() && i64::try_from(duration.as_nanos()).is_ok(),
            "bucket_duration must be in (0, i64::MAX ns], not {duration:?}"
        );
        self.bucket_duration = duration;
        self
    }

    /// Number of fully elapsed windows kept open before eviction.
    ///
    /// Defaults to 0: a window is evicted by the first flush at or after its end. Raising it
    /// delays every export by that many windows in exchange for accepting later observations.
    pub fn retained_windows(mut self, windows: u32) -> Self {
        self.retained_windows = windows;
        self
    }

    /// How often the export thread flushes. Defaults to the bucket duration.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "flush_interval must not be zero");
        self.flush_interval = Some(interval);
        self
    }

    /// Name of the export thread.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        assert!(!name.is_empty());
        self.thread_name = name;
        self
    }

    /// Relative accuracy of the [`DDSketch`]es built by [`ProcessorBuilder::build`].
    ///
    /// Defaults to 1%.
    pub fn relative_accuracy(mut self, relative_accuracy: f64) -> Self {
        match LogarithmicMapping::new(relative_accuracy) {
            Ok(mapping) => self.mapping = mapping,
            Err(err) => panic!("{err}"),
        }
        self
    }

    /// Retry policy of exporters created by [`Processor::exporter`].
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Clock used to assign offsets to windows and to drive export ticks.
    pub fn time_source(mut self, time_source: TimeSource) -> Self {
        self.time_source = time_source;
        self
    }

    /// Whether the collector currently accepts data streams payloads.
    ///
    /// Polled once per export tick and once at build time. While it returns false, points and
    /// offsets are ignored and closed windows are discarded without sending.
    pub fn export_enabled(mut self, enabled: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.export_enabled = Arc::new(enabled);
        self
    }

    /// Build a processor aggregating into [`DDSketch`]es.
    pub fn build(self) -> Processor<DDSketch> {
        let mapping = self.mapping;
        Processor::from_builder(self, mapping)
    }

    /// Build a processor aggregating into a custom sketch type.
    pub fn build_with_sketch<S: QuantileSketch>(self, config: S::Config) -> Processor<S> {
        Processor::from_builder(self, config)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use assert2::check;
    use rstest::rstest;

    use super::{ProcessorBuilder, ProcessorConfig};

    #[test]
    fn env_overrides() {
        let vars = HashMap::from([("DD_ENV", "staging"), ("DD_SERVICE", "")]);
        let config = ProcessorConfig {
            service: "from-file".into(),
            ..Default::default()
        }
        .with_env_overrides(|name| vars.get(name).map(|v| v.to_string()));
        check!(config.env == "staging");
        check!(config.service == "from-file");
    }

    #[test]
    fn defaults() {
        let config = ProcessorConfig::default();
        check!(config.lang == "rust");
        check!(config.bucket_duration_ms == 10_000);
        check!(config.retained_windows == 0);
        check!(config.max_attempts == 3);
        check!(config.backoff_ms == 100);
    }

    #[test]
    fn unknown_fields_rejected() {
        check!(serde_json::from_str::<ProcessorConfig>(r#"{"bucket_duration": 1}"#).is_err());
    }

    #[test]
    #[should_panic = "bucket_duration"]
    fn zero_bucket_duration() {
        ProcessorBuilder::new().bucket_duration(Duration::ZERO);
    }

    #[test]
    #[should_panic = "flush_interval"]
    fn zero_flush_interval() {
        ProcessorBuilder::new().flush_interval(Duration::ZERO);
    }

    #[rstest]
    #[case(0.0)]
    #[case(1.0)]
    #[case(f64::NAN)]
    #[should_panic = "relative accuracy"]
    fn invalid_relative_accuracy(#[case] accuracy: f64) {
        ProcessorBuilder::new().relative_accuracy(accuracy);
    }
}
