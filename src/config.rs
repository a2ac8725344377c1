use duration_str::deserialize_duration;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path, time::Duration};

use crate::{
    consolidate::MergePolicy,
    error::{Error, Result},
    extractor::MetricNames,
};

pub const DEFAULT_EXPORTER_URL: &str = "http://localhost:8000/metrics";

const PLATFORMS: &[&str] = &["knative", "openwhisk", "openfaas"];

const WORKLOADS: &[&str] = &[
    "cpu",
    "memory",
    "io",
    "mixed",
    "cpu-intensive",
    "memory-intensive",
    "network-intensive",
    "machine-learning",
];

const METHODS: &[&str] = &[
    "GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH", "TRACE", "CONNECT",
];

/// hey's own request timeout, in seconds
const HEY_DEFAULT_TIMEOUT: u32 = 20;

const MAX_TIMEOUT: u32 = 3600;

/// BenchmarkConfig
///
/// Loaded from YAML. Missing or zero values fall back to the defaults below.
///
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    pub requests: u32,
    pub concurrency: u32,

    /// hey `-z`, e.g. "30s"; overrides `requests` when set
    ///
    #[serde(alias = "duration")]
    pub time: Option<String>,

    #[serde(alias = "execution")]
    pub executions: u32,

    pub platform: String,
    pub function: String,
    pub url: String,
    pub workload: String,

    pub hey: HeyOptions,
    pub metadata: BTreeMap<String, String>,

    pub scrape: ScrapeConfig,
    pub exporter: ExporterConfig,
    pub metrics: MetricNames,
    pub merge_policy: MergePolicy,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            requests: 200,
            concurrency: 50,
            time: None,
            executions: 1,
            platform: "knative".to_string(),
            function: String::new(),
            url: String::new(),
            workload: "cpu".to_string(),
            hey: HeyOptions::default(),
            metadata: BTreeMap::new(),
            scrape: ScrapeConfig::default(),
            exporter: ExporterConfig::default(),
            metrics: MetricNames::default(),
            merge_policy: MergePolicy::default(),
        }
    }
}

/// HeyOptions
///
/// Options passed through to the load generator. Unset options are left to
/// hey's own defaults.
///
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HeyOptions {
    pub rate_limit: u32,
    pub method: String,

    /// seconds
    pub timeout: u32,

    pub body: String,
    pub body_file: String,
    pub content_type: String,
    pub auth: String,
    pub proxy: String,
    pub host: String,
    pub http2: bool,
    pub disable_compression: bool,
    #[serde(alias = "disable_keep_alive")]
    pub disable_keepalive: bool,
    pub disable_redirects: bool,
    pub cpus: u32,
    pub headers: BTreeMap<String, String>,
}

/// ScrapeConfig
///
/// Where and how long to wait for the exporter's exposition payload.
///
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub url: String,
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_EXPORTER_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// ExporterConfig
///
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub enabled: bool,

    /// compose file, `docker compose` looks up its default when unset
    pub compose_file: Option<String>,

    /// time given to the exporter to come up before the first run
    #[serde(deserialize_with = "deserialize_duration")]
    pub settle: Duration,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            compose_file: None,
            settle: Duration::from_secs(5),
        }
    }
}

impl BenchmarkConfig {
    /// from_path
    ///
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);

        let config: Self = serde_yaml::from_reader(reader)?;
        config.finish()
    }

    /// from_yaml
    ///
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.finish()
    }

    fn finish(mut self) -> Result<Self> {
        self.apply_defaults();
        self.validate()?;
        Ok(self)
    }

    /// Explicit zeros and empty strings count as unset.
    fn apply_defaults(&mut self) {
        let defaults = Self::default();

        if self.requests == 0 {
            self.requests = defaults.requests;
        }
        if self.concurrency == 0 {
            self.concurrency = defaults.concurrency;
        }
        if self.executions == 0 {
            self.executions = defaults.executions;
        }
        if self.platform.is_empty() {
            self.platform = defaults.platform;
        }
        if self.workload.is_empty() {
            self.workload = defaults.workload;
        }
        if self.hey.cpus == 0 {
            self.hey.cpus = 1;
        }
    }

    /// validate
    ///
    pub fn validate(&self) -> Result<()> {
        if self.requests == 0 {
            return Err(Error::config("requests must be greater than 0"));
        }
        if self.concurrency == 0 {
            return Err(Error::config("concurrency must be greater than 0"));
        }
        if self.concurrency > self.requests {
            return Err(Error::config(
                "concurrency cannot be greater than total requests",
            ));
        }
        if self.url.is_empty() {
            return Err(Error::config("url is required"));
        }
        if self.function.is_empty() {
            return Err(Error::config("function is required"));
        }

        if !PLATFORMS.contains(&self.platform.as_str()) {
            return Err(Error::config(format!(
                "unsupported platform: {}. supported platforms: {}",
                self.platform,
                PLATFORMS.join(", ")
            )));
        }
        if !WORKLOADS.contains(&self.workload.as_str()) {
            return Err(Error::config(format!(
                "unsupported workload: {}. supported workloads: {}",
                self.workload,
                WORKLOADS.join(", ")
            )));
        }

        validate_url(&self.url)?;

        if let Some(time) = &self.time {
            if !is_hey_duration(time) {
                return Err(Error::config(format!(
                    "invalid time format: {time}. use a number followed by s, m or h"
                )));
            }
        }

        self.hey.validate()?;

        if self.scrape.timeout.is_zero() {
            return Err(Error::config("scrape timeout must be greater than 0"));
        }
        validate_url(&self.scrape.url)
    }

    /// to_hey_args
    ///
    /// Command line for one hey run, target url last.
    pub fn to_hey_args(&self) -> Vec<String> {
        let hey = &self.hey;
        let mut args = Vec::new();

        let mut push = |flag: &str, value: String| {
            args.push(flag.to_string());
            args.push(value);
        };

        push("-n", self.requests.to_string());
        push("-c", self.concurrency.to_string());

        if let Some(time) = &self.time {
            push("-z", time.clone());
        }
        if hey.rate_limit > 0 {
            push("-q", hey.rate_limit.to_string());
        }

        let method = hey.method.to_uppercase();
        if !method.is_empty() && method != "GET" {
            push("-m", method);
        }
        if hey.timeout > 0 && hey.timeout != HEY_DEFAULT_TIMEOUT {
            push("-t", hey.timeout.to_string());
        }
        for (key, value) in &hey.headers {
            push("-H", format!("{key}: {value}"));
        }

        if !hey.body.is_empty() {
            push("-d", hey.body.clone());
        } else if !hey.body_file.is_empty() {
            push("-D", hey.body_file.clone());
        }
        if !hey.content_type.is_empty() {
            push("-T", hey.content_type.clone());
        }
        if !hey.auth.is_empty() {
            push("-a", hey.auth.clone());
        }
        if !hey.proxy.is_empty() {
            push("-x", hey.proxy.clone());
        }
        if !hey.host.is_empty() {
            push("-host", hey.host.clone());
        }
        if hey.cpus > 1 {
            push("-cpus", hey.cpus.to_string());
        }

        let flags = [
            (hey.http2, "-h2"),
            (hey.disable_compression, "-disable-compression"),
            (hey.disable_keepalive, "-disable-keepalive"),
            (hey.disable_redirects, "-disable-redirects"),
        ];
        args.extend(
            flags
                .into_iter()
                .filter(|(enabled, _)| *enabled)
                .map(|(_, flag)| flag.to_string()),
        );

        args.push(self.url.clone());
        args
    }

    /// env_vars
    ///
    /// Benchmark description handed to the exporter's environment.
    pub fn env_vars(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();

        env.insert("BENCH_REQUESTS".into(), self.requests.to_string());
        env.insert("BENCH_CONCURRENCY".into(), self.concurrency.to_string());
        env.insert("BENCH_PLATFORM".into(), self.platform.clone());
        env.insert("BENCH_FUNCTION".into(), self.function.clone());
        env.insert("BENCH_URL".into(), self.url.clone());
        env.insert("BENCH_WORKLOAD".into(), self.workload.clone());

        env.insert("HEY_METHOD".into(), self.hey.effective_method());
        env.insert("HEY_TIMEOUT".into(), self.hey.effective_timeout().to_string());
        env.insert("HEY_RATE_LIMIT".into(), self.hey.rate_limit.to_string());

        env
    }

    /// summary
    ///
    /// What was benchmarked and how, for the report header.
    pub fn summary(&self) -> BenchmarkSummary {
        BenchmarkSummary {
            platform: self.platform.clone(),
            function: self.function.clone(),
            url: self.url.clone(),
            workload: self.workload.clone(),
            requests: self.requests,
            concurrency: self.concurrency,
            executions: self.executions,
            hey_args: self.to_hey_args(),
            metadata: self.metadata.clone(),
        }
    }
}

/// BenchmarkSummary
///
/// Description of a benchmark carried next to its results, including the
/// free-form `metadata` from the config.
///
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BenchmarkSummary {
    pub platform: String,
    pub function: String,
    pub url: String,
    pub workload: String,
    pub requests: u32,
    pub concurrency: u32,
    pub executions: u32,
    pub hey_args: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

impl HeyOptions {
    /// upper-cased method, `GET` when unset
    fn effective_method(&self) -> String {
        match self.method.to_uppercase() {
            method if method.is_empty() => "GET".to_string(),
            method => method,
        }
    }

    /// request timeout in seconds as hey applies it
    fn effective_timeout(&self) -> u32 {
        if self.timeout == 0 {
            HEY_DEFAULT_TIMEOUT
        } else {
            self.timeout
        }
    }

    fn validate(&self) -> Result<()> {
        let method = self.method.to_uppercase();
        if !method.is_empty() && !METHODS.contains(&method.as_str()) {
            return Err(Error::config(format!(
                "invalid HTTP method: {}. supported methods: {}",
                self.method,
                METHODS.join(", ")
            )));
        }

        if self.timeout > MAX_TIMEOUT {
            return Err(Error::config(format!(
                "timeout cannot exceed {MAX_TIMEOUT} seconds"
            )));
        }

        if !self.body.is_empty() && !self.body_file.is_empty() {
            return Err(Error::config("cannot specify both body and body_file"));
        }

        for (key, value) in &self.headers {
            if key.trim().is_empty() {
                return Err(Error::config("header key cannot be empty"));
            }
            if value.trim().is_empty() {
                return Err(Error::config(format!(
                    "header value for {key} cannot be empty"
                )));
            }
        }

        Ok(())
    }
}

fn validate_url(url: &str) -> Result<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(Error::config(format!(
            "url must start with http:// or https://: {url}"
        )));
    }

    reqwest::Url::parse(url)
        .map(|_| ())
        .map_err(|err| Error::config(format!("invalid url {url}: {err}")))
}

/// `<digits><s|m|h>`
fn is_hey_duration(value: &str) -> bool {
    match value.char_indices().last() {
        Some((unit_at, unit)) => {
            let digits = &value[..unit_at];
            matches!(unit, 's' | 'm' | 'h')
                && !digits.is_empty()
                && digits.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}
