use chrono::{DateTime, SecondsFormat, Utc};
use std::{collections::BTreeMap, process::Stdio};

use crate::{
    config::ExporterConfig,
    error::{Error, Result},
};

pub const BENCHMARK_START_TIME: &str = "BENCHMARK_START_TIME";

/// Exporter
///
/// Starts and stops the telemetry exporter with `docker compose`.
///
#[derive(Debug, Clone)]
pub struct Exporter {
    program: String,
    config: ExporterConfig,
    env: BTreeMap<String, String>,
}

impl Exporter {
    pub fn new(config: ExporterConfig, env: BTreeMap<String, String>) -> Self {
        Self::with_program("docker", config, env)
    }

    pub fn with_program(
        program: impl Into<String>,
        config: ExporterConfig,
        env: BTreeMap<String, String>,
    ) -> Self {
        Self {
            program: program.into(),
            config,
            env,
        }
    }

    /// start
    ///
    /// `docker compose up -d`, with the benchmark epoch exported as
    /// `BENCHMARK_START_TIME`, then waits for the exporter to settle.
    pub async fn start(&self, epoch: DateTime<Utc>) -> Result<()> {
        tracing::info!("starting exporter");

        let status = self
            .compose(&["up", "-d"])
            .env(
                BENCHMARK_START_TIME,
                epoch.to_rfc3339_opts(SecondsFormat::Nanos, true),
            )
            .status()
            .await
            .map_err(|err| Error::Exporter(format!("failed to run {}: {err}", self.program)))?;

        if !status.success() {
            return Err(Error::Exporter(format!(
                "`{} compose up` exited with {status}",
                self.program
            )));
        }

        tokio::time::sleep(self.config.settle).await;
        tracing::info!("exporter started");

        Ok(())
    }

    /// stop
    ///
    pub async fn stop(&self) -> Result<()> {
        tracing::info!("stopping exporter");

        let status = self
            .compose(&["down"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|err| Error::Exporter(format!("failed to run {}: {err}", self.program)))?;

        if !status.success() {
            return Err(Error::Exporter(format!(
                "`{} compose down` exited with {status}",
                self.program
            )));
        }

        Ok(())
    }

    /// `compose` invocation carrying the benchmark environment, so that
    /// `up` and `down` interpolate the compose file the same way
    fn compose(&self, action: &[&str]) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(self.compose_args(action)).envs(&self.env);
        command
    }

    fn compose_args(&self, action: &[&str]) -> Vec<String> {
        let mut args = vec!["compose".to_string()];

        if let Some(file) = &self.config.compose_file {
            args.push("-f".to_string());
            args.push(file.clone());
        }

        args.extend(action.iter().map(|arg| arg.to_string()));
        args
    }
}
