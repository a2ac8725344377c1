use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

use crate::{
    error::{Error, Result},
    load_result::LoadResultParser,
    types::LoadRunResult,
};

pub const HEY: &str = "hey";

/// RunRecord
///
/// Everything captured from one load generator execution. Failed runs are
/// kept as well so that they can be inspected after the benchmark.
///
#[derive(Debug)]
pub struct RunRecord {
    pub index: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stdout: String,
    pub stderr: String,
    pub outcome: Result<LoadRunResult>,
}

impl RunRecord {
    pub fn elapsed(&self) -> chrono::TimeDelta {
        self.finished_at - self.started_at
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// LoadRunner
///
/// Runs the load generator. Commands are served one at a time so runs never
/// overlap.
///
pub struct LoadRunner {
    program: String,
    args: Vec<String>,
    parser: LoadResultParser,

    /// interface to access this component
    ///
    command_receiver: mpsc::Receiver<Command>,
}

impl LoadRunner {
    /// new
    ///
    pub fn new(args: Vec<String>) -> (Self, Controller) {
        Self::with_program(HEY, args)
    }

    /// with_program
    ///
    pub fn with_program(program: impl Into<String>, args: Vec<String>) -> (Self, Controller) {
        let (command_sender, command_receiver) = mpsc::channel(8);

        let runner = Self {
            program: program.into(),
            args,
            parser: LoadResultParser,
            command_receiver,
        };

        let controller = Controller { command_sender };

        (runner, controller)
    }

    /// run
    ///
    pub async fn run(&mut self) {
        tracing::info!("running");

        while let Some(command) = self.command_receiver.recv().await {
            match command {
                Command::Execute(request) => {
                    let record = self.execute(request.index).await;

                    if request
                        .response_sender
                        .send(execute::Response { record })
                        .is_err()
                    {
                        tracing::debug!("execute requester went away");
                    }
                }
            }
        }

        tracing::info!("shutdown");
    }

    async fn execute(&self, index: u32) -> RunRecord {
        tracing::debug!("run {index}: {} {}", self.program, self.args.join(" "));

        let started_at = Utc::now();
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await;
        let finished_at = Utc::now();

        let (stdout, stderr, outcome) = match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

                let outcome = if output.status.success() {
                    self.parser.parse(&stdout)
                } else {
                    Err(Error::LoadGenerator {
                        status: output.status.to_string(),
                        stderr: stderr.clone(),
                    })
                };

                (stdout, stderr, outcome)
            }
            Err(err) => {
                let outcome = Err(Error::LoadGenerator {
                    status: format!("failed to spawn {}", self.program),
                    stderr: err.to_string(),
                });

                (String::new(), String::new(), outcome)
            }
        };

        RunRecord {
            index,
            started_at,
            finished_at,
            stdout,
            stderr,
            outcome,
        }
    }
}

/// Api
///
///
///
///
#[derive(Clone)]
pub struct Controller {
    command_sender: mpsc::Sender<Command>,
}

impl Controller {
    /// execute
    ///
    pub async fn execute(&self, index: u32) -> Result<execute::Handle> {
        let (response_sender, response_receiver) = oneshot::channel();

        let request = Command::Execute(execute::Request {
            response_sender,
            index,
        });

        self.command_sender
            .send(request)
            .await
            .map_err(|_| Error::Shutdown)?;

        Ok(execute::Handle { response_receiver })
    }

    /// execute_all
    ///
    /// Runs `count` executions back to back. A failed run is logged and the
    /// remaining runs still happen.
    pub async fn execute_all(&self, count: u32) -> Result<Vec<RunRecord>> {
        let mut records = Vec::with_capacity(count as usize);

        for index in 1..=count {
            tracing::info!("run {index}/{count} in progress");

            let record = self.execute(index).await?.recv().await?;

            match &record.outcome {
                Ok(_) => tracing::info!("run {index}/{count} finished in {}", record.elapsed()),
                Err(err) => tracing::warn!("run {index}/{count} failed: {err}"),
            }

            records.push(record);
        }

        Ok(records)
    }
}

pub enum Command {
    Execute(execute::Request),
}

pub mod execute {
    use super::*;

    pub struct Request {
        pub response_sender: oneshot::Sender<Response>,
        pub index: u32,
    }

    #[derive(Debug)]
    pub struct Response {
        pub record: RunRecord,
    }

    pub struct Handle {
        pub response_receiver: oneshot::Receiver<Response>,
    }

    impl Handle {
        pub async fn recv(self) -> Result<RunRecord> {
            self.response_receiver
                .await
                .map(|response| response.record)
                .map_err(|_| Error::Shutdown)
        }
    }
}
