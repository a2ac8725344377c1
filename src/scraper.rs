use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};

use crate::{
    config::ScrapeConfig,
    error::{Error, Result},
};

/// Scraper
///
/// Fetches the exporter's exposition payload. Every request is bounded by
/// the timeout in [`ScrapeConfig`]; a timeout, a transport failure and a
/// non-success status are reported as different errors and never as an
/// empty body.
///
pub struct Scraper {
    client: reqwest::Client,
    config: ScrapeConfig,

    /// interface to access this component
    ///
    command_receiver: mpsc::Receiver<Command>,

    /// number of scrapes in flight
    ///
    max_concurrency: usize,
    semaphore: Arc<Semaphore>,
}

impl Scraper {
    /// new
    ///
    pub fn new(config: ScrapeConfig) -> Result<(Self, Controller)> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|source| Error::ScrapeTransport {
                url: config.url.clone(),
                source,
            })?;

        let (command_sender, command_receiver) = mpsc::channel(16);

        let scraper = Self {
            client,
            config,
            command_receiver,
            max_concurrency: 4,
            semaphore: Arc::new(Semaphore::new(4)),
        };

        let controller = Controller { command_sender };

        Ok((scraper, controller))
    }

    /// run
    ///
    pub async fn run(&mut self) {
        tracing::info!("running");

        while let Some(command) = self.command_receiver.recv().await {
            let client = self.client.clone();
            let config = self.config.clone();

            let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                break;
            };

            tokio::spawn(async move {
                match command {
                    Command::Scrape(request) => Self::task_scrape(client, config, request).await,
                }

                drop(permit);
            });
        }

        self.wait_for_shutdown().await;
    }

    async fn wait_for_shutdown(&self) {
        tracing::debug!(
            "shutting down {} tasks",
            self.max_concurrency - self.semaphore.available_permits()
        );

        let _ = self
            .semaphore
            .acquire_many(self.max_concurrency as u32)
            .await;

        tracing::info!("shutdown");
    }

    /// task
    ///
    async fn task_scrape(client: reqwest::Client, config: ScrapeConfig, request: scrape::Request) {
        let url = request.url.unwrap_or_else(|| config.url.clone());
        tracing::trace!("scraping {url}");

        let body = fetch(&client, &url, &config).await;

        match &body {
            Ok(body) => tracing::debug!("scraped {} bytes from {url}", body.len()),
            Err(err) => tracing::warn!("scrape failed: {err}"),
        }

        if request
            .response_sender
            .send(scrape::Response { body })
            .is_err()
        {
            tracing::debug!("scrape requester went away");
        }
    }
}

async fn fetch(client: &reqwest::Client, url: &str, config: &ScrapeConfig) -> Result<String> {
    let classify = |source: reqwest::Error| {
        if source.is_timeout() {
            Error::ScrapeTimeout {
                url: url.to_string(),
                timeout: config.timeout,
            }
        } else {
            Error::ScrapeTransport {
                url: url.to_string(),
                source,
            }
        }
    };

    let response = client.get(url).send().await.map_err(classify)?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::ScrapeStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    response.text().await.map_err(classify)
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
    /// scrape
    ///
    /// Scrapes the configured exporter url.
    pub async fn scrape(&self) -> Result<scrape::Handle> {
        self.send(None).await
    }

    /// scrape_url
    ///
    pub async fn scrape_url(&self, url: impl Into<String>) -> Result<scrape::Handle> {
        self.send(Some(url.into())).await
    }

    async fn send(&self, url: Option<String>) -> Result<scrape::Handle> {
        let (response_sender, response_receiver) = oneshot::channel();

        let request = Command::Scrape(scrape::Request {
            response_sender,
            url,
        });

        if self.command_sender.capacity() == 0 {
            tracing::warn!("command queue is full");
        }

        self.command_sender
            .send(request)
            .await
            .map_err(|_| Error::Shutdown)?;

        Ok(scrape::Handle { response_receiver })
    }
}

pub enum Command {
    Scrape(scrape::Request),
}

pub mod scrape {
    use super::*;

    pub struct Request {
        pub response_sender: oneshot::Sender<Response>,

        /// overrides the configured url
        pub url: Option<String>,
    }

    #[derive(Debug)]
    pub struct Response {
        pub body: Result<String>,
    }

    pub struct Handle {
        pub response_receiver: oneshot::Receiver<Response>,
    }

    impl Handle {
        pub async fn recv(self) -> Result<String> {
            self.response_receiver
                .await
                .map_err(|_| Error::Shutdown)?
                .body
        }
    }
}
