//! Podcast TTS client.

use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{Error, Result},
    synthesizer::PodcastSynthesizer,
    transport::{ConnectHeaders, Connector, WsConnector},
};

/// Default podcast WebSocket endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://openspeech.bytedance.com/api/v3/sami/podcasttts";

/// Fixed X-Api-App-Key for the podcast API.
pub const APP_KEY_PODCAST: &str = "aGjiRDfUWi";

/// Podcast synthesis resource id.
pub const RESOURCE_PODCAST: &str = "volc.service_type.10050";

/// Default number of attempts per build.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default wait between attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Default timeout for each connect, send and receive.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Podcast TTS client.
///
/// # Example
///
/// ```rust,no_run
/// use dailycast_podcasttts::{Client, DialogueScript, PodcastOptions, Segment};
///
/// # async fn run() -> dailycast_podcasttts::Result<()> {
/// let client = Client::builder("your-app-id")
///     .access_key("your-access-key")
///     .build()?;
///
/// let script = DialogueScript::new(vec![
///     Segment::new("host", "Welcome to today's episode."),
///     Segment::new("guest", "Glad to be here."),
/// ]);
/// let result = client
///     .podcast()
///     .synthesize(&script, &PodcastOptions::default(), "episode.mp3".as_ref())
///     .await?;
/// println!("{} bytes", result.bytes);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
}

/// Client configuration shared with the services.
pub(crate) struct ClientConfig {
    pub(crate) app_id: String,
    pub(crate) access_key: String,
    pub(crate) app_key: String,
    pub(crate) resource_id: String,
    pub(crate) endpoint: String,
    pub(crate) timeout: Duration,
    pub(crate) max_attempts: u32,
    pub(crate) backoff: Duration,
    pub(crate) connector: Arc<dyn Connector>,
}

impl ClientConfig {
    /// Headers for a new connection, with a fresh connect id.
    pub(crate) fn connect_headers(&self) -> ConnectHeaders {
        ConnectHeaders {
            app_id: self.app_id.clone(),
            app_key: self.app_key.clone(),
            access_key: self.access_key.clone(),
            resource_id: self.resource_id.clone(),
            connect_id: generate_id(),
        }
    }
}

impl Client {
    /// Creates a new client builder.
    pub fn builder(app_id: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(app_id)
    }

    /// Returns the configured app ID.
    pub fn app_id(&self) -> &str {
        &self.config.app_id
    }

    /// Returns the configured endpoint.
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Returns the podcast synthesis service.
    pub fn podcast(&self) -> PodcastSynthesizer {
        PodcastSynthesizer::new(self.config.clone())
    }
}

/// Builder for creating a podcast TTS client.
pub struct ClientBuilder {
    app_id: String,
    access_key: Option<String>,
    app_key: String,
    resource_id: String,
    endpoint: String,
    timeout: Duration,
    max_attempts: u32,
    backoff: Duration,
    connector: Option<Arc<dyn Connector>>,
}

impl ClientBuilder {
    /// Creates a new client builder.
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            access_key: None,
            app_key: APP_KEY_PODCAST.to_string(),
            resource_id: RESOURCE_PODCAST.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
            connector: None,
        }
    }

    /// Sets the access key.
    ///
    /// Header format: X-Api-Access-Key: {accessKey}
    pub fn access_key(mut self, access_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self
    }

    /// Overrides the fixed X-Api-App-Key.
    pub fn app_key(mut self, app_key: impl Into<String>) -> Self {
        self.app_key = app_key.into();
        self
    }

    /// Sets the resource id.
    pub fn resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = resource_id.into();
        self
    }

    /// Sets a custom WebSocket endpoint.
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }

    /// Sets the timeout for each connect, send and receive.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum number of attempts per build.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the wait between attempts.
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replaces the WebSocket connector.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<Client> {
        if self.app_id.is_empty() {
            return Err(Error::Config("app_id must be non-empty".to_string()));
        }

        let access_key = match self.access_key {
            Some(key) if !key.is_empty() => key,
            _ => return Err(Error::Config("access_key must be provided".to_string())),
        };

        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be positive".to_string()));
        }

        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WsConnector::new(self.endpoint.clone())));

        Ok(Client {
            config: Arc::new(ClientConfig {
                app_id: self.app_id,
                access_key,
                app_key: self.app_key,
                resource_id: self.resource_id,
                endpoint: self.endpoint,
                timeout: self.timeout,
                max_attempts: self.max_attempts,
                backoff: self.backoff,
                connector,
            }),
        })
    }
}

/// Generates a unique id for sessions and connections.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
