use crate::error::ConfigurationError;
use std::env;
use std::time::Duration;

/// Output format of the log subscriber, driven by the Lambda log configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub region: String,
    /// Overrides the regional SageMaker Runtime endpoint (local stacks, tests).
    pub endpoint_url: Option<String>,
    /// Transport timeout. `None` leaves the call unbounded.
    pub request_timeout: Option<Duration>,
    pub log_format: LogFormat,
}

impl ClassifierConfig {
    pub fn builder() -> ClassifierConfigBuilder {
        ClassifierConfigBuilder::default()
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::builder().from_lookup(|key| env::var(key).ok())?.build()
    }

    pub fn runtime_endpoint(&self) -> String {
        match &self.endpoint_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://runtime.sagemaker.{}.amazonaws.com", self.region),
        }
    }
}

#[derive(Debug, Default)]
pub struct ClassifierConfigBuilder {
    region: Option<String>,
    endpoint_url: Option<String>,
    request_timeout: Option<Duration>,
    log_format: Option<LogFormat>,
}

impl ClassifierConfigBuilder {
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.log_format = Some(format);
        self
    }

    /// Fill unset fields from `lookup`. Explicitly set fields win.
    pub fn from_lookup<F>(mut self, lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.region.is_none() {
            self.region = lookup("AWS_REGION").or_else(|| lookup("AWS_DEFAULT_REGION"));
        }

        if self.endpoint_url.is_none() {
            self.endpoint_url = lookup("AWS_ENDPOINT_URL_SAGEMAKER_RUNTIME")
                .or_else(|| lookup("AWS_ENDPOINT_URL"));
        }

        if self.request_timeout.is_none() {
            if let Some(raw) = lookup("CLASSIFIER_REQUEST_TIMEOUT_SECS") {
                self.request_timeout = Some(parse_timeout(&raw)?);
            }
        }

        if self.log_format.is_none() {
            if let Some(raw) = lookup("AWS_LAMBDA_LOG_FORMAT") {
                self.log_format = Some(parse_log_format(&raw)?);
            }
        }

        Ok(self)
    }

    pub fn build(self) -> Result<ClassifierConfig, ConfigurationError> {
        let region = self
            .region
            .filter(|r| !r.trim().is_empty())
            .ok_or(ConfigurationError::MissingRegion)?;

        if let Some(url) = &self.endpoint_url {
            let parsed = url::Url::parse(url).map_err(|e| ConfigurationError::Invalid {
                field: "endpoint_url",
                message: e.to_string(),
            })?;
            if parsed.query().is_some() || parsed.fragment().is_some() {
                return Err(ConfigurationError::Invalid {
                    field: "endpoint_url",
                    message: format!("'{}' must not carry a query or fragment", url),
                });
            }
        }

        Ok(ClassifierConfig {
            region,
            endpoint_url: self.endpoint_url,
            request_timeout: self.request_timeout,
            log_format: self.log_format.unwrap_or_default(),
        })
    }
}

fn parse_timeout(raw: &str) -> Result<Duration, ConfigurationError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigurationError::Invalid {
            field: "CLASSIFIER_REQUEST_TIMEOUT_SECS",
            message: format!("expected a positive number of seconds, got '{}'", raw),
        }),
    }
}

fn parse_log_format(raw: &str) -> Result<LogFormat, ConfigurationError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Ok(LogFormat::Json),
        "text" | "" => Ok(LogFormat::Text),
        _ => Err(ConfigurationError::Invalid {
            field: "AWS_LAMBDA_LOG_FORMAT",
            message: format!("expected JSON or Text, got '{}'", raw),
        }),
    }
}
