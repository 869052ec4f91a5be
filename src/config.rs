//! Configuration management for the admin console

use crate::errors::{ConsoleError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Identifies one of the nine backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKey {
    Auth,
    Students,
    Lecturers,
    Courses,
    Assignments,
    Submissions,
    Announcements,
    Quizzes,
    Materials,
}

impl ServiceKey {
    pub const ALL: [ServiceKey; 9] = [
        ServiceKey::Auth,
        ServiceKey::Students,
        ServiceKey::Lecturers,
        ServiceKey::Courses,
        ServiceKey::Assignments,
        ServiceKey::Submissions,
        ServiceKey::Announcements,
        ServiceKey::Quizzes,
        ServiceKey::Materials,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKey::Auth => "auth",
            ServiceKey::Students => "students",
            ServiceKey::Lecturers => "lecturers",
            ServiceKey::Courses => "courses",
            ServiceKey::Assignments => "assignments",
            ServiceKey::Submissions => "submissions",
            ServiceKey::Announcements => "announcements",
            ServiceKey::Quizzes => "quizzes",
            ServiceKey::Materials => "materials",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ServiceKey::Auth => "Auth Service",
            ServiceKey::Students => "Student Service",
            ServiceKey::Lecturers => "Lecturer Service",
            ServiceKey::Courses => "Course Service",
            ServiceKey::Assignments => "Assignment Service",
            ServiceKey::Submissions => "Submission Service",
            ServiceKey::Announcements => "Announcement Service",
            ServiceKey::Quizzes => "Quiz Service",
            ServiceKey::Materials => "Material Service",
        }
    }

    fn singular(&self) -> &'static str {
        match self {
            ServiceKey::Quizzes => "quiz",
            ServiceKey::Auth => "auth",
            other => other.as_str().trim_end_matches('s'),
        }
    }

    /// Port in the reference deployment (8081-8089).
    pub fn default_port(&self) -> u16 {
        match self {
            ServiceKey::Auth => 8081,
            ServiceKey::Students => 8082,
            ServiceKey::Lecturers => 8083,
            ServiceKey::Courses => 8084,
            ServiceKey::Assignments => 8085,
            ServiceKey::Submissions => 8086,
            ServiceKey::Announcements => 8087,
            ServiceKey::Quizzes => 8088,
            ServiceKey::Materials => 8089,
        }
    }

    pub fn default_probe_endpoint(&self) -> String {
        match self {
            ServiceKey::Auth => "/api/auth/health".to_string(),
            other => format!("/api/{}", other.as_str()),
        }
    }

    fn env_prefix(&self) -> String {
        self.as_str().to_uppercase()
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKey {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_lowercase();
        ServiceKey::ALL
            .into_iter()
            .find(|key| key.as_str() == needle || key.singular() == needle)
            .ok_or_else(|| ConsoleError::UnknownService(s.to_string()))
    }
}

/// Static description of one backend. Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub key: ServiceKey,
    pub display_name: String,
    pub base_url: String,
    pub probe_endpoint: String,
    pub timeout: Duration,
}

impl ServiceDescriptor {
    pub fn new(key: ServiceKey, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            key,
            display_name: key.display_name().to_string(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            probe_endpoint: key.default_probe_endpoint(),
            timeout,
        }
    }

    pub fn with_probe_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.probe_endpoint = endpoint.into();
        self
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub fn probe_url(&self) -> String {
        self.url(&self.probe_endpoint)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Scheme and host the default descriptor table is built against
    pub service_host: String,

    /// One entry per backend
    pub services: Vec<ServiceDescriptor>,

    /// Budget for data calls (list fetches, dashboard counts)
    pub request_timeout: Duration,

    /// Budget for health probes
    pub probe_timeout: Duration,

    /// Durable location of the persisted settings
    pub settings_path: PathBuf,

    /// Bearer token handed over by the auth collaborator
    pub auth_token: Option<String>,

    /// Session cookie, used when no bearer token is configured
    pub session_cookie: Option<String>,

    /// Quiet period before a search term is applied
    pub search_debounce: Duration,

    pub default_page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        let service_host = "http://localhost".to_string();
        let request_timeout = Duration::from_millis(5000);
        let services = default_descriptors(&service_host, request_timeout);

        Self {
            service_host,
            services,
            request_timeout,
            probe_timeout: Duration::from_millis(3000),
            settings_path: PathBuf::from("console-settings.json"),
            auth_token: None,
            session_cookie: None,
            search_debounce: Duration::from_millis(500),
            default_page_size: 10,
        }
    }
}

/// The reference deployment: every service on `host` at its fixed port.
pub fn default_descriptors(host: &str, timeout: Duration) -> Vec<ServiceDescriptor> {
    let host = host.trim_end_matches('/');
    ServiceKey::ALL
        .iter()
        .map(|key| ServiceDescriptor::new(*key, format!("{}:{}", host, key.default_port()), timeout))
        .collect()
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(host) = env::var("CONSOLE_SERVICE_HOST") {
            config.service_host = host;
        }

        if let Ok(timeout) = env::var("SERVICE_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse::<u64>() {
                config.request_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(timeout) = env::var("PROBE_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse::<u64>() {
                config.probe_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(path) = env::var("CONSOLE_SETTINGS_PATH") {
            config.settings_path = PathBuf::from(path);
        }

        if let Ok(token) = env::var("CONSOLE_AUTH_TOKEN") {
            if !token.trim().is_empty() {
                config.auth_token = Some(token);
            }
        }

        if let Ok(cookie) = env::var("CONSOLE_SESSION_COOKIE") {
            if !cookie.trim().is_empty() {
                config.session_cookie = Some(cookie);
            }
        }

        if let Ok(debounce) = env::var("SEARCH_DEBOUNCE_MS") {
            if let Ok(ms) = debounce.parse::<u64>() {
                config.search_debounce = Duration::from_millis(ms);
            }
        }

        if let Ok(page_size) = env::var("DEFAULT_PAGE_SIZE") {
            if let Ok(size) = page_size.parse() {
                config.default_page_size = size;
            }
        }

        config.services = default_descriptors(&config.service_host, config.request_timeout)
            .into_iter()
            .map(|mut descriptor| {
                let prefix = descriptor.key.env_prefix();
                if let Ok(url) = env::var(format!("{}_SERVICE_URL", prefix)) {
                    descriptor.base_url = url.trim_end_matches('/').to_string();
                }
                if let Ok(path) = env::var(format!("{}_PROBE_PATH", prefix)) {
                    descriptor.probe_endpoint = path;
                }
                descriptor
            })
            .collect();

        config
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.services.is_empty() {
            return Err("at least one service descriptor must be configured".to_string());
        }

        let mut keys = HashSet::new();
        let mut urls = HashSet::new();
        for descriptor in &self.services {
            if !keys.insert(descriptor.key) {
                return Err(format!("duplicate service key: {}", descriptor.key));
            }
            if descriptor.base_url.is_empty() {
                return Err(format!("{} has an empty base_url", descriptor.key));
            }
            if !urls.insert(descriptor.base_url.as_str()) {
                return Err(format!("duplicate base_url: {}", descriptor.base_url));
            }
            if !descriptor.probe_endpoint.starts_with('/') {
                return Err(format!(
                    "{} probe endpoint must start with '/': {}",
                    descriptor.key, descriptor.probe_endpoint
                ));
            }
            if descriptor.timeout.is_zero() {
                return Err(format!("{} timeout must be greater than 0", descriptor.key));
            }
        }

        if self.request_timeout.is_zero() {
            return Err("request_timeout must be greater than 0".to_string());
        }

        if self.probe_timeout.is_zero() {
            return Err("probe_timeout must be greater than 0".to_string());
        }

        if self.default_page_size == 0 {
            return Err("default_page_size must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn descriptor(&self, key: ServiceKey) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|d| d.key == key)
    }

    /// Descriptors with the probe budget substituted for the data-call budget.
    pub fn probe_descriptors(&self) -> Vec<ServiceDescriptor> {
        self.services
            .iter()
            .cloned()
            .map(|mut descriptor| {
                descriptor.timeout = self.probe_timeout;
                descriptor
            })
            .collect()
    }
}
