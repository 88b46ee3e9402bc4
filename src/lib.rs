//! Image Chat Gateway
//!
//! Accepts prompts with optional reference images, throttles each client
//! through an in-memory admission controller, and forwards admitted calls to
//! a generative image provider (OpenAI or Gemini).

pub mod admission;
pub mod api;
pub mod config;
pub mod error;
pub mod middleware;
pub mod provider;
pub mod response;

pub use error::{AppError, Result};

use std::sync::Arc;
use std::time::Duration;

use admission::{AdmissionConfig, AdmissionController};
use config::{ProviderKind, Settings};
use provider::GenerationProvider;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<Settings>,
    /// `None` when per-client admission is disabled
    pub admission: Option<AdmissionController>,
    /// `None` when the provider credential is missing
    pub provider: Option<Arc<dyn GenerationProvider>>,
    pub provider_kind: ProviderKind,
    pub provider_timeout: Duration,
}

impl AppState {
    pub fn new(
        settings: Settings,
        admission: Option<AdmissionController>,
        provider: Option<Arc<dyn GenerationProvider>>,
    ) -> Self {
        Self {
            provider_kind: settings.provider.kind,
            provider_timeout: settings.provider.timeout(),
            settings: Arc::new(settings),
            admission,
            provider,
        }
    }

    /// Build the admission controller and provider described by `settings`
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let provider = provider::build_provider(&settings.provider)?;
        let admission = settings
            .rate_limit
            .enabled
            .then(|| AdmissionController::new(AdmissionConfig::from(&settings.rate_limit)));

        Ok(Self::new(settings, admission, provider))
    }
}
