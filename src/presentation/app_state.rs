// Application state for HTTP handlers
use crate::application::catalog_service::CatalogService;
use crate::application::page_service::PageService;
use crate::application::recovery_repository::RecoveryRepository;
use crate::application::streaming_service::StreamingPageService;
use crate::domain::filter::Period;
use crate::domain::recovery::BusinessRules;
use crate::domain::format::Formatter;
use crate::infrastructure::config::DisplaySettings;
use std::sync::Arc;

/// Services bound to a working warehouse, or the reason there is none
pub enum Backend {
    Ready {
        pages: PageService,
        streaming: StreamingPageService,
        catalog: CatalogService,
    },
    Misconfigured(String),
}

pub struct AppState {
    pub backend: Backend,
    pub formatter: Formatter,
    pub default_period: Period,
}

impl AppState {
    pub fn ready(
        repository: Arc<dyn RecoveryRepository>,
        rules: BusinessRules,
        display: &DisplaySettings,
        default_period: Period,
    ) -> Self {
        let formatter = formatter(display);
        Self {
            backend: Backend::Ready {
                pages: PageService::new(repository.clone(), rules.clone(), formatter.clone()),
                streaming: StreamingPageService::new(repository.clone(), rules, formatter.clone()),
                catalog: CatalogService::new(repository),
            },
            formatter,
            default_period,
        }
    }

    pub fn misconfigured(reason: impl Into<String>, display: &DisplaySettings, default_period: Period) -> Self {
        Self {
            backend: Backend::Misconfigured(reason.into()),
            formatter: formatter(display),
            default_period,
        }
    }
}

fn formatter(display: &DisplaySettings) -> Formatter {
    Formatter::new(
        &display.currency_symbol,
        display.currency_decimals,
        display.percent_decimals,
    )
}
