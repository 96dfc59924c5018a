// Streaming page service - Progressive loading, one message per panel
use crate::application::pages::{self, RenderContext};
use crate::application::recovery_repository::{PageData, RecoveryRepository};
use crate::domain::dashboard::{Page, Panel};
use crate::domain::filter::FilterSet;
use crate::domain::format::Formatter;
use crate::domain::recovery::BusinessRules;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelSkeleton {
    pub id: String,
    pub title: String,
}

/// One line of the NDJSON page stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    Skeleton {
        page: Page,
        title: String,
        filter: FilterSet,
        panels: Vec<PanelSkeleton>,
    },
    Panel(Panel),
    Complete {
        panels: usize,
        elapsed_ms: u64,
    },
}

#[derive(Clone)]
pub struct StreamingPageService {
    repository: Arc<dyn RecoveryRepository>,
    rules: BusinessRules,
    formatter: Formatter,
}

impl StreamingPageService {
    pub fn new(repository: Arc<dyn RecoveryRepository>, rules: BusinessRules, formatter: Formatter) -> Self {
        Self {
            repository,
            rules,
            formatter,
        }
    }

    /// Sends the skeleton right away, then each panel as soon as its dataset
    /// has been queried, then a completion message once every task is done.
    pub fn stream_page(&self, page: Page, filter: FilterSet) -> mpsc::Receiver<StreamMessage> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let start_time = Instant::now();
        let layout = pages::layout(page);

        let skeleton = StreamMessage::Skeleton {
            page,
            title: page.title().to_string(),
            filter: filter.clone(),
            panels: layout
                .iter()
                .map(|kind| PanelSkeleton {
                    id: kind.id().to_string(),
                    title: kind.title().to_string(),
                })
                .collect(),
        };
        // Capacity is larger than one, the first send never waits
        if tx.try_send(skeleton).is_err() {
            tracing::warn!(page = page.slug(), "stream receiver dropped before skeleton");
            return rx;
        }

        let mut handles = Vec::new();
        for dataset in pages::datasets(page) {
            let tx = tx.clone();
            let repo = self.repository.clone();
            let filter = filter.clone();
            let rules = self.rules.clone();
            let formatter = self.formatter.clone();

            handles.push(tokio::spawn(async move {
                let data = PageData::fetch_one(repo.as_ref(), dataset, &filter).await;
                let ctx = RenderContext {
                    filter: &filter,
                    rules: &rules,
                    formatter: &formatter,
                };
                for kind in layout.iter().filter(|kind| kind.dataset() == dataset) {
                    let panel = pages::render_panel(*kind, &ctx, &data);
                    if tx.send(StreamMessage::Panel(panel)).await.is_err() {
                        tracing::debug!(?dataset, "stream receiver dropped");
                        return;
                    }
                }
            }));
        }

        let total_panels = layout.len();
        tokio::spawn(async move {
            for result in futures::future::join_all(handles).await {
                if let Err(e) = result {
                    tracing::error!(error = %e, "panel task failed");
                }
            }

            let elapsed_ms = start_time.elapsed().as_millis() as u64;
            tracing::info!(page = page.slug(), panels = total_panels, elapsed_ms, "page stream complete");
            let _ = tx
                .send(StreamMessage::Complete {
                    panels: total_panels,
                    elapsed_ms,
                })
                .await;
        });

        rx
    }
}
