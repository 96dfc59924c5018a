// Dashboard domain model - pages, panels and the rendered widget tree
use super::filter::FilterSet;
use super::widget::Widget;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Page {
    ExecutiveSummary,
    Operations,
    FinancialImpact,
    TrendsAnalytics,
}

impl Page {
    pub const ALL: [Page; 4] = [
        Page::ExecutiveSummary,
        Page::Operations,
        Page::FinancialImpact,
        Page::TrendsAnalytics,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Page::ExecutiveSummary => "executive-summary",
            Page::Operations => "operations",
            Page::FinancialImpact => "financial-impact",
            Page::TrendsAnalytics => "trends-analytics",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Page::ExecutiveSummary => "Executive Summary",
            Page::Operations => "Operations",
            Page::FinancialImpact => "Financial Impact",
            Page::TrendsAnalytics => "Trends & Analytics",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Page::ALL.into_iter().find(|p| p.slug() == slug)
    }
}

/// One aggregate query of the query layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    Monthly,
    PlatformIssue,
    Daily,
    Locations,
    Chains,
    Status,
    Subcategories,
    ChainAttention,
    OrderValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Panel {
    pub id: String,
    pub title: String,
    pub widgets: Vec<Widget>,
}

impl Panel {
    pub fn new(id: impl Into<String>, title: impl Into<String>, widgets: Vec<Widget>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            widgets,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageView {
    pub page: Page,
    pub title: String,
    pub filter: FilterSet,
    pub panels: Vec<Panel>,
}

impl PageView {
    pub fn new(page: Page, filter: FilterSet, panels: Vec<Panel>) -> Self {
        Self {
            page,
            title: page.title().to_string(),
            filter,
            panels,
        }
    }

    pub fn panel(&self, id: &str) -> Option<&Panel> {
        self.panels.iter().find(|p| p.id == id)
    }
}
