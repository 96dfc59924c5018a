// Widget domain models - the display vocabulary pages are built from
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Currency,
    Percent,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiTile {
    pub id: String,
    pub title: String,
    pub unit: Unit,
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<Tone>,
}

impl KpiTile {
    pub fn new(id: impl Into<String>, title: impl Into<String>, unit: Unit, value: Option<f64>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            unit,
            value,
            caption: None,
            tone: None,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn with_tone(mut self, tone: Tone) -> Self {
        self.tone = Some(tone);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: Option<f64>,
}

impl ChartPoint {
    pub fn new(label: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesStyle {
    Bar,
    Line,
    DashedLine,
    Area,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesData {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub style: SeriesStyle,
    pub axis: Axis,
    pub points: Vec<ChartPoint>,
}

impl SeriesData {
    pub fn new(id: impl Into<String>, name: impl Into<String>, style: SeriesStyle, points: Vec<ChartPoint>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: None,
            style,
            axis: Axis::Primary,
            points,
        }
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.color = Some(color.to_string());
        self
    }

    pub fn on_secondary_axis(mut self) -> Self {
        self.axis = Axis::Secondary;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    GroupedBar,
    StackedBar,
    HorizontalBar,
    Line,
    Combo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub id: String,
    pub title: String,
    pub kind: ChartKind,
    pub unit: Unit,
    pub secondary_unit: Option<Unit>,
    pub x_label: Option<String>,
    pub series: Vec<SeriesData>,
}

impl ChartData {
    pub fn new(id: impl Into<String>, title: impl Into<String>, kind: ChartKind, unit: Unit, series: Vec<SeriesData>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind,
            unit,
            secondary_unit: None,
            x_label: None,
            series,
        }
    }

    pub fn with_secondary_unit(mut self, unit: Unit) -> Self {
        self.secondary_unit = Some(unit);
        self
    }

    pub fn with_x_label(mut self, label: impl Into<String>) -> Self {
        self.x_label = Some(label.into());
        self
    }

    /// True when no series carries a single defined value
    pub fn is_empty(&self) -> bool {
        self.series
            .iter()
            .all(|s| s.points.iter().all(|p| p.value.is_none()))
    }

    /// Category labels in first-seen order across all series
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for series in &self.series {
            for point in &series.points {
                if !labels.contains(&point.label) {
                    labels.push(point.label.clone());
                }
            }
        }
        labels
    }
}

/// Two-dimensional grid, rendered as a colour-scaled table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapData {
    pub id: String,
    pub title: String,
    pub unit: Unit,
    pub x_labels: Vec<String>,
    pub y_labels: Vec<String>,
    pub cells: Vec<Vec<Option<f64>>>,
}

impl HeatmapData {
    pub fn is_empty(&self) -> bool {
        self.y_labels.is_empty() || self.x_labels.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TableCell {
    Text(String),
    Count(i64),
    Currency(f64),
    Percent(Option<f64>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableData {
    pub id: String,
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<TableCell>>,
}

impl TableData {
    pub fn new(id: impl Into<String>, title: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<TableCell>) {
        self.rows.push(row);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub tone: Tone,
    pub message: String,
}

impl Notice {
    pub fn new(tone: Tone, message: impl Into<String>) -> Self {
        Self {
            tone,
            message: message.into(),
        }
    }
}

/// Placeholder for a widget group whose query failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unavailable {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "widget", rename_all = "snake_case")]
pub enum Widget {
    Kpi(KpiTile),
    Chart(ChartData),
    Heatmap(HeatmapData),
    Table(TableData),
    Notice(Notice),
    Unavailable(Unavailable),
}

impl Widget {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Widget::Unavailable(Unavailable {
            reason: reason.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_labels_keep_first_seen_order() {
        let chart = ChartData::new(
            "c",
            "Chart",
            ChartKind::GroupedBar,
            Unit::Currency,
            vec![
                SeriesData::new("a", "A", SeriesStyle::Bar, vec![ChartPoint::new("x", Some(1.0)), ChartPoint::new("y", None)]),
                SeriesData::new("b", "B", SeriesStyle::Bar, vec![ChartPoint::new("z", Some(2.0)), ChartPoint::new("x", Some(3.0))]),
            ],
        );
        assert_eq!(chart.labels(), vec!["x", "y", "z"]);
        assert!(!chart.is_empty());
    }

    #[test]
    fn test_widget_serializes_with_tag() {
        let widget = Widget::Kpi(KpiTile::new("total", "Total Recovered", Unit::Currency, Some(12.5)));
        let json = serde_json::to_value(&widget).unwrap();
        assert_eq!(json["widget"], "kpi");
        assert_eq!(json["unit"], "currency");
        assert_eq!(json["value"], 12.5);
        assert!(json.get("caption").is_none());
    }
}
