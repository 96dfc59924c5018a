// Server-side SVG rendering for chart and heatmap widgets, drawn with plotters
use crate::domain::format::Formatter;
use crate::domain::widget::{Axis, ChartData, ChartKind, HeatmapData, SeriesData, SeriesStyle};
use crate::presentation::html::escape;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::collections::HashMap;
use std::ops::Range;

pub const EMPTY_STATE: &str = "No data for the selected filters.";
const DRAW_FAILED: &str = "Chart could not be drawn.";

const WIDTH: u32 = 720;
const HEIGHT: u32 = 280;
const MARGIN: u32 = 12;
const X_LABEL_AREA: u32 = 44;
const Y_LABEL_AREA: u32 = 64;
const LABEL_GUTTER: u32 = 160;
const ROW_HEIGHT: u32 = 28;
const HEAT_ROW_HEIGHT: u32 = 36;
const MAX_X_LABELS: usize = 8;
/// Share of a category band covered by its bars
const BAR_GROUP: f64 = 0.8;
const FONT: &str = "sans-serif";

const AXIS_INK: RGBColor = RGBColor(100, 116, 139);
const GRID_INK: RGBColor = RGBColor(226, 232, 240);
const HEAT_BASE: RGBColor = RGBColor(37, 99, 235);
const HEAT_EMPTY: RGBColor = RGBColor(241, 245, 249);
const DARK_INK: RGBColor = RGBColor(15, 23, 42);

const PALETTE: [&str; 8] = [
    "#2563eb", "#16a34a", "#f59e0b", "#dc2626", "#7c3aed", "#0891b2", "#db2777", "#65a30d",
];

type DrawResult = Result<(), Box<dyn std::error::Error>>;

pub fn empty_state() -> String {
    format!(r#"<p class="empty">{}</p>"#, EMPTY_STATE)
}

fn draw_failed(id: &str, err: &dyn std::error::Error) -> String {
    tracing::warn!(widget = %id, error = %err, "failed to draw chart");
    format!(r#"<p class="empty">{}</p>"#, DRAW_FAILED)
}

fn series_color(series: &SeriesData, index: usize) -> String {
    series
        .color
        .clone()
        .unwrap_or_else(|| PALETTE[index % PALETTE.len()].to_string())
}

/// `#rrggbb` to an RGB colour, palette blue when malformed
fn rgb(hex: &str) -> RGBColor {
    let hex = hex.trim_start_matches('#');
    let channel = |range: Range<usize>| hex.get(range).and_then(|h| u8::from_str_radix(h, 16).ok());
    match (channel(0..2), channel(2..4), channel(4..6)) {
        (Some(r), Some(g), Some(b)) if hex.len() == 6 => RGBColor(r, g, b),
        _ => HEAT_BASE,
    }
}

/// Replace the fixed pixel size with a viewBox so the chart scales with its panel
fn responsive(svg: String, width: u32, height: u32) -> String {
    let needle = format!(r#"width="{}" height="{}""#, width, height);
    let sized = if svg.contains("viewBox=") {
        r#"class="chart-svg" width="100%""#.to_string()
    } else {
        format!(r#"class="chart-svg" viewBox="0 0 {} {}" width="100%""#, width, height)
    };
    svg.replacen(&needle, &sized, 1)
}

/// Values of a series aligned to the chart's category labels
fn aligned(series: &SeriesData, labels: &[String]) -> Vec<Option<f64>> {
    let by_label: HashMap<&str, Option<f64>> = series
        .points
        .iter()
        .map(|p| (p.label.as_str(), p.value))
        .collect();
    labels
        .iter()
        .map(|label| by_label.get(label.as_str()).copied().flatten())
        .collect()
}

/// Tick text for a category axis; fractional ticks stay blank
fn category_label(labels: &[String], position: f64) -> String {
    let index = position.round();
    if (position - index).abs() > 1e-6 || index < 0.0 {
        return String::new();
    }
    labels.get(index as usize).cloned().unwrap_or_default()
}

fn nice_step(raw: f64) -> f64 {
    let magnitude = 10f64.powf(raw.log10().floor());
    let normalized = raw / magnitude;
    let nice = if normalized <= 1.0 {
        1.0
    } else if normalized <= 2.0 {
        2.0
    } else if normalized <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

/// Linear value axis, always including zero
#[derive(Debug, Clone, Copy, PartialEq)]
struct Scale {
    min: f64,
    max: f64,
    step: f64,
}

impl Scale {
    fn fit(values: impl IntoIterator<Item = f64>) -> Self {
        let (mut lo, mut hi) = (0.0f64, 0.0f64);
        for value in values.into_iter().filter(|v| v.is_finite()) {
            lo = lo.min(value);
            hi = hi.max(value);
        }
        if hi - lo < f64::EPSILON {
            hi = lo + 1.0;
        }
        let step = nice_step((hi - lo) / 4.0);
        Self {
            min: (lo / step).floor() * step,
            max: (hi / step).ceil() * step,
            step,
        }
    }

    fn range(&self) -> Range<f64> {
        self.min..self.max
    }

    fn tick_count(&self) -> usize {
        ((self.max - self.min) / self.step).round() as usize + 1
    }

    /// Position of `value` on this scale, expressed in `onto`'s units
    fn project(&self, onto: &Scale, value: f64) -> f64 {
        let ratio = (value - self.min) / (self.max - self.min);
        onto.min + ratio * (onto.max - onto.min)
    }
}

fn value_extent(chart: &ChartData, values: &[Vec<Option<f64>>], axis: Axis, stacked: bool) -> Vec<f64> {
    let mut extent = Vec::new();
    let mut stack_tops: Vec<f64> = Vec::new();
    for (series, series_values) in chart.series.iter().zip(values) {
        if series.axis != axis {
            continue;
        }
        if stacked && series.style == SeriesStyle::Bar {
            if stack_tops.is_empty() {
                stack_tops = vec![0.0; series_values.len()];
            }
            for (top, value) in stack_tops.iter_mut().zip(series_values) {
                *top += value.unwrap_or(0.0).max(0.0);
            }
        }
        extent.extend(series_values.iter().flatten().copied());
    }
    extent.extend(stack_tops);
    extent
}

/// One bar in data coordinates: x is the category index, y the series value
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bar {
    series: usize,
    axis: Axis,
    from: (f64, f64),
    to: (f64, f64),
}

/// Bars side by side within each category band, or stacked from zero
fn bar_layout(chart: &ChartData, values: &[Vec<Option<f64>>], categories: usize) -> Vec<Bar> {
    let bar_series: Vec<usize> = chart
        .series
        .iter()
        .enumerate()
        .filter(|(_, s)| s.style == SeriesStyle::Bar)
        .map(|(i, _)| i)
        .collect();
    let stacked = chart.kind == ChartKind::StackedBar;
    let slots = if stacked { 1 } else { bar_series.len().max(1) };
    let slot_width = BAR_GROUP / slots as f64;
    let mut stack_base = vec![0.0f64; categories];
    let mut bars = Vec::new();

    for (slot, &index) in bar_series.iter().enumerate() {
        let slot = if stacked { 0 } else { slot };
        for (i, value) in values[index].iter().enumerate() {
            let Some(value) = *value else { continue };
            let (low, high) = if stacked {
                let base = stack_base[i];
                stack_base[i] += value.max(0.0);
                (base, base + value.max(0.0))
            } else {
                (0.0, value)
            };
            let left = i as f64 - BAR_GROUP / 2.0 + slot as f64 * slot_width;
            bars.push(Bar {
                series: index,
                axis: chart.series[index].axis,
                from: (left, low),
                to: (left + slot_width * 0.9, high),
            });
        }
    }
    bars
}

/// Points of a series, split wherever a value is undefined
fn line_segments(values: &[Option<f64>]) -> Vec<Vec<(f64, f64)>> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    for (i, value) in values.iter().enumerate() {
        match value {
            Some(v) => current.push((i as f64, *v)),
            None if !current.is_empty() => segments.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

pub fn render_chart(chart: &ChartData, fmt: &Formatter) -> String {
    if chart.is_empty() {
        return empty_state();
    }
    let labels = chart.labels();
    let values: Vec<Vec<Option<f64>>> = chart.series.iter().map(|s| aligned(s, &labels)).collect();

    let mut svg = String::new();
    let (drawn, height) = match chart.kind {
        ChartKind::HorizontalBar => {
            let height = MARGIN * 2 + X_LABEL_AREA + ROW_HEIGHT * labels.len() as u32;
            (draw_horizontal(&mut svg, height, chart, &labels, &values, fmt), height)
        }
        _ => (draw_vertical(&mut svg, chart, &labels, &values, fmt), HEIGHT),
    };
    if let Err(err) = drawn {
        return draw_failed(&chart.id, err.as_ref());
    }
    format!("{}{}", responsive(svg, WIDTH, height), render_legend(chart))
}

fn render_legend(chart: &ChartData) -> String {
    if chart.series.len() < 2 {
        return String::new();
    }
    let mut legend = String::from(r#"<div class="legend">"#);
    for (i, series) in chart.series.iter().enumerate() {
        let dashed = if series.style == SeriesStyle::DashedLine { " dashed" } else { "" };
        legend.push_str(&format!(
            r#"<span class="legend-item"><span class="swatch{dashed}" style="background:{color}"></span>{name}</span>"#,
            dashed = dashed,
            color = escape(&series_color(series, i)),
            name = escape(&series.name),
        ));
    }
    legend.push_str("</div>");
    legend
}

/// Category charts: bars, lines, areas and combos, with an optional right axis
fn draw_vertical(
    svg: &mut String,
    chart: &ChartData,
    labels: &[String],
    values: &[Vec<Option<f64>>],
    fmt: &Formatter,
) -> DrawResult {
    let stacked = chart.kind == ChartKind::StackedBar;
    let has_secondary = chart.series.iter().any(|s| s.axis == Axis::Secondary);
    let primary = Scale::fit(value_extent(chart, values, Axis::Primary, stacked));
    let secondary = Scale::fit(value_extent(chart, values, Axis::Secondary, false));
    let secondary_unit = chart.secondary_unit.unwrap_or(chart.unit);
    let categories = -0.5..labels.len() as f64 - 0.5;
    // Secondary values are drawn in primary coordinates
    let y = |axis: Axis, value: f64| match axis {
        Axis::Primary => value,
        Axis::Secondary => secondary.project(&primary, value),
    };

    let root = SVGBackend::with_string(svg, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut builder = ChartBuilder::on(&root);
    builder
        .margin(MARGIN)
        .x_label_area_size(X_LABEL_AREA)
        .y_label_area_size(Y_LABEL_AREA);
    if has_secondary {
        builder.right_y_label_area_size(Y_LABEL_AREA);
    }
    let mut plot = builder
        .build_cartesian_2d(categories.clone(), primary.range())?
        .set_secondary_coord(categories, secondary.range());

    let x_label = |x: &f64| category_label(labels, *x);
    let y_label = |v: &f64| fmt.axis(chart.unit, *v);
    let mut mesh = plot.configure_mesh();
    mesh.disable_x_mesh()
        .light_line_style(WHITE)
        .bold_line_style(GRID_INK)
        .x_labels(labels.len().min(MAX_X_LABELS))
        .y_labels(primary.tick_count())
        .x_label_formatter(&x_label)
        .y_label_formatter(&y_label)
        .axis_style(AXIS_INK)
        .label_style((FONT, 11, &AXIS_INK));
    if let Some(title) = &chart.x_label {
        mesh.x_desc(title.as_str());
    }
    mesh.draw()?;

    if has_secondary {
        let secondary_label = |v: &f64| fmt.axis(secondary_unit, *v);
        plot.configure_secondary_axes()
            .y_labels(secondary.tick_count())
            .y_label_formatter(&secondary_label)
            .axis_style(AXIS_INK)
            .label_style((FONT, 11, &AXIS_INK))
            .draw()?;
    }

    for bar in bar_layout(chart, values, labels.len()) {
        let color = rgb(&series_color(&chart.series[bar.series], bar.series));
        let corners = [
            (bar.from.0, y(bar.axis, bar.from.1)),
            (bar.to.0, y(bar.axis, bar.to.1)),
        ];
        plot.draw_series(std::iter::once(Rectangle::new(corners, color.filled())))?;
    }

    let baseline = y(Axis::Primary, 0.0);
    for (index, series) in chart.series.iter().enumerate() {
        if series.style == SeriesStyle::Bar {
            continue;
        }
        let color = rgb(&series_color(series, index));
        let stroke = color.stroke_width(2);
        for segment in line_segments(&values[index]) {
            let points: Vec<(f64, f64)> = segment.into_iter().map(|(x, v)| (x, y(series.axis, v))).collect();
            if let [point] = points[..] {
                plot.draw_series(std::iter::once(Circle::new(point, 3, color.filled())))?;
                continue;
            }
            match series.style {
                SeriesStyle::Area => {
                    plot.draw_series(AreaSeries::new(points.iter().copied(), baseline, color.mix(0.15)))?;
                    plot.draw_series(LineSeries::new(points.iter().copied(), stroke))?;
                }
                SeriesStyle::DashedLine => {
                    plot.draw_series(DashedLineSeries::new(points.iter().copied(), 6, 4, stroke))?;
                }
                _ => {
                    plot.draw_series(LineSeries::new(points.iter().copied(), stroke))?;
                }
            }
        }
    }

    root.present()?;
    Ok(())
}

/// Horizontal bars, one row per category with the first label on top
fn draw_horizontal(
    svg: &mut String,
    height: u32,
    chart: &ChartData,
    labels: &[String],
    values: &[Vec<Option<f64>>],
    fmt: &Formatter,
) -> DrawResult {
    let rows = labels.len();
    let top_down: Vec<String> = labels.iter().rev().cloned().collect();
    let flip = |position: f64| (rows as f64 - 1.0) - position;
    let scale = Scale::fit(values.iter().flatten().flatten().copied());

    let root = SVGBackend::with_string(svg, (WIDTH, height)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut plot = ChartBuilder::on(&root)
        .margin(MARGIN)
        .x_label_area_size(X_LABEL_AREA)
        .y_label_area_size(LABEL_GUTTER)
        .build_cartesian_2d(scale.range(), -0.5..rows as f64 - 0.5)?;

    let x_label = |v: &f64| fmt.axis(chart.unit, *v);
    let y_label = |position: &f64| category_label(&top_down, *position);
    plot.configure_mesh()
        .disable_y_mesh()
        .light_line_style(WHITE)
        .bold_line_style(GRID_INK)
        .x_labels(scale.tick_count())
        .y_labels(rows)
        .x_label_formatter(&x_label)
        .y_label_formatter(&y_label)
        .axis_style(AXIS_INK)
        .label_style((FONT, 11, &AXIS_INK))
        .draw()?;

    for bar in bar_layout(chart, values, rows) {
        let color = rgb(&series_color(&chart.series[bar.series], bar.series));
        let corners = [(bar.from.1, flip(bar.from.0)), (bar.to.1, flip(bar.to.0))];
        plot.draw_series(std::iter::once(Rectangle::new(corners, color.filled())))?;
    }

    root.present()?;
    Ok(())
}

/// Cell opacity relative to the defined cells: 0.1 at the lowest, 0.85 at the highest
fn heat_alpha(value: f64, lo: f64, hi: f64) -> f64 {
    let position = if hi - lo > f64::EPSILON { (value - lo) / (hi - lo) } else { 1.0 };
    0.1 + 0.75 * position
}

pub fn render_heatmap(heatmap: &HeatmapData, fmt: &Formatter) -> String {
    if heatmap.is_empty() {
        return empty_state();
    }
    let height = MARGIN * 2 + X_LABEL_AREA + HEAT_ROW_HEIGHT * heatmap.y_labels.len() as u32;
    let mut svg = String::new();
    if let Err(err) = draw_heatmap(&mut svg, height, heatmap, fmt) {
        return draw_failed(&heatmap.id, err.as_ref());
    }
    responsive(svg, WIDTH, height)
}

fn draw_heatmap(svg: &mut String, height: u32, heatmap: &HeatmapData, fmt: &Formatter) -> DrawResult {
    let columns = heatmap.x_labels.len();
    let rows = heatmap.y_labels.len();
    let top_down: Vec<String> = heatmap.y_labels.iter().rev().cloned().collect();
    let defined: Vec<f64> = heatmap.cells.iter().flatten().flatten().copied().collect();
    let lo = defined.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = defined.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let root = SVGBackend::with_string(svg, (WIDTH, height)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut plot = ChartBuilder::on(&root)
        .margin(MARGIN)
        .x_label_area_size(X_LABEL_AREA)
        .y_label_area_size(LABEL_GUTTER)
        .build_cartesian_2d(-0.5..columns as f64 - 0.5, -0.5..rows as f64 - 0.5)?;

    let x_label = |position: &f64| category_label(&heatmap.x_labels, *position);
    let y_label = |position: &f64| category_label(&top_down, *position);
    plot.configure_mesh()
        .disable_mesh()
        .x_labels(columns)
        .y_labels(rows)
        .x_label_formatter(&x_label)
        .y_label_formatter(&y_label)
        .axis_style(AXIS_INK)
        .label_style((FONT, 11, &AXIS_INK))
        .draw()?;

    let centered = Pos::new(HPos::Center, VPos::Center);
    let mut cells = Vec::with_capacity(rows * columns);
    let mut captions = Vec::with_capacity(rows * columns);
    for row in 0..rows {
        let y = (rows - 1 - row) as f64;
        for column in 0..columns {
            let x = column as f64;
            let value = heatmap.cells.get(row).and_then(|r| r.get(column)).copied().flatten();
            let (fill, ink) = match value {
                Some(v) => {
                    let alpha = heat_alpha(v, lo, hi);
                    let ink = if alpha > 0.55 { WHITE } else { DARK_INK };
                    (HEAT_BASE.mix(alpha).filled(), ink)
                }
                None => (HEAT_EMPTY.filled(), AXIS_INK),
            };
            cells.push(Rectangle::new([(x - 0.48, y - 0.48), (x + 0.48, y + 0.48)], fill));
            captions.push(Text::new(
                fmt.value(heatmap.unit, value),
                (x, y),
                (FONT, 12).into_font().color(&ink).pos(centered),
            ));
        }
    }
    plot.draw_series(cells)?;
    plot.draw_series(captions)?;

    root.present()?;
    Ok(())
}
