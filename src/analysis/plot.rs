//! Named exploratory figures rendered to standalone HTML.
//!
//! Each figure is a Plotly figure (`{data, layout}`) built as JSON and
//! embedded in a self-contained page that loads plotly.js from its CDN.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde_json::{Value, json};
use tracing::{info, instrument};

use super::AnalysisError;
use super::dataset::{AnimeRow, Dataset};

/// plotly.js bundle referenced by every page.
const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

/// Histogram bin width of the double-distribution figures.
const DISTRIBUTION_BIN_SIZE: f64 = 0.5;

/// Points sampled along each fitted normal curve.
const CURVE_POINTS: usize = 200;

const ISEKAI_DIST_COLOR: &str = "#2BCDC1";
const OTHER_DIST_COLOR: &str = "#F66095";

/// The figures the CLI can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PlotKind {
    /// Print the first rows of the cleaned dataset.
    #[value(name = "test")]
    Test,
    /// Score over start date, colored by log members.
    #[value(name = "scoretime")]
    ScoreTime,
    /// Score over log members, colored by start date.
    #[value(name = "scoremembers")]
    ScoreMembers,
    /// Score over members, isekai highlighted.
    #[value(name = "scoreisekai")]
    ScoreIsekai,
    /// Log-member distributions of isekai vs. other entries.
    #[value(name = "histogramisekaimembers")]
    HistogramIsekaiMembers,
    /// Score distributions of isekai vs. other entries.
    #[value(name = "histogramisekaiscore")]
    HistogramIsekaiScore,
    /// Stacked log-member histogram with a log count axis.
    #[value(name = "isekaimembershistogram")]
    IsekaiMembersHistogram,
}

impl PlotKind {
    /// Output file name, or `None` for [`PlotKind::Test`].
    #[must_use]
    pub fn file_name(self) -> Option<&'static str> {
        match self {
            Self::Test => None,
            Self::ScoreTime => Some("mal_score_over_time_member_colored.html"),
            Self::ScoreMembers => Some("mal_score_over_members_date_colored.html"),
            Self::ScoreIsekai => Some("mal_score_over_members_isekai_colored.html"),
            Self::HistogramIsekaiMembers => Some("mal_isekai_popularity_double_gaussian.html"),
            Self::HistogramIsekaiScore => Some("mal_isekai_score_double_gaussian.html"),
            Self::IsekaiMembersHistogram => Some("mal_isekai_popularity_double_histogram.html"),
        }
    }
}

/// A Plotly figure.
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    title: String,
    data: Vec<Value>,
    layout: Value,
}

impl Figure {
    fn new(title: &str, data: Vec<Value>, layout: Value) -> Self {
        Self {
            title: title.to_string(),
            data,
            layout,
        }
    }

    /// Figure title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Traces of the figure.
    #[must_use]
    pub fn traces(&self) -> &[Value] {
        &self.data
    }

    /// Layout object of the figure.
    #[must_use]
    pub fn layout(&self) -> &Value {
        &self.layout
    }

    /// `{data, layout}` as consumed by `Plotly.newPlot`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({ "data": self.data, "layout": self.layout })
    }

    /// Standalone HTML page rendering the figure.
    #[must_use]
    pub fn to_html(&self) -> String {
        // "</" inside a script block would end it early.
        let figure = self.to_json().to_string().replace("</", "<\\/");
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
             <script src=\"{PLOTLY_CDN}\"></script>\n</head>\n\
             <body style=\"margin:0;background:#111111\">\n\
             <div id=\"figure\" style=\"width:100vw;height:100vh\"></div>\n\
             <script>\nconst figure = {figure};\n\
             Plotly.newPlot(\"figure\", figure.data, figure.layout, {{responsive: true}});\n\
             </script>\n</body>\n</html>\n",
            title = escape_html(&self.title),
        )
    }
}

/// Builds the figure for `kind`; `None` for [`PlotKind::Test`].
#[must_use]
pub fn build_figure(kind: PlotKind, dataset: &Dataset) -> Option<Figure> {
    let rows = dataset.rows();
    match kind {
        PlotKind::Test => None,
        PlotKind::ScoreTime => Some(score_over_time(rows)),
        PlotKind::ScoreMembers => Some(score_over_members(rows)),
        PlotKind::ScoreIsekai => Some(score_members_isekai(rows)),
        PlotKind::HistogramIsekaiMembers => Some(double_distribution(
            "Popularity of Isekais vs. Non-Isekais on MAL",
            rows,
            |row| Some(row.log_members()),
        )),
        PlotKind::HistogramIsekaiScore => Some(double_distribution(
            "Score of Isekais vs. Non-Isekais on MAL",
            rows,
            |row| row.score,
        )),
        PlotKind::IsekaiMembersHistogram => Some(members_histogram(rows)),
    }
}

/// Builds the figure for `kind` and writes it under `output_dir`.
///
/// The directory is created if missing. Returns the written path, or
/// `None` for [`PlotKind::Test`], which has no file output.
///
/// # Errors
///
/// Returns [`AnalysisError::Io`] if the directory or file cannot be written.
#[instrument(skip(dataset, output_dir), fields(rows = dataset.len(), output_dir = %output_dir.display()))]
pub fn render_plot(
    kind: PlotKind,
    dataset: &Dataset,
    output_dir: &Path,
) -> Result<Option<PathBuf>, AnalysisError> {
    let (Some(file_name), Some(figure)) = (kind.file_name(), build_figure(kind, dataset)) else {
        return Ok(None);
    };

    std::fs::create_dir_all(output_dir).map_err(|e| AnalysisError::io(output_dir, e))?;
    let path = output_dir.join(file_name);
    std::fs::write(&path, figure.to_html()).map_err(|e| AnalysisError::io(&path, e))?;

    info!(path = %path.display(), traces = figure.traces().len(), "figure written");
    Ok(Some(path))
}

fn score_over_time(rows: &[AnimeRow]) -> Figure {
    let points: Vec<(&AnimeRow, NaiveDate, f64)> = rows
        .iter()
        .filter_map(|row| Some((row, row.start_date?, row.score?)))
        .collect();

    let log_members: Vec<f64> = points.iter().map(|(row, _, _)| row.log_members()).collect();
    let tick_values = linspace(
        log_members.iter().copied().fold(f64::INFINITY, f64::min),
        log_members.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        6,
    );
    let tick_text: Vec<String> = tick_values
        .iter()
        .map(|value| format_thousands(value.exp()))
        .collect();

    let trace = json!({
        "type": "scattergl",
        "mode": "markers",
        "x": points.iter().map(|(_, date, _)| date.to_string()).collect::<Vec<_>>(),
        "y": points.iter().map(|(_, _, score)| *score).collect::<Vec<_>>(),
        "text": points.iter().map(|(row, _, _)| hover_text(row)).collect::<Vec<_>>(),
        "hoverinfo": "x+y+text",
        "opacity": 0.6,
        "marker": {
            "size": 7,
            "color": log_members,
            "colorscale": "Viridis",
            "colorbar": {
                "title": {"text": "Members", "side": "top"},
                "tickvals": tick_values,
                "ticktext": tick_text,
            },
        },
    });

    let title = "MAL Anime Scores Over Time";
    let mut layout = base_layout(title);
    layout["xaxis"] = axis("Start Date");
    layout["yaxis"] = axis("Mean Score");
    Figure::new(title, vec![trace], layout)
}

fn score_over_members(rows: &[AnimeRow]) -> Figure {
    let cutoff = NaiveDate::from_ymd_opt(1960, 1, 1);
    let points: Vec<(&AnimeRow, NaiveDate, f64)> = rows
        .iter()
        .filter(|row| row.title.is_some())
        .filter_map(|row| Some((row, row.start_date?, row.score?)))
        .filter(|(_, date, _)| Some(*date) >= cutoff)
        .collect();

    let earliest = points.iter().map(|(_, date, _)| *date).min();
    let days_since_earliest: Vec<i64> = points
        .iter()
        .map(|(_, date, _)| earliest.map_or(0, |first| (*date - first).num_days()))
        .collect();

    let trace = json!({
        "type": "scattergl",
        "mode": "markers",
        "x": points.iter().map(|(row, _, _)| row.log_members()).collect::<Vec<_>>(),
        "y": points.iter().map(|(_, _, score)| *score).collect::<Vec<_>>(),
        "text": points.iter().map(|(row, _, _)| hover_text(row)).collect::<Vec<_>>(),
        "hoverinfo": "y+text",
        "opacity": 0.6,
        "marker": {
            "size": 7,
            "color": days_since_earliest,
            "colorscale": "Electric",
            "colorbar": {"title": {"text": "Date", "side": "top"}, "tickvals": []},
        },
    });

    let title = "MAL Scores vs. Members, Date-colored";
    let mut layout = base_layout(title);
    layout["xaxis"] = axis("Ln(Members)");
    layout["yaxis"] = axis("Score");
    layout["showlegend"] = json!(false);
    Figure::new(title, vec![trace], layout)
}

fn score_members_isekai(rows: &[AnimeRow]) -> Figure {
    let group = |isekai: bool, name: &str, color: &str, size: u32| {
        let points: Vec<(&AnimeRow, f64)> = rows
            .iter()
            .filter(|row| row.title.is_some() && row.is_isekai() == isekai)
            .filter_map(|row| Some((row, row.score?)))
            .collect();
        json!({
            "type": "scattergl",
            "mode": "markers",
            "name": name,
            "x": points.iter().map(|(row, _)| row.members).collect::<Vec<_>>(),
            "y": points.iter().map(|(_, score)| *score).collect::<Vec<_>>(),
            "text": points.iter().map(|(row, _)| hover_text(row)).collect::<Vec<_>>(),
            "hoverinfo": "y+text",
            "opacity": 0.6,
            "marker": {"color": color, "size": size},
        })
    };

    let tick_values: Vec<f64> = (0..6).map(|exponent| 10f64.powi(exponent)).collect();
    let tick_text: Vec<String> = tick_values.iter().map(|v| format_thousands(*v)).collect();

    let title = "MAL Scores vs. Members, Isekai-colored";
    let mut layout = base_layout(title);
    layout["xaxis"] = axis("Members");
    layout["xaxis"]["type"] = json!("log");
    layout["xaxis"]["tickmode"] = json!("array");
    layout["xaxis"]["tickvals"] = json!(tick_values);
    layout["xaxis"]["ticktext"] = json!(tick_text);
    layout["yaxis"] = axis("Mean Score");
    layout["legend"] = legend("Genre");

    Figure::new(
        title,
        vec![
            group(false, "Other", "#f57fcc", 2),
            group(true, "Isekai", "#dfff00", 6),
        ],
        layout,
    )
}

/// Density histograms of one value for isekai and other entries, each with a
/// fitted normal curve.
fn double_distribution<F>(title: &str, rows: &[AnimeRow], value: F) -> Figure
where
    F: Fn(&AnimeRow) -> Option<f64>,
{
    let split = |isekai: bool| -> Vec<f64> {
        rows.iter()
            .filter(|row| row.is_isekai() == isekai)
            .filter_map(&value)
            .collect()
    };

    let mut traces = Vec::new();
    for (label, color, values) in [
        ("Isekai", ISEKAI_DIST_COLOR, split(true)),
        ("Not Isekai", OTHER_DIST_COLOR, split(false)),
    ] {
        traces.push(json!({
            "type": "histogram",
            "name": label,
            "legendgroup": label,
            "x": values,
            "histnorm": "probability density",
            "xbins": {"size": DISTRIBUTION_BIN_SIZE},
            "opacity": 0.7,
            "marker": {"color": color},
        }));
        if let Some((xs, ys)) = normal_curve(&values, CURVE_POINTS) {
            traces.push(json!({
                "type": "scatter",
                "mode": "lines",
                "name": label,
                "legendgroup": label,
                "showlegend": false,
                "x": xs,
                "y": ys,
                "line": {"color": color},
            }));
        }
    }

    let mut layout = base_layout(title);
    layout["barmode"] = json!("overlay");
    layout["legend"] = legend("Genre");
    Figure::new(title, traces, layout)
}

fn members_histogram(rows: &[AnimeRow]) -> Figure {
    let group = |isekai: bool, name: &str, color: &str| {
        let values: Vec<f64> = rows
            .iter()
            .filter(|row| row.is_isekai() == isekai)
            .map(AnimeRow::log_members)
            .collect();
        json!({
            "type": "histogram",
            "name": name,
            "x": values,
            "marker": {"color": color},
        })
    };

    let title = "Histogram of Isekai vs. Non-Isekai anime on MAL";
    let mut layout = base_layout(title);
    layout["barmode"] = json!("stack");
    layout["xaxis"] = axis("Ln(Members)");
    layout["yaxis"] = axis("Log(Count)");
    layout["yaxis"]["type"] = json!("log");
    layout["legend"] = legend("Genre");

    Figure::new(
        title,
        vec![
            group(false, "Other", "#00798C"),
            group(true, "Isekai", "#D1495B"),
        ],
        layout,
    )
}

fn base_layout(title: &str) -> Value {
    json!({
        "title": {
            "text": title,
            "x": 0.5,
            "xanchor": "center",
            "font": {"size": 25, "family": "Roboto Black"},
        },
        "font": {"family": "Roboto", "size": 15, "color": "#f2f5fa"},
        "paper_bgcolor": "#111111",
        "plot_bgcolor": "#111111",
    })
}

fn axis(title: &str) -> Value {
    json!({
        "title": {"text": title, "font": {"size": 20, "family": "Roboto Medium"}},
        "gridcolor": "#283442",
    })
}

fn legend(title: &str) -> Value {
    json!({
        "title": {"text": title},
        "font": {"size": 20, "family": "Roboto Medium"},
    })
}

fn hover_text(row: &AnimeRow) -> String {
    format!(
        "{}<br>Members: {}",
        row.title.as_deref().unwrap_or(""),
        format_thousands(row.members)
    )
}

/// Normal density with the sample's mean and (population) standard deviation,
/// sampled at `points` positions across the sample's range.
fn normal_curve(values: &[f64], points: usize) -> Option<(Vec<f64>, Vec<f64>)> {
    if values.len() < 2 || points < 2 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    if std_dev <= 0.0 || !std_dev.is_finite() {
        return None;
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let xs = linspace(min, max, points);
    let scale = 1.0 / (std_dev * (2.0 * std::f64::consts::PI).sqrt());
    let ys = xs
        .iter()
        .map(|x| scale * (-0.5 * ((x - mean) / std_dev).powi(2)).exp())
        .collect();
    Some((xs, ys))
}

/// `count` evenly spaced values from `start` to `end` inclusive.
///
/// Empty when the bounds are not finite (e.g. no data).
#[allow(clippy::cast_precision_loss)]
fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    if !start.is_finite() || !end.is_finite() || count == 0 {
        return Vec::new();
    }
    if count == 1 {
        return vec![start];
    }
    let step = (end - start) / (count - 1) as f64;
    (0..count).map(|i| start + step * i as f64).collect()
}

/// Truncates to an integer and groups thousands with commas.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn format_thousands(value: f64) -> String {
    let digits = (value.max(0.0) as u64).to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
