//! Chart projection: candle window to drawing coordinates
//!
//! Pure functions over a candle window. The drawing surface is a fixed
//! 1000x300 box; prices map into a vertical band with fixed margins (higher
//! price, smaller y) and indices map into a horizontal band.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::domain::{Candle, ChartStyle};

pub const VIEW_WIDTH: f64 = 1000.0;
pub const VIEW_HEIGHT: f64 = 300.0;

/// Gap between the band's low edge and the bottom of the box
pub const BOTTOM_MARGIN: f64 = 40.0;
/// Height of the price band; the top margin is what remains
pub const BAND_HEIGHT: f64 = 220.0;
pub const LEFT_EDGE: f64 = 80.0;
pub const BAND_WIDTH: f64 = 840.0;

/// Horizontal span shared out between candle slots
pub const CANDLE_SLOT_SPAN: f64 = 800.0;
pub const CANDLE_BODY_FRACTION: f64 = 0.6;
pub const MIN_BODY_HEIGHT: f64 = 2.0;

const Y_LABEL_X: f64 = 75.0;
const X_LABEL_Y: f64 = 295.0;

/// Price bounds of the loaded window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartMetrics {
    pub min: f64,
    pub max: f64,
    /// `max - min`, floored at 1 so flat windows still project
    pub range: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// One candle: a high-low wick plus an open-close body
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CandleGlyph {
    pub x: f64,
    pub wick_top: f64,
    pub wick_bottom: f64,
    pub body_left: f64,
    pub body_top: f64,
    pub body_width: f64,
    pub body_height: f64,
    /// close >= open
    pub up: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ChartGeometry {
    Line(Vec<Point>),
    Candles(Vec<CandleGlyph>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisLabel {
    pub x: f64,
    pub y: f64,
    pub text: String,
}

/// Everything needed to draw the current window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartFrame {
    pub metrics: ChartMetrics,
    pub geometry: ChartGeometry,
    pub y_labels: Vec<AxisLabel>,
    pub x_labels: Vec<AxisLabel>,
}

fn as_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Bounds over all lows and highs. `None` for an empty window.
pub fn metrics(window: &[Candle]) -> Option<ChartMetrics> {
    if window.is_empty() {
        return None;
    }

    let min = window.iter().map(|c| c.low).min()?;
    let max = window.iter().map(|c| c.high).max()?;
    let (min, max) = (as_f64(min), as_f64(max));

    Some(ChartMetrics {
        min,
        max,
        range: (max - min).max(1.0),
    })
}

pub fn project_y(price: f64, metrics: &ChartMetrics) -> f64 {
    VIEW_HEIGHT - BOTTOM_MARGIN - ((price - metrics.min) / metrics.range) * BAND_HEIGHT
}

/// A single-candle window pins index 0 to the left edge.
pub fn project_x(index: usize, window_len: usize) -> f64 {
    if window_len <= 1 {
        return LEFT_EDGE;
    }
    LEFT_EDGE + (index as f64 / (window_len - 1) as f64) * BAND_WIDTH
}

/// Polyline through closing prices
pub fn line_points(window: &[Candle], metrics: &ChartMetrics) -> Vec<Point> {
    window
        .iter()
        .enumerate()
        .map(|(i, c)| Point {
            x: project_x(i, window.len()),
            y: project_y(as_f64(c.close), metrics),
        })
        .collect()
}

/// SVG path data (`M x y L x y ...`) for a polyline
pub fn line_path(points: &[Point]) -> String {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let cmd = if i == 0 { 'M' } else { 'L' };
            format!("{} {} {}", cmd, p.x, p.y)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn candle_glyphs(window: &[Candle], metrics: &ChartMetrics) -> Vec<CandleGlyph> {
    if window.is_empty() {
        return Vec::new();
    }
    let body_width = (CANDLE_SLOT_SPAN / window.len() as f64) * CANDLE_BODY_FRACTION;

    window
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let x = project_x(i, window.len());
            let open_y = project_y(as_f64(c.open), metrics);
            let close_y = project_y(as_f64(c.close), metrics);
            let up = c.is_up();

            CandleGlyph {
                x,
                wick_top: project_y(as_f64(c.high), metrics),
                wick_bottom: project_y(as_f64(c.low), metrics),
                body_left: x - body_width / 2.0,
                body_top: if up { close_y } else { open_y },
                body_width,
                body_height: (close_y - open_y).abs().max(MIN_BODY_HEIGHT),
                up,
            }
        })
        .collect()
}

/// Price labels at the bottom, middle and top of the band
pub fn y_labels(metrics: &ChartMetrics) -> Vec<AxisLabel> {
    [0.0, 0.5, 1.0]
        .iter()
        .map(|v| {
            let price = metrics.min + v * metrics.range;
            AxisLabel {
                x: Y_LABEL_X,
                y: VIEW_HEIGHT - BOTTOM_MARGIN - v * BAND_HEIGHT,
                text: format_usd(Decimal::from_f64_retain(price).unwrap_or_default()),
            }
        })
        .collect()
}

/// Open-time labels for the first, middle and last candle
pub fn x_labels(window: &[Candle]) -> Vec<AxisLabel> {
    if window.is_empty() {
        return Vec::new();
    }

    let mut indices = vec![0, window.len() / 2, window.len() - 1];
    indices.dedup();

    indices
        .into_iter()
        .map(|idx| AxisLabel {
            x: project_x(idx, window.len()),
            y: X_LABEL_Y,
            text: window[idx].open_time.format("%H:%M").to_string(),
        })
        .collect()
}

/// Project a window in the chosen style. `None` when there is nothing to draw.
pub fn project(window: &[Candle], style: ChartStyle) -> Option<ChartFrame> {
    let metrics = metrics(window)?;
    let geometry = match style {
        ChartStyle::Line => ChartGeometry::Line(line_points(window, &metrics)),
        ChartStyle::Candle => ChartGeometry::Candles(candle_glyphs(window, &metrics)),
    };

    Some(ChartFrame {
        metrics,
        geometry,
        y_labels: y_labels(&metrics),
        x_labels: x_labels(window),
    })
}

/// Whole-dollar price with thousands separators, e.g. `$64,210`.
/// Halves round away from zero.
pub fn format_usd(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let digits = rounded.abs().trunc().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn candle(i: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Candle {
        Candle {
            open_time: Utc.timestamp_opt(1_700_000_000 + i * 3600, 0).unwrap(),
            open,
            high,
            low,
            close,
        }
    }

    fn sample_window() -> Vec<Candle> {
        vec![
            candle(0, dec!(100), dec!(110), dec!(95), dec!(105)),
            candle(1, dec!(105), dec!(120), dec!(100), dec!(98)),
            candle(2, dec!(98), dec!(104), dec!(90), dec!(102)),
        ]
    }

    #[test]
    fn test_metrics_bound_every_candle() {
        let window = sample_window();
        let m = metrics(&window).unwrap();
        assert_eq!(m.min, 90.0);
        assert_eq!(m.max, 120.0);
        assert_eq!(m.range, 30.0);
        for c in &window {
            assert!(m.min <= as_f64(c.low));
            assert!(m.max >= as_f64(c.high));
        }
    }

    #[test]
    fn test_metrics_empty_and_flat() {
        assert!(metrics(&[]).is_none());

        let flat = vec![candle(0, dec!(5), dec!(5), dec!(5), dec!(5))];
        let m = metrics(&flat).unwrap();
        assert_eq!(m.range, 1.0);
        assert!(project_y(5.0, &m).is_finite());
    }

    #[test]
    fn test_project_y_inverted_and_monotonic() {
        let m = metrics(&sample_window()).unwrap();
        assert_eq!(project_y(m.min, &m), 260.0);
        assert_eq!(project_y(m.max, &m), 40.0);

        let mut prev = f64::INFINITY;
        for step in 0..=60 {
            let price = 85.0 + step as f64 * 0.75;
            let y = project_y(price, &m);
            assert!(y <= prev, "higher price must not move down");
            prev = y;
        }
    }

    #[test]
    fn test_project_x_edges() {
        assert_eq!(project_x(0, 24), 80.0);
        assert_eq!(project_x(23, 24), 920.0);
        assert_eq!(project_x(0, 1), 80.0);
        assert_eq!(project_x(0, 0), 80.0);
    }

    #[test]
    fn test_line_path_format() {
        let points = vec![Point { x: 80.0, y: 40.0 }, Point { x: 920.0, y: 260.0 }];
        assert_eq!(line_path(&points), "M 80 40 L 920 260");
        assert_eq!(line_path(&[]), "");
    }

    #[test]
    fn test_candle_glyphs() {
        let window = sample_window();
        let m = metrics(&window).unwrap();
        let glyphs = candle_glyphs(&window, &m);
        assert_eq!(glyphs.len(), 3);

        // 800 / 3 * 0.6
        assert!((glyphs[0].body_width - 160.0).abs() < 1e-9);
        assert!(glyphs[0].up);
        assert!(!glyphs[1].up);
        assert_eq!(glyphs[0].body_top, project_y(105.0, &m));
        assert_eq!(glyphs[1].body_top, project_y(105.0, &m));
        assert!(glyphs[0].wick_top < glyphs[0].wick_bottom);
    }

    #[test]
    fn test_zero_range_body_stays_visible() {
        let window = vec![
            candle(0, dec!(100), dec!(110), dec!(90), dec!(100)),
            candle(1, dec!(100), dec!(101), dec!(99), dec!(101)),
        ];
        let m = metrics(&window).unwrap();
        let glyphs = candle_glyphs(&window, &m);
        assert_eq!(glyphs[0].body_height, MIN_BODY_HEIGHT);
        assert!(glyphs[0].up);
    }

    #[test]
    fn test_project_frame_labels() {
        let window = sample_window();
        let frame = project(&window, ChartStyle::Line).unwrap();
        assert!(matches!(frame.geometry, ChartGeometry::Line(ref p) if p.len() == 3));

        let ys: Vec<f64> = frame.y_labels.iter().map(|l| l.y).collect();
        assert_eq!(ys, vec![260.0, 150.0, 40.0]);
        assert_eq!(frame.y_labels[0].text, "$90");
        assert_eq!(frame.y_labels[2].text, "$120");

        assert_eq!(frame.x_labels.len(), 3);
        assert_eq!(frame.x_labels[1].x, project_x(1, 3));

        assert!(project(&[], ChartStyle::Candle).is_none());
    }

    #[test]
    fn test_format_usd() {
        assert_eq!(format_usd(dec!(64210.49)), "$64,210");
        assert_eq!(format_usd(dec!(1234567.5)), "$1,234,568");
        assert_eq!(format_usd(dec!(999)), "$999");
        assert_eq!(format_usd(dec!(0)), "$0");
        assert_eq!(format_usd(dec!(-1500)), "-$1,500");
    }

    #[test]
    fn test_format_usd_rounds_halves_away_from_zero() {
        assert_eq!(format_usd(dec!(64210.5)), "$64,211");
        assert_eq!(format_usd(dec!(64211.5)), "$64,212");
        assert_eq!(format_usd(dec!(-2.5)), "-$3");
    }
}
