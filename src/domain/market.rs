use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLC price sample over a fixed sub-interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl Candle {
    /// Check if candle closed up (close >= open)
    pub fn is_up(&self) -> bool {
        self.close >= self.open
    }

    /// Parse a kline tuple `[openTime, open, high, low, close, ...]`.
    ///
    /// Only the first five fields are consumed; prices arrive as strings.
    pub fn from_kline_row(row: &[serde_json::Value]) -> Option<Self> {
        if row.len() < 5 {
            return None;
        }

        let open_time = DateTime::from_timestamp_millis(row[0].as_i64()?)?;

        Some(Candle {
            open_time,
            open: parse_price(&row[1])?,
            high: parse_price(&row[2])?,
            low: parse_price(&row[3])?,
            close: parse_price(&row[4])?,
        })
    }
}

fn parse_price(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

/// Market view window preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// 1-minute candles over the last hour
    Hourly,
    /// 1-hour candles over the last day
    #[default]
    Daily,
    /// 1-day candles over the last week
    Weekly,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Granularity::Hourly, Granularity::Daily, Granularity::Weekly];

    /// Sub-interval in exchange notation
    pub fn interval(&self) -> &'static str {
        match self {
            Granularity::Hourly => "1m",
            Granularity::Daily => "1h",
            Granularity::Weekly => "1d",
        }
    }

    /// Number of samples in the window
    pub fn window_len(&self) -> usize {
        match self {
            Granularity::Hourly => 60,
            Granularity::Daily => 24,
            Granularity::Weekly => 7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hourly" | "1h" => Ok(Granularity::Hourly),
            "daily" | "1d" => Ok(Granularity::Daily),
            "weekly" | "1w" => Ok(Granularity::Weekly),
            other => Err(format!("unknown granularity: {other}")),
        }
    }
}

/// How the candle window is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChartStyle {
    #[default]
    Line,
    Candle,
}

impl std::str::FromStr for ChartStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "line" => Ok(ChartStyle::Line),
            "candle" | "candles" => Ok(ChartStyle::Candle),
            other => Err(format!("unknown chart style: {other}")),
        }
    }
}
