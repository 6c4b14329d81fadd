//! Offline market feed producing a bounded random walk

use async_trait::async_trait;
use chrono::{Duration, DurationRound, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use std::sync::Mutex;

use super::binance_klines::MarketFeed;
use crate::domain::{Candle, Granularity};
use crate::error::Result;

/// Random-walk candle source for running without network access
pub struct SyntheticFeed {
    last_close: Mutex<Decimal>,
}

impl SyntheticFeed {
    pub fn new(start_price: Decimal) -> Self {
        Self {
            last_close: Mutex::new(start_price),
        }
    }

    fn step_duration(granularity: Granularity) -> Duration {
        match granularity {
            Granularity::Hourly => Duration::minutes(1),
            Granularity::Daily => Duration::hours(1),
            Granularity::Weekly => Duration::days(1),
        }
    }
}

#[async_trait]
impl MarketFeed for SyntheticFeed {
    async fn fetch_candles(&self, granularity: Granularity, limit: usize) -> Result<Vec<Candle>> {
        let step = Self::step_duration(granularity);
        let now = Utc::now();
        let end = now.duration_trunc(step).unwrap_or(now);
        let mut rng = rand::thread_rng();

        let mut price = *self
            .last_close
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut candles = Vec::with_capacity(limit);
        for i in 0..limit {
            let open = price;
            // +/- 0.5% per step, in basis points
            let drift = Decimal::new(rng.gen_range(-50..=50), 4);
            let close = (open * (Decimal::ONE + drift)).round_dp(2);
            let wick = Decimal::new(rng.gen_range(0..=20), 4);
            let high = (open.max(close) * (Decimal::ONE + wick)).round_dp(2);
            let low = (open.min(close) * (Decimal::ONE - wick)).round_dp(2);

            let offset = i32::try_from(limit - 1 - i).unwrap_or(i32::MAX);
            candles.push(Candle {
                open_time: end - step * offset,
                open,
                high,
                low,
                close,
            });
            price = close;
        }

        *self
            .last_close
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = price;

        Ok(candles)
    }
}
