// Feature Engine
// Turns hourly candle history into normalized indicator rows for the direction model

use common::{Candle, FeatureVector, IndicatorSnapshot, SignalError};
use statrs::statistics::Statistics;

/// Candles before the current one in each feature window
pub const LOOKBACK: usize = 25;
/// Full trailing window (lookback + current candle)
pub const WINDOW: usize = LOOKBACK + 1;
pub const RSI_PERIOD: usize = 14;
pub const VOLATILITY_PERIOD: usize = 14;
pub const SHORT_MA_PERIOD: usize = 7;

/// Fixed normalization bounds
const RETURNS_BOUNDS: (f64, f64) = (-0.1, 0.1);
const VOLATILITY_BOUNDS: (f64, f64) = (0.0, 0.1);
const RSI_BOUNDS: (f64, f64) = (0.0, 100.0);
const MA_BAND: (f64, f64) = (0.8, 1.2);

/// Build one feature row per candle index in `[25, len - 1]`.
///
/// The row for index `i` uses the trailing window `candles[i-25..=i]`. Its
/// target is 1.0 if the following close is higher, 0.0 otherwise, and `None`
/// for the final row.
pub fn prepare_training_data(candles: &[Candle]) -> Result<Vec<FeatureVector>, SignalError> {
    if candles.len() < WINDOW {
        return Err(SignalError::InsufficientData {
            required: WINDOW,
            actual: candles.len(),
        });
    }

    let mut processed = Vec::with_capacity(candles.len() - LOOKBACK);

    for i in LOOKBACK..candles.len() {
        let window = &candles[i - LOOKBACK..=i];
        let current = &candles[i];

        let raw = IndicatorSnapshot {
            returns: period_return(candles[i - 1].close, current.close),
            volatility: calculate_volatility(window, VOLATILITY_PERIOD),
            ma7: calculate_ma(&window[window.len() - SHORT_MA_PERIOD..]),
            ma25: calculate_ma(window),
            rsi: calculate_rsi(window, RSI_PERIOD),
        };

        let target = candles.get(i + 1).map(|next| {
            if next.close > current.close {
                1.0
            } else {
                0.0
            }
        });

        let ma_min = current.close * MA_BAND.0;
        let ma_max = current.close * MA_BAND.1;

        processed.push(FeatureVector {
            timestamp: current.timestamp,
            close: current.close,
            normalized_returns: normalize(raw.returns, RETURNS_BOUNDS.0, RETURNS_BOUNDS.1),
            normalized_volatility: normalize(
                raw.volatility,
                VOLATILITY_BOUNDS.0,
                VOLATILITY_BOUNDS.1,
            ),
            normalized_ma7: normalize(raw.ma7, ma_min, ma_max),
            normalized_ma25: normalize(raw.ma25, ma_min, ma_max),
            normalized_rsi: normalize(raw.rsi, RSI_BOUNDS.0, RSI_BOUNDS.1),
            target,
            raw,
        });
    }

    Ok(processed)
}

/// Split labeled rows into model inputs and labels. The unlabeled final row
/// is left out so both outputs have the same length.
pub fn feature_matrix(data: &[FeatureVector]) -> (Vec<[f64; FeatureVector::NUM_FEATURES]>, Vec<f64>) {
    data.iter()
        .filter_map(|row| row.target.map(|target| (row.features(), target)))
        .unzip()
}

/// Linear map of `[min, max]` onto `[0, 1]`. Not clamped.
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    (value - min) / (max - min)
}

fn period_return(previous: f64, current: f64) -> f64 {
    (current - previous) / previous
}

/// Population standard deviation of the last `period` one-period returns.
pub fn calculate_volatility(window: &[Candle], period: usize) -> f64 {
    let start = window.len().saturating_sub(period + 1);
    let returns: Vec<f64> = window[start..]
        .windows(2)
        .map(|pair| period_return(pair[0].close, pair[1].close))
        .collect();

    if returns.is_empty() {
        return 0.0;
    }

    returns.iter().population_std_dev()
}

pub fn calculate_ma(candles: &[Candle]) -> f64 {
    candles.iter().map(|c| c.close).mean()
}

/// RSI over the last `period` close-to-close changes.
///
/// A window without losing periods divides by 1 instead of 0, so a steadily
/// rising series does not read 100.
pub fn calculate_rsi(window: &[Candle], period: usize) -> f64 {
    let start = window.len().saturating_sub(period + 1);
    let (gains, losses) = window[start..]
        .windows(2)
        .map(|pair| pair[1].close - pair[0].close)
        .fold((0.0, 0.0), |(gains, losses), change| {
            if change > 0.0 {
                (gains + change, losses)
            } else {
                (gains, losses - change)
            }
        });

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    let denominator = if avg_loss == 0.0 { 1.0 } else { avg_loss };

    100.0 - 100.0 / (1.0 + avg_gain / denominator)
}
