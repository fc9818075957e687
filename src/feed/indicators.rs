//! Technical indicators over a price history (oldest first)

/// Indicator names published by the simulator
pub const RSI: &str = "RSI";
pub const SMA_20: &str = "SMA 20";
pub const SMA_50: &str = "SMA 50";
pub const EMA_10: &str = "EMA 10";
pub const MACD: &str = "MACD";

/// Neutral RSI reported while history is too short
pub const NEUTRAL_RSI: f64 = 50.0;

/// Relative strength index using simple averages over the last `periods`
/// price changes
///
/// Returns 50 when fewer than `periods + 1` prices exist and 100 when the
/// window has no losses.
pub fn rsi(prices: &[f64], periods: usize) -> f64 {
    if periods == 0 || prices.len() < periods + 1 {
        return NEUTRAL_RSI;
    }

    let window = &prices[prices.len() - periods - 1..];
    let (gain, loss) = window
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold((0.0, 0.0), |(gain, loss), change| {
            if change >= 0.0 {
                (gain + change, loss)
            } else {
                (gain, loss - change)
            }
        });

    let avg_gain = gain / periods as f64;
    let avg_loss = loss / periods as f64;
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// Mean of the last `periods` prices, or `None` without enough history
pub fn sma(prices: &[f64], periods: usize) -> Option<f64> {
    if periods == 0 || prices.len() < periods {
        return None;
    }
    let tail = &prices[prices.len() - periods..];
    Some(tail.iter().sum::<f64>() / periods as f64)
}

/// Exponential moving average seeded with the SMA of the first `periods`
/// prices
///
/// With less history than `periods` this is the plain mean of what exists.
pub fn ema(prices: &[f64], periods: usize) -> Option<f64> {
    if prices.is_empty() || periods == 0 {
        return None;
    }
    if prices.len() < periods {
        return Some(prices.iter().sum::<f64>() / prices.len() as f64);
    }

    let seed = prices[..periods].iter().sum::<f64>() / periods as f64;
    let k = 2.0 / (periods as f64 + 1.0);
    Some(
        prices[periods..]
            .iter()
            .fold(seed, |ema, price| price * k + ema * (1.0 - k)),
    )
}

/// EMA(12) minus EMA(26), available once 26 prices exist
pub fn macd(prices: &[f64]) -> Option<f64> {
    if prices.len() < 26 {
        return None;
    }
    Some(ema(prices, 12)? - ema(prices, 26)?)
}
