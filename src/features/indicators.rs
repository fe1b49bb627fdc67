//! Rolling indicator series over close prices
//!
//! Each function returns one value per input element; positions without a
//! full window are `None`.

/// Simple moving average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, v) in values.iter().enumerate() {
        sum += v;
        if i >= period {
            sum -= values[i - period];
        }
        if i + 1 >= period {
            out.push(Some(sum / period as f64));
        } else {
            out.push(None);
        }
    }
    out
}

/// Rolling sample standard deviation (n - 1 denominator)
pub fn rolling_std(values: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if period < 2 || i + 1 < period {
                return None;
            }
            let window = &values[i + 1 - period..=i];
            let mean = window.iter().sum::<f64>() / period as f64;
            let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (period - 1) as f64;
            Some(var.sqrt())
        })
        .collect()
}

/// Percentage change over `period` steps
pub fn rate_of_change(values: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if period == 0 || i < period {
                return None;
            }
            let base = values[i - period];
            if base == 0.0 {
                None
            } else {
                Some(values[i] / base - 1.0)
            }
        })
        .collect()
}

/// RSI from the simple rolling mean of gains and losses over `period` diffs
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if period == 0 || i < period {
                return None;
            }
            let (mut gain, mut loss) = (0.0, 0.0);
            for j in i + 1 - period..=i {
                let delta = values[j] - values[j - 1];
                if delta > 0.0 {
                    gain += delta;
                } else {
                    loss -= delta;
                }
            }
            let avg_gain = gain / period as f64;
            let avg_loss = loss / period as f64;
            Some(if avg_loss == 0.0 {
                if avg_gain == 0.0 {
                    50.0
                } else {
                    100.0
                }
            } else {
                100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
            })
        })
        .collect()
}
