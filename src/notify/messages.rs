//! Human-readable notification texts

use crate::ml_engine::TrainedModel;
use crate::persistence::TradeSummary;
use crate::types::Direction;

/// `£1,234.56`
pub fn format_gbp(amount: f64) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}£{}.{:02}", sign, grouped, cents % 100)
}

fn direction_badge(direction: Direction) -> String {
    match direction {
        Direction::Long => format!("🟢 {}", direction.label()),
        Direction::Short => format!("🔴 {}", direction.label()),
    }
}

pub fn skipped(reason: &str) -> String {
    format!("⏭️ Trade skipped: {}", reason)
}

pub fn trade_alert(direction: Direction, confidence: f64, action: &str, units: i64) -> String {
    format!(
        "{} {} signal\nConfidence: {:.2}\nUnits: {}",
        direction_badge(direction),
        action.to_uppercase(),
        confidence,
        units
    )
}

pub fn trade_error(error: &str) -> String {
    format!("❌ Trade error: {}", error)
}

pub fn retrained(model: &TrainedModel) -> String {
    format!(
        "🧠 Model retrained successfully.\nSamples: {}\nIn-sample accuracy: {:.1}%",
        model.samples,
        model.accuracy * 100.0
    )
}

pub fn retrain_failed(error: &str) -> String {
    format!("❌ Retrain failed: {}", error)
}

pub fn stats(summary: &TradeSummary) -> String {
    format!(
        "📊 Trade Performance Stats\n\
         • 📈 Total Trades: {}\n\
         • ✅ Wins: {}\n\
         • ❌ Losses: {}\n\
         • 🔥 Win Rate: {:.1}%\n\
         • 💰 Net P/L: {}",
        summary.total,
        summary.wins,
        summary.losses,
        summary.win_rate,
        format_gbp(summary.total_pl)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gbp_grouping() {
        assert_eq!(format_gbp(0.0), "£0.00");
        assert_eq!(format_gbp(12.345), "£12.35");
        assert_eq!(format_gbp(1234.5), "£1,234.50");
        assert_eq!(format_gbp(1_234_567.891), "£1,234,567.89");
        assert_eq!(format_gbp(-987.1), "-£987.10");
    }

    #[test]
    fn test_alert_shows_direction_and_units() {
        let text = trade_alert(Direction::Short, 0.734, "flip", -1000);
        assert_eq!(text, "🔴 Sell FLIP signal\nConfidence: 0.73\nUnits: -1000");
    }

    #[test]
    fn test_stats_message_uses_gbp() {
        let summary = TradeSummary {
            total: 3,
            wins: 2,
            losses: 1,
            win_rate: 66.666,
            total_pl: 1520.0,
        };
        let text = stats(&summary);
        assert!(text.contains("Win Rate: 66.7%"));
        assert!(text.contains("£1,520.00"));
    }
}
