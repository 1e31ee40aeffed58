//! HTML rendering for alerts and command replies.

use std::fmt::Write;

use rust_decimal::Decimal;

use crate::limiter::RateLimiter;
use crate::models::AlertCandidate;
use crate::monitor::config::{DirectionPolicy, MonitorConfig, human_duration};

/// Renders an admitted candidate for delivery.
pub fn render_alert(alert: &AlertCandidate) -> String {
    format!(
        "<b>🚨 {symbol} VOLUME ALERT {arrow}</b>\n\
         \n\
         <b>⏱️ Timeframe:</b> {timeframe}\n\
         <b>💹 Current Price:</b> {price}\n\
         <b>📊 Volume Change:</b> <code>{change}</code>\n\
         \n\
         <b>⚠️ {label} VOLUME DETECTED</b>",
        symbol = escape(&alert.symbol),
        arrow = alert.direction.arrow(),
        timeframe = alert.timeframe,
        price = format_usd(alert.current_price),
        change = format_pct(alert.change_pct),
        label = alert.direction.label(),
    )
}

/// `$43,250.50`: two decimals with thousands separators.
pub fn format_usd(value: Decimal) -> String {
    let rounded = value.round_dp(2);
    let digits = format!("{:.2}", rounded.abs());
    let (whole, frac) = digits.split_once('.').unwrap_or((digits.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{sign}${grouped}.{frac}")
}

/// `+35.00%` / `-12.50%`: always signed, two decimals.
pub fn format_pct(value: Decimal) -> String {
    let rounded = value.round_dp(2);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-{:.2}%", rounded.abs())
    } else {
        format!("+{:.2}%", rounded.abs())
    }
}

/// Static description sent in reply to any private message.
pub fn welcome_message(config: &MonitorConfig) -> String {
    let mut out = String::from(
        "<b>🚀 Volume Alert Bot</b>\n\n\
         Real-time cryptocurrency volume alerts, delivered to this channel.\n\n\
         <b>📊 Features:</b>\n\
         • Real-time volume change detection\n",
    );
    for (timeframe, rules) in &config.timeframes {
        let _ = writeln!(
            out,
            "• <b>{timeframe} Timeframe:</b> Alerts on {}{}% volume changes",
            sign(rules.direction),
            rules.threshold_pct
        );
    }
    let _ = writeln!(out, "• Monitoring: {}", escape(&config.symbols.join(", ")));
    out.push_str(
        "\n<i>This bot operates automatically. \
         Alerts are posted when volume thresholds are met.</i>",
    );
    out
}

/// Reply to `/status`: run state, rules, and today's per-pair counters.
pub fn status_message(
    running: bool,
    config: &MonitorConfig,
    limiter: &RateLimiter,
    queued: usize,
    bot_username: Option<&str>,
) -> String {
    let (emoji, state) = if running {
        ("✅", "Bot is active")
    } else {
        ("🛑", "Bot is paused")
    };
    let checking = if running {
        format!(
            "Volume data checking every {}",
            human_duration(config.check_interval_secs)
        )
    } else {
        "Volume data not checking".to_string()
    };

    let mut out = String::from("<b>📊 Volume Alert Bot Status</b>\n\n");
    let _ = write!(out, "{emoji} <b>{state}</b>\n\n");
    let _ = write!(out, "⏱️ <b>{checking}</b>\n\n");
    out.push_str(&config.describe());

    out.push_str("\n<b>Alerts This Period:</b>\n");
    for (symbol, timeframes) in limiter.table() {
        for (timeframe, entry) in timeframes {
            let cap = limiter.cap_for(*timeframe).unwrap_or_default();
            let _ = writeln!(
                out,
                "• {} {timeframe}: {}/{cap}",
                escape(symbol),
                entry.count
            );
        }
    }
    let _ = writeln!(out, "• Queued: {queued}");

    let suffix = bot_username
        .map(|name| format!(" @{name}"))
        .unwrap_or_default();
    let _ = write!(
        out,
        "\n<b>Commands:</b>\n\
         • /start{suffix} - Activate monitoring\n\
         • /stop{suffix} - Pause monitoring\n\
         • /status{suffix} - Show this status\n\n\
         <i>Only the owner can control the bot with /start and /stop commands.</i>"
    );
    out
}

pub fn activated_reply(by: &str, config: &MonitorConfig) -> String {
    format!(
        "✅ Bot activated by {}\n\n📊 Volume alerts are now ACTIVE\n⏱️ Checking every {}",
        escape(by),
        human_duration(config.check_interval_secs)
    )
}

pub fn stopped_reply(by: &str) -> String {
    format!(
        "🛑 Bot stopped by {}\n\n⏸️ Volume alerts are now PAUSED",
        escape(by)
    )
}

/// Reply to a non-owner issuing an owner command; `action` is the verb.
pub fn refusal_reply(action: &str) -> String {
    format!("🚫 Only the bot owner can {action} the bot.")
}

fn sign(direction: DirectionPolicy) -> &'static str {
    match direction {
        DirectionPolicy::Increase => "+",
        DirectionPolicy::Both => "±",
    }
}

/// Escapes the three characters HTML parse mode treats specially.
pub(crate) fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
