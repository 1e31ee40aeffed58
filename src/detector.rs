//! Volume change detection between consecutive periods.

use rust_decimal::Decimal;
use tracing::debug;

use crate::models::{AlertCandidate, CandleReading, Direction};
use crate::monitor::config::{DirectionPolicy, TimeframeRules};

/// Percentage change of `current` against `previous`, or `None` when
/// `previous` is zero.
pub fn volume_change_pct(current: Decimal, previous: Decimal) -> Option<Decimal> {
    if previous.is_zero() {
        return None;
    }
    current
        .checked_sub(previous)?
        .checked_div(previous)?
        .checked_mul(Decimal::ONE_HUNDRED)
}

/// Compares two consecutive readings and returns a candidate when the
/// volume change satisfies the timeframe's threshold and direction policy.
///
/// Pure: the result depends only on the inputs. `detected_at` is stamped
/// onto the candidate unchanged.
pub fn detect(
    current: &CandleReading,
    previous: &CandleReading,
    rules: &TimeframeRules,
    detected_at: i64,
) -> Option<AlertCandidate> {
    let Some(change_pct) = volume_change_pct(current.volume, previous.volume) else {
        debug!(
            symbol = %current.symbol,
            timeframe = %current.timeframe,
            "previous volume is zero, skipping"
        );
        return None;
    };

    let direction = if change_pct.is_sign_negative() {
        Direction::Decrease
    } else {
        Direction::Increase
    };

    let qualifies = match rules.direction {
        DirectionPolicy::Increase => change_pct >= rules.threshold_pct,
        DirectionPolicy::Both => change_pct.abs() >= rules.threshold_pct,
    };
    if !qualifies {
        return None;
    }

    Some(AlertCandidate {
        symbol: current.symbol.clone(),
        timeframe: current.timeframe,
        change_pct: change_pct.round_dp(2),
        direction,
        current_price: current.close,
        current_volume: current.volume,
        previous_volume: previous.volume,
        open_time: current.open_time,
        detected_at,
    })
}
