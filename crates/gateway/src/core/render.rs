//! Notification rendering: multi-line UTF-8 text with explicit numeric
//! levels, capped at the transport limit.

use chrono::{DateTime, SecondsFormat};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::derivation::format_price;
use crate::types::{B1Kind, Candidate, ExecReason, Lean, LevelsRecord, Timeframe, TradeFrame};

/// Everything needed to render one invocation's notification.
pub struct RenderInput<'a> {
    pub driver_tf: Timeframe,
    pub force: bool,
    pub dry: bool,
    pub now_ms: i64,
    pub winners: &'a [Candidate],
    pub btc_symbol: &'a str,
    pub drilldown_base_url: &'a str,
    pub max_chars: usize,
}

/// Render the full notification message.
///
/// Per-symbol blocks are appended while they fit under the cap (minus the
/// trailing drilldown line, which is always kept).
#[must_use]
pub fn render_message(input: &RenderInput) -> String {
    let mut header = format!("Perp signals [{}]", input.driver_tf);
    if input.force {
        header.push_str(" [FORCE]");
    }
    if input.dry {
        header.push_str(" [DRY]");
    }

    let timestamp = DateTime::from_timestamp_millis(input.now_ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default();

    let drilldown = drilldown_url(input);
    // Reserve room for the drilldown line and the truncation marker.
    let budget = input.max_chars.saturating_sub(drilldown.len() + 16);

    let mut message = format!("{header}\n{timestamp}\n");
    for candidate in input.winners {
        let block = render_block(candidate);
        if message.len() + block.len() + 1 > budget {
            message.push_str("(truncated)\n");
            break;
        }
        message.push('\n');
        message.push_str(&block);
    }

    message.push('\n');
    message.push_str(&drilldown);
    message
}

/// One symbol's block: header, entry line, grade, leverage, frame.
fn render_block(c: &Candidate) -> String {
    let hi = c.levels_1h.hi.map(format_price).unwrap_or_else(|| "?".into());
    let lo = c.levels_1h.lo.map(format_price).unwrap_or_else(|| "?".into());

    let mut block = format!(
        "{symbol} {price} {bias} ({mode}) | 1h {hi} / {lo}\n",
        symbol = c.symbol,
        price = format_price(c.price),
        bias = c.bias.as_str().to_uppercase(),
        mode = c.mode,
    );

    block.push_str(&format!(
        "Entry: {reason} | {detail}\n",
        reason = c.exec_reason,
        detail = entry_detail(c),
    ));

    block.push_str(&format!("Confidence: {}\n", c.grade));

    if let Some(band) = c.leverage {
        block.push_str(&format!("Leverage: x{}-x{}\n", band.low, band.high));
    }

    if let Some(frame) = &c.frame {
        block.push_str(&format!(
            "Zone: {from}-{to} | SL {sl} | TP {tp}\n",
            from = format_price(frame.zone_from),
            to = format_price(frame.zone_to),
            sl = format_price(frame.stop),
            tp = format_price(frame.take_profit),
        ));
    }

    block
}

/// Human-readable entry detail referencing explicit numeric levels.
fn entry_detail(c: &Candidate) -> String {
    let hi = c.levels_1h.hi.map(format_price).unwrap_or_else(|| "?".into());
    let lo = c.levels_1h.lo.map(format_price).unwrap_or_else(|| "?".into());
    let price = format_price(c.price);

    match c.exec_reason {
        ExecReason::LongBreakout => format!("breakout above 1h high {hi}"),
        ExecReason::LongSweepReclaim => format!("swept 1h low {lo}, reclaimed at {price}"),
        ExecReason::ShortBreakdown => format!("breakdown below 1h low {lo}"),
        ExecReason::ShortSweepReject => format!("swept 1h high {hi}, rejected at {price}"),
        ExecReason::LongBreak => format!("break above 1h high {hi}"),
        ExecReason::ShortBreak => format!("break below 1h low {lo}"),
        ExecReason::LongReversal => format!("reversal from 1h low {lo} edge band"),
        ExecReason::ShortReversal => format!("reversal from 1h high {hi} edge band"),
    }
}

/// Drilldown URL scoped to the alerted symbols plus BTC.
fn drilldown_url(input: &RenderInput) -> String {
    let mut symbols: Vec<&str> = input.winners.iter().map(|c| c.symbol.as_str()).collect();
    if !symbols.contains(&input.btc_symbol) {
        symbols.push(input.btc_symbol);
    }
    format!(
        "{base}?symbols={list}",
        base = input.drilldown_base_url,
        list = symbols.join(",")
    )
}

/// Copy-only entry zone / stop / take-profit framing from the 1h range.
///
/// Break entries frame from the broken level to the current price and
/// target half a range beyond; reversal entries frame the edge band itself
/// and target the range midpoint.
#[must_use]
pub fn compute_frame(
    bias: Lean,
    price: Decimal,
    levels: &LevelsRecord,
    edge_pct: Decimal,
    breakout: bool,
) -> Option<TradeFrame> {
    let (hi, lo) = (levels.hi?, levels.lo?);
    let range = hi - lo;
    if range <= Decimal::ZERO {
        return None;
    }
    let edge = edge_pct * range;
    let half_range = range / dec!(2);

    let frame = match (bias, breakout) {
        (Lean::Long, true) => TradeFrame {
            zone_from: hi,
            zone_to: price.max(hi),
            stop: lo,
            take_profit: hi + half_range,
        },
        (Lean::Long, false) => TradeFrame {
            zone_from: lo,
            zone_to: lo + edge,
            stop: lo,
            take_profit: (hi + lo) / dec!(2),
        },
        (Lean::Short, true) => TradeFrame {
            zone_from: price.min(lo),
            zone_to: lo,
            stop: hi,
            take_profit: lo - half_range,
        },
        (Lean::Short, false) => TradeFrame {
            zone_from: hi - edge,
            zone_to: hi,
            stop: hi,
            take_profit: (hi + lo) / dec!(2),
        },
        (Lean::Neutral, _) => return None,
    };

    Some(frame)
}

/// Whether an exec reason took a break/breakout path (for framing).
#[must_use]
pub fn is_breakout_path(c: &Candidate) -> bool {
    matches!(c.b1.kind, Some(B1Kind::BreakAbove | B1Kind::BreakBelow))
}
