//! Mechanical confidence grading. Three classes, rule-based, no scoring.

use rust_decimal::Decimal;

use crate::types::{ExecReason, Grade, Lean};

/// Grade a winning candidate.
///
/// - A: strong B1, reversal-confirmed entry, 15m OI aligned with the bias,
///   1h lean aligned with the bias.
/// - B: strong B1, reversal-confirmed entry, 15m OI neutral.
/// - C: everything else (including breakout-only entries).
#[must_use]
pub fn grade_candidate(
    exec: ExecReason,
    b1_strong: bool,
    bias: Lean,
    lean_15m: Lean,
    oi_15m: Option<Decimal>,
    lean_1h: Lean,
    shock_oi_min: Decimal,
) -> Grade {
    let reversal_confirmed = exec.is_reversal();
    let oi_aligned = lean_15m == bias;
    let oi_neutral =
        lean_15m.is_neutral() || oi_15m.map_or(true, |oi| oi.abs() < shock_oi_min);
    let one_hour_aligned = lean_1h == bias;

    if b1_strong && reversal_confirmed && oi_aligned && one_hour_aligned {
        Grade::A
    } else if b1_strong && reversal_confirmed && oi_neutral {
        Grade::B
    } else {
        Grade::C
    }
}
