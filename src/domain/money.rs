//! Fixed-precision money helpers.
//!
//! Every balance and amount is snapped to the same decimal grid before it is
//! compared, stored or returned, so conservation checks never see rounding
//! drift between the two legs of a transfer.

use rust_decimal::{Decimal, RoundingStrategy};

/// Highest scale `rust_decimal` can represent.
pub const MAX_PRECISION: u32 = 28;

/// Rounds `value` to `precision` fractional digits, ties away from zero.
///
/// The result always carries exactly `precision` digits of scale so that
/// rendered values line up (`81` becomes `81.00000` at precision 5).
pub fn normalize(value: Decimal, precision: u32) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(precision);
    rounded
}
