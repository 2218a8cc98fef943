//! Presentation timestamp continuity and timebase conversion.

use super::types::Rational;

/// Per-job timestamp state feeding the encoder.
///
/// Every corrected timestamp is strictly greater than the previous one.
/// Timestamps that already satisfy this pass through unchanged.
#[derive(Debug, Default, Clone)]
pub struct PresentationClock {
    last: Option<i64>,
    rewritten: usize,
}

impl PresentationClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `pts`, or `previous + 1` when it is missing or not increasing.
    ///
    /// A missing timestamp on the first frame becomes 0.
    pub fn correct(&mut self, pts: Option<i64>) -> i64 {
        let corrected = match (pts, self.last) {
            (Some(pts), Some(last)) if pts > last => pts,
            (Some(pts), None) => pts,
            (None, None) => 0,
            (_, Some(last)) => last.saturating_add(1),
        };
        if pts != Some(corrected) {
            self.rewritten += 1;
            log::trace!("pts {:?} rewritten to {}", pts, corrected);
        }
        self.last = Some(corrected);
        corrected
    }

    pub fn last(&self) -> Option<i64> {
        self.last
    }

    /// How many timestamps had to be rewritten.
    pub fn rewritten(&self) -> usize {
        self.rewritten
    }
}

/// Converts `value` from timebase `from` to timebase `to`, rounding to the
/// nearest integer with halves away from zero.
///
/// The intermediate product is computed in 128 bits; results outside `i64`
/// saturate.
pub fn rescale(value: i64, from: Rational, to: Rational) -> i64 {
    let mut num = i128::from(value) * i128::from(from.num) * i128::from(to.den);
    let mut den = i128::from(from.den) * i128::from(to.num);
    if den == 0 {
        return value;
    }
    if den < 0 {
        num = -num;
        den = -den;
    }
    let half = den / 2;
    let rounded = if num >= 0 {
        (num + half) / den
    } else {
        -((-num + half) / den)
    };
    rounded.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// [`rescale`] for optional timestamps.
pub fn rescale_opt(value: Option<i64>, from: Rational, to: Rational) -> Option<i64> {
    value.map(|v| rescale(v, from, to))
}
