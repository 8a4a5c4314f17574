//! Weighted variant selection.
//!
//! Every variant contributes `max(1, weight)` slots to a line of `total`
//! slots; a draw `r` in `[1, total]` picks the variant whose slot range
//! contains it. Iteration order is the caller's, so the same ordered input
//! and the same `r` always produce the same variant.

use rand::Rng as _;

use crate::experiment::Variant;

// ─── Random sources ──────────────────────────────────────────────────────────

/// A source of uniformly distributed draws.
pub trait RandomSource {
  /// Return an integer uniformly distributed in `[1, upper]`.
  /// `upper` is always at least 1.
  fn draw(&mut self, upper: u64) -> u64;
}

/// Draws from the thread-local CSPRNG (`rand::rng()`), which is seeded from
/// the operating system and periodically reseeded.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
  fn draw(&mut self, upper: u64) -> u64 { rand::rng().random_range(1..=upper) }
}

/// Always draws the same value, clamped into `[1, upper]`.
#[derive(Debug, Clone, Copy)]
pub struct FixedDraw(pub u64);

impl RandomSource for FixedDraw {
  fn draw(&mut self, upper: u64) -> u64 { self.0.clamp(1, upper) }
}

// ─── Selection ───────────────────────────────────────────────────────────────

/// Sum of effective weights. Equals `variants.len()` when every weight is 0.
pub fn total_weight(variants: &[Variant]) -> u64 {
  variants.iter().map(Variant::effective_weight).sum()
}

/// Draw from `rng` and pick a variant. Returns `None` only for empty input.
pub fn select<'a, R>(variants: &'a [Variant], rng: &mut R) -> Option<&'a Variant>
where
  R: RandomSource + ?Sized,
{
  if variants.is_empty() {
    return None;
  }
  let r = rng.draw(total_weight(variants));
  pick(variants, r)
}

/// Pick the variant whose cumulative weight first reaches `r`.
///
/// If `r` lies beyond the total (which a correct draw never produces) the
/// first variant is returned and the miss is logged.
pub fn pick(variants: &[Variant], r: u64) -> Option<&Variant> {
  let first = variants.first()?;

  let mut cumulative = 0u64;
  for variant in variants {
    cumulative += variant.effective_weight();
    if r <= cumulative {
      return Some(variant);
    }
  }

  tracing::error!(
    r,
    total = cumulative,
    variant_count = variants.len(),
    "weighted draw fell past the last variant; falling back to the first",
  );
  Some(first)
}
