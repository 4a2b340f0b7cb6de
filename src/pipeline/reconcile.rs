//! Grid reconciliation.
//!
//! Records whose frequency axis differs from a band's canonical axis by
//! no more than a relative tolerance are re-interpolated onto the
//! canonical grid. Interpolation is piecewise-linear, deterministic, and
//! reproduces the original sample exactly at exact axis matches.

/// Check whether a candidate axis matches the canonical one within a
/// relative tolerance at every index
///
/// **Public** - the classifier's accept/reconcile/reject gate
pub fn axis_within_tolerance(canonical: &[f64], candidate: &[f64], rel_tol: f64) -> bool {
    if canonical.len() != candidate.len() {
        return false;
    }
    canonical.iter().zip(candidate).all(|(&a, &b)| {
        let scale = a.abs().max(1.0);
        (a - b).abs() <= rel_tol * scale
    })
}

/// Re-interpolate `power` (sampled at `freqs`) onto the canonical axis
///
/// **Public** - invoked only when a record's grid differs from canonical
///
/// Targets outside the record's frequency range (possible near the
/// endpoints due to float drift) clamp to the nearest endpoint sample.
pub fn resample_onto(canonical: &[f64], freqs: &[f64], power: &[f32]) -> Vec<f32> {
    debug_assert_eq!(freqs.len(), power.len());

    canonical
        .iter()
        .map(|&target| interpolate(freqs, power, target))
        .collect()
}

/// Piecewise-linear interpolation with endpoint clamping
fn interpolate(freqs: &[f64], power: &[f32], target: f64) -> f32 {
    // Number of source points at or below the target
    let at_or_below = freqs.partition_point(|&f| f <= target);

    if at_or_below == 0 {
        return power[0];
    }
    if at_or_below == freqs.len() {
        return power[freqs.len() - 1];
    }

    let lo = at_or_below - 1;
    if freqs[lo] == target {
        // Exact match reproduces the original value bit-for-bit
        return power[lo];
    }

    let hi = at_or_below;
    let t = (target - freqs[lo]) / (freqs[hi] - freqs[lo]);
    (power[lo] as f64 + (power[hi] as f64 - power[lo] as f64) * t) as f32
}
