// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Aggregate Statistics
// ─────────────────────────────────────────────────────────────────────

pub use attractor_types::mean_of as mean;

/// Population standard deviation; `None` when empty.
pub fn population_std(xs: &[f64]) -> Option<f64> {
    let m = mean(xs)?;
    let var = xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / xs.len() as f64;
    Some(var.sqrt())
}

/// |mean_obs − mean_null| / std_null, or `None` when the null spread is
/// below `epsilon`.
pub fn sigma_separation(mean_obs: f64, mean_null: f64, std_null: f64, epsilon: f64) -> Option<f64> {
    if !(std_null > epsilon) {
        return None;
    }
    Some((mean_obs - mean_null).abs() / std_null)
}

/// Fraction of `xs` within `tolerance` of `target`.
pub fn fraction_within(xs: &[f64], target: f64, tolerance: f64) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().filter(|x| (*x - target).abs() < tolerance).count() as f64 / xs.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_population_std() {
        let s = population_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((s - 2.0).abs() < 1e-12);
        assert_eq!(population_std(&[]), None);
        assert_eq!(population_std(&[3.0]), Some(0.0));
    }

    #[test]
    fn test_sigma_separation_degenerate_null() {
        assert_eq!(sigma_separation(0.8, 0.75, 0.0, 1e-12), None);
        let s = sigma_separation(0.8, 0.75, 0.01, 1e-12).unwrap();
        assert!((s - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_fraction_within() {
        assert_eq!(fraction_within(&[0.75, 0.755, 0.8, 0.7], 0.75, 0.01), 0.5);
        assert_eq!(fraction_within(&[], 0.75, 0.01), 0.0);
    }
}
