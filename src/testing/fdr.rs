//! P-value adjustment for multiple testing
//!
//! NaN entries mark tests that were not carried out: they stay NaN and do not
//! count towards the number of tests.

/// Benjamini-Hochberg FDR correction
/// R equivalent: p.adjust(method = "BH")
pub fn benjamini_hochberg(pvalues: &[f64]) -> Vec<f64> {
    let n = pvalues.len();
    if n == 0 {
        return vec![];
    }

    // NaN sorts last
    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| {
        let (pa, pb) = (pvalues[a], pvalues[b]);
        match (pa.is_nan(), pb.is_nan()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => pa.total_cmp(&pb),
        }
    });

    let m = pvalues.iter().filter(|p| p.is_finite()).count();
    if m == 0 {
        return vec![f64::NAN; n];
    }

    let mut padj = vec![f64::NAN; n];
    let mut cummin = f64::INFINITY;
    let mut rank = m;

    for &i in indices.iter().rev() {
        let p = pvalues[i];

        if p.is_finite() {
            let adj = (p * m as f64 / rank as f64).min(1.0);
            cummin = cummin.min(adj);
            padj[i] = cummin;
            rank -= 1;
        }
    }

    padj
}

/// Bonferroni family-wise error rate correction
/// R equivalent: p.adjust(method = "bonferroni")
pub fn bonferroni(pvalues: &[f64]) -> Vec<f64> {
    let m = pvalues.iter().filter(|p| p.is_finite()).count();
    if m == 0 {
        return vec![f64::NAN; pvalues.len()];
    }
    pvalues
        .iter()
        .map(|&p| {
            if p.is_nan() {
                f64::NAN
            } else {
                (p * m as f64).min(1.0)
            }
        })
        .collect()
}

/// Adjust optional p-values, `None` meaning "not tested"
pub fn adjust_optional(pvalues: &[Option<f64>], method: fn(&[f64]) -> Vec<f64>) -> Vec<Option<f64>> {
    let raw: Vec<f64> = pvalues.iter().map(|p| p.unwrap_or(f64::NAN)).collect();
    method(&raw)
        .into_iter()
        .map(|p| p.is_finite().then_some(p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bh_not_below_raw() {
        let pvalues = vec![0.01, 0.04, 0.03, 0.02];
        let padj = benjamini_hochberg(&pvalues);

        for (p, adj) in pvalues.iter().zip(padj.iter()) {
            assert!(*adj >= *p);
            assert!(*adj <= 1.0);
        }
    }

    #[test]
    fn test_bh_with_nan() {
        let pvalues = vec![0.01, f64::NAN, 0.03, 0.02];
        let padj = benjamini_hochberg(&pvalues);

        assert!(padj[0].is_finite());
        assert!(padj[1].is_nan());
        assert!((padj[2] - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_bh_monotone_in_raw_order() {
        let pvalues = vec![0.2, 0.001, 0.05, 0.01, 0.5, 0.04];
        let padj = benjamini_hochberg(&pvalues);

        let mut order: Vec<usize> = (0..pvalues.len()).collect();
        order.sort_by(|&a, &b| pvalues[a].total_cmp(&pvalues[b]));
        for w in order.windows(2) {
            assert!(padj[w[0]] <= padj[w[1]]);
        }
    }

    #[test]
    fn test_bonferroni_not_below_raw() {
        let pvalues = vec![0.001, 0.2, f64::NAN, 0.6];
        let padj = bonferroni(&pvalues);
        assert!((padj[0] - 0.003).abs() < 1e-12);
        assert!((padj[1] - 0.6).abs() < 1e-12);
        assert!(padj[2].is_nan());
        assert_eq!(padj[3], 1.0);
        for (p, adj) in pvalues.iter().zip(padj.iter()).filter(|(p, _)| p.is_finite()) {
            assert!(adj >= p);
        }
    }

    #[test]
    fn test_adjust_optional_skips_untested() {
        let padj = adjust_optional(&[Some(0.01), None, Some(0.02)], bonferroni);
        assert_eq!(padj[1], None);
        assert!((padj[0].unwrap() - 0.02).abs() < 1e-12);
    }
}
