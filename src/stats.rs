//! Statistical utility functions shared across modules
//!
//! Robust location/scale estimators used by the significance evaluator,
//! moments used by the t-tests, equal-frequency binning used by the bias
//! diagnostic, and the LOWESS smoother used for gene weights.

use std::cmp::Ordering;

/// Consistency constant making the MAD estimate sigma for normal data
/// R equivalent: mad(x, constant = 1.4826)
pub const MAD_CONSTANT: f64 = 1.4826;

fn total_cmp(a: &f64, b: &f64) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

/// Arithmetic mean; NaN for empty input
pub fn mean(x: &[f64]) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    x.iter().sum::<f64>() / x.len() as f64
}

/// Sample variance (n - 1 denominator); NaN with fewer than two values
pub fn variance(x: &[f64]) -> f64 {
    let n = x.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(x);
    x.iter().map(|&v| (v - m) * (v - m)).sum::<f64>() / (n - 1) as f64
}

/// Sample standard deviation
pub fn std_dev(x: &[f64]) -> f64 {
    variance(x).sqrt()
}

/// Median; NaN for empty input
pub fn median(x: &[f64]) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    let mut sorted = x.to_vec();
    sorted.sort_by(total_cmp);
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}

/// Scaled median absolute deviation around the median
/// R equivalent: mad(x)
pub fn mad(x: &[f64]) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    let center = median(x);
    let deviations: Vec<f64> = x.iter().map(|&v| (v - center).abs()).collect();
    MAD_CONSTANT * median(&deviations)
}

/// Equal-frequency bins 1..=n_bins by rank, ties broken by position
/// R equivalent: dplyr::ntile(x, n_bins)
///
/// Bin sizes differ by at most one; the larger bins come first.
pub fn ntile(x: &[f64], n_bins: usize) -> Vec<usize> {
    let n = x.len();
    if n == 0 || n_bins == 0 {
        return vec![0; n];
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| total_cmp(&x[a], &x[b]).then(a.cmp(&b)));

    let base = n / n_bins;
    let larger = n % n_bins;

    let mut bins = vec![0; n];
    let mut rank = 0;
    for bin in 0..n_bins {
        let size = base + usize::from(bin < larger);
        for _ in 0..size {
            bins[order[rank]] = bin + 1;
            rank += 1;
        }
    }
    bins
}

/// LOWESS fit of `y` on `x`, returned in the original (unsorted) order
///
/// Sorts the pairs by `x`, runs [`lowess_smooth`] and scatters the fitted
/// values back so callers can keep their gene order.
pub fn lowess_fit(x: &[f64], y: &[f64], f: f64, nsteps: usize) -> Vec<f64> {
    assert_eq!(x.len(), y.len());
    let n = x.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| total_cmp(&x[a], &x[b]));

    let xs: Vec<f64> = order.iter().map(|&i| x[i]).collect();
    let ys: Vec<f64> = order.iter().map(|&i| y[i]).collect();
    let fitted_sorted = lowess_smooth(&xs, &ys, f, nsteps);

    let mut fitted = vec![0.0; n];
    for (k, &i) in order.iter().enumerate() {
        fitted[i] = fitted_sorted[k];
    }
    fitted
}

/// LOWESS (Locally Weighted Scatterplot Smoothing)
/// Faithful port of R's clowess() C implementation from lowess.c
///
/// * `x` - x values (must be sorted in ascending order)
/// * `y` - y values
/// * `f` - smoother span fraction (R default: 2/3)
/// * `nsteps` - number of robustness iterations (R default: 3)
pub fn lowess_smooth(x: &[f64], y: &[f64], f: f64, nsteps: usize) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return vec![];
    }
    if n == 1 {
        return vec![y[0]];
    }

    // R's lowess() wrapper uses delta = 0.01 * diff(range(x))
    let delta = 0.01 * (x[n - 1] - x[0]);

    let mut ys = vec![0.0; n];
    let mut rw = vec![0.0; n];
    let mut res = vec![0.0; n];

    clowess(x, y, f, nsteps, delta, &mut ys, &mut rw, &mut res);

    ys
}

/// Port of R's lowest() from lowess.c: weighted local linear fit at `xs`
///
/// Returns `None` if the total weight in the window is zero.
#[allow(clippy::too_many_arguments)]
fn lowest(
    x: &[f64],
    y: &[f64],
    n: usize,
    xs: f64,
    nleft: usize,
    nright: usize,
    w: &mut [f64],
    userw: bool,
    rw: &[f64],
) -> Option<f64> {
    let range = x[n - 1] - x[0];
    let h = f64::max(xs - x[nleft], x[nright] - xs);
    let h9 = 0.999 * h;
    let h1 = 0.001 * h;

    let mut a = 0.0_f64;
    let mut j = nleft;
    while j < n {
        w[j] = 0.0;
        let r = (x[j] - xs).abs();
        if r <= h9 {
            if r <= h1 {
                w[j] = 1.0;
            } else {
                // tricube
                let u = r / h;
                let t = 1.0 - u * u * u;
                w[j] = t * t * t;
            }
            if userw {
                w[j] *= rw[j];
            }
            a += w[j];
        } else if x[j] > xs {
            break;
        }
        j += 1;
    }

    let nrt = j - 1;

    if a <= 0.0 {
        return None;
    }

    for wj in &mut w[nleft..=nrt] {
        *wj /= a;
    }

    if h > 0.0 {
        a = 0.0;
        for j in nleft..=nrt {
            a += w[j] * x[j];
        }
        let b = xs - a;

        let mut c = 0.0;
        for j in nleft..=nrt {
            c += w[j] * (x[j] - a) * (x[j] - a);
        }

        if c.sqrt() > 0.001 * range {
            let b_over_c = b / c;
            for j in nleft..=nrt {
                w[j] *= b_over_c * (x[j] - a) + 1.0;
            }
        }
    }

    let mut ys = 0.0;
    for j in nleft..=nrt {
        ys += w[j] * y[j];
    }
    Some(ys)
}

/// Port of R's clowess() from lowess.c
/// Main LOWESS loop with robustness iterations and delta skipping.
#[allow(clippy::too_many_arguments)]
fn clowess(
    x: &[f64],
    y: &[f64],
    f: f64,
    nsteps: usize,
    delta: f64,
    ys: &mut [f64],
    rw: &mut [f64],
    res: &mut [f64],
) {
    let n = x.len();
    debug_assert!(n >= 2);

    // R: ns = imax2(2, imin2(n, (int)(f*n + 1e-7)))
    let ns = 2.max((n as isize).min((f * n as f64 + 1e-7) as isize)) as usize;

    let mut iter = 1usize;
    while iter <= nsteps + 1 {
        let mut nleft: usize = 0;
        let mut nright: usize = ns - 1;
        let mut last: isize = -1;
        let mut i: usize = 0;

        loop {
            if nright < n - 1 {
                let d1 = x[i] - x[nleft];
                let d2 = x[nright + 1] - x[i];
                if d1 > d2 {
                    nleft += 1;
                    nright += 1;
                    continue;
                }
            }

            let fit = lowest(x, y, n, x[i], nleft, nright, res, iter > 1, rw);
            ys[i] = fit.unwrap_or(y[i]);

            // Linear interpolation over points skipped by delta
            if last >= 0 && (last as usize) + 1 < i {
                let last_u = last as usize;
                let denom = x[i] - x[last_u];
                for j in (last_u + 1)..i {
                    let alpha = (x[j] - x[last_u]) / denom;
                    ys[j] = alpha * ys[i] + (1.0 - alpha) * ys[last_u];
                }
            }

            last = i as isize;
            let cut = x[i] + delta;

            let last_u = i;
            i = last_u + 1;
            while i < n {
                if x[i] > cut {
                    break;
                }
                if x[i] == x[last_u] {
                    ys[i] = ys[last_u];
                    last = i as isize;
                }
                i += 1;
            }

            let last_val = last as usize;
            i = (last_val + 1).max(i.saturating_sub(1));

            if last_val >= n - 1 {
                break;
            }
        }

        for i in 0..n {
            res[i] = y[i] - ys[i];
        }

        let sc = res.iter().map(|r| r.abs()).sum::<f64>() / n as f64;

        if iter > nsteps {
            break;
        }

        for i in 0..n {
            rw[i] = res[i].abs();
        }

        // cmad = 6 * median(|residuals|)
        let m1 = n / 2;
        let cmad = if n % 2 == 0 {
            rw.select_nth_unstable_by(m1, total_cmp);
            let val_m1 = rw[m1];
            let m2 = n - m1 - 1;
            rw[..m1].select_nth_unstable_by(m2, total_cmp);
            let val_m2 = rw[m2];
            3.0 * (val_m1 + val_m2)
        } else {
            rw.select_nth_unstable_by(m1, total_cmp);
            6.0 * rw[m1]
        };

        if cmad < 1e-7 * sc {
            break;
        }

        // bisquare robustness weights
        let c9 = 0.999 * cmad;
        let c1 = 0.001 * cmad;
        for i in 0..n {
            let r = res[i].abs();
            rw[i] = if r <= c1 {
                1.0
            } else if r <= c9 {
                let u = r / cmad;
                (1.0 - u * u) * (1.0 - u * u)
            } else {
                0.0
            };
        }

        iter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert!(median(&[]).is_nan());
    }

    #[test]
    fn test_mad_matches_r() {
        // R: mad(c(1, 2, 3, 4, 100)) = 1.4826
        let m = mad(&[1.0, 2.0, 3.0, 4.0, 100.0]);
        assert!((m - 1.4826).abs() < 1e-12);
    }

    #[test]
    fn test_mad_constant_input_is_zero() {
        assert_eq!(mad(&[0.0; 8]), 0.0);
    }

    #[test]
    fn test_variance() {
        let v = variance(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((v - 32.0 / 7.0).abs() < 1e-12);
        assert!(variance(&[1.0]).is_nan());
    }

    #[test]
    fn test_ntile_equal_frequency() {
        let x: Vec<f64> = (0..25).map(|i| (25 - i) as f64).collect();
        let bins = ntile(&x, 10);
        // 25 values into 10 bins: five bins of 3, five of 2
        let mut counts = [0usize; 10];
        for &b in &bins {
            assert!((1..=10).contains(&b));
            counts[b - 1] += 1;
        }
        assert_eq!(counts, [3, 3, 3, 3, 3, 2, 2, 2, 2, 2]);
        // Largest value (index 0) lands in the top bin
        assert_eq!(bins[0], 10);
        assert_eq!(bins[24], 1);
    }

    #[test]
    fn test_lowess_basic_linear() {
        let x = vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];
        let y: Vec<f64> = (0..11).map(|i| i as f64 * 10.0).collect();

        let fit = lowess_smooth(&x, &y, 0.5, 3);
        assert_eq!(fit.len(), x.len());
        for (i, &f_val) in fit.iter().enumerate() {
            let expected = i as f64 * 10.0;
            assert!(
                (f_val - expected).abs() < 5.0,
                "At index {}, expected ~{:.1}, got {:.1}",
                i,
                expected,
                f_val
            );
        }
    }

    #[test]
    fn test_lowess_robustness_iterations() {
        let x = vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];
        let y = vec![10.0, 12.0, 14.0, 50.0, 18.0, 20.0, 22.0, 24.0, 26.0, 28.0, 30.0];

        let fit_no_iter = lowess_smooth(&x, &y, 0.5, 0);
        let fit_with_iter = lowess_smooth(&x, &y, 0.5, 3);

        let error_no_iter = (fit_no_iter[3] - 16.0).abs();
        let error_with_iter = (fit_with_iter[3] - 16.0).abs();
        assert!(error_with_iter <= error_no_iter);
    }

    #[test]
    fn test_lowess_fit_restores_order() {
        let x = vec![3.0, 1.0, 2.0, 0.0];
        let y = vec![30.0, 10.0, 20.0, 0.0];
        let fit = lowess_fit(&x, &y, 1.0, 0);
        for (f, expected) in fit.iter().zip(y.iter()) {
            assert!((f - expected).abs() < 1e-8);
        }
    }

    #[test]
    fn test_lowess_single_point() {
        let fit = lowess_smooth(&[1.0], &[42.0], 0.5, 3);
        assert_eq!(fit, vec![42.0]);
    }
}
