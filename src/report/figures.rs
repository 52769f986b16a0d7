//! SVG figures for the HTML reports
//!
//! Every figure is rendered into an in-memory SVG document so it can be
//! inlined into a self-contained report.

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters_svg::SVGBackend;

use crate::error::{Result, SspaError};
use crate::io::{AlignmentStats, AssignmentSummary};
use crate::qc::{BiasCell, LibraryStats, PcaResult};

const WIDTH: u32 = 800;
const HEIGHT: u32 = 500;
const HISTOGRAM_BINS: usize = 30;

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for SspaError {
    fn from(e: DrawingAreaErrorKind<E>) -> Self {
        SspaError::Plot { reason: e.to_string() }
    }
}

type Area<'a> = DrawingArea<SVGBackend<'a>, Shift>;

/// Render onto a white canvas and return the SVG markup
fn render<F>(size: (u32, u32), draw: F) -> Result<String>
where
    F: FnOnce(&Area<'_>) -> Result<()>,
{
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, size).into_drawing_area();
        root.fill(&WHITE)?;
        draw(&root)?;
        root.present()?;
    }
    Ok(svg)
}

fn no_data(root: &Area<'_>, title: &str) -> Result<()> {
    let (w, h) = root.dim_in_pixel();
    root.draw(&Text::new(
        format!("{}: no data", title),
        (w as i32 / 2 - 80, h as i32 / 2),
        ("sans-serif", 20).into_font().color(&BLACK),
    ))?;
    Ok(())
}

/// Blue (negative) to white to red (positive); `value` in [-1, 1]
pub fn diverging_color(value: f64) -> RGBColor {
    let v = if value.is_finite() { value.clamp(-1.0, 1.0) } else { 0.0 };
    let fade = |x: f64| (255.0 * (1.0 - x)) as u8;
    if v < 0.0 {
        RGBColor(fade(-v), fade(-v), 255)
    } else {
        RGBColor(255, fade(v), fade(v))
    }
}

/// One stacked bar per sample; `percent(c, s)` is category `c` of sample `s`
fn stacked_percent_bars<F>(
    root: &Area<'_>,
    title: &str,
    samples: &[String],
    categories: &[String],
    percent: F,
) -> Result<()>
where
    F: Fn(usize, usize) -> f64,
{
    if samples.is_empty() || categories.is_empty() {
        return no_data(root, title);
    }

    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 20))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d((0..samples.len()).into_segmented(), 0f64..100f64)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(samples.len())
        .x_label_formatter(&|v| match v {
            SegmentValue::CenterOf(i) => samples.get(*i).cloned().unwrap_or_default(),
            _ => String::new(),
        })
        .y_desc("% of reads")
        .draw()?;

    for (c, category) in categories.iter().enumerate() {
        let color = Palette99::pick(c);
        let bars = (0..samples.len()).map(|s| {
            let bottom: f64 = (0..c).map(|prev| percent(prev, s)).sum();
            let top = bottom + percent(c, s);
            let mut bar = Rectangle::new(
                [(SegmentValue::Exact(s), bottom), (SegmentValue::Exact(s + 1), top)],
                color.filled(),
            );
            bar.set_margin(0, 0, 4, 4);
            bar
        });
        let legend_color = color.to_rgba();
        chart
            .draw_series(bars)?
            .label(category.as_str())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], legend_color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(WHITE.mix(0.85))
        .border_style(BLACK)
        .draw()?;
    Ok(())
}

/// Aligner outcome of every read, stacked per sample
pub fn alignment_bars(stats: &[AlignmentStats]) -> Result<String> {
    let samples: Vec<String> = stats.iter().map(|s| s.sample.clone()).collect();
    let categories: Vec<String> = stats
        .first()
        .map(|s| s.categories().iter().map(|(name, _)| name.to_string()).collect())
        .unwrap_or_default();
    render((WIDTH, HEIGHT), |root| {
        stacked_percent_bars(root, "Alignment", &samples, &categories, |c, s| stats[s].categories()[c].1)
    })
}

/// Read-counter assignment categories, stacked per sample
pub fn assignment_bars(summary: &AssignmentSummary) -> Result<String> {
    let totals = summary.totals();
    render((WIDTH, HEIGHT), |root| {
        stacked_percent_bars(root, "Gene assignment", &summary.samples, &summary.categories, |c, s| {
            if totals[s] > 0 {
                100.0 * summary.counts[c][s] as f64 / totals[s] as f64
            } else {
                0.0
            }
        })
    })
}

/// Library size per sample in millions of reads
pub fn library_bars(stats: &[LibraryStats]) -> Result<String> {
    render((WIDTH, HEIGHT), |root| {
        if stats.is_empty() {
            return no_data(root, "Library sizes");
        }
        let max = stats.iter().map(|s| s.library_size / 1e6).fold(0.0, f64::max).max(1e-6);

        let mut chart = ChartBuilder::on(root)
            .caption("Library sizes", ("sans-serif", 20))
            .margin(20)
            .x_label_area_size(60)
            .y_label_area_size(60)
            .build_cartesian_2d((0..stats.len()).into_segmented(), 0f64..max * 1.05)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(stats.len())
            .x_label_formatter(&|v| match v {
                SegmentValue::CenterOf(i) => stats.get(*i).map(|s| s.sample.clone()).unwrap_or_default(),
                _ => String::new(),
            })
            .y_desc("Assigned reads (millions)")
            .draw()?;

        chart.draw_series(stats.iter().enumerate().map(|(i, s)| {
            let mut bar = Rectangle::new(
                [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), s.library_size / 1e6)],
                BLUE.mix(0.7).filled(),
            );
            bar.set_margin(0, 0, 4, 4);
            bar
        }))?;
        Ok(())
    })
}

/// First two principal components, coloured by composite group
///
/// `groups` follows the sample order of the PCA.
pub fn pca_scatter(pca: &PcaResult, groups: &[String]) -> Result<String> {
    render((WIDTH, HEIGHT), |root| {
        if pca.n_components() == 0 || pca.sample_ids.is_empty() {
            return no_data(root, "PCA");
        }
        let x: Vec<f64> = pca.scores.column(0).to_vec();
        let y: Vec<f64> = if pca.n_components() > 1 {
            pca.scores.column(1).to_vec()
        } else {
            vec![0.0; x.len()]
        };
        let range = |v: &[f64]| {
            let lo = v.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let pad = ((hi - lo) * 0.1).max(1e-3);
            (lo - pad)..(hi + pad)
        };

        let pct = |k: usize| pca.variance_explained.get(k).map_or(0.0, |v| v * 100.0);
        let mut chart = ChartBuilder::on(root)
            .caption("PCA of logCPM", ("sans-serif", 20))
            .margin(20)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(range(&x), range(&y))?;

        chart
            .configure_mesh()
            .x_desc(format!("PC1 ({:.1}%)", pct(0)))
            .y_desc(format!("PC2 ({:.1}%)", pct(1)))
            .draw()?;

        let mut labels: Vec<&String> = groups.iter().collect();
        labels.sort();
        labels.dedup();
        for (g, label) in labels.into_iter().enumerate() {
            let color = Palette99::pick(g).to_rgba();
            let points = (0..x.len())
                .filter(|&i| groups.get(i) == Some(label))
                .map(|i| Circle::new((x[i], y[i]), 6, color.filled()));
            chart
                .draw_series(points)?
                .label(label.as_str())
                .legend(move |(px, py)| Circle::new((px + 5, py), 5, color.filled()));
        }

        chart.draw_series(x.iter().zip(&y).zip(&pca.sample_ids).map(|((&px, &py), name)| {
            Text::new(name.clone(), (px, py), ("sans-serif", 11).into_font())
        }))?;

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.85))
            .border_style(BLACK)
            .draw()?;
        Ok(())
    })
}

/// Length-bin x GC-bin bubbles for one component
///
/// Colour encodes the t statistic, radius the number of genes and opacity
/// whether the cell is significant.
pub fn bias_bubbles(cells: &[BiasCell], component: usize, n_bins: usize) -> Result<String> {
    let cells: Vec<&BiasCell> = cells.iter().filter(|c| c.component == component).collect();
    let title = format!("PC{} loadings by gene length and GC content", component);
    render((600, 600), |root| {
        if cells.is_empty() || n_bins == 0 {
            return no_data(root, &title);
        }
        let max_n = cells.iter().map(|c| c.n).max().unwrap_or(1).max(1) as f64;
        let max_t = cells
            .iter()
            .filter_map(|c| c.t)
            .map(f64::abs)
            .fold(0.0, f64::max)
            .max(1e-9);

        let upper = n_bins as f64 + 0.5;
        let mut chart = ChartBuilder::on(root)
            .caption(&title, ("sans-serif", 18))
            .margin(20)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(0.5f64..upper, 0.5f64..upper)?;

        chart
            .configure_mesh()
            .x_labels(n_bins)
            .y_labels(n_bins)
            .x_label_formatter(&|v| format!("{:.0}", v))
            .y_label_formatter(&|v| format!("{:.0}", v))
            .x_desc("Length bin")
            .y_desc("GC bin")
            .draw()?;

        chart.draw_series(cells.iter().filter(|c| c.n > 0).map(|c| {
            let radius = (4.0 + 16.0 * (c.n as f64 / max_n).sqrt()) as i32;
            let opacity = if c.significant { 1.0 } else { 0.35 };
            let color = diverging_color(c.t.unwrap_or(0.0) / max_t).mix(opacity);
            Circle::new((c.length_bin as f64, c.gc_bin as f64), radius, color.filled())
        }))?;
        Ok(())
    })
}

/// Histogram of a pathway's permuted null with the observed scores marked
pub fn null_histogram(pathway: &str, null: &[f64], observed: &[f64]) -> Result<String> {
    let title = format!("{}: permuted null", pathway);
    render((WIDTH, 400), |root| {
        let finite: Vec<f64> = null.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return no_data(root, &title);
        }
        let all = finite.iter().chain(observed.iter().filter(|v| v.is_finite()));
        let lo = all.clone().copied().fold(f64::INFINITY, f64::min);
        let hi = all.copied().fold(f64::NEG_INFINITY, f64::max);
        let width = ((hi - lo) / HISTOGRAM_BINS as f64).max(1e-12);

        let mut counts = vec![0usize; HISTOGRAM_BINS];
        for v in &finite {
            let bin = (((v - lo) / width) as usize).min(HISTOGRAM_BINS - 1);
            counts[bin] += 1;
        }
        let max_count = counts.iter().copied().max().unwrap_or(1) as f64;

        let mut chart = ChartBuilder::on(root)
            .caption(&title, ("sans-serif", 18))
            .margin(20)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(lo..lo + width * HISTOGRAM_BINS as f64, 0f64..max_count * 1.1)?;

        chart
            .configure_mesh()
            .x_desc("Perturbation score")
            .y_desc("Relabelings")
            .draw()?;

        chart.draw_series(counts.iter().enumerate().map(|(b, &n)| {
            let x0 = lo + b as f64 * width;
            Rectangle::new([(x0, 0.0), (x0 + width, n as f64)], BLUE.mix(0.5).filled())
        }))?;

        chart.draw_series(
            observed
                .iter()
                .filter(|v| v.is_finite())
                .map(|&v| PathElement::new(vec![(v, 0.0), (v, max_count * 1.1)], RED.stroke_width(2))),
        )?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_diverging_color() {
        assert_eq!(diverging_color(0.0), RGBColor(255, 255, 255));
        assert_eq!(diverging_color(1.0), RGBColor(255, 0, 0));
        assert_eq!(diverging_color(-5.0), RGBColor(0, 0, 255));
        assert_eq!(diverging_color(f64::NAN), RGBColor(255, 255, 255));
    }

    #[test]
    fn test_null_histogram_is_svg() {
        let null: Vec<f64> = (0..60).map(|i| (i as f64 - 30.0) / 10.0).collect();
        let svg = null_histogram("P1", &null, &[2.5, -0.4]).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("</svg>"));
    }

    #[test]
    fn test_empty_inputs_still_render() {
        assert!(alignment_bars(&[]).unwrap().contains("</svg>"));
        assert!(null_histogram("P1", &[], &[]).unwrap().contains("no data"));
    }

    #[test]
    fn test_pca_scatter() {
        let pca = PcaResult {
            sample_ids: vec!["s1".into(), "s2".into(), "s3".into()],
            gene_ids: vec!["g1".into(), "g2".into()],
            scores: array![[1.0, 0.2], [-0.5, 0.1], [-0.5, -0.3]],
            loadings: array![[0.8, 0.6], [0.6, -0.8]],
            variance_explained: vec![0.9, 0.1],
        };
        let svg = pca_scatter(&pca, &["A".into(), "B".into(), "B".into()]).unwrap();
        assert!(svg.contains("</svg>"));
    }
}
