//! Self-contained HTML reports
//!
//! Narrative, tables and inline SVG figures in one file with no external
//! assets.

use std::collections::BTreeMap;

use super::figures;
use crate::config::Config;
use crate::error::Result;
use crate::io::{AlignmentReport, Evaluation, PathwayResults, TsvRecord};
use crate::normalization::FilterSummary;
use crate::permutation::PermutedScores;
use crate::qc::{BiasCell, LibraryStats, PcaResult};

/// Escape text for use in HTML content and attribute values
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn html_header(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{}</title>
    <style>
        :root {{
            --primary: #2563eb;
            --dark: #1e293b;
            --light: #f8fafc;
            --border: #e2e8f0;
        }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            line-height: 1.6;
            color: var(--dark);
            background: var(--light);
            margin: 0;
        }}
        .container {{ max-width: 1200px; margin: 0 auto; padding: 40px 20px; }}
        .header {{ text-align: center; border-bottom: 3px solid var(--primary); margin-bottom: 32px; }}
        .section {{
            background: white;
            border-radius: 8px;
            padding: 24px;
            margin-bottom: 24px;
            border: 1px solid var(--border);
        }}
        .section h2 {{ border-bottom: 2px solid var(--primary); padding-bottom: 8px; }}
        .figure {{ text-align: center; margin: 16px 0; }}
        .scroll {{ max-height: 480px; overflow: auto; }}
        table {{ border-collapse: collapse; width: 100%; font-size: 13px; }}
        th, td {{ border: 1px solid var(--border); padding: 4px 8px; text-align: left; }}
        th {{ background: var(--light); position: sticky; top: 0; }}
        pre {{ background: var(--light); padding: 12px; }}
    </style>
</head>
<body>
<div class="container">
    <div class="header"><h1>{}</h1></div>
"#,
        escape(title),
        escape(title)
    )
}

fn html_footer() -> String {
    format!(
        "    <p><small>Generated by rust_sspa {}</small></p>\n</div>\n</body>\n</html>\n",
        env!("CARGO_PKG_VERSION")
    )
}

fn section(title: &str, body: &str) -> String {
    format!(
        "    <div class=\"section\">\n        <h2>{}</h2>\n{}\n    </div>\n",
        escape(title),
        body
    )
}

fn figure(svg: &str) -> String {
    format!("<div class=\"figure\">{}</div>", svg)
}

/// Render rows with the same columns as their TSV table
pub fn table<T: TsvRecord>(rows: &[T]) -> String {
    let mut html = String::from("<div class=\"scroll\"><table>\n<thead><tr>");
    for name in T::header() {
        html.push_str(&format!("<th>{}</th>", escape(name)));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for row in rows {
        html.push_str("<tr>");
        for value in row.record() {
            html.push_str(&format!("<td>{}</td>", escape(&value)));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody></table></div>");
    html
}

/// Everything shown in the QC report
pub struct QcReport<'a> {
    pub config: &'a Config,
    pub snapshot: &'a str,
    pub alignment: &'a AlignmentReport,
    pub libraries: &'a [LibraryStats],
    pub filter: &'a FilterSummary,
    pub pca: &'a PcaResult,
    /// Composite group of each PCA sample
    pub groups: &'a [String],
    pub bias: &'a [BiasCell],
}

impl QcReport<'_> {
    pub fn render(&self) -> Result<String> {
        let config = self.config;
        let mut html = html_header(&format!("RNA-seq QC report: {}", config.tag));

        let fc = &config.feature_counts;
        html.push_str(&section(
            "Methods",
            &format!(
                "<p>Reads were counted per gene against {} {} (release {}), annotation snapshot \
                 <code>{}</code>. Read counting was {} with a minimum overlap of {} bp, \
                 a minimum overlapping fraction of {}, a minimum mapping quality of {} and \
                 the additional options <code>{}</code>.</p>\n\
                 <p>Genes without reads were removed and genes with CPM &ge; {} in at least {} \
                 samples were kept ({} of {} genes). Expression is log2 CPM with a prior count \
                 of {}.</p>",
                escape(&config.reference.species),
                escape(&config.reference.build),
                config.reference.release,
                escape(self.snapshot),
                fc.strandedness_label(),
                fc.min_overlap,
                fc.frac_overlap,
                fc.min_qual,
                escape(&fc.extra),
                self.filter.min_cpm,
                self.filter.min_samples,
                self.filter.kept,
                self.filter.input_genes,
                config.qc.prior_count,
            ),
        ));

        let mut body = figure(&figures::alignment_bars(&self.alignment.alignment)?);
        body.push_str(&table(&self.alignment.alignment));
        html.push_str(&section("Alignment", &body));

        let mut body = figure(&figures::assignment_bars(&self.alignment.assignment)?);
        body.push_str(&table(&self.alignment.assignment.rows()));
        html.push_str(&section("Gene assignment", &body));

        let mut body = figure(&figures::library_bars(self.libraries)?);
        body.push_str(&format!(
            "<p>{} genes had no reads in any sample; {} further genes fell below the \
             expression threshold.</p>",
            self.filter.zero_total, self.filter.low_expression
        ));
        body.push_str(&table(self.libraries));
        html.push_str(&section("Library sizes and detected genes", &body));

        let mut body = figure(&figures::pca_scatter(self.pca, self.groups)?);
        body.push_str(&table(&self.pca.score_rows()));
        html.push_str(&section("Sample similarity", &body));

        let n_bins = config.qc.n_bins;
        let mut body = format!(
            "<p>Gene loadings of each component were grouped into {} length bins by {} GC bins \
             and tested against zero; cells are Bonferroni-adjusted across all tests and \
             drawn opaque when adjusted p &lt; {}.</p>",
            n_bins, n_bins, config.qc.alpha
        );
        for component in 1..=self.pca.n_components() {
            body.push_str(&figure(&figures::bias_bubbles(self.bias, component, n_bins)?));
        }
        let tested: Vec<&BiasCell> = self.bias.iter().filter(|c| c.pvalue.is_some()).collect();
        body.push_str(&format!(
            "<p>{} of {} cells tested, {} significant.</p>",
            tested.len(),
            self.bias.len(),
            tested.iter().filter(|c| c.significant).count()
        ));
        html.push_str(&section("GC content and length bias", &body));

        html.push_str(&html_footer());
        Ok(html)
    }
}

/// Size of one pathway as scored
#[derive(Debug, Clone, PartialEq)]
pub struct PathwayOverview {
    pub pathway: String,
    pub nodes: usize,
    pub measured_nodes: usize,
}

impl TsvRecord for PathwayOverview {
    fn header() -> Vec<&'static str> {
        vec!["pathway", "nodes", "measured_nodes"]
    }

    fn record(&self) -> Vec<String> {
        vec![self.pathway.clone(), self.nodes.to_string(), self.measured_nodes.to_string()]
    }
}

/// Everything shown in the pathway report
pub struct PathwayReport<'a> {
    pub config: &'a Config,
    pub treated: &'a [String],
    pub reference_size: usize,
    pub paired: bool,
    pub dropped_genes: usize,
    pub pathways: &'a [PathwayOverview],
    pub null: &'a PermutedScores,
    pub results: &'a PathwayResults,
}

impl PathwayReport<'_> {
    pub fn render(&self) -> Result<String> {
        let config = self.config;
        let settings = &config.pathways;
        let mut html = html_header(&format!("Pathway perturbation report: {}", config.tag));

        html.push_str(&section(
            "Methods",
            &format!(
                "<p>{} treated samples were compared against {} '{}' sample(s) each ({} design). \
                 Single-sample log fold changes were weighted by the inverse of their \
                 expression-dependent variance and propagated through {} pathway topologies \
                 (at most {} propagation steps). {} genes without an Entrez id were not scored.</p>\n\
                 <p>Each pathway score was compared with {} relabelings of the samples \
                 ({} requested, {} possible, seed {}). Sample-level p-values are empirical and \
                 Bonferroni-adjusted; group-level p-values come from a one-sample t-test of the \
                 robust z-scores and are Benjamini-Hochberg adjusted. Pathways with a degenerate \
                 null are listed as non-evaluable.</p>",
                self.treated.len(),
                self.reference_size,
                escape(&settings.reference_level),
                if self.paired { "paired" } else { "unpaired" },
                self.pathways.len(),
                settings.max_depth,
                self.dropped_genes,
                self.null.n_relabelings,
                self.null.requested,
                self.null.bound,
                self.null.seed,
            ),
        ));

        html.push_str(&section(
            "Summary",
            &format!("<pre>{}</pre>", escape(&self.results.summary().to_string())),
        ));
        html.push_str(&section("Group level", &table(&self.results.group_level)));
        html.push_str(&section("Sample level", &table(&self.results.sample_level)));

        let mut observed: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for row in &self.results.sample_level {
            observed.entry(row.pathway.as_str()).or_default().push(row.raw_score);
        }
        let mut body = String::from(
            "<p>Null distributions of pathways with a non-degenerate null; observed scores in red.</p>",
        );
        for group in &self.results.group_level {
            if group.status == Evaluation::NonEvaluable || self.null.is_degenerate(&group.pathway) {
                continue;
            }
            let null = self.null.get(&group.pathway).unwrap_or_default();
            let scores = observed.get(group.pathway.as_str()).map(Vec::as_slice).unwrap_or_default();
            body.push_str(&figure(&figures::null_histogram(&group.pathway, null, scores)?));
        }
        body.push_str(&table(&self.null.summaries()));
        html.push_str(&section("Null distributions", &body));

        html.push_str(&section("Pathways", &table(self.pathways)));

        html.push_str(&html_footer());
        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
    }

    #[test]
    fn test_table_uses_tsv_columns() {
        let rows = vec![PathwayOverview {
            pathway: "MAPK <signaling>".to_string(),
            nodes: 4,
            measured_nodes: 3,
        }];
        let html = table(&rows);
        assert!(html.contains("<th>measured_nodes</th>"));
        assert!(html.contains("<td>MAPK &lt;signaling&gt;</td>"));
        assert!(html.contains("<td>3</td>"));
    }
}
