//! Quote narrative generation.
//!
//! Builds a deterministic description of a quote, attempts to compress
//! it through a learned summarization step, and falls back to a template
//! summary when none can be acquired. [`NarrativeGenerator::generate`]
//! never fails: the last strategy in the chain is pure.

mod summarizer;

pub use summarizer::{
    DecodeSettings, HostedModelSource, ModelCache, ModelSource, SummaryModel,
};

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SummaryConfig;
use crate::errors::SummaryError;
use crate::features::DraftLineItem;

/// Fixed scope sentence closing every generated description.
const SCOPE_SENTENCE: &str = "Scope includes supply and installation to company standards, \
     final site measurements prior to fabrication, and warranty-backed workmanship.";

/// Inputs for one narrative; a pure value object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteNarrativeInput {
    pub customer_name: String,
    pub items: Vec<DraftLineItem>,
    pub total_amount: f64,
}

/// One way to produce a summary. Strategies are tried in order; the
/// first non-empty success wins.
#[async_trait]
pub trait SummaryStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn summarize(
        &self,
        input: &QuoteNarrativeInput,
        source: &str,
    ) -> Result<String, SummaryError>;
}

pub struct NarrativeGenerator {
    strategies: Vec<Box<dyn SummaryStrategy>>,
}

impl NarrativeGenerator {
    /// Learned compression first, template fallback last.
    pub fn new(config: SummaryConfig) -> Self {
        let cache = ModelCache::new(
            Box::new(HostedModelSource::new(config.clone())),
            config.token.clone(),
        );
        Self::with_strategies(vec![
            Box::new(LearnedSummary { cache, config }),
            Box::new(TemplateSummary),
        ])
    }

    /// Deterministic template output only; no model endpoint is ever
    /// contacted.
    pub fn template_only() -> Self {
        Self::with_strategies(vec![Box::new(TemplateSummary)])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn SummaryStrategy>>) -> Self {
        Self { strategies }
    }

    /// Produce a narrative summary. Always returns a non-empty string;
    /// strategy failures are logged and absorbed.
    pub async fn generate(&self, input: &QuoteNarrativeInput) -> String {
        let source = build_source_text(input);
        for strategy in &self.strategies {
            match strategy.summarize(input, &source).await {
                Ok(summary) if !summary.trim().is_empty() => {
                    debug!(strategy = strategy.name(), "narrative strategy succeeded");
                    return summary.trim().to_string();
                }
                Ok(_) => {
                    warn!(strategy = strategy.name(), "narrative strategy returned empty text");
                }
                Err(error) => {
                    warn!(
                        strategy = strategy.name(),
                        error = %error,
                        "narrative strategy failed, trying next"
                    );
                }
            }
        }
        fallback_summary(input)
    }
}

/// Learned compression over the source description.
struct LearnedSummary {
    cache: ModelCache,
    config: SummaryConfig,
}

#[async_trait]
impl SummaryStrategy for LearnedSummary {
    fn name(&self) -> &'static str {
        "learned"
    }

    async fn summarize(
        &self,
        _input: &QuoteNarrativeInput,
        source: &str,
    ) -> Result<String, SummaryError> {
        let model = self.cache.acquire().await?;

        let mut text = truncate_chars(source, self.config.max_input_chars).to_string();
        if self.config.task_prefix {
            text = format!("summarize: {text}");
        }
        let (min_length, max_length) = dynamic_lengths(&text, &self.config);
        let decode = DecodeSettings {
            min_length,
            max_length,
            no_repeat_ngram: self.config.no_repeat_ngram,
            sampling: self.config.sampling,
            top_p: self.config.top_p,
            temperature: self.config.temperature,
            num_beams: self.config.num_beams,
        };
        model.summarize(&text, &decode).await
    }
}

/// The guaranteed-final step of the chain: pure, no external dependency.
struct TemplateSummary;

#[async_trait]
impl SummaryStrategy for TemplateSummary {
    fn name(&self) -> &'static str {
        "template"
    }

    async fn summarize(
        &self,
        input: &QuoteNarrativeInput,
        _source: &str,
    ) -> Result<String, SummaryError> {
        Ok(fallback_summary(input))
    }
}

/// Deterministic source description fed to the compression step.
pub fn build_source_text(input: &QuoteNarrativeInput) -> String {
    let mut lines = vec![
        format!("Customer: {}.", input.customer_name),
        format!("Total quoted amount: {}.", format_usd(input.total_amount)),
        "Items:".to_string(),
    ];
    for (index, item) in input.items.iter().enumerate() {
        let name = item.name.as_deref().unwrap_or("Item");
        let category = item.category.as_deref().unwrap_or("General");
        let quantity = item.quantity.unwrap_or(1);
        let size = match (item.width_ft, item.height_ft) {
            (Some(width), Some(height)) if width.is_finite() && height.is_finite() => {
                format!("{width:.2}ft x {height:.2}ft")
            }
            _ => "N/A".to_string(),
        };
        lines.push(format!(
            "- {}. {} ({}), Qty: {}, Size: {}",
            index + 1,
            name,
            category,
            quantity,
            size
        ));
    }
    lines.push(SCOPE_SENTENCE.to_string());
    lines.join(" ")
}

/// Template summary from the first six distinct item names, the unit
/// count, and the formatted total.
pub fn fallback_summary(input: &QuoteNarrativeInput) -> String {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for item in &input.items {
        let name = item.name.clone().unwrap_or_else(|| "product".to_string());
        if seen.insert(name.clone()) {
            names.push(name);
        }
    }
    let listed = if names.is_empty() {
        "the specified products".to_string()
    } else {
        let mut joined = names.iter().take(6).cloned().collect::<Vec<_>>().join(", ");
        if names.len() > 6 {
            joined.push_str("...");
        }
        joined
    };
    let unit_count: u64 = input
        .items
        .iter()
        .map(|item| u64::from(item.quantity.unwrap_or(1)))
        .sum();

    format!(
        "This quotation for {} covers supply and installation of {} item type(s) ({}) \
         with a total value of {}. The scope includes site verification, fabrication to \
         final measurements, and installation aligned with company standards.",
        input.customer_name,
        unit_count,
        listed,
        format_usd(input.total_amount)
    )
}

/// Derive decode lengths from the input word count, so short inputs do
/// not request degenerate ranges.
fn dynamic_lengths(text: &str, config: &SummaryConfig) -> (usize, usize) {
    let word_count = text.split_whitespace().count().max(1);
    let scaled_max = (word_count as f64 * 0.8) as usize;
    let scaled_min = (word_count as f64 * 0.4) as usize;
    let max_length = config.max_length.min(scaled_max.max(48));
    let mut min_length = config.min_length.min(scaled_min.max(24));
    if min_length >= max_length {
        min_length = max_length.saturating_sub(8).max(16);
    }
    (min_length, max_length)
}

/// Dollar amount with digit grouping and two decimals.
fn format_usd(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let dollars = cents / 100;
    let fraction = cents % 100;

    let digits = dollars.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (offset, digit) in digits.chars().enumerate() {
        if offset > 0 && (digits.len() - offset) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{fraction:02}")
}

/// Truncate on a character boundary.
fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((boundary, _)) => &text[..boundary],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use crate::config::SummaryConfig;
    use crate::errors::SummaryError;
    use crate::features::DraftLineItem;

    use super::{
        build_source_text, dynamic_lengths, fallback_summary, format_usd, truncate_chars,
        NarrativeGenerator, QuoteNarrativeInput, SummaryStrategy,
    };

    fn item(name: &str, category: &str, quantity: u32) -> DraftLineItem {
        DraftLineItem {
            name: Some(name.to_string()),
            category: Some(category.to_string()),
            quantity: Some(quantity),
            ..DraftLineItem::default()
        }
    }

    fn acme_input() -> QuoteNarrativeInput {
        QuoteNarrativeInput {
            customer_name: "Acme".to_string(),
            items: vec![item("Window A", "Casement", 2)],
            total_amount: 500.0,
        }
    }

    struct FailingStrategy;

    #[async_trait]
    impl SummaryStrategy for FailingStrategy {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn summarize(
            &self,
            _input: &QuoteNarrativeInput,
            _source: &str,
        ) -> Result<String, SummaryError> {
            Err(SummaryError::Acquisition("offline".to_string()))
        }
    }

    struct CannedStrategy(&'static str);

    #[async_trait]
    impl SummaryStrategy for CannedStrategy {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn summarize(
            &self,
            _input: &QuoteNarrativeInput,
            _source: &str,
        ) -> Result<String, SummaryError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn source_text_lists_items_with_formatted_dimensions() {
        let input = QuoteNarrativeInput {
            customer_name: "Bright Homes".to_string(),
            items: vec![
                DraftLineItem {
                    name: Some("Bay Window B".to_string()),
                    category: Some("Bay Window".to_string()),
                    quantity: Some(3),
                    width_ft: Some(4.0),
                    height_ft: Some(3.25),
                    ..DraftLineItem::default()
                },
                item("French Door A", "French Door", 1),
            ],
            total_amount: 12_500.0,
        };

        let text = build_source_text(&input);
        assert!(text.starts_with("Customer: Bright Homes."));
        assert!(text.contains("Total quoted amount: $12,500.00."));
        assert!(text.contains("- 1. Bay Window B (Bay Window), Qty: 3, Size: 4.00ft x 3.25ft"));
        assert!(text.contains("- 2. French Door A (French Door), Qty: 1, Size: N/A"));
        assert!(text.ends_with("warranty-backed workmanship."));
    }

    #[test]
    fn missing_fields_take_generic_placeholders() {
        let input = QuoteNarrativeInput {
            customer_name: "Acme".to_string(),
            items: vec![DraftLineItem::default()],
            total_amount: 0.0,
        };
        let text = build_source_text(&input);
        assert!(text.contains("- 1. Item (General), Qty: 1, Size: N/A"));
    }

    #[test]
    fn fallback_carries_the_documented_fields() {
        let summary = fallback_summary(&acme_input());
        assert!(summary.contains("Acme"));
        assert!(summary.contains("2 item type(s)"));
        assert!(summary.contains("Window A"));
        assert!(summary.contains("$500.00"));
    }

    #[test]
    fn fallback_with_no_items_names_the_generic_products() {
        let summary = fallback_summary(&QuoteNarrativeInput {
            customer_name: "Acme".to_string(),
            items: Vec::new(),
            total_amount: 0.0,
        });
        assert!(summary.contains("the specified products"));
        assert!(summary.contains("0 item type(s)"));
    }

    #[test]
    fn fallback_elides_names_after_the_sixth_distinct() {
        let items: Vec<DraftLineItem> = (1..=8)
            .map(|index| item(&format!("Window {index}"), "Casement", 1))
            .collect();
        let summary = fallback_summary(&QuoteNarrativeInput {
            customer_name: "Acme".to_string(),
            items,
            total_amount: 4_000.0,
        });
        assert!(summary.contains("Window 6..."));
        assert!(!summary.contains("Window 7"));
        assert!(summary.contains("8 item type(s)"));
    }

    #[test]
    fn duplicate_item_names_are_listed_once() {
        let summary = fallback_summary(&QuoteNarrativeInput {
            customer_name: "Acme".to_string(),
            items: vec![item("Window A", "Casement", 1), item("Window A", "Casement", 2)],
            total_amount: 900.0,
        });
        assert_eq!(summary.matches("Window A").count(), 1);
        assert!(summary.contains("3 item type(s)"));
    }

    #[test]
    fn long_inputs_use_the_configured_length_caps() {
        let config = SummaryConfig::default();
        let text = "word ".repeat(400);
        assert_eq!(dynamic_lengths(&text, &config), (60, 140));
    }

    #[test]
    fn short_inputs_shrink_the_length_window() {
        let config = SummaryConfig::default();
        let text = "only a few words here today";
        // 6 words: floors kick in at 24/48.
        assert_eq!(dynamic_lengths(text, &config), (24, 48));
    }

    #[test]
    fn degenerate_length_configuration_is_repaired() {
        let config = SummaryConfig {
            max_length: 20,
            min_length: 60,
            ..SummaryConfig::default()
        };
        let text = "word ".repeat(100);
        let (min_length, max_length) = dynamic_lengths(&text, &config);
        assert_eq!(max_length, 20);
        assert_eq!(min_length, 16);
        assert!(min_length < max_length);
    }

    #[test]
    fn usd_formatting_groups_digits() {
        assert_eq!(format_usd(500.0), "$500.00");
        assert_eq!(format_usd(1_234_567.891), "$1,234,567.89");
        assert_eq!(format_usd(0.0), "$0.00");
        assert_eq!(format_usd(-12.5), "-$12.50");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("abcdef", 4), "abcd");
        assert_eq!(truncate_chars("ab", 4), "ab");
        assert_eq!(truncate_chars("ééé", 2), "éé");
    }

    #[tokio::test]
    async fn generate_falls_back_when_every_learned_strategy_fails() {
        let generator = NarrativeGenerator::with_strategies(vec![Box::new(FailingStrategy)]);
        let summary = generator.generate(&acme_input()).await;
        assert!(summary.contains("Acme"));
        assert!(summary.contains("2 item type(s)"));
        assert!(summary.contains("$500.00"));
    }

    #[tokio::test]
    async fn generate_commits_to_the_first_successful_strategy() {
        let generator = NarrativeGenerator::with_strategies(vec![
            Box::new(FailingStrategy),
            Box::new(CannedStrategy("Compressed summary.")),
            Box::new(CannedStrategy("Never reached.")),
        ]);
        let summary = generator.generate(&acme_input()).await;
        assert_eq!(summary, "Compressed summary.");
    }

    #[tokio::test]
    async fn empty_strategy_output_is_treated_as_a_failure() {
        let generator = NarrativeGenerator::with_strategies(vec![
            Box::new(CannedStrategy("   ")),
            Box::new(CannedStrategy("Usable.")),
        ]);
        assert_eq!(generator.generate(&acme_input()).await, "Usable.");
    }

    #[tokio::test]
    async fn template_only_generator_always_answers() {
        let generator = NarrativeGenerator::template_only();
        let summary = generator
            .generate(&QuoteNarrativeInput {
                customer_name: "Acme".to_string(),
                items: Vec::new(),
                total_amount: 0.0,
            })
            .await;
        assert!(!summary.is_empty());
    }
}
