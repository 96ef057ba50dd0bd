//! Region/price merger: folds per-region price observations into one record
//! per logical game, reconciled across sources and converted to a single
//! reference currency for ranking.
//!
//! Identity matching prefers the stable store id (nsuid) and falls back to a
//! normalized title key. The per-region collision policy is a deterministic
//! min over the reference-currency price, so merging is commutative and
//! idempotent regardless of input order.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::Offer;
use crate::normalize::{derive_discount, slugify};

/// Round to two decimals, half away from zero. Used for every converted
/// amount so artifacts are stable across platforms.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Static currency → reference-currency conversion table.
///
/// Injected into the merger explicitly so rates can be updated and tested
/// independently; never read from process-wide state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateTable {
    /// Currency code all prices are converted into.
    pub reference: String,
    /// Scalar multipliers: native amount × rate = reference amount.
    pub rates: HashMap<String, f64>,
}

impl RateTable {
    /// Built-in table targeting BRL (January 2026 rates).
    pub fn default_brl() -> Self {
        let rates = [
            ("USD", 5.80),
            ("CAD", 4.20),
            ("MXN", 0.32),
            ("BRL", 1.00),
            ("ARS", 0.0062),
            ("CLP", 0.0062),
            ("COP", 0.0014),
            ("PEN", 1.55),
            ("EUR", 6.20),
            ("GBP", 7.20),
            ("CHF", 6.50),
            ("SEK", 0.54),
            ("NOK", 0.53),
            ("DKK", 0.83),
            ("PLN", 1.45),
            ("CZK", 0.25),
            ("RUB", 0.063),
            ("JPY", 0.039),
            ("AUD", 3.60),
            ("NZD", 3.40),
            ("HKD", 0.74),
            ("KRW", 0.0043),
            ("ZAR", 0.31),
        ]
        .into_iter()
        .map(|(code, rate)| (code.to_string(), rate))
        .collect();
        Self {
            reference: "BRL".to_string(),
            rates,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("reading rate table {}", path.display()))?;
        serde_json::from_str(&body)
            .with_context(|| format!("parsing rate table {}", path.display()))
    }

    /// Resolve the table from `RATES_FILE` when set, else the built-in
    /// default.
    pub fn from_env() -> Result<Self> {
        match crate::util::env::env_opt("RATES_FILE") {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default_brl()),
        }
    }

    /// Convert a native amount to the reference currency, rounded to two
    /// decimals. Unknown currencies pass through at rate 1.0 (logged) so a
    /// missing table entry degrades a ranking instead of dropping a region.
    pub fn to_reference(&self, currency: &str, amount: f64) -> f64 {
        let rate = match self.rates.get(currency) {
            Some(rate) => *rate,
            None => {
                warn!(currency, "no conversion rate configured; using 1.0");
                1.0
            }
        };
        round2(amount * rate)
    }
}

/// One known-bad price range and the verified value that replaces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionEntry {
    pub low: f64,
    pub high: f64,
    pub replace_with: f64,
}

impl CorrectionEntry {
    fn contains(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }
}

/// Data-driven price correction for one currency.
///
/// Upstream estimates go stale when a storefront reprices a whole region;
/// rather than editing code per incident, the known-bad ranges and their
/// verified replacements live in configuration. Prices below `stale_below`
/// that match no entry are scaled by `fallback_factor` when one is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrectionRule {
    pub currency: String,
    #[serde(default)]
    pub entries: Vec<CorrectionEntry>,
    #[serde(default)]
    pub stale_below: Option<f64>,
    #[serde(default)]
    pub fallback_factor: Option<f64>,
}

impl CorrectionRule {
    pub fn looks_stale(&self, price: f64) -> bool {
        self.entries.iter().any(|e| e.contains(price))
            || self.stale_below.is_some_and(|limit| price < limit)
    }

    pub fn corrected(&self, price: f64) -> f64 {
        if let Some(entry) = self.entries.iter().find(|e| e.contains(price)) {
            return entry.replace_with;
        }
        if self.looks_stale(price) {
            if let Some(factor) = self.fallback_factor {
                return round2(price * factor);
            }
        }
        price
    }
}

/// All correction rules in force, indexed by currency.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrectionSet {
    rules: Vec<CorrectionRule>,
}

impl CorrectionSet {
    pub fn new(rules: Vec<CorrectionRule>) -> Self {
        Self { rules }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("reading correction rules {}", path.display()))?;
        serde_json::from_str(&body)
            .with_context(|| format!("parsing correction rules {}", path.display()))
    }

    /// Resolve the rule set from `CORRECTIONS_FILE` when set; no rules
    /// otherwise.
    pub fn from_env() -> Result<Self> {
        match crate::util::env::env_opt("CORRECTIONS_FILE") {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn rule_for(&self, currency: &str) -> Option<&CorrectionRule> {
        self.rules.iter().find(|r| r.currency == currency)
    }

    /// Apply the matching rule to a price, if any; identity otherwise.
    fn apply(&self, currency: &str, price: Option<f64>) -> Option<f64> {
        let price = price?;
        match self.rule_for(currency) {
            Some(rule) if rule.looks_stale(price) => Some(rule.corrected(price)),
            _ => Some(price),
        }
    }
}

/// Identity of one observed game: stable id when the source has one, plus
/// the display title used for fallback matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameKey {
    pub title: String,
    pub nsuid: Option<String>,
}

/// Price fields of one observation, still in the native currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPrice {
    pub currency: String,
    pub msrp: Option<f64>,
    pub sale_price: Option<f64>,
    pub discount_percent: i32,
}

/// One (game, region, price) observation fed to the merger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub key: GameKey,
    pub region: String,
    pub price: RawPrice,
    pub cover_url: Option<String>,
}

impl Observation {
    /// Build an observation from a raw offer. Offers with no price at all
    /// carry nothing worth merging and yield `None`.
    pub fn from_offer(offer: &Offer) -> Option<Self> {
        offer.msrp.or(offer.sale_price)?;
        Some(Self {
            key: GameKey {
                title: offer.title.clone().unwrap_or_else(|| "Unknown".to_string()),
                nsuid: offer.nsuid.clone(),
            },
            region: offer.region.clone().unwrap_or_else(|| "unknown".to_string()),
            price: RawPrice {
                currency: offer.currency.clone().unwrap_or_else(|| "USD".to_string()),
                msrp: offer.msrp,
                sale_price: offer.sale_price,
                discount_percent: offer.discount_percent,
            },
            cover_url: offer.cover_url.clone(),
        })
    }
}

/// One region's reconciled price on a merged game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionPrice {
    pub currency: String,
    pub msrp: f64,
    pub sale_price: f64,
    pub discount_percent: i32,
    /// Effective price converted to the reference currency.
    pub price_reference: f64,
    pub msrp_reference: f64,
    pub on_sale: bool,
}

/// One logical game with at most one reconciled price per region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedGame {
    pub title: String,
    pub slug: String,
    pub nsuid: Option<String>,
    pub cover_url: Option<String>,
    pub prices: BTreeMap<String, RegionPrice>,
}

impl MergedGame {
    /// Region with the lowest reference-currency price. Ties resolve to the
    /// first region in map order, which is deterministic.
    pub fn cheapest_region(&self) -> Option<&str> {
        self.prices
            .iter()
            .min_by(|a, b| a.1.price_reference.total_cmp(&b.1.price_reference))
            .map(|(region, _)| region.as_str())
    }

    pub fn max_discount(&self) -> i32 {
        self.prices
            .values()
            .map(|p| p.discount_percent)
            .max()
            .unwrap_or(0)
    }

    pub fn num_regions(&self) -> usize {
        self.prices.len()
    }
}

/// The `store/merged.json` artifact, recomputed wholesale on every run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergedDataset {
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub games: Vec<MergedGame>,
}

/// Normalized title key for fallback matching: lowercased, punctuation
/// stripped, the stopword "the" dropped, whitespace collapsed.
pub fn match_key(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|word| *word != "the")
        .collect::<Vec<_>>()
        .join(" ")
}

/// True when the candidate should replace the incumbent for a region.
///
/// Lower reference price wins; exact ties break on lower native sale price,
/// then lower msrp. The comparison is a strict total order over the price
/// fields, so the outcome is independent of arrival order.
fn candidate_wins(candidate: &RegionPrice, incumbent: &RegionPrice) -> bool {
    match candidate.price_reference.total_cmp(&incumbent.price_reference) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => {
            match candidate.sale_price.total_cmp(&incumbent.sale_price) {
                std::cmp::Ordering::Less => true,
                std::cmp::Ordering::Greater => false,
                std::cmp::Ordering::Equal => candidate.msrp < incumbent.msrp,
            }
        }
    }
}

fn region_price(
    price: &RawPrice,
    rates: &RateTable,
    corrections: &CorrectionSet,
) -> Option<RegionPrice> {
    let msrp = corrections.apply(&price.currency, price.msrp);
    let sale = corrections.apply(&price.currency, price.sale_price);

    // Effective values after coalescing; at least one side is present.
    let effective_sale = sale.or(msrp)?;
    let effective_msrp = msrp.or(sale)?;

    let discount = derive_discount(msrp, sale, price.discount_percent);

    Some(RegionPrice {
        currency: price.currency.clone(),
        msrp: effective_msrp,
        sale_price: effective_sale,
        discount_percent: discount,
        price_reference: rates.to_reference(&price.currency, effective_sale),
        msrp_reference: rates.to_reference(&price.currency, effective_msrp),
        on_sale: discount > 0 || effective_sale < effective_msrp,
    })
}

/// Fold observations into one merged record per logical game.
///
/// Commutative and idempotent: re-merging the same observations, in any
/// order, produces the same set of winners. Output is sorted by slug.
pub fn merge(
    observations: &[Observation],
    rates: &RateTable,
    corrections: &CorrectionSet,
) -> Vec<MergedGame> {
    let mut games: Vec<MergedGame> = Vec::new();
    let mut by_nsuid: HashMap<String, usize> = HashMap::new();
    let mut by_title: HashMap<String, usize> = HashMap::new();

    for obs in observations {
        let Some(candidate) = region_price(&obs.price, rates, corrections) else {
            continue;
        };

        let title_key = match_key(&obs.key.title);
        let idx = obs
            .key
            .nsuid
            .as_ref()
            .and_then(|nsuid| by_nsuid.get(nsuid).copied())
            .or_else(|| by_title.get(&title_key).copied());

        let idx = match idx {
            Some(idx) => idx,
            None => {
                let idx = games.len();
                games.push(MergedGame {
                    title: obs.key.title.clone(),
                    slug: slugify(&obs.key.title),
                    nsuid: obs.key.nsuid.clone(),
                    cover_url: obs.cover_url.clone(),
                    prices: BTreeMap::new(),
                });
                by_title.insert(title_key.clone(), idx);
                if let Some(nsuid) = &obs.key.nsuid {
                    by_nsuid.insert(nsuid.clone(), idx);
                }
                idx
            }
        };

        let game = &mut games[idx];
        // Matched by title with a fresh stable id: remember it for later runs.
        if game.nsuid.is_none() {
            if let Some(nsuid) = &obs.key.nsuid {
                game.nsuid = Some(nsuid.clone());
                by_nsuid.insert(nsuid.clone(), idx);
            }
        }
        if game.cover_url.is_none() {
            game.cover_url = obs.cover_url.clone();
        }

        match game.prices.get(&obs.region) {
            Some(incumbent) if !candidate_wins(&candidate, incumbent) => {}
            _ => {
                game.prices.insert(obs.region.clone(), candidate);
            }
        }
    }

    games.sort_by(|a, b| a.slug.cmp(&b.slug));
    games
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(title: &str, nsuid: Option<&str>, region: &str, currency: &str, msrp: f64) -> Observation {
        Observation {
            key: GameKey {
                title: title.to_string(),
                nsuid: nsuid.map(str::to_string),
            },
            region: region.to_string(),
            price: RawPrice {
                currency: currency.to_string(),
                msrp: Some(msrp),
                sale_price: None,
                discount_percent: 0,
            },
            cover_url: None,
        }
    }

    fn brl_rates() -> RateTable {
        RateTable::default_brl()
    }

    #[test]
    fn round2_is_half_away_from_zero() {
        // 0.125 is exactly representable, so this really is a half-way case
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(-0.125), -0.13);
        assert_eq!(round2(347.942), 347.94);
        assert_eq!(round2(2.0), 2.0);
    }

    #[test]
    fn conversion_uses_rate_and_rounds() {
        let rates = brl_rates();
        // 59.99 USD * 5.80 = 347.942
        assert_eq!(rates.to_reference("USD", 59.99), 347.94);
        assert_eq!(rates.to_reference("BRL", 299.0), 299.0);
    }

    #[test]
    fn unknown_currency_passes_through_at_unit_rate() {
        let rates = brl_rates();
        assert_eq!(rates.to_reference("XXX", 42.5), 42.5);
    }

    #[test]
    fn match_key_strips_punctuation_and_stopword() {
        assert_eq!(
            match_key("The Legend of Zelda: Tears of the Kingdom"),
            "legend of zelda tears of kingdom"
        );
        assert_eq!(
            match_key("Legend of Zelda - Tears of Kingdom!"),
            "legend of zelda tears of kingdom"
        );
    }

    #[test]
    fn collision_keeps_lower_reference_price_in_either_order() {
        let rates = brl_rates();
        let corrections = CorrectionSet::default();
        let a = obs("Foo", None, "BR", "BRL", 300.0);
        let b = obs("Foo", None, "BR", "BRL", 250.0);

        let forward = merge(&[a.clone(), b.clone()], &rates, &corrections);
        let reverse = merge(&[b, a], &rates, &corrections);

        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].prices["BR"].price_reference, 250.0);
        assert_eq!(forward, reverse);
    }

    #[test]
    fn merge_is_idempotent_under_reapplication() {
        let rates = brl_rates();
        let corrections = CorrectionSet::default();
        let set = vec![
            obs("Foo", Some("7001"), "BR", "BRL", 300.0),
            obs("Foo", Some("7001"), "US", "USD", 59.99),
            obs("Bar", None, "BR", "BRL", 199.0),
        ];
        let mut doubled = set.clone();
        doubled.extend(set.clone());

        assert_eq!(
            merge(&set, &rates, &corrections),
            merge(&doubled, &rates, &corrections)
        );
    }

    #[test]
    fn nsuid_match_beats_title_spelling_differences() {
        let rates = brl_rates();
        let corrections = CorrectionSet::default();
        let games = merge(
            &[
                obs("Pokémon Scarlet", Some("70010000055478"), "US", "USD", 59.99),
                obs("Pokemon Scarlet", Some("70010000055478"), "BR", "BRL", 299.0),
            ],
            &rates,
            &corrections,
        );
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].num_regions(), 2);
    }

    #[test]
    fn title_fallback_ignores_leading_the() {
        let rates = brl_rates();
        let corrections = CorrectionSet::default();
        let games = merge(
            &[
                obs("The Legend of Zelda: Tears of the Kingdom", None, "US", "USD", 69.99),
                obs("Legend of Zelda: Tears of the Kingdom", None, "BR", "BRL", 349.0),
            ],
            &rates,
            &corrections,
        );
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].num_regions(), 2);
    }

    #[test]
    fn correction_applies_before_collision_policy() {
        let rates = brl_rates();
        // BRL prices stuck at the pre-repricing 299 tier are replaced by the
        // verified 349 value.
        let corrections = CorrectionSet::new(vec![CorrectionRule {
            currency: "BRL".to_string(),
            entries: vec![CorrectionEntry {
                low: 290.0,
                high: 300.0,
                replace_with: 349.0,
            }],
            stale_below: None,
            fallback_factor: None,
        }]);

        let games = merge(
            &[
                obs("Foo", None, "BR", "BRL", 299.0), // corrected to 349
                obs("Foo", None, "BR", "BRL", 340.0),
            ],
            &rates,
            &corrections,
        );
        // 340 wins only because the 299 was corrected to 349 first.
        assert_eq!(games[0].prices["BR"].price_reference, 340.0);
    }

    #[test]
    fn correction_fallback_factor_scales_stale_prices() {
        let rule = CorrectionRule {
            currency: "BRL".to_string(),
            entries: vec![CorrectionEntry {
                low: 290.0,
                high: 300.0,
                replace_with: 349.0,
            }],
            stale_below: Some(200.0),
            fallback_factor: Some(1.15),
        };
        assert!(rule.looks_stale(299.0));
        assert_eq!(rule.corrected(299.0), 349.0);
        assert!(rule.looks_stale(100.0));
        assert_eq!(rule.corrected(100.0), 115.0);
        assert!(!rule.looks_stale(250.0));
        assert_eq!(rule.corrected(250.0), 250.0);
    }

    #[test]
    fn derived_aggregates_follow_the_region_map() {
        let rates = brl_rates();
        let corrections = CorrectionSet::default();
        let mut sale = obs("Foo", None, "US", "USD", 59.99);
        sale.price.sale_price = Some(41.99);

        let games = merge(
            &[sale, obs("Foo", None, "BR", "BRL", 199.0)],
            &rates,
            &corrections,
        );
        let game = &games[0];
        assert_eq!(game.num_regions(), 2);
        assert_eq!(game.max_discount(), 30); // round((1 - 41.99/59.99)*100)
        assert_eq!(game.cheapest_region(), Some("BR")); // 199.0 < 243.54
        assert!(game.prices["US"].on_sale);
        assert!(!game.prices["BR"].on_sale);
    }

    #[test]
    fn rate_table_loads_from_json() {
        let json = r#"{"reference":"USD","rates":{"USD":1.0,"BRL":0.17}}"#;
        let table: RateTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.reference, "USD");
        assert_eq!(table.to_reference("BRL", 100.0), 17.0);
    }

    #[test]
    fn correction_set_loads_from_json() {
        let json = r#"[{"currency":"BRL","entries":[{"low":290.0,"high":300.0,"replace_with":349.0}]}]"#;
        let set: CorrectionSet = serde_json::from_str(json).unwrap();
        assert!(set.rule_for("BRL").is_some());
        assert!(set.rule_for("USD").is_none());
    }

    #[test]
    fn offers_without_any_price_are_skipped() {
        let offer = Offer {
            title: Some("Foo".to_string()),
            ..Offer::default()
        };
        assert!(Observation::from_offer(&offer).is_none());
    }
}
