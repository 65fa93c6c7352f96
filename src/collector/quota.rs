//! Collection budget allocation across discovery channels
//!
//! A run's total item budget is divided by fixed relative weights: goldbox
//! 0.2, category-best 0.4, keyword-search 0.3, brand-catalog the remainder.
//! The allocator is consulted once per channel, in channel order, because a
//! channel's effective cap also depends on what earlier channels actually
//! collected: the brand channel absorbs rounding slack and any unused budget.

/// One product-discovery source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Goldbox,
    CategoryBest,
    KeywordSearch,
    BrandCatalog,
}

impl Channel {
    /// Fixed execution order for a collection run.
    ///
    /// The order is a correctness requirement: each channel's effective
    /// budget depends on what earlier channels consumed.
    pub const RUN_ORDER: [Channel; 4] = [
        Channel::Goldbox,
        Channel::CategoryBest,
        Channel::KeywordSearch,
        Channel::BrandCatalog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Goldbox => "goldbox",
            Self::CategoryBest => "category_best",
            Self::KeywordSearch => "keyword_search",
            Self::BrandCatalog => "brand_catalog",
        }
    }
}

/// Budget allocator with fixed channel weights
#[derive(Debug, Clone)]
pub struct QuotaAllocator {
    goldbox_weight: f64,
    category_weight: f64,
    keyword_weight: f64,
}

impl Default for QuotaAllocator {
    fn default() -> Self {
        Self {
            goldbox_weight: 0.2,
            category_weight: 0.4,
            keyword_weight: 0.3,
        }
    }
}

impl QuotaAllocator {
    /// Compute the cap for a channel given the run total and what earlier
    /// channels have already collected.
    ///
    /// Weighted channels get `floor(total * weight)`, never exceeding the
    /// remaining budget; the brand channel takes whatever is left.
    pub fn cap(&self, channel: Channel, total: usize, already_collected: usize) -> usize {
        let remaining = total.saturating_sub(already_collected);

        match channel {
            Channel::Goldbox => weighted_cap(total, self.goldbox_weight).min(remaining),
            Channel::CategoryBest => weighted_cap(total, self.category_weight).min(remaining),
            Channel::KeywordSearch => weighted_cap(total, self.keyword_weight).min(remaining),
            Channel::BrandCatalog => remaining,
        }
    }

    /// Per-sub-source quota within a channel: `ceil(budget / sources)`
    pub fn per_source_quota(channel_budget: usize, source_count: usize) -> usize {
        if source_count == 0 {
            return 0;
        }
        channel_budget.div_ceil(source_count)
    }
}

fn weighted_cap(total: usize, weight: f64) -> usize {
    (total as f64 * weight).floor() as usize
}
