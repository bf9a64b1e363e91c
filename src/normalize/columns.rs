//! Column name mapping
//!
//! A built-in table covers the column names seen across Swiggy, Zepto,
//! Blinkit and Instamart exports. Per-platform overrides stored in the
//! database are layered on top when a mapper is resolved.

use crate::meta::{ColumnMapping, DataType, MetaDb};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, warn};

/// Canonical fields of a normalized row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Date,
    Spend,
    Impressions,
    Clicks,
    Sales,
    Orders,
    CampaignName,
    City,
    Brand,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 9] = [
        CanonicalField::Date,
        CanonicalField::Spend,
        CanonicalField::Impressions,
        CanonicalField::Clicks,
        CanonicalField::Sales,
        CanonicalField::Orders,
        CanonicalField::CampaignName,
        CanonicalField::City,
        CanonicalField::Brand,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Date => "date",
            CanonicalField::Spend => "spend",
            CanonicalField::Impressions => "impressions",
            CanonicalField::Clicks => "clicks",
            CanonicalField::Sales => "sales",
            CanonicalField::Orders => "orders",
            CanonicalField::CampaignName => "campaign_name",
            CanonicalField::City => "city",
            CanonicalField::Brand => "brand",
        }
    }
}

impl std::fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalField {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        let lower = s.trim().to_lowercase();
        CanonicalField::ALL
            .into_iter()
            .find(|field| field.as_str() == lower)
            .ok_or_else(|| {
                crate::error::Error::InvalidInput(format!("Unknown canonical column: {}", s))
            })
    }
}

/// Built-in source column names (lower case) and the field they feed.
///
/// `total_direct_gmv_7_days` and `total_direct_gmv_14_days` are left out on
/// purpose: they overlap `total_gmv` in Swiggy ads exports.
pub const DEFAULT_MAPPINGS: &[(&str, CanonicalField)] = &[
    // Date
    ("date", CanonicalField::Date),
    ("metrics_date", CanonicalField::Date),
    ("metrics date", CanonicalField::Date),
    ("ordered_date", CanonicalField::Date),
    ("report_date", CanonicalField::Date),
    ("sales date", CanonicalField::Date),
    ("month", CanonicalField::Date),
    // Spend
    ("spend", CanonicalField::Spend),
    ("spends", CanonicalField::Spend),
    ("total_budget_burnt", CanonicalField::Spend),
    ("budget_burnt", CanonicalField::Spend),
    ("total_budget", CanonicalField::Spend),
    ("daily_budget", CanonicalField::Spend),
    ("cost", CanonicalField::Spend),
    ("amount_spent", CanonicalField::Spend),
    // Impressions
    ("impressions", CanonicalField::Impressions),
    ("total_impressions", CanonicalField::Impressions),
    ("views", CanonicalField::Impressions),
    // Clicks
    ("clicks", CanonicalField::Clicks),
    ("total_clicks", CanonicalField::Clicks),
    ("click", CanonicalField::Clicks),
    // Sales / GMV
    ("gmv", CanonicalField::Sales),
    ("total_gmv", CanonicalField::Sales),
    ("revenue", CanonicalField::Sales),
    ("sales", CanonicalField::Sales),
    ("total_sales", CanonicalField::Sales),
    ("order_value", CanonicalField::Sales),
    // Orders / quantity
    ("orders", CanonicalField::Orders),
    ("total_orders", CanonicalField::Orders),
    ("total_conversions", CanonicalField::Orders),
    ("conversions", CanonicalField::Orders),
    ("units_sold", CanonicalField::Orders),
    ("quantity", CanonicalField::Orders),
    // Campaign / product name
    ("campaign_name", CanonicalField::CampaignName),
    ("campaignname", CanonicalField::CampaignName),
    ("campaign", CanonicalField::CampaignName),
    ("product_name", CanonicalField::CampaignName),
    ("sku name", CanonicalField::CampaignName),
    ("sku_name", CanonicalField::CampaignName),
    ("ad_name", CanonicalField::CampaignName),
    ("menu_name", CanonicalField::CampaignName),
    ("item_name", CanonicalField::CampaignName),
    ("item", CanonicalField::CampaignName),
    ("name", CanonicalField::CampaignName),
    // City / location
    ("city", CanonicalField::City),
    ("location", CanonicalField::City),
    ("area_name", CanonicalField::City),
    ("region", CanonicalField::City),
    // Brand
    ("brand", CanonicalField::Brand),
    ("brand_name", CanonicalField::Brand),
    ("brandname", CanonicalField::Brand),
];

/// Where a source column ends up in a normalized row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnTarget {
    Canonical(CanonicalField),
    PassThrough(String),
}

/// Immutable lookup from lower-cased source column to target column name
#[derive(Debug, Clone)]
pub struct ColumnMapper {
    table: HashMap<String, String>,
}

fn mapping_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Best-guess key for a column nobody mapped: lower case, whitespace runs as `_`
pub fn slugify_column(name: &str) -> String {
    mapping_key(name)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

impl ColumnMapper {
    /// Mapper with only the built-in table
    pub fn defaults() -> Self {
        let table = DEFAULT_MAPPINGS
            .iter()
            .map(|(source, target)| (source.to_string(), target.as_str().to_string()))
            .collect();
        Self { table }
    }

    /// Build a mapper snapshot for one platform and data type.
    ///
    /// Active overrides for the same platform and data type replace built-in
    /// entries with the same (case-insensitive) source name.
    pub fn resolve(platform: &str, data_type: DataType, overrides: &[ColumnMapping]) -> Self {
        let mut mapper = Self::defaults();
        for mapping in overrides.iter().filter(|m| {
            m.is_active && m.data_type == data_type && m.platform.eq_ignore_ascii_case(platform)
        }) {
            mapper.table.insert(
                mapping_key(&mapping.source_column),
                mapping.target_column.trim().to_string(),
            );
        }
        mapper
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Target column name for a source column, or its slug when unmapped
    pub fn normalize_column_name(&self, name: &str) -> String {
        match self.table.get(&mapping_key(name)) {
            Some(target) => target.clone(),
            None => slugify_column(name),
        }
    }

    pub fn resolve_column(&self, name: &str) -> ColumnTarget {
        let target = self.normalize_column_name(name);
        match target.parse::<CanonicalField>() {
            Ok(field) => ColumnTarget::Canonical(field),
            Err(_) => ColumnTarget::PassThrough(target),
        }
    }
}

/// Resolve the mapper for a sync pass from stored overrides.
///
/// A failure to read overrides is not fatal: the built-in table still covers
/// the common exports.
pub async fn build_mapper(db: &MetaDb, platform: &str, data_type: DataType) -> ColumnMapper {
    match db.list_column_mappings(Some(platform), true).await {
        Ok(overrides) => {
            let mapper = ColumnMapper::resolve(platform, data_type, &overrides);
            debug!(platform, %data_type, entries = mapper.len(), "Resolved column mapper");
            mapper
        }
        Err(e) => {
            warn!(platform, %data_type, "Failed to load custom column mappings: {}", e);
            ColumnMapper::defaults()
        }
    }
}

/// Guess whether a sheet carries ads or sales data from its headers
pub fn detect_data_type<S: AsRef<str>>(headers: &[S]) -> DataType {
    const ADS_INDICATORS: &[&str] = &[
        "impressions",
        "clicks",
        "ctr",
        "cpi",
        "roi",
        "roas",
        "budget",
        "spend",
        "spends",
        "ad_name",
        "campaign",
        "budget_burnt",
    ];
    const SALES_INDICATORS: &[&str] = &[
        "order_id",
        "order",
        "quantity",
        "units_sold",
        "sku",
        "product_name",
        "mrp",
        "discount",
        "net_amount",
    ];

    let lower: Vec<String> = headers.iter().map(|h| h.as_ref().to_lowercase()).collect();
    let score = |indicators: &[&str]| {
        indicators
            .iter()
            .filter(|ind| lower.iter().any(|h| h.contains(*ind)))
            .count()
    };

    if score(ADS_INDICATORS) >= score(SALES_INDICATORS) {
        DataType::Ads
    } else {
        DataType::Sales
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
}

/// A proposed mapping for one sheet header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingSuggestion {
    pub source: String,
    pub target: CanonicalField,
    pub confidence: Confidence,
}

/// Suggest canonical targets for sheet headers.
///
/// Exact hits in the built-in table are high confidence; a substring match in
/// either direction is medium. Headers with no match are omitted.
pub fn suggest_mappings<S: AsRef<str>>(headers: &[S]) -> Vec<MappingSuggestion> {
    let mut suggestions = Vec::new();

    for header in headers {
        let header = header.as_ref();
        let lower = mapping_key(header);
        if lower.is_empty() {
            continue;
        }

        if let Some((_, target)) = DEFAULT_MAPPINGS.iter().find(|(source, _)| *source == lower) {
            suggestions.push(MappingSuggestion {
                source: header.to_string(),
                target: *target,
                confidence: Confidence::High,
            });
            continue;
        }

        if let Some((_, target)) = DEFAULT_MAPPINGS
            .iter()
            .find(|(pattern, _)| lower.contains(pattern) || pattern.contains(lower.as_str()))
        {
            suggestions.push(MappingSuggestion {
                source: header.to_string(),
                target: *target,
                confidence: Confidence::Medium,
            });
        }
    }

    suggestions
}
