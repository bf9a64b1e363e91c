//! Column mapping commands

use crate::error::{Error, Result};
use crate::meta::{ColumnMapping, DataType, MetaDb};
use crate::normalize::{detect_data_type, slugify_column, suggest_mappings, CanonicalField, MappingSuggestion};
use crate::sheets::SheetFetcher;
use serde::Serialize;
use tracing::{info, warn};

pub async fn cmd_list_mappings(db: &MetaDb, platform: Option<&str>) -> Result<Vec<ColumnMapping>> {
    db.list_column_mappings(platform, false).await
}

/// Map a sheet header to a canonical field for one platform and data type.
///
/// Targets that are not canonical fields are stored as slugs and land in the
/// pass-through columns of normalized rows.
pub async fn cmd_set_mapping(
    db: &MetaDb,
    platform: &str,
    data_type: DataType,
    source_column: &str,
    target: &str,
) -> Result<ColumnMapping> {
    if platform.trim().is_empty() || source_column.trim().is_empty() {
        return Err(Error::InvalidInput(
            "Platform and source column must not be empty".to_string(),
        ));
    }

    let target_column = match target.parse::<CanonicalField>() {
        Ok(field) => field.as_str().to_string(),
        Err(_) => {
            let slug = slugify_column(target);
            if slug.is_empty() {
                return Err(Error::InvalidInput(format!("Invalid target column: {}", target)));
            }
            warn!("'{}' is not a canonical field; stored as custom column '{}'", target, slug);
            slug
        }
    };

    let mapping = ColumnMapping::new(
        platform.to_string(),
        data_type,
        source_column.to_string(),
        target_column,
    );
    db.upsert_column_mapping(&mapping).await?;
    info!(
        platform = %mapping.platform,
        %data_type,
        "Mapped '{}' -> '{}'",
        mapping.source_column,
        mapping.target_column
    );
    Ok(mapping)
}

pub async fn cmd_remove_mapping(db: &MetaDb, mapping_id: &str) -> Result<()> {
    db.delete_column_mapping(mapping_id).await
}

/// Header analysis for a registered source
#[derive(Debug, Clone, Serialize)]
pub struct SuggestReport {
    pub source_id: String,
    pub source_name: String,
    pub configured_data_type: DataType,
    pub detected_data_type: DataType,
    pub headers: Vec<String>,
    pub suggestions: Vec<MappingSuggestion>,
}

/// Fetch a source's headers and propose mappings
pub async fn cmd_suggest_mappings(
    db: &MetaDb,
    fetcher: &dyn SheetFetcher,
    source_id: &str,
) -> Result<SuggestReport> {
    let source = db
        .get_source(source_id)
        .await?
        .ok_or_else(|| Error::SourceNotFound(source_id.to_string()))?;

    let rows = fetcher
        .fetch_rows(
            &source.sheet_id,
            source.tab_name.as_deref(),
            source.tab_gid.as_deref(),
        )
        .await?;

    let headers: Vec<String> = rows
        .first()
        .map(|row| row.columns().map(str::to_string).collect())
        .unwrap_or_default();
    if headers.is_empty() {
        return Err(Error::Sheet("No data found in sheet".to_string()));
    }

    Ok(SuggestReport {
        source_id: source.id,
        source_name: source.name,
        configured_data_type: source.data_type,
        detected_data_type: detect_data_type(&headers),
        suggestions: suggest_mappings(&headers),
        headers,
    })
}

pub fn print_mappings(mappings: &[ColumnMapping]) {
    println!("\n🔀 Column Mappings\n");

    if mappings.is_empty() {
        println!("No custom mappings. Built-in mappings cover common platform exports.");
        return;
    }

    for mapping in mappings {
        let state = if mapping.is_active { "" } else { " (inactive)" };
        println!(
            "• [{} {}] {} → {}{}",
            mapping.platform, mapping.data_type, mapping.source_column, mapping.target_column, state
        );
        println!("  ID: {}", mapping.id);
    }
}

pub fn print_suggestions(report: &SuggestReport) {
    println!("\n🔍 {} ({})\n", report.source_name, report.source_id);
    println!("Headers: {}", report.headers.join(", "));
    if report.detected_data_type == report.configured_data_type {
        println!("Detected data type: {}", report.detected_data_type);
    } else {
        println!(
            "Detected data type: {} (source is registered as {})",
            report.detected_data_type, report.configured_data_type
        );
    }

    if report.suggestions.is_empty() {
        println!("\nNo headers matched a known metric column.");
        return;
    }

    println!();
    for suggestion in &report.suggestions {
        println!(
            "  {} → {} ({:?})",
            suggestion.source, suggestion.target, suggestion.confidence
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::DataSource;
    use crate::normalize::{Confidence, RawRow};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct HeaderSheet(Vec<&'static str>);

    #[async_trait]
    impl SheetFetcher for HeaderSheet {
        async fn fetch_rows(
            &self,
            _sheet_id: &str,
            _tab_name: Option<&str>,
            _grid_id: Option<&str>,
        ) -> Result<Vec<RawRow>> {
            if self.0.is_empty() {
                return Ok(Vec::new());
            }
            Ok(vec![self.0.iter().map(|h| (*h, "1")).collect()])
        }
    }

    async fn setup_test_db() -> (MetaDb, TempDir) {
        let temp = TempDir::new().unwrap();
        let db = MetaDb::new(&temp.path().join("test.db")).await.unwrap();
        (db, temp)
    }

    #[tokio::test]
    async fn test_set_mapping_canonical_and_custom() {
        let (db, _temp) = setup_test_db().await;

        let mapping = cmd_set_mapping(&db, "Zepto", DataType::Ads, "Ad Spend (INR)", "Spend")
            .await
            .unwrap();
        assert_eq!(mapping.target_column, "spend");
        assert_eq!(mapping.platform, "zepto");

        let custom = cmd_set_mapping(&db, "zepto", DataType::Ads, "Region", "Store Region")
            .await
            .unwrap();
        assert_eq!(custom.target_column, "store_region");

        let listed = cmd_list_mappings(&db, Some("ZEPTO")).await.unwrap();
        assert_eq!(listed.len(), 2);

        cmd_remove_mapping(&db, &custom.id).await.unwrap();
        assert_eq!(cmd_list_mappings(&db, None).await.unwrap().len(), 1);
        assert!(matches!(
            cmd_remove_mapping(&db, &custom.id).await.unwrap_err(),
            Error::MappingNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_suggest_from_headers() {
        let (db, _temp) = setup_test_db().await;
        let source = DataSource::new(
            "blinkit sales".to_string(),
            "sheet".to_string(),
            "https://example.com".to_string(),
            "blinkit",
            DataType::Ads,
        );
        db.insert_source(&source).await.unwrap();

        let sheet = HeaderSheet(vec!["Order Date", "Order ID", "SKU", "Quantity", "GMV"]);
        let report = cmd_suggest_mappings(&db, &sheet, &source.id).await.unwrap();

        assert_eq!(report.detected_data_type, DataType::Sales);
        assert_eq!(report.configured_data_type, DataType::Ads);
        assert_eq!(report.headers.len(), 5);
        assert!(report
            .suggestions
            .iter()
            .any(|s| s.source == "GMV" && s.target == CanonicalField::Sales
                && s.confidence == Confidence::High));
    }

    #[tokio::test]
    async fn test_suggest_on_empty_sheet() {
        let (db, _temp) = setup_test_db().await;
        let source = DataSource::new(
            "empty".to_string(),
            "sheet".to_string(),
            "https://example.com".to_string(),
            "swiggy",
            DataType::Ads,
        );
        db.insert_source(&source).await.unwrap();

        let err = cmd_suggest_mappings(&db, &HeaderSheet(Vec::new()), &source.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Sheet(_)));
    }
}
