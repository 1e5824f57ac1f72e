use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::common::{PlaceRecordId, ScrapeJobId};
use crate::domains::scraping::actions::FoundPlace;
use crate::domains::scraping::error::StoreError;

/// Stored in place of contact fields the provider did not return.
pub const MISSING_VALUE: &str = "-";

/// One place discovered by a scrape job. Never updated by the worker.
#[derive(FromRow, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub id: PlaceRecordId,
    pub scrape_job_id: ScrapeJobId,
    pub name: String,
    /// Always `-`: the provider has no email source
    pub email: String,
    pub address: String,
    pub phone: String,
    pub website: String,
    /// Canonical provider URL for the place
    pub source: String,
    pub industry: Vec<String>,
    pub rating: Option<f64>,
    pub review_count: i32,
    /// Promotion to a lead happens outside the worker
    pub has_been_added: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a place record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPlaceRecord {
    pub scrape_job_id: ScrapeJobId,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub website: String,
    pub source: String,
    pub industry: Vec<String>,
    pub rating: Option<f64>,
    pub review_count: i32,
}

impl NewPlaceRecord {
    /// Merge a search summary with its details. Details win where both carry
    /// a value; missing contact fields become `-`.
    pub fn from_found(scrape_job_id: ScrapeJobId, place: &FoundPlace) -> Self {
        let summary = &place.summary;
        let details = &place.details;

        let industry_source = if details.types.is_empty() {
            &summary.types
        } else {
            &details.types
        };
        let mut industry: Vec<String> = Vec::with_capacity(industry_source.len());
        for tag in industry_source {
            if !industry.contains(tag) {
                industry.push(tag.clone());
            }
        }

        Self {
            scrape_job_id,
            name: first_present([&details.name, &summary.name])
                .unwrap_or(summary.place_id.as_str())
                .to_string(),
            address: or_missing(first_present([&details.formatted_address, &summary.vicinity])),
            phone: or_missing(first_present([&details.formatted_phone_number])),
            website: or_missing(first_present([&details.website])),
            source: or_missing(first_present([&details.url])),
            industry,
            rating: details.rating.or(summary.rating),
            review_count: details
                .user_ratings_total
                .or(summary.user_ratings_total)
                .map(|n| n.clamp(0, i32::MAX as i64) as i32)
                .unwrap_or(0),
        }
    }

    /// Materialize without touching the database.
    pub fn into_record(self) -> PlaceRecord {
        PlaceRecord {
            id: PlaceRecordId::new(),
            scrape_job_id: self.scrape_job_id,
            name: self.name,
            email: MISSING_VALUE.to_string(),
            address: self.address,
            phone: self.phone,
            website: self.website,
            source: self.source,
            industry: self.industry,
            rating: self.rating,
            review_count: self.review_count,
            has_been_added: false,
            created_at: Utc::now(),
        }
    }
}

fn first_present<const N: usize>(candidates: [&Option<String>; N]) -> Option<&str> {
    candidates
        .into_iter()
        .filter_map(|c| c.as_deref())
        .map(str::trim)
        .find(|v| !v.is_empty())
}

fn or_missing(value: Option<&str>) -> String {
    value.unwrap_or(MISSING_VALUE).to_string()
}

impl PlaceRecord {
    pub async fn insert(new: NewPlaceRecord, pool: &PgPool) -> Result<Self, StoreError> {
        let record = new.into_record();
        let record = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO place_records (
                id, scrape_job_id, name, email, address, phone, website, source,
                industry, rating, review_count, has_been_added, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(record.id)
        .bind(record.scrape_job_id)
        .bind(&record.name)
        .bind(&record.email)
        .bind(&record.address)
        .bind(&record.phone)
        .bind(&record.website)
        .bind(&record.source)
        .bind(&record.industry)
        .bind(record.rating)
        .bind(record.review_count)
        .bind(record.has_been_added)
        .bind(record.created_at)
        .fetch_one(pool)
        .await?;

        Ok(record)
    }

    pub async fn find_by_job(
        scrape_job_id: ScrapeJobId,
        pool: &PgPool,
    ) -> Result<Vec<Self>, StoreError> {
        let records = sqlx::query_as::<_, Self>(
            "SELECT * FROM place_records WHERE scrape_job_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(scrape_job_id)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    pub async fn count_by_job(scrape_job_id: ScrapeJobId, pool: &PgPool) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM place_records WHERE scrape_job_id = $1",
        )
        .bind(scrape_job_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maps_client::{PlaceDetails, PlaceSummary};

    fn summary() -> PlaceSummary {
        PlaceSummary {
            place_id: "p1".into(),
            name: Some("Warung Sate".into()),
            vicinity: Some("Jl. Braga No. 1".into()),
            types: vec!["restaurant".into(), "food".into()],
            rating: Some(4.1),
            user_ratings_total: Some(80),
        }
    }

    #[test]
    fn test_details_take_precedence() {
        let place = FoundPlace {
            summary: summary(),
            details: PlaceDetails {
                name: Some("Warung Sate Braga".into()),
                formatted_address: Some("Jl. Braga No. 1, Bandung".into()),
                formatted_phone_number: Some("(022) 123456".into()),
                website: Some("https://satebraga.id".into()),
                rating: Some(4.3),
                user_ratings_total: Some(95),
                types: vec!["restaurant".into(), "point_of_interest".into()],
                url: Some("https://maps.google.com/?cid=42".into()),
                ..Default::default()
            },
        };

        let record = NewPlaceRecord::from_found(ScrapeJobId::new(), &place);
        assert_eq!(record.name, "Warung Sate Braga");
        assert_eq!(record.address, "Jl. Braga No. 1, Bandung");
        assert_eq!(record.phone, "(022) 123456");
        assert_eq!(record.source, "https://maps.google.com/?cid=42");
        assert_eq!(record.industry, vec!["restaurant", "point_of_interest"]);
        assert_eq!(record.rating, Some(4.3));
        assert_eq!(record.review_count, 95);
    }

    #[test]
    fn test_missing_fields_use_sentinel_and_summary_fallbacks() {
        let place = FoundPlace {
            summary: summary(),
            details: PlaceDetails::default(),
        };

        let record = NewPlaceRecord::from_found(ScrapeJobId::new(), &place);
        assert_eq!(record.name, "Warung Sate");
        assert_eq!(record.address, "Jl. Braga No. 1");
        assert_eq!(record.phone, MISSING_VALUE);
        assert_eq!(record.website, MISSING_VALUE);
        assert_eq!(record.source, MISSING_VALUE);
        assert_eq!(record.industry, vec!["restaurant", "food"]);
        assert_eq!(record.rating, Some(4.1));
        assert_eq!(record.review_count, 80);
    }

    #[test]
    fn test_absent_rating_stays_unset() {
        let place = FoundPlace {
            summary: PlaceSummary {
                place_id: "p2".into(),
                ..Default::default()
            },
            details: PlaceDetails {
                website: Some("   ".into()),
                ..Default::default()
            },
        };

        let record = NewPlaceRecord::from_found(ScrapeJobId::new(), &place);
        assert_eq!(record.rating, None);
        assert_eq!(record.review_count, 0);
        assert_eq!(record.website, MISSING_VALUE);
        assert_eq!(record.name, "p2");
        assert_eq!(record.address, MISSING_VALUE);
    }

    #[test]
    fn test_industry_tags_deduplicated_in_order() {
        let place = FoundPlace {
            summary: summary(),
            details: PlaceDetails {
                types: vec!["food".into(), "cafe".into(), "food".into()],
                ..Default::default()
            },
        };

        let record = NewPlaceRecord::from_found(ScrapeJobId::new(), &place);
        assert_eq!(record.industry, vec!["food", "cafe"]);
    }

    #[test]
    fn test_into_record_defaults() {
        let place = FoundPlace {
            summary: summary(),
            details: PlaceDetails::default(),
        };
        let record = NewPlaceRecord::from_found(ScrapeJobId::new(), &place).into_record();
        assert_eq!(record.email, MISSING_VALUE);
        assert!(!record.has_been_added);
    }
}
