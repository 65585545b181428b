//! Aggregates behind the analytics charts

use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProjectCount {
    pub id: i64,
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ActivityPoint {
    pub bucket: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistogramBin {
    pub bucket: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LengthHistogram {
    pub bins: Vec<HistogramBin>,
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FilenameCount {
    pub name: String,
    pub count: i64,
}

/// Time bucket width for the activity series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Hour,
    Day,
    Week,
    Month,
}

impl Interval {
    /// Unknown values fall back to `Day`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("hour") => Self::Hour,
            Some("week") => Self::Week,
            Some("month") => Self::Month,
            _ => Self::Day,
        }
    }

    /// SQLite expression truncating `created_at` to the start of the bucket.
    fn bucket_expr(&self) -> &'static str {
        match self {
            Self::Hour => "strftime('%Y-%m-%dT%H:00:00Z', created_at)",
            Self::Day => "strftime('%Y-%m-%dT00:00:00Z', created_at)",
            // Monday of the ISO week
            Self::Week => "strftime('%Y-%m-%dT00:00:00Z', created_at, 'weekday 0', '-6 days')",
            Self::Month => "strftime('%Y-%m-01T00:00:00Z', created_at)",
        }
    }
}

pub struct AnalyticsRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AnalyticsRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Text count per project, including empty projects.
    pub async fn project_counts(&self) -> Result<Vec<ProjectCount>> {
        let rows = sqlx::query_as::<_, ProjectCount>(
            r#"
            SELECT p.id AS id, p.name AS name, COUNT(t.id) AS count
            FROM projects p
            LEFT JOIN saved_texts t ON t.project_id = p.id
            GROUP BY p.id, p.name
            ORDER BY count DESC, p.name ASC
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Most recent `points` buckets, returned oldest first. `points` is clamped to 1..=365.
    pub async fn activity(
        &self,
        project_id: Option<i64>,
        interval: Interval,
        points: i64,
    ) -> Result<Vec<ActivityPoint>> {
        let points = points.clamp(1, 365);
        let sql = format!(
            r#"
            SELECT {} AS bucket, COUNT(*) AS count
            FROM saved_texts
            WHERE (?1 IS NULL OR project_id = ?1)
            GROUP BY bucket
            ORDER BY bucket DESC
            LIMIT ?2
            "#,
            interval.bucket_expr()
        );

        let mut rows = sqlx::query_as::<_, ActivityPoint>(&sql)
            .bind(project_id)
            .bind(points)
            .fetch_all(self.pool)
            .await?;
        rows.reverse();

        Ok(rows)
    }

    /// Histogram of text lengths in `bins` equal-width buckets (clamped to 2..=50).
    pub async fn length_histogram(&self, project_id: Option<i64>, bins: i64) -> Result<LengthHistogram> {
        let lengths = sqlx::query_scalar::<_, i64>(
            "SELECT LENGTH(text) FROM saved_texts WHERE (?1 IS NULL OR project_id = ?1)",
        )
        .bind(project_id)
        .fetch_all(self.pool)
        .await?;

        Ok(histogram(&lengths, bins.clamp(2, 50)))
    }

    /// Most frequent filenames; missing names group as `(none)`. `limit` is clamped to 1..=100.
    pub async fn top_filenames(&self, project_id: Option<i64>, limit: i64) -> Result<Vec<FilenameCount>> {
        let rows = sqlx::query_as::<_, FilenameCount>(
            r#"
            SELECT COALESCE(filename, '(none)') AS name, COUNT(*) AS count
            FROM saved_texts
            WHERE (?1 IS NULL OR project_id = ?1)
            GROUP BY COALESCE(filename, '(none)')
            ORDER BY count DESC, COALESCE(filename, '(none)') ASC
            LIMIT ?2
            "#,
        )
        .bind(project_id)
        .bind(limit.clamp(1, 100))
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }
}

/// Equal-width buckets over `[min, max + 1)`, numbered from 1; empty buckets are omitted.
fn histogram(lengths: &[i64], bins: i64) -> LengthHistogram {
    let (Some(&min), Some(&max)) = (lengths.iter().min(), lengths.iter().max()) else {
        return LengthHistogram {
            bins: Vec::new(),
            min: 0,
            max: 0,
        };
    };

    let span = max + 1 - min;
    let mut counts = vec![0i64; bins as usize];
    for &len in lengths {
        let idx = ((len - min) * bins / span) as usize;
        counts[idx.min(bins as usize - 1)] += 1;
    }

    LengthHistogram {
        bins: counts
            .into_iter()
            .enumerate()
            .filter(|(_, c)| *c > 0)
            .map(|(i, count)| HistogramBin {
                bucket: i as i64 + 1,
                count,
            })
            .collect(),
        min,
        max,
    }
}
