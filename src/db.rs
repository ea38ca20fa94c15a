use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::catalog::SignatureCatalog;
use crate::error::StoreError;
use crate::models::{
    EnrollmentRecord, EnrollmentStatus, PhaseSummary, ProgramType, ProgressionSummaryRow,
    StudentOutput, Term,
};
use crate::registry::{InMemoryRegistry, MajorRef};
use crate::store::ProgressionStore;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Loads the major catalog into memory once, ahead of a batch.
pub async fn load_registry(pool: &PgPool) -> anyhow::Result<InMemoryRegistry> {
    let rows = sqlx::query("SELECT code, name, program_type FROM progression.majors")
        .fetch_all(pool)
        .await
        .context("failed to load majors")?;

    let mut majors = Vec::with_capacity(rows.len());
    for row in rows {
        let program_type: String = row.get("program_type");
        let Some(program_type) = ProgramType::parse(&program_type) else {
            tracing::warn!(program_type = %program_type, "Skipping major with unknown program type");
            continue;
        };
        majors.push(MajorRef {
            code: row.get("code"),
            name: row.get("name"),
            program_type,
        });
    }

    Ok(InMemoryRegistry::new(majors))
}

pub async fn seed(pool: &PgPool, catalog: &SignatureCatalog) -> anyhow::Result<()> {
    for major in catalog.reference_majors() {
        sqlx::query(
            r#"
            INSERT INTO progression.majors (code, name, program_type)
            VALUES ($1, $2, $3)
            ON CONFLICT (code) DO UPDATE
            SET name = EXCLUDED.name, program_type = EXCLUDED.program_type
            "#,
        )
        .bind(&major.code)
        .bind(&major.name)
        .bind(major.program_type.as_str())
        .execute(pool)
        .await?;
    }

    let students = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "Sokha Chan",
            "sokha.chan@groupscholar.com",
            vec![
                vec!["IEAP-3", "IEAP-3"],
                vec!["IEAP-4", "IEAP-4"],
                vec!["IR210", "IR220", "ENG101"],
                vec!["IR301", "IR310", "POL302"],
            ],
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "Dara Meas",
            "dara.meas@groupscholar.com",
            vec![
                vec!["BUS201", "BUS210", "ACCT201"],
                vec!["BUS301", "FIN301", "BUS330"],
                vec!["BUS501", "BUS510"],
            ],
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "Vanna Keo",
            "vanna.keo@groupscholar.com",
            vec![
                vec!["GEN101", "HIST110", "PHIL120"],
                vec!["ART101", "SOC110", "PSY120"],
            ],
        ),
    ];

    let first_term = NaiveDate::from_ymd_opt(2022, 1, 10).context("invalid date")?;
    for (id, name, email, terms) in students {
        let student_id: Uuid = sqlx::query(
            r#"
            INSERT INTO progression.students (id, full_name, email)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .fetch_one(pool)
        .await?
        .get("id");

        for (idx, courses) in terms.iter().enumerate() {
            let term_start = first_term + Duration::days(120 * idx as i64);
            let term_code = format!("SEED-{}-{}", email, idx + 1);
            for course in courses {
                sqlx::query(
                    r#"
                    INSERT INTO progression.enrollments
                    (id, student_id, course_code, term_code, term_start, term_end,
                     grade, credits, status, source_key)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    ON CONFLICT (source_key) DO NOTHING
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(student_id)
                .bind(*course)
                .bind(&term_code)
                .bind(term_start)
                .bind(term_start + Duration::days(105))
                .bind("B")
                .bind(3.0_f64)
                .bind(EnrollmentStatus::Completed.as_str())
                .bind(format!("{term_code}-{course}"))
                .execute(pool)
                .await?;
            }
        }
    }

    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        full_name: String,
        email: String,
        course_code: String,
        term_code: String,
        term_start: NaiveDate,
        term_end: NaiveDate,
        #[serde(default)]
        grade: String,
        credits: f64,
        #[serde(default)]
        status: String,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let student_id: Uuid = sqlx::query(
            r#"
            INSERT INTO progression.students (id, full_name, email)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.full_name)
        .bind(&row.email)
        .fetch_one(pool)
        .await?
        .get("id");

        let source_key = row.source_key.unwrap_or_else(|| {
            format!("{}:{}:{}", row.email, row.term_code, row.course_code)
        });

        let result = sqlx::query(
            r#"
            INSERT INTO progression.enrollments
            (id, student_id, course_code, term_code, term_start, term_end,
             grade, credits, status, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(&row.course_code)
        .bind(&row.term_code)
        .bind(row.term_start)
        .bind(row.term_end)
        .bind(row.grade.trim())
        .bind(row.credits)
        .bind(EnrollmentStatus::parse(&row.status).as_str())
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn fetch_progression_summaries(
    pool: &PgPool,
) -> anyhow::Result<Vec<ProgressionSummaryRow>> {
    let records = sqlx::query(
        "SELECT p.student_id, s.full_name, p.current_status, p.entry_program_type, \
         p.ba_major_code, p.total_terms, p.journeys_requiring_review \
         FROM progression.progressions p \
         LEFT JOIN progression.students s ON s.id = p.student_id \
         ORDER BY p.journeys_requiring_review DESC, s.full_name",
    )
    .fetch_all(pool)
    .await?;

    let mut rows = Vec::with_capacity(records.len());
    for row in records {
        rows.push(ProgressionSummaryRow {
            student_id: row.get("student_id"),
            full_name: row.get("full_name"),
            current_status: row.get("current_status"),
            entry_program_type: row.get("entry_program_type"),
            ba_major: row.get("ba_major_code"),
            total_terms: row.get("total_terms"),
            journeys_requiring_review: row.get("journeys_requiring_review"),
        });
    }

    Ok(rows)
}

/// Postgres-backed [`ProgressionStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn delete_output(
        tx: &mut Transaction<'_, Postgres>,
        student_id: Uuid,
    ) -> Result<(), StoreError> {
        // milestones go with their journeys (ON DELETE CASCADE)
        sqlx::query("DELETE FROM progression.journeys WHERE student_id = $1")
            .bind(student_id)
            .execute(&mut **tx)
            .await?;
        sqlx::query("DELETE FROM progression.progressions WHERE student_id = $1")
            .bind(student_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProgressionStore for PgStore {
    async fn student_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        // Every output row references a student, so this also covers students
        // whose enrollments have since been deleted.
        let rows = sqlx::query("SELECT id FROM progression.students ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("id")).collect())
    }

    async fn enrollments(&self, student_id: Uuid) -> Result<Vec<EnrollmentRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT student_id, course_code, term_code, term_start, term_end, grade, credits, status \
             FROM progression.enrollments \
             WHERE student_id = $1 \
             ORDER BY term_start, term_code, course_code",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.get("status");
            records.push(EnrollmentRecord {
                student_id: row.get("student_id"),
                course_code: row.get("course_code"),
                term: Term {
                    code: row.get("term_code"),
                    start_date: row.get("term_start"),
                    end_date: row.get("term_end"),
                },
                grade: row.get("grade"),
                credits: row.get("credits"),
                status: EnrollmentStatus::parse(&status),
            });
        }
        Ok(records)
    }

    async fn replace_output(&self, output: &StudentOutput) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::delete_output(&mut tx, output.student_id).await?;

        for journey in &output.journeys {
            sqlx::query(
                r#"
                INSERT INTO progression.journeys
                (id, student_id, sequence, program_type, program_code, start_date, stop_date,
                 start_term, duration_terms, transition_status, confidence_score,
                 requires_review, language_level)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(journey.id)
            .bind(journey.student_id)
            .bind(journey.sequence as i32)
            .bind(journey.program_type.as_str())
            .bind(journey.program.as_ref().map(|program| program.code.as_str()))
            .bind(journey.start_date)
            .bind(journey.stop_date)
            .bind(&journey.start_term)
            .bind(journey.duration_terms as i32)
            .bind(journey.transition_status.as_str())
            .bind(journey.confidence_score)
            .bind(journey.requires_review)
            .bind(journey.language_level.map(|level| level as i32))
            .execute(&mut *tx)
            .await?;
        }

        for milestone in &output.milestones {
            sqlx::query(
                r#"
                INSERT INTO progression.milestones
                (id, journey_id, kind, occurred_on, confidence_score, inferred, inference_method)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(milestone.id)
            .bind(milestone.journey_id)
            .bind(milestone.kind.as_str())
            .bind(milestone.date)
            .bind(milestone.confidence_score)
            .bind(milestone.inferred)
            .bind(milestone.inference_method)
            .execute(&mut *tx)
            .await?;
        }

        let progression = &output.progression;
        let detail = serde_json::to_string(progression).map_err(|source| StoreError::Encode {
            what: "progression",
            source,
        })?;
        let phase = |summary: &PhaseSummary| {
            (
                summary.start_date,
                summary.end_date,
                summary.terms as i32,
                summary.completed,
            )
        };
        let language = phase(&progression.language);
        let undergraduate = phase(&progression.undergraduate);
        let graduate = phase(&progression.graduate);

        sqlx::query(
            r#"
            INSERT INTO progression.progressions
            (student_id, entry_program_type, entry_program_code, entry_date, entry_term,
             language_start, language_end, language_terms, language_completed,
             ba_start, ba_end, ba_terms, ba_completed,
             ma_start, ma_end, ma_terms, ma_completed,
             ba_major_code, ma_program_code, time_to_ba_days, time_to_ma_days,
             total_terms, journeys_requiring_review, current_status, detail)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25::jsonb)
            "#,
        )
        .bind(progression.student_id)
        .bind(progression.entry_program_type.as_str())
        .bind(progression.entry_program.as_ref().map(|program| program.code.as_str()))
        .bind(progression.entry_date)
        .bind(&progression.entry_term)
        .bind(language.0)
        .bind(language.1)
        .bind(language.2)
        .bind(language.3)
        .bind(undergraduate.0)
        .bind(undergraduate.1)
        .bind(undergraduate.2)
        .bind(undergraduate.3)
        .bind(graduate.0)
        .bind(graduate.1)
        .bind(graduate.2)
        .bind(graduate.3)
        .bind(progression.ba_major.as_ref().map(|major| major.code.as_str()))
        .bind(progression.ma_program.as_ref().map(|program| program.code.as_str()))
        .bind(progression.time_to_ba_days)
        .bind(progression.time_to_ma_days)
        .bind(progression.total_terms as i32)
        .bind(progression.journeys_requiring_review as i32)
        .bind(progression.current_status.as_str())
        .bind(detail)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            student_id = %output.student_id,
            journeys = output.journeys.len(),
            milestones = output.milestones.len(),
            "Stored progression output"
        );
        Ok(())
    }

    async fn clear_output(&self, student_id: Uuid) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::delete_output(&mut tx, student_id).await?;
        tx.commit().await?;
        Ok(())
    }
}
