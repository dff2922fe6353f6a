//! Compile jobs: layout descriptor to SLA, then the export phase.
//!
//! Export runs inside the same job rather than as a second queued job, so
//! a compile job is only `completed` once its PDF and page previews exist.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{json, Value};

use pressline_core::ids::to_hex;
use pressline_core::kinds::ArtifactKind;
use pressline_core::layout::{self, validate_descriptor};
use pressline_core::types::DbId;
use pressline_db::models::job::Job;
use pressline_db::models::page::CreatePage;
use pressline_db::models::status::LogLevel;
use pressline_db::repositories::{ArtifactRepo, JobRepo, PageRepo};
use pressline_pipeline::preview::{page_previews, placeholder_pdf};
use pressline_pipeline::sla::compile_layout;

use super::{attempt_tag, emit_job_event};
use crate::context::WorkerContext;
use crate::error::JobError;

/// Schema errors quoted in the failure message.
const MAX_QUOTED_ERRORS: usize = 5;

pub fn sla_file_name(job_id: DbId, attempt: &str) -> String {
    format!("layout_{}_{attempt}.sla", to_hex(job_id))
}

pub fn build_file_name(job_id: DbId, attempt: &str) -> String {
    format!("build_{}_{attempt}.json", to_hex(job_id))
}

pub fn pdf_file_name(job_id: DbId, attempt: &str) -> String {
    format!("output_{}_{attempt}.pdf", to_hex(job_id))
}

pub fn preview_file_name(job_id: DbId, attempt: &str, page_number: i64) -> String {
    format!("preview_{}_{attempt}_p{page_number:04}.png", to_hex(job_id))
}

/// Reject descriptors the compiler cannot place.
pub fn check_descriptor(doc: &Value) -> Result<(), JobError> {
    let errors = validate_descriptor(doc);
    if errors.is_empty() {
        return Ok(());
    }
    let quoted: Vec<String> = errors.iter().take(MAX_QUOTED_ERRORS).map(ToString::to_string).collect();
    Err(JobError::InvalidJob(format!(
        "layout descriptor has {} schema error(s): {}",
        errors.len(),
        quoted.join("; ")
    )))
}

/// `(page_number, master_page, object_count)` per page, in document order.
pub fn page_rows(doc: &Value) -> Result<Vec<(i32, Option<String>, i32)>, JobError> {
    layout::pages(doc)
        .map(|page| {
            let raw = layout::page_number(page);
            let number = i32::try_from(raw)
                .map_err(|_| JobError::InvalidJob(format!("pageNumber {raw} does not fit a page row")))?;
            let master = page.get("masterPage").and_then(Value::as_str).map(str::to_string);
            let objects = i32::try_from(layout::page_objects(page).count()).unwrap_or(i32::MAX);
            Ok((number, master, objects))
        })
        .collect()
}

pub async fn run(ctx: &WorkerContext, job: &Job) -> Result<(), JobError> {
    if !JobRepo::mark_running(&ctx.pool, job.id).await? {
        tracing::info!(job_id = %job.id, "Job no longer runnable");
        return Ok(());
    }
    ctx.job_log(job.id, LogLevel::Info, "Compilation started", None).await;

    let input_id = job
        .input_artifact_id
        .ok_or_else(|| JobError::InvalidJob("compile job has no input artifact".into()))?;
    let input = ArtifactRepo::find_by_id(&ctx.pool, input_id)
        .await?
        .ok_or_else(|| JobError::InvalidJob(format!("input artifact {input_id} not found")))?;
    let doc: Value = serde_json::from_slice(&ctx.fetch_artifact(&input).await?)?;
    check_descriptor(&doc)?;
    let rows = page_rows(&doc)?;
    let attempt = attempt_tag();

    // -- SLA ---
    let sla = compile_layout(&doc);
    let sla_md5 = ctx.store.checksum(&sla);
    let sla_size = sla.len();
    let sla_artifact = ctx
        .store_artifact(
            sla,
            ArtifactKind::Sla,
            &sla_file_name(job.id, &attempt),
            json!({ "job_id": job.id, "attempt": attempt }),
        )
        .await?;
    JobRepo::set_output_artifact(&ctx.pool, job.id, sla_artifact.id).await?;

    let build = json!({
        "job_id": job.id,
        "input_artifact_id": input_id,
        "sla_artifact_id": sla_artifact.id,
        "sla_bytes": sla_size,
        "sla_md5": sla_md5,
        "pages": rows.len(),
        "objects": rows.iter().map(|(_, _, count)| *count as i64).sum::<i64>(),
        "compiled_at": Utc::now(),
        "compiler": concat!("pressline ", env!("CARGO_PKG_VERSION")),
    });
    ctx.store_artifact(
        serde_json::to_vec_pretty(&build)?,
        ArtifactKind::BuildMetadata,
        &build_file_name(job.id, &attempt),
        json!({ "job_id": job.id, "attempt": attempt }),
    )
    .await?;

    // Page rows describe the latest run only.
    PageRepo::delete_for_job(&ctx.pool, job.id).await?;
    let mut page_ids = HashMap::new();
    for (page_number, master_page, object_count) in rows {
        let page = PageRepo::create(
            &ctx.pool,
            &CreatePage {
                job_id: job.id,
                page_number,
                master_page,
                object_count,
            },
        )
        .await?;
        page_ids.insert(i64::from(page_number), page.id);
    }

    ctx.job_log(
        job.id,
        LogLevel::Info,
        "Compilation finished",
        Some(json!({ "pages": page_ids.len(), "sla_artifact_id": sla_artifact.id })),
    )
    .await;
    emit_job_event(
        ctx,
        job,
        "job.compilation.completed",
        json!({ "sla_artifact_id": sla_artifact.id, "pages": page_ids.len() }),
    );

    let exported = export(ctx, job, &attempt, doc, &page_ids).await?;

    JobRepo::complete(&ctx.pool, job.id, Some(sla_artifact.id)).await?;
    ctx.job_log(job.id, LogLevel::Info, "Export finished", Some(exported.clone())).await;
    emit_job_event(ctx, job, "job.export.completed", exported);
    Ok(())
}

/// Export phase: placeholder PDF for the whole job plus one PNG preview per
/// page, each attached to its page row.
async fn export(
    ctx: &WorkerContext,
    job: &Job,
    attempt: &str,
    doc: Value,
    page_ids: &HashMap<i64, DbId>,
) -> Result<Value, JobError> {
    let (pdf, previews) = tokio::task::spawn_blocking(move || {
        let pdf = placeholder_pdf(&doc);
        page_previews(&doc).map(|previews| (pdf, previews))
    })
    .await
    .map_err(|e| JobError::Render(e.to_string()))?
    .map_err(|e| JobError::Render(e.to_string()))?;

    let pdf_artifact = ctx
        .store_artifact(
            pdf,
            ArtifactKind::Pdf,
            &pdf_file_name(job.id, attempt),
            json!({ "job_id": job.id, "attempt": attempt }),
        )
        .await?;
    PageRepo::set_pdf_artifact(&ctx.pool, job.id, pdf_artifact.id).await?;

    let mut attached = 0usize;
    for (page_number, png) in previews {
        let artifact = ctx
            .store_artifact(
                png,
                ArtifactKind::Png,
                &preview_file_name(job.id, attempt, page_number),
                json!({ "job_id": job.id, "attempt": attempt, "page_number": page_number }),
            )
            .await?;
        match page_ids.get(&page_number) {
            Some(page_id) => {
                PageRepo::set_png_artifact(&ctx.pool, *page_id, artifact.id).await?;
                attached += 1;
            }
            None => tracing::warn!(job_id = %job.id, page_number, "Preview has no page row"),
        }
    }

    Ok(json!({ "pdf_artifact_id": pdf_artifact.id, "previews": attached }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn two_pages() -> Value {
        json!({
            "version": "1.0.0",
            "document": {"width": 2480, "height": 3508, "dpi": 300},
            "pages": [
                {"pageNumber": 1, "masterPage": "A", "objects": [
                    {"id": "t1", "type": "text", "bbox": {"x": 100, "y": 100, "w": 800, "h": 200}, "content": "Hello"},
                    {"id": "i1", "type": "image", "bbox": {"x": 100, "y": 400, "w": 800, "h": 600}, "imageUrl": "https://x/a.png"}
                ]},
                {"pageNumber": 2, "objects": [
                    {"id": "t2", "type": "text", "bbox": {"x": 100, "y": 100, "w": 800, "h": 200}, "content": "World"}
                ]}
            ]
        })
    }

    #[test]
    fn file_names_use_hex_job_ids_and_the_attempt() {
        let id = DbId::nil();
        assert_eq!(sla_file_name(id, "0a1b2c3d"), "layout_00000000000000000000000000000000_0a1b2c3d.sla");
        assert_eq!(
            preview_file_name(id, "0a1b2c3d", 3),
            "preview_00000000000000000000000000000000_0a1b2c3d_p0003.png"
        );
        assert!(pdf_file_name(id, "x").starts_with("output_"));
        assert_ne!(build_file_name(id, "a"), build_file_name(id, "b"));
    }

    #[test]
    fn page_rows_follow_document_order() {
        assert_eq!(
            page_rows(&two_pages()).unwrap(),
            vec![(1, Some("A".to_string()), 2), (2, None, 1)]
        );
    }

    #[test]
    fn page_number_beyond_i32_is_an_invalid_job() {
        let mut doc = two_pages();
        doc["pages"][1]["pageNumber"] = json!(4_294_967_297u64);
        assert_matches!(page_rows(&doc), Err(JobError::InvalidJob(msg)) if msg.contains("4294967297"));
        assert_matches!(check_descriptor(&doc), Err(JobError::InvalidJob(_)));
    }

    #[test]
    fn invalid_descriptor_is_an_invalid_job() {
        assert!(check_descriptor(&two_pages()).is_ok());
        assert_matches!(check_descriptor(&json!([])), Err(JobError::InvalidJob(_)));

        let mut doc = two_pages();
        doc["pages"][1]["pageNumber"] = json!(1);
        assert_matches!(check_descriptor(&doc), Err(JobError::InvalidJob(msg)) if msg.contains("duplicates"));
    }
}
