//! `agents`: deterministic review agents over converted layouts.
//!
//! Each agent inspects a descriptor and returns findings. Agents are pure
//! functions of the descriptor and the seed, so identical inputs yield an
//! identical `agents_report.json`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use pressline_core::hashing::sha256_hex;
use pressline_core::heuristics::run_heuristic_checks;
use pressline_core::layout::{self, str_field, BBox};
use pressline_core::project_config::ProjectConfig;

use super::{layout_stem, read_json, write_json, FileHash, AGENTS};
use crate::error::StepError;
use crate::executor::StepOutput;
use crate::progress::ProgressTracker;

pub const REPORT_FILE: &str = "agents_report.json";

pub const SEMANTIC_ENRICHER: &str = "SemanticEnricher";
pub const LAYOUT_DESIGNER: &str = "LayoutDesigner";
pub const QUALITY_CRITIC: &str = "QualityCritic";

/// Declared inputs of `agents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentsInput {
    pub step: String,
    pub layouts: Vec<FileHash>,
    pub agent_steps: Vec<String>,
    pub agent_seed: Option<u64>,
    pub agent_version: String,
    pub simulate: bool,
    pub project_init: Option<PathBuf>,
    pub project_init_hash: Option<String>,
    pub agents_out: PathBuf,
}

impl AgentsInput {
    pub fn new(layouts: Vec<FileHash>, agents_out: PathBuf) -> Self {
        Self {
            step: AGENTS.to_string(),
            layouts,
            agent_steps: vec![
                SEMANTIC_ENRICHER.to_string(),
                LAYOUT_DESIGNER.to_string(),
                QUALITY_CRITIC.to_string(),
            ],
            agent_seed: None,
            agent_version: "v1".to_string(),
            simulate: false,
            project_init: None,
            project_init_hash: None,
            agents_out,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentFinding {
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    pub message: String,
}

impl AgentFinding {
    fn page(code: &'static str, page: i64, message: String) -> Self {
        Self { code, page: Some(page), object_id: None, message }
    }
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// Text statistics and role coverage.
fn semantic_enricher(doc: &Value) -> Vec<AgentFinding> {
    let mut findings = Vec::new();
    for page in layout::pages(doc) {
        let pn = layout::page_number(page);
        let texts: Vec<_> = layout::page_objects(page)
            .filter(|o| str_field(o, "type") == "text")
            .collect();
        let words: usize = texts
            .iter()
            .map(|o| str_field(o, "content").split_whitespace().count())
            .sum();
        let has_title = texts.iter().any(|o| {
            matches!(str_field(o, "role").to_lowercase().as_str(), "title" | "h1" | "headline")
        });

        findings.push(AgentFinding::page(
            "text.words",
            pn,
            format!("{} text object(s), {words} word(s)", texts.len()),
        ));
        if !texts.is_empty() && !has_title {
            findings.push(AgentFinding::page("text.no_title", pn, "Page has text but no title".into()));
        }
        for obj in &texts {
            if str_field(obj, "content").trim().is_empty() {
                findings.push(AgentFinding {
                    code: "text.empty",
                    page: Some(pn),
                    object_id: Some(str_field(obj, "id").to_string()),
                    message: "Text object has no content".into(),
                });
            }
        }
    }
    findings
}

fn intersects(a: &BBox, b: &BBox) -> bool {
    a.x < b.right() && b.x < a.right() && a.y < b.bottom() && b.y < a.bottom()
}

/// Overlapping text frames on the same layer and empty pages.
fn layout_designer(doc: &Value) -> Vec<AgentFinding> {
    let mut findings = Vec::new();
    for page in layout::pages(doc) {
        let pn = layout::page_number(page);
        let objects: Vec<_> = layout::page_objects(page).collect();
        if objects.is_empty() {
            findings.push(AgentFinding::page("page.empty", pn, "Page has no objects".into()));
            continue;
        }

        let frames: Vec<(&str, &str, BBox)> = objects
            .iter()
            .filter(|o| str_field(o, "type") == "text")
            .filter_map(|o| Some((str_field(o, "id"), str_field(o, "layer"), BBox::from_value(o.get("bbox"))?)))
            .collect();
        for (i, (id_a, layer_a, a)) in frames.iter().enumerate() {
            for (id_b, layer_b, b) in &frames[i + 1..] {
                if layer_a == layer_b && intersects(a, b) {
                    findings.push(AgentFinding {
                        code: "text.overlap",
                        page: Some(pn),
                        object_id: Some(id_a.to_string()),
                        message: format!("Text frames {id_a} and {id_b} overlap on layer {layer_a}"),
                    });
                }
            }
        }
    }
    findings
}

/// Heuristic overflow and density warnings.
fn quality_critic(doc: &Value, project: &ProjectConfig) -> Vec<AgentFinding> {
    let report = run_heuristic_checks(doc, &project.heuristic_config());
    report
        .warnings
        .into_iter()
        .chain(report.infos)
        .map(|f| AgentFinding {
            code: f.id,
            page: Some(f.page),
            object_id: f.object_id,
            message: f.message,
        })
        .collect()
}

/// Run one agent by name. `None` for unknown agents.
pub fn run_agent(name: &str, doc: &Value, project: &ProjectConfig) -> Option<Vec<AgentFinding>> {
    match name {
        SEMANTIC_ENRICHER => Some(semantic_enricher(doc)),
        LAYOUT_DESIGNER => Some(layout_designer(doc)),
        QUALITY_CRITIC => Some(quality_critic(doc, project)),
        _ => None,
    }
}

/// Stable run identifier for one (layout, agent) pair.
fn run_id(input: &AgentsInput, layout_hash: Option<&str>, agent: &str) -> String {
    let seed = input.agent_seed.unwrap_or(0);
    let material = format!(
        "{seed}:{}:{agent}:{}",
        input.agent_version,
        layout_hash.unwrap_or("")
    );
    sha256_hex(material.as_bytes())[..16].to_string()
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

pub fn run(input: AgentsInput, tracker: &ProgressTracker) -> Result<StepOutput, StepError> {
    let project = ProjectConfig::load_optional(input.project_init.as_deref())
        .map_err(|e| StepError::Configuration(e.to_string()))?;

    tracker.emit(
        "agents.start",
        json!({ "layouts": input.layouts.len(), "agents": input.agent_steps, "simulate": input.simulate }),
    );

    let mut layouts = Vec::new();
    let mut errors = Vec::new();
    let mut total_findings = 0usize;

    for source in &input.layouts {
        let doc = match read_json(&source.path_buf()) {
            Ok(doc) => doc,
            Err(e) => {
                errors.push(json!({ "path": source.path, "error": e.to_string() }));
                continue;
            }
        };

        let mut agents = Vec::new();
        for agent in &input.agent_steps {
            let id = run_id(&input, source.hash.as_deref(), agent);
            if input.simulate {
                agents.push(json!({ "agent": agent, "run_id": id, "status": "simulated", "findings": [] }));
                continue;
            }
            match run_agent(agent, &doc, &project) {
                Some(findings) => {
                    total_findings += findings.len();
                    agents.push(json!({ "agent": agent, "run_id": id, "status": "ok", "findings": findings }));
                }
                None => {
                    errors.push(json!({ "path": source.path, "agent": agent, "error": "unknown agent" }));
                }
            }
        }

        layouts.push(json!({
            "path": source.path,
            "name": layout_stem(&source.path_buf()),
            "agents": agents,
        }));
    }

    let report_path = input.agents_out.join(REPORT_FILE);
    let report = json!({
        "version": input.agent_version,
        "seed": input.agent_seed,
        "simulate": input.simulate,
        "layouts": layouts,
        "errors": errors,
    });
    write_json(&report_path, &report)?;

    tracker.emit(
        "agents.done",
        json!({ "layouts": layouts.len(), "findings": total_findings, "errors": errors.len() }),
    );

    Ok(StepOutput::new(vec![report_path.to_string_lossy().into_owned()])
        .with_summary(json!({ "outputs": 1, "findings": total_findings, "errors": errors.len() }))
        .with_report(report))
}
