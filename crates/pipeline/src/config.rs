//! Per-run workflow configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::retry::RetryPolicy;

/// Crop parameters for `gamma_sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropParams {
    pub pad_px: u32,
    pub refine: bool,
    pub refine_margin_px: u32,
    pub bg_threshold: u8,
}

impl Default for CropParams {
    fn default() -> Self {
        Self {
            pad_px: 10,
            refine: true,
            refine_margin_px: 40,
            bg_threshold: 245,
        }
    }
}

/// Immutable settings for one orchestrator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub manifest_path: PathBuf,
    pub pptx_root: PathBuf,
    pub layout_out: PathBuf,
    pub variants_out: PathBuf,
    pub project_init: Option<PathBuf>,
    pub resume_path: PathBuf,

    pub generate_variants: bool,

    pub gamma_png_dir: Option<PathBuf>,
    pub gamma_crops_out: PathBuf,
    pub gamma_sync: bool,
    pub gamma_crop_kinds: Vec<String>,
    pub gamma_attach_to_variants: bool,
    pub gamma_attach_kinds: Vec<String>,
    pub crop: CropParams,

    pub quality_check: bool,
    pub quality_on_variants: bool,
    pub quality_out: PathBuf,
    pub quality_checks: Vec<String>,

    pub render: bool,
    pub render_on_variants: bool,
    pub render_out: PathBuf,
    pub render_pdf: bool,
    pub render_png: bool,

    pub agents_enabled: bool,
    pub agents_out: PathBuf,
    pub agent_steps: Vec<String>,
    pub agent_seed: Option<u64>,
    pub agent_version: String,
    pub agent_simulate: bool,

    pub force: bool,
    pub retry_max: u32,
    #[serde(with = "millis")]
    pub retry_base_delay: Duration,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from("media_pool/pptx/manifest.json"),
            pptx_root: PathBuf::from("media_pool/pptx"),
            layout_out: PathBuf::from("media_pool/layout_json"),
            variants_out: PathBuf::from("media_pool/layout_json_variants"),
            project_init: None,
            resume_path: PathBuf::from("temp_analysis/workflow_state.json"),
            generate_variants: true,
            gamma_png_dir: None,
            gamma_crops_out: PathBuf::from("media_pool/gamma_crops"),
            gamma_sync: false,
            gamma_crop_kinds: strings(&["infobox", "image_box"]),
            gamma_attach_to_variants: false,
            gamma_attach_kinds: strings(&["image_box"]),
            crop: CropParams::default(),
            quality_check: false,
            quality_on_variants: true,
            quality_out: PathBuf::from("media_pool/quality"),
            quality_checks: strings(&["preflight", "amazon"]),
            render: false,
            render_on_variants: true,
            render_out: PathBuf::from("media_pool/render"),
            render_pdf: true,
            render_png: true,
            agents_enabled: false,
            agents_out: PathBuf::from("media_pool/agents"),
            agent_steps: strings(&["SemanticEnricher", "LayoutDesigner", "QualityCritic"]),
            agent_seed: None,
            agent_version: "v1".to_string(),
            agent_simulate: false,
            force: false,
            retry_max: 1,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl WorkflowConfig {
    /// Defaults with every output rooted under `base`. Used by the worker to
    /// confine a run to its job directory.
    pub fn rooted_at(base: &Path) -> Self {
        let defaults = Self::default();
        Self {
            manifest_path: base.join(&defaults.manifest_path),
            pptx_root: base.join(&defaults.pptx_root),
            layout_out: base.join(&defaults.layout_out),
            variants_out: base.join(&defaults.variants_out),
            resume_path: base.join(&defaults.resume_path),
            gamma_crops_out: base.join(&defaults.gamma_crops_out),
            quality_out: base.join(&defaults.quality_out),
            render_out: base.join(&defaults.render_out),
            agents_out: base.join(&defaults.agents_out),
            ..defaults
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_max, self.retry_base_delay)
    }

    /// The project configuration path when it exists on disk.
    pub fn existing_project_init(&self) -> Option<&Path> {
        self.project_init.as_deref().filter(|p| p.exists())
    }

    /// Reject contradictory flag combinations before any step runs.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.gamma_attach_to_variants && (!self.gamma_sync || self.gamma_png_dir.is_none()) {
            return Err(WorkflowError::Configuration(
                "gamma_attach_to_variants requires gamma_sync and gamma_png_dir".into(),
            ));
        }
        if self.gamma_sync && self.gamma_crop_kinds.is_empty() {
            return Err(WorkflowError::Configuration(
                "gamma_sync requires at least one crop kind".into(),
            ));
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = WorkflowConfig::default();
        assert!(cfg.generate_variants);
        assert!(!cfg.quality_check);
        assert_eq!(cfg.gamma_crop_kinds, vec!["infobox", "image_box"]);
        assert_eq!(cfg.crop, CropParams { pad_px: 10, refine: true, refine_margin_px: 40, bg_threshold: 245 });
        assert_eq!(cfg.retry_policy().delay_after(0), Duration::from_millis(500));
    }

    #[test]
    fn attach_without_gamma_sync_is_rejected() {
        let cfg = WorkflowConfig {
            gamma_attach_to_variants: true,
            ..WorkflowConfig::default()
        };
        assert_matches!(cfg.validate(), Err(WorkflowError::Configuration(_)));

        let cfg = WorkflowConfig {
            gamma_sync: true,
            gamma_png_dir: Some("gamma".into()),
            ..cfg
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rooted_config_keeps_paths_inside_base() {
        let cfg = WorkflowConfig::rooted_at(Path::new("/work/job1"));
        assert!(cfg.layout_out.starts_with("/work/job1"));
        assert!(cfg.resume_path.starts_with("/work/job1"));
    }

    #[test]
    fn partial_json_overrides_defaults() {
        let cfg: WorkflowConfig =
            serde_json::from_str(r#"{"quality_check": true, "retry_base_delay": 10}"#).unwrap();
        assert!(cfg.quality_check);
        assert!(cfg.generate_variants);
        assert_eq!(cfg.retry_base_delay, Duration::from_millis(10));
    }
}
