//! Command-line surface of the `pressline` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use pressline_pipeline::{CropParams, WorkflowConfig};

#[derive(Debug, Parser)]
#[command(name = "pressline", version, about = "Layout conversion and publishing workflows")]
pub struct Cli {
    /// Print reports as single-line JSON instead of indented JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert one extracted slide deck to a layout descriptor.
    ConvertOne(ConvertOneArgs),
    /// Convert every deck listed in a manifest.
    ConvertManifest(ConvertManifestArgs),
    /// Crop boxes out of rendered slide PNG archives.
    Crop(CropArgs),
    /// Run the full workflow.
    Run(RunArgs),
    /// Validate layout descriptors against the schema and the quality gate.
    Validate(ValidateArgs),
    /// Write a starter project configuration.
    ExportProjectInit(ExportProjectInitArgs),
}

#[derive(Debug, Args)]
pub struct ConvertOneArgs {
    /// Extracted deck JSON.
    #[arg(long)]
    pub input: PathBuf,
    /// Output layout descriptor.
    #[arg(long)]
    pub out: PathBuf,
}

#[derive(Debug, Args)]
pub struct ConvertManifestArgs {
    #[arg(long)]
    pub manifest: PathBuf,
    #[arg(long)]
    pub pptx_root: PathBuf,
    /// Directory receiving `<name>.layout.json` files.
    #[arg(long)]
    pub out: PathBuf,
    #[arg(long)]
    pub project_init: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CropParamArgs {
    /// Padding around each box in pixels.
    #[arg(long, default_value_t = CropParams::default().pad_px)]
    pub pad_px: u32,
    /// Crop the padded box without trimming background margins.
    #[arg(long)]
    pub no_refine: bool,
    #[arg(long, default_value_t = CropParams::default().refine_margin_px)]
    pub refine_margin_px: u32,
    /// Channel value at or above which a pixel counts as background.
    #[arg(long, default_value_t = CropParams::default().bg_threshold)]
    pub bg_threshold: u8,
}

impl CropParamArgs {
    pub fn params(&self) -> CropParams {
        CropParams {
            pad_px: self.pad_px,
            refine: !self.no_refine,
            refine_margin_px: self.refine_margin_px,
            bg_threshold: self.bg_threshold,
        }
    }
}

#[derive(Debug, Args)]
pub struct CropArgs {
    #[arg(long)]
    pub manifest: PathBuf,
    #[arg(long)]
    pub pptx_root: PathBuf,
    /// Directory holding `<name>.zip` slide PNG archives.
    #[arg(long)]
    pub gamma_dir: PathBuf,
    #[arg(long)]
    pub out: PathBuf,
    /// Box kinds to crop.
    #[arg(long, value_delimiter = ',', default_values_t = ["infobox".to_string(), "image_box".to_string()])]
    pub kinds: Vec<String>,
    #[command(flatten)]
    pub crop: CropParamArgs,
}

/// Flags mirroring [`WorkflowConfig`]. Unset flags keep the defaults.
#[derive(Debug, Args)]
pub struct RunArgs {
    #[arg(long)]
    pub manifest: Option<PathBuf>,
    #[arg(long)]
    pub pptx_root: Option<PathBuf>,
    #[arg(long)]
    pub layout_out: Option<PathBuf>,
    #[arg(long)]
    pub variants_out: Option<PathBuf>,
    #[arg(long)]
    pub project_init: Option<PathBuf>,
    /// Workflow state file used for resume.
    #[arg(long)]
    pub resume_path: Option<PathBuf>,

    /// Re-run every step even when its inputs are unchanged.
    #[arg(long)]
    pub force: bool,
    #[arg(long)]
    pub retry_max: Option<u32>,
    /// Base retry delay in milliseconds.
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,

    #[arg(long)]
    pub no_variants: bool,

    #[arg(long)]
    pub gamma_sync: bool,
    #[arg(long)]
    pub gamma_dir: Option<PathBuf>,
    #[arg(long)]
    pub gamma_crops_out: Option<PathBuf>,
    #[arg(long, value_delimiter = ',')]
    pub gamma_kinds: Option<Vec<String>>,
    #[arg(long)]
    pub gamma_attach: bool,
    #[arg(long, value_delimiter = ',')]
    pub gamma_attach_kinds: Option<Vec<String>>,
    #[command(flatten)]
    pub crop: CropParamArgs,

    #[arg(long)]
    pub quality_check: bool,
    /// Check the converted layouts instead of the variants.
    #[arg(long)]
    pub quality_on_layouts: bool,
    #[arg(long)]
    pub quality_out: Option<PathBuf>,
    #[arg(long, value_delimiter = ',')]
    pub quality_checks: Option<Vec<String>>,

    #[arg(long)]
    pub render: bool,
    #[arg(long)]
    pub render_on_layouts: bool,
    #[arg(long)]
    pub render_out: Option<PathBuf>,
    #[arg(long)]
    pub no_pdf: bool,
    #[arg(long)]
    pub no_png: bool,

    #[arg(long)]
    pub agents: bool,
    #[arg(long)]
    pub agents_out: Option<PathBuf>,
    #[arg(long, value_delimiter = ',')]
    pub agent_steps: Option<Vec<String>>,
    #[arg(long)]
    pub agent_seed: Option<u64>,
    #[arg(long)]
    pub agent_version: Option<String>,
    #[arg(long)]
    pub agent_simulate: bool,
}

impl RunArgs {
    /// Overlay the flags on the workflow defaults.
    pub fn to_config(&self) -> WorkflowConfig {
        let mut c = WorkflowConfig::default();

        if let Some(v) = &self.pptx_root {
            c.manifest_path = v.join("manifest.json");
            c.pptx_root = v.clone();
        }
        if let Some(v) = &self.manifest {
            c.manifest_path = v.clone();
        }
        set(&mut c.layout_out, &self.layout_out);
        set(&mut c.variants_out, &self.variants_out);
        set(&mut c.resume_path, &self.resume_path);
        c.project_init = self.project_init.clone();

        c.force = self.force;
        set(&mut c.retry_max, &self.retry_max);
        if let Some(ms) = self.retry_delay_ms {
            c.retry_base_delay = std::time::Duration::from_millis(ms);
        }
        c.generate_variants = !self.no_variants;

        c.gamma_sync = self.gamma_sync;
        c.gamma_png_dir = self.gamma_dir.clone();
        set(&mut c.gamma_crops_out, &self.gamma_crops_out);
        set(&mut c.gamma_crop_kinds, &self.gamma_kinds);
        c.gamma_attach_to_variants = self.gamma_attach;
        set(&mut c.gamma_attach_kinds, &self.gamma_attach_kinds);
        c.crop = self.crop.params();

        c.quality_check = self.quality_check;
        c.quality_on_variants = !self.quality_on_layouts;
        set(&mut c.quality_out, &self.quality_out);
        set(&mut c.quality_checks, &self.quality_checks);

        c.render = self.render;
        c.render_on_variants = !self.render_on_layouts;
        set(&mut c.render_out, &self.render_out);
        c.render_pdf = !self.no_pdf;
        c.render_png = !self.no_png;

        c.agents_enabled = self.agents;
        set(&mut c.agents_out, &self.agents_out);
        set(&mut c.agent_steps, &self.agent_steps);
        c.agent_seed = self.agent_seed;
        set(&mut c.agent_version, &self.agent_version);
        c.agent_simulate = self.agent_simulate;

        c
    }
}

fn set<T: Clone>(field: &mut T, flag: &Option<T>) {
    if let Some(v) = flag {
        *field = v.clone();
    }
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Layout descriptors to check.
    #[arg(required = true)]
    pub layouts: Vec<PathBuf>,
    #[arg(long)]
    pub project_init: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ExportProjectInitArgs {
    #[arg(long)]
    pub out: PathBuf,
    /// Replace an existing file.
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pressline").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn run_without_flags_keeps_defaults() {
        let Command::Run(args) = parse(&["run"]).command else {
            panic!("expected run");
        };
        assert_eq!(args.to_config(), WorkflowConfig::default());
    }

    #[test]
    fn run_flags_override_config() {
        let cli = parse(&[
            "run",
            "--pptx-root",
            "decks",
            "--force",
            "--retry-max",
            "3",
            "--retry-delay-ms",
            "10",
            "--no-variants",
            "--quality-check",
            "--quality-checks",
            "preflight",
            "--render",
            "--no-png",
            "--gamma-sync",
            "--gamma-dir",
            "gamma",
            "--gamma-kinds",
            "infobox",
            "--pad-px",
            "4",
            "--no-refine",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let c = args.to_config();
        assert_eq!(c.manifest_path, PathBuf::from("decks/manifest.json"));
        assert!(c.force);
        assert_eq!(c.retry_max, 3);
        assert_eq!(c.retry_base_delay, Duration::from_millis(10));
        assert!(!c.generate_variants);
        assert!(c.quality_check);
        assert_eq!(c.quality_checks, vec!["preflight"]);
        assert!(c.render && c.render_pdf && !c.render_png);
        assert!(c.gamma_sync);
        assert_eq!(c.gamma_png_dir, Some(PathBuf::from("gamma")));
        assert_eq!(c.gamma_crop_kinds, vec!["infobox"]);
        assert_eq!(c.crop, CropParams { pad_px: 4, refine: false, ..CropParams::default() });
    }

    #[test]
    fn explicit_manifest_wins_over_pptx_root() {
        let Command::Run(args) = parse(&["run", "--pptx-root", "decks", "--manifest", "m.json"]).command else {
            panic!("expected run");
        };
        let c = args.to_config();
        assert_eq!(c.manifest_path, PathBuf::from("m.json"));
        assert_eq!(c.pptx_root, PathBuf::from("decks"));
    }

    #[test]
    fn crop_kinds_split_on_commas() {
        let cli = parse(&[
            "crop", "--manifest", "m.json", "--pptx-root", "p", "--gamma-dir", "g", "--out", "o", "--kinds",
            "infobox,image_box",
        ]);
        let Command::Crop(args) = cli.command else {
            panic!("expected crop");
        };
        assert_eq!(args.kinds, vec!["infobox", "image_box"]);
        assert_eq!(args.crop.params(), CropParams::default());
    }

    #[test]
    fn validate_requires_a_path() {
        assert!(Cli::try_parse_from(["pressline", "validate"]).is_err());
    }
}
