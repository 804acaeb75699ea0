//! Headless scene inspector.
//!
//! Builds a small demo scene (or imports one), applies property edits to the
//! first root node and exports the result locally or to the remote store.

use std::path::PathBuf;

use scene_inspector::app::{ExportTarget, Inspector, InspectorError};
use scene_inspector::config::{InspectorConfig, DEFAULT_CONFIG_FILE};
use scene_inspector::scene::{
    Color, GeometryKind, MaterialDescriptor, MaterialKind, SceneNode, Transform,
};
use scene_inspector::sink::remote::UploadOutcome;
use scene_inspector::sink::Delivery;

const USAGE: &str = "\
usage: scene-inspector [options]
  --config <file>        settings file (default scene-inspector.json)
  --import <file>        start from a .glb/.gltf export or a .json project
  --set <prop>=<value>   edit the first root node, repeatable
  --save-project <file>  write the edited scene as a JSON project
  --local [file]         export to a local file (default)
  --remote               upload the export to the remote store";

#[derive(Debug, Default)]
struct CliArgs {
    config: Option<PathBuf>,
    import: Option<PathBuf>,
    edits: Vec<(String, String)>,
    save_project: Option<PathBuf>,
    target: Option<ExportTarget>,
}

impl CliArgs {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, String> {
        let mut parsed = CliArgs::default();
        let mut args = args.into_iter().peekable();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => parsed.config = Some(required(&mut args, &arg)?.into()),
                "--import" => parsed.import = Some(required(&mut args, &arg)?.into()),
                "--save-project" => parsed.save_project = Some(required(&mut args, &arg)?.into()),
                "--set" => {
                    let pair = required(&mut args, &arg)?;
                    let (property, value) = pair
                        .split_once('=')
                        .ok_or_else(|| format!("--set expects prop=value, got '{pair}'"))?;
                    parsed.edits.push((property.to_string(), value.to_string()));
                }
                "--local" => {
                    let file = args.next_if(|next| !next.starts_with("--"));
                    parsed.target = Some(ExportTarget::Local(file.map(PathBuf::from)));
                }
                "--remote" => parsed.target = Some(ExportTarget::Remote),
                "-h" | "--help" => return Err(String::new()),
                other => return Err(format!("unknown argument '{other}'")),
            }
        }
        Ok(parsed)
    }
}

fn required(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    args.next().ok_or_else(|| format!("{flag} needs a value"))
}

fn demo_scene(inspector: &mut Inspector) {
    let crate_id = inspector.add_node(
        SceneNode::new(GeometryKind::Box.descriptor(), MaterialDescriptor::default())
            .with_name("Crate"),
    );
    inspector.add_child(
        crate_id,
        SceneNode::new(
            GeometryKind::Cone.descriptor(),
            MaterialDescriptor::new(MaterialKind::Toon)
                .with_color(Color::from_hex("#ffaa00").unwrap_or_default()),
        )
        .with_name("Marker")
        .with_transform(Transform::from_position([0.0, 1.0, 0.0])),
    );
    inspector.add_node(
        SceneNode::new(
            GeometryKind::Sphere.descriptor(),
            MaterialDescriptor::new(MaterialKind::Phong),
        )
        .with_name("Ball")
        .with_transform(Transform::from_position([2.5, 0.0, 0.0])),
    );
}

fn run(args: CliArgs, config: &InspectorConfig) -> Result<(), InspectorError> {
    let mut inspector = Inspector::from_config(config)?;

    match &args.import {
        Some(path) if path.extension().is_some_and(|ext| ext == "json") => {
            inspector.load_project(path)?
        }
        Some(path) => inspector.import_gltf(path)?,
        None => demo_scene(&mut inspector),
    }

    let first_root = inspector.scene().roots().next().map(|node| node.id);
    inspector.pointer_click(first_root);
    for (property, value) in &args.edits {
        match inspector.apply_raw(property, value) {
            Ok(true) => log::info!("Applied {}={}", property, value),
            Ok(false) => log::warn!("Scene is empty; ignoring {}={}", property, value),
            Err(err) => log::warn!("Skipping {}={}: {}", property, value, err),
        }
    }

    if let Some(path) = &args.save_project {
        inspector.save_project(path)?;
    }

    let target = args.target.unwrap_or(ExportTarget::Local(None));
    match inspector.export_to(target)? {
        Delivery::Saved(path) => log::info!("Export written to {}", path.display()),
        Delivery::Uploading(task) => {
            let path = task.path().to_string();
            let outcome = inspector.wait_for_upload(task);
            for event in inspector.drain_upload_events() {
                log::debug!("{:?}", event);
            }
            match outcome {
                UploadOutcome::Succeeded => log::info!("Uploaded {}", path),
                UploadOutcome::Failed(reason) => {
                    log::warn!("Upload of {} failed: {}", path, reason)
                }
            }
        }
    }
    Ok(())
}

fn main() {
    let args = match CliArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("{message}");
            }
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = InspectorConfig::load(&config_path);
    let filter = config
        .as_ref()
        .map(|config| config.log_filter.clone())
        .unwrap_or_else(|_| "info".to_string());

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp_millis()
        .init();

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            log::error!("Failed to read {}: {}", config_path.display(), err);
            std::process::exit(1);
        }
    };

    if let Err(err) = run(args, &config) {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
