use std::path::{Path, PathBuf};

use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use formsplit_config::{AppConfig, ConfigError};
use formsplit_engine::region::{PassRules, run_pass};
use formsplit_io::{
    DocumentLoader, DocumentSaver, JsonFacade, ScriptWriter, blocks_file_name, script_file_name,
};

fn main() {
    let mut args = std::env::args().skip(1);
    let mut input: Option<PathBuf> = None;
    let mut config_override: Option<PathBuf> = None;
    let mut out_dir_override: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let Some(path) = args.next() else {
                    eprintln!("`--config` 需要提供配置文件路径");
                    std::process::exit(1);
                };
                config_override = Some(PathBuf::from(path));
            }
            "--out-dir" => {
                let Some(path) = args.next() else {
                    eprintln!("`--out-dir` 需要提供输出目录");
                    std::process::exit(1);
                };
                out_dir_override = Some(PathBuf::from(path));
            }
            other if input.is_none() && !other.starts_with('-') => {
                input = Some(PathBuf::from(other));
            }
            other => {
                eprintln!("未知参数：{other}");
                std::process::exit(1);
            }
        }
    }

    let Some(input) = input else {
        eprintln!("用法：formsplit <输入文档> [--config <路径>] [--out-dir <目录>]");
        std::process::exit(1);
    };

    let config = load_configuration(config_override);
    init_logging(&config);
    info!(input = %input.display(), "开始楼层分块处理");

    let out_dir = out_dir_override.unwrap_or_else(|| config.output.static_dir.clone());
    if let Err(err) = std::fs::create_dir_all(&out_dir) {
        error!(dir = %out_dir.display(), error = %err, "无法创建输出目录");
        std::process::exit(1);
    }

    match process_document(&input, &out_dir, &config) {
        Ok((document_path, script_path)) => {
            println!("{}|{}", document_path.display(), script_path.display());
        }
        Err(err) => {
            error!(error = %err, "处理失败");
            std::process::exit(1);
        }
    }
}

/// 一趟完整处理：读文档、分区物化、写回文档与批处理脚本。
fn process_document(
    input: &Path,
    out_dir: &Path,
    config: &AppConfig,
) -> Result<(PathBuf, PathBuf), Box<dyn std::error::Error>> {
    let facade = JsonFacade::new();
    let mut doc = facade.load(input)?;

    let rules = PassRules {
        form_block_name: config.pass.form_block_name.clone(),
        excluded_layers: config.pass.excluded_layers.clone(),
        axis_marker_blocks: config.pass.axis_marker_blocks.clone(),
        origin_vertical_axis: config.pass.origin_vertical_axis.clone(),
        origin_horizon_axis: config.pass.origin_horizon_axis.clone(),
    };
    let report = run_pass(&mut doc, rules)?;
    for kind in report.unresolved.iter() {
        warn!(kind = %kind, "实体无法求心，保留在模型空间");
    }

    let raw_file_name = input
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "document.json".to_string());

    let document_path = out_dir.join(blocks_file_name(&raw_file_name));
    facade.save(&doc, &document_path)?;

    let script_path = out_dir.join(script_file_name(&raw_file_name));
    let writer = ScriptWriter::new(config.output.script_target_dir.clone());
    writer.write(&report.region_names(), &script_path)?;

    info!(
        regions = report.regions.len(),
        unassigned = report.unassigned,
        "楼层分块处理完成"
    );
    Ok((document_path, script_path))
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
