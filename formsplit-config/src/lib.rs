use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub pass: PassConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            pass: PassConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `FORMSPLIT_CONFIG`，否则寻找
    /// `./config/default.toml`。若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("FORMSPLIT_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 分区规则配置：表单块名、排除图层与原点轴号。
#[derive(Debug, Clone, Deserialize)]
pub struct PassConfig {
    #[serde(default = "PassConfig::default_form_block_name")]
    pub form_block_name: String,
    #[serde(default = "PassConfig::default_excluded_layers")]
    pub excluded_layers: Vec<String>,
    #[serde(default = "PassConfig::default_axis_marker_blocks")]
    pub axis_marker_blocks: Vec<String>,
    #[serde(default = "PassConfig::default_origin_vertical_axis")]
    pub origin_vertical_axis: String,
    #[serde(default = "PassConfig::default_origin_horizon_axis")]
    pub origin_horizon_axis: String,
}

impl PassConfig {
    fn default_form_block_name() -> String {
        "NEED_FORM_VER3".to_string()
    }

    fn default_excluded_layers() -> Vec<String> {
        vec![
            "A-ANNOT".to_string(),
            "A-WALL-INSUL".to_string(),
            "A-WALL-PATT".to_string(),
            "Defpoints".to_string(),
        ]
    }

    fn default_axis_marker_blocks() -> Vec<String> {
        vec!["AXIS_NO".to_string()]
    }

    fn default_origin_vertical_axis() -> String {
        "1".to_string()
    }

    fn default_origin_horizon_axis() -> String {
        "A".to_string()
    }
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            form_block_name: Self::default_form_block_name(),
            excluded_layers: Self::default_excluded_layers(),
            axis_marker_blocks: Self::default_axis_marker_blocks(),
            origin_vertical_axis: Self::default_origin_vertical_axis(),
            origin_horizon_axis: Self::default_origin_horizon_axis(),
        }
    }
}

/// 产物输出配置：文档输出目录与脚本引用的目标目录。
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "OutputConfig::default_static_dir")]
    pub static_dir: PathBuf,
    /// 写入脚本文本里的绝对目录，指向消费方机器上的路径。
    #[serde(default = "OutputConfig::default_script_target_dir")]
    pub script_target_dir: String,
}

impl OutputConfig {
    fn default_static_dir() -> PathBuf {
        PathBuf::from("static")
    }

    fn default_script_target_dir() -> String {
        "C:\\Users\\Public".to_string()
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            static_dir: Self::default_static_dir(),
            script_target_dir: Self::default_script_target_dir(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
