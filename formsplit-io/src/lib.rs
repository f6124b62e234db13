use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use formsplit_core::document::Document;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode document {path:?}: {source}")]
    DecodeError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode document: {0}")]
    EncodeError(#[source] serde_json::Error),
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Document, IoError>;
}

pub trait DocumentSaver {
    fn save(&self, document: &Document, path: &Path) -> Result<(), IoError>;
}

/// JSON 序列化门面：整个文档模型经 serde 持久化。
pub struct JsonFacade;

impl JsonFacade {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentLoader for JsonFacade {
    fn load(&self, path: &Path) -> Result<Document, IoError> {
        let data = fs::read_to_string(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| IoError::DecodeError {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl DocumentSaver for JsonFacade {
    fn save(&self, document: &Document, path: &Path) -> Result<(), IoError> {
        let data = serde_json::to_string(document).map_err(IoError::EncodeError)?;
        fs::write(path, data).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "文档已保存");
        Ok(())
    }
}

/// 已知楼层名序表：地下 7~1 层、地上 1~18 层、옥탑、지붕。
/// 区域名包含其中某项时取其序号作文件名前缀，否则落到 99。
fn floor_sequence() -> Vec<String> {
    let mut floors = Vec::new();
    for i in (1..=7).rev() {
        floors.push(format!("지하 {i}층"));
    }
    for i in 1..=18 {
        floors.push(format!("지상 {i}층"));
    }
    floors.push("옥탑".to_string());
    floors.push("지붕".to_string());
    floors
}

/// 区域名 → 外部图纸文件名（不含扩展名）。
/// 规则沿用平面图命名惯例：`NN_<去空格区域名>평면도`。
pub fn xref_file_name(region_name: &str) -> String {
    let floors = floor_sequence();
    let floor_idx = floors
        .iter()
        .position(|floor| region_name.contains(floor.as_str()))
        .map(|i| i + 1)
        .unwrap_or(99);

    let compact = region_name.replace(' ', "");
    if region_name == "옥탑" || region_name == "지붕" {
        format!("{floor_idx:02}_{compact} 평면도")
    } else {
        format!("{floor_idx:02}_{compact}평면도")
    }
}

/// `x.ext` → `x_fl_blocks.ext`；无扩展名时原样返回。
pub fn blocks_file_name(raw_file_name: &str) -> String {
    raw_file_name.replace('.', "_fl_blocks.")
}

/// `x.ext` → `x_wb.scr`。
pub fn script_file_name(raw_file_name: &str) -> String {
    let stem = raw_file_name.split('.').next().unwrap_or(raw_file_name);
    format!("{stem}_wb.scr")
}

/// 批处理脚本生成：每个区域三行 —— `wblock`、目标图纸路径、区域名。
/// 目标路径指向消费方机器上的绝对目录，由配置给定。
pub struct ScriptWriter {
    target_dir: String,
}

impl ScriptWriter {
    pub fn new(target_dir: impl Into<String>) -> Self {
        Self {
            target_dir: target_dir.into(),
        }
    }

    pub fn render(&self, region_names: &[String]) -> String {
        let mut lines = Vec::with_capacity(region_names.len() * 3 + 1);
        for name in region_names {
            lines.push("wblock".to_string());
            lines.push(format!(
                "\"{}\\{}.dwg\"",
                self.target_dir,
                xref_file_name(name)
            ));
            lines.push(format!("\"{name}\""));
        }
        lines.push(String::new());
        lines.join("\n")
    }

    // TODO: 消费方按 ms949 读取脚本；区域名超出该码表时需要转码。
    pub fn write(&self, region_names: &[String], path: &Path) -> Result<(), IoError> {
        let script = self.render(region_names);
        fs::write(path, script).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), regions = region_names.len(), "脚本已写出");
        Ok(())
    }
}
