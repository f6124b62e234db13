pub mod axis;
pub mod centroid;
pub mod region;
pub mod space;

pub mod errors {
    use thiserror::Error;

    /// 文档级 / 区域级的结构性失败。实体级失败不会出现在这里，
    /// 它们只进入 `PassContext` 的诊断列表。
    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("no form references named {block_name:?} found in the document")]
        NoFormsFound { block_name: String },
        #[error("form {form:?} has no boundary geometry to build a bounding box from")]
        EmptyFormGeometry { form: String },
        #[error("form {form:?} cannot resolve an origin from axis pair {vertical:?}/{horizon:?}")]
        OriginUnresolved {
            form: String,
            vertical: String,
            horizon: String,
        },
    }
}
