use std::collections::HashMap;

use formsplit_core::document::{
    BlockReference, Document, Entity, HatchEdge, HatchPath, LwPolyline,
};
use formsplit_core::geometry::{Point3, Vector3, arc_endpoint, mean_point};
use tracing::trace;

/// 子元素超过该数量时触发抽样。
pub const SAMPLE_THRESHOLD: usize = 25;
/// 抽样后的固定数量。
pub const SAMPLE_COUNT: usize = 24;

/// 块心缓存键。镜像实例与正常实例的内部几何关于插入点对称，
/// 偏移不能共用，因此键里带镜像标志。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub name: String,
    pub mirrored: bool,
}

impl BlockKey {
    fn of(reference: &BlockReference) -> Self {
        Self {
            name: reference.name.clone(),
            mirrored: reference.is_mirrored(),
        }
    }
}

/// 单趟处理的全部可变状态：块心偏移缓存、过滤备忘与诊断收集。
/// 每次文档处理新建一个，绝不跨趟共享。
#[derive(Debug, Default)]
pub struct PassContext {
    block_offsets: HashMap<BlockKey, Vector3>,
    filter_memo: HashMap<String, bool>,
    unresolved: Vec<String>,
}

impl PassContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cached_offset(&self, key: &BlockKey) -> Option<Vector3> {
        self.block_offsets.get(key).copied()
    }

    #[inline]
    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    /// 记录一次不可求心的实体，仅作诊断，绝不中断批次。
    pub fn note_unresolved(&mut self, kind: impl Into<String>) {
        self.unresolved.push(kind.into());
    }

    #[inline]
    pub(crate) fn filter_memo(&self, block_name: &str) -> Option<bool> {
        self.filter_memo.get(block_name).copied()
    }

    #[inline]
    pub(crate) fn remember_filter(&mut self, block_name: String, keep: bool) {
        self.filter_memo.insert(block_name, keep);
    }
}

/// 确定性抽样：超过阈值时按等距步长取 `SAMPLE_COUNT` 个下标，
/// 相同输入总是给出相同结果。
fn sample_indices(len: usize) -> Vec<usize> {
    if len <= SAMPLE_THRESHOLD {
        (0..len).collect()
    } else {
        (0..SAMPLE_COUNT).map(|i| i * len / SAMPLE_COUNT).collect()
    }
}

/// 计算实体的"假想中心"：用于空间归属判定的单一代表点，
/// 并非严格的几何重心。无法求得时返回 None。
pub fn center_of(ctx: &mut PassContext, doc: &mut Document, entity: &Entity) -> Option<Point3> {
    match entity {
        Entity::Line(line) => Some(line.start.midpoint(line.end)),
        // 弧取两端点连线的中点。这是刻意的弦中点近似，不是弧重心。
        Entity::Arc(arc) => Some(chord_midpoint(
            arc.center,
            arc.radius,
            arc.start_angle,
            arc.end_angle,
        )),
        Entity::Circle(circle) => Some(circle.center),
        Entity::Text(text) => Some(text.insert),
        Entity::Dimension(dimension) => Some(dimension.definition_point),
        Entity::LwPolyline(polyline) => polyline_center(ctx, doc, polyline),
        Entity::Hatch(hatch) => {
            let indices = sample_indices(hatch.paths.len());
            mean_point(
                indices
                    .into_iter()
                    .filter_map(|i| path_center(&hatch.paths[i])),
            )
        }
        Entity::BlockReference(reference) => insert_center(ctx, doc, reference),
        Entity::Unsupported(_) => None,
    }
}

#[inline]
fn chord_midpoint(center: Point3, radius: f64, start_angle: f64, end_angle: f64) -> Point3 {
    let start = arc_endpoint(center, radius, start_angle);
    let end = arc_endpoint(center, radius, end_angle);
    start.midpoint(end)
}

/// 多段线：展开为基础段（排除弧段）后取段心平均；没有可用段时
/// 退回原始顶点平均。
fn polyline_center(
    ctx: &mut PassContext,
    doc: &mut Document,
    polyline: &LwPolyline,
) -> Option<Point3> {
    let segments: Vec<Entity> = polyline
        .virtual_segments()
        .into_iter()
        .filter(|segment| !matches!(segment, Entity::Arc(_)))
        .collect();
    if segments.is_empty() {
        return mean_point(polyline.vertices.iter().map(|vertex| vertex.position));
    }
    let indices = sample_indices(segments.len());
    mean_point(
        indices
            .into_iter()
            .filter_map(|i| center_of(ctx, doc, &segments[i])),
    )
}

fn path_center(path: &HatchPath) -> Option<Point3> {
    match path {
        HatchPath::Polyline { vertices } => mean_point(vertices.iter().copied()),
        HatchPath::Edges { edges } => {
            let indices = sample_indices(edges.len());
            mean_point(indices.into_iter().map(|i| edge_center(&edges[i])))
        }
    }
}

fn edge_center(edge: &HatchEdge) -> Point3 {
    match edge {
        HatchEdge::Line { start, end } => start.midpoint(*end),
        HatchEdge::Arc {
            center,
            radius,
            start_angle,
            end_angle,
        } => chord_midpoint(*center, *radius, *start_angle, *end_angle),
    }
}

/// 求块参照的假想中心。同一（块名，镜像）键的偏移只计算一次：
/// 块内几何在所有实例间只差一个平移。
fn insert_center(
    ctx: &mut PassContext,
    doc: &mut Document,
    reference: &BlockReference,
) -> Option<Point3> {
    let key = BlockKey::of(reference);
    if let Some(offset) = ctx.block_offsets.get(&key) {
        return Some(reference.insert.translate(*offset));
    }

    let point = instance_point(ctx, doc, reference)?;
    let offset = reference.insert.vector_to(point);
    trace!(
        block = %key.name,
        mirrored = key.mirrored,
        dx = offset.x(),
        dy = offset.y(),
        "已缓存块心偏移"
    );
    ctx.block_offsets.insert(key, offset);
    Some(reference.insert.translate(offset))
}

/// 嵌套参照、圆和弧不作为块内候选：变换后的投影位置不可靠。
fn is_direct_candidate(entity: &Entity) -> bool {
    !matches!(
        entity,
        Entity::BlockReference(_) | Entity::Circle(_) | Entity::Arc(_) | Entity::Unsupported(_)
    )
}

fn instance_point(
    ctx: &mut PassContext,
    doc: &mut Document,
    reference: &BlockReference,
) -> Option<Point3> {
    let candidates: Vec<Entity> = doc
        .virtual_entities(reference)
        .into_iter()
        .filter(is_direct_candidate)
        .collect();

    if !candidates.is_empty() {
        let indices = sample_indices(candidates.len());
        return mean_point(
            indices
                .into_iter()
                .filter_map(|i| center_of(ctx, doc, &candidates[i])),
        );
    }

    // 本层没有可求心基元：把块内嵌套参照炸开一层再试。递归深度
    // 受成图嵌套层数约束；自引用块图属于致命误用，不在守护范围内。
    if doc.explode_block_references(&reference.name) == 0 {
        return None;
    }
    instance_point(ctx, doc, reference)
}
