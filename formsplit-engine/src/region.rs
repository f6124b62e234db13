use formsplit_core::document::{BlockReference, Document, Entity};
use formsplit_core::geometry::{Bounds2D, Point3, Vector3};
use tracing::{debug, info, warn};

use crate::axis::AxisGrid;
use crate::centroid::{PassContext, center_of};
use crate::errors::EngineError;
use crate::space::{RegionId, SpatialIndex};

/// 表单参照上存放区域名的属性标签。
pub const REGION_NAME_TAG: &str = "NAME";

/// 一个已命名的矩形区域：由表单参照的边界几何与轴网原点推导。
#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub bounds: Bounds2D,
    pub origin: Point3,
}

/// 一趟处理的策略参数，由调用方（通常来自配置文件）提供。
#[derive(Debug, Clone)]
pub struct PassRules {
    /// 表单区域块名。
    pub form_block_name: String,
    /// 永不导出的图层。
    pub excluded_layers: Vec<String>,
    /// 轴号 / 参考标记块名，整块排除。
    pub axis_marker_blocks: Vec<String>,
    /// 解析区域原点用的纵横轴号。
    pub origin_vertical_axis: String,
    pub origin_horizon_axis: String,
}

impl Default for PassRules {
    fn default() -> Self {
        Self {
            form_block_name: "NEED_FORM_VER3".to_string(),
            excluded_layers: vec![
                "A-ANNOT".to_string(),
                "A-WALL-INSUL".to_string(),
                "A-WALL-PATT".to_string(),
                "Defpoints".to_string(),
            ],
            axis_marker_blocks: vec!["AXIS_NO".to_string()],
            origin_vertical_axis: "1".to_string(),
            origin_horizon_axis: "A".to_string(),
        }
    }
}

impl PassRules {
    #[inline]
    fn layer_excluded(&self, layer: &str) -> bool {
        self.excluded_layers.iter().any(|name| name == layer)
    }
}

/// 每个区域的迁移统计。
#[derive(Debug, Clone)]
pub struct RegionReport {
    pub name: String,
    pub origin: Point3,
    /// 迁入区域块的实体数。
    pub moved: usize,
    /// 归属该区域但被过滤丢弃的实体数。
    pub dropped: usize,
}

/// 整趟处理的结果汇总，供日志与产物输出使用。
#[derive(Debug, Clone)]
pub struct PassReport {
    pub regions: Vec<RegionReport>,
    pub unassigned: usize,
    pub unresolved: Vec<String>,
}

impl PassReport {
    pub fn region_names(&self) -> Vec<String> {
        self.regions.iter().map(|region| region.name.clone()).collect()
    }
}

/// 区域归属器：持有本趟的全部区域与空间索引。
#[derive(Debug)]
pub struct RegionAssigner {
    rules: PassRules,
    regions: Vec<Region>,
    index: SpatialIndex,
}

impl RegionAssigner {
    /// 收集表单参照并构建区域与索引。找不到任何表单是文档级
    /// 硬失败；单个表单的边界或原点问题只跳过该表单。
    pub fn prepare(doc: &Document, rules: PassRules) -> Result<Self, EngineError> {
        let forms: Vec<BlockReference> = doc
            .entities()
            .filter_map(|(_, entity)| match entity {
                Entity::BlockReference(reference)
                    if reference.name == rules.form_block_name =>
                {
                    Some(reference.clone())
                }
                _ => None,
            })
            .collect();
        if forms.is_empty() {
            return Err(EngineError::NoFormsFound {
                block_name: rules.form_block_name.clone(),
            });
        }

        let mut regions = Vec::new();
        for (idx, form) in forms.iter().enumerate() {
            match build_region(doc, form, idx, &rules) {
                Ok(region) => {
                    debug!(
                        region = %region.name,
                        min_x = region.bounds.min().x(),
                        min_y = region.bounds.min().y(),
                        max_x = region.bounds.max().x(),
                        max_y = region.bounds.max().y(),
                        "表单区域就绪"
                    );
                    regions.push(region);
                }
                Err(err) => {
                    warn!(error = %err, "跳过无法成形的表单");
                }
            }
        }

        let index = SpatialIndex::build(
            regions
                .iter()
                .enumerate()
                .map(|(i, region)| (RegionId::new(i), region.bounds))
                .collect(),
        );
        Ok(Self {
            rules,
            regions,
            index,
        })
    }

    #[inline]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    #[inline]
    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.get())
    }

    /// 单实体分类：心不可求或命中区域数不为 1 时一律不归属。
    /// 重叠区域属于上游建模异常，绝不任取其一。
    pub fn classify(
        &self,
        ctx: &mut PassContext,
        doc: &mut Document,
        entity: &Entity,
    ) -> Option<RegionId> {
        let Some(center) = center_of(ctx, doc, entity) else {
            ctx.note_unresolved(entity.kind_name().to_string());
            return None;
        };
        let hits = self.index.query_point(center.xy());
        if hits.len() == 1 { Some(hits[0]) } else { None }
    }

    /// 递归可见性过滤。裸实体看图层；块参照按保留策略判定，
    /// 其块定义在首次访问时被原地修剪一次并记入备忘。
    pub fn filter_for_inclusion(
        &self,
        ctx: &mut PassContext,
        doc: &mut Document,
        entity: &Entity,
    ) -> bool {
        match entity {
            Entity::BlockReference(reference) => {
                if reference.name == self.rules.form_block_name {
                    return false;
                }
                if self
                    .rules
                    .axis_marker_blocks
                    .iter()
                    .any(|name| *name == reference.name)
                {
                    return false;
                }
                if self.rules.layer_excluded(&reference.layer) {
                    return false;
                }
                if let Some(keep) = ctx.filter_memo(&reference.name) {
                    return keep;
                }
                let keep = self.prune_block(ctx, doc, &reference.name);
                ctx.remember_filter(reference.name.clone(), keep);
                keep
            }
            // 游离文字与未识别对象无条件排除
            Entity::Text(_) | Entity::Unsupported(_) => false,
            other => !self.rules.layer_excluded(other.layer_name()),
        }
    }

    /// 一次性修剪：把块定义里被过滤掉的子实体永久摘除，返回
    /// 是否还有存活内容。幂等 —— 备忘保证同名块只走一遍。
    fn prune_block(&self, ctx: &mut PassContext, doc: &mut Document, block_name: &str) -> bool {
        let Some(definition) = doc.block_mut(block_name) else {
            return false;
        };
        let entities = std::mem::take(&mut definition.entities);
        let mut retained = Vec::with_capacity(entities.len());
        for entity in entities {
            if self.filter_for_inclusion(ctx, doc, &entity) {
                retained.push(entity);
            }
        }
        let keep = !retained.is_empty();
        if let Some(definition) = doc.block_mut(block_name) {
            definition.entities = retained;
        }
        keep
    }

    /// 物化：为每个区域建块，把归属且通过过滤的实体迁入，
    /// 最后在区域原点放一个区域块参照。表单参照自身会在过滤
    /// 阶段被丢弃，不会留在模型空间。
    pub fn materialize(&self, ctx: &mut PassContext, doc: &mut Document) -> PassReport {
        // 先整体分类，再迁移，避免边遍历边改动实体表
        let mut assignments: Vec<(formsplit_core::document::EntityId, RegionId)> = Vec::new();
        let mut unassigned = 0usize;
        for id in doc.entity_ids() {
            let Some(entity) = doc.entity(id).cloned() else {
                continue;
            };
            match self.classify(ctx, doc, &entity) {
                Some(region_id) => assignments.push((id, region_id)),
                None => unassigned += 1,
            }
        }

        for region in &self.regions {
            doc.new_block(region.name.clone(), region.origin);
        }

        let mut reports: Vec<RegionReport> = self
            .regions
            .iter()
            .map(|region| RegionReport {
                name: region.name.clone(),
                origin: region.origin,
                moved: 0,
                dropped: 0,
            })
            .collect();

        for (id, region_id) in assignments {
            let Some(entity) = doc.unlink_entity(id) else {
                continue;
            };
            let report = &mut reports[region_id.get()];
            if self.filter_for_inclusion(ctx, doc, &entity) {
                // 块刚刚建好，挂接不会失败
                if doc.attach_to_block(&self.regions[region_id.get()].name, entity).is_ok() {
                    report.moved += 1;
                }
            } else {
                report.dropped += 1;
            }
        }

        for region in &self.regions {
            doc.add_block_reference(
                region.name.clone(),
                region.origin,
                Vector3::new(1.0, 1.0, 1.0),
                0.0,
                vec![],
                "0",
            );
        }

        for report in &reports {
            info!(
                region = %report.name,
                moved = report.moved,
                dropped = report.dropped,
                "区域物化完成"
            );
        }
        PassReport {
            regions: reports,
            unassigned,
            unresolved: ctx.unresolved().to_vec(),
        }
    }
}

/// 表单的包围盒：取其虚拟实体中线段端点与多段线顶点的并。
fn form_bounds(doc: &Document, form: &BlockReference) -> Bounds2D {
    let mut bounds = Bounds2D::empty();
    for entity in doc.virtual_entities(form) {
        match entity {
            Entity::Line(line) => {
                bounds.include_point(line.start.xy());
                bounds.include_point(line.end.xy());
            }
            Entity::LwPolyline(polyline) => {
                for vertex in &polyline.vertices {
                    bounds.include_point(vertex.position.xy());
                }
            }
            _ => {}
        }
    }
    bounds
}

fn build_region(
    doc: &Document,
    form: &BlockReference,
    idx: usize,
    rules: &PassRules,
) -> Result<Region, EngineError> {
    let name = form
        .attribute_text(REGION_NAME_TAG)
        .map(str::to_string)
        .unwrap_or_else(|| format!("FORM_{idx}"));

    let bounds = form_bounds(doc, form);
    if bounds.is_empty() {
        return Err(EngineError::EmptyFormGeometry { form: name });
    }

    let grid = AxisGrid::from_form_box(doc, form);
    let origin = grid
        .resolve(&rules.origin_vertical_axis, &rules.origin_horizon_axis)
        .ok_or_else(|| EngineError::OriginUnresolved {
            form: name.clone(),
            vertical: rules.origin_vertical_axis.clone(),
            horizon: rules.origin_horizon_axis.clone(),
        })?;

    Ok(Region {
        name,
        bounds,
        origin,
    })
}

/// 整趟入口：收集表单、构建索引、分类并物化，返回汇总报告。
pub fn run_pass(doc: &mut Document, rules: PassRules) -> Result<PassReport, EngineError> {
    let assigner = RegionAssigner::prepare(doc, rules)?;
    let mut ctx = PassContext::new();
    let report = assigner.materialize(&mut ctx, doc);
    info!(
        regions = report.regions.len(),
        unassigned = report.unassigned,
        unresolved = report.unresolved.len(),
        "文档处理完成"
    );
    Ok(report)
}
