use std::collections::HashMap;

use formsplit_core::document::{BlockReference, Document, Entity};
use formsplit_core::geometry::Point3;

/// 轴号标记块里存放轴名的属性标签。
pub const AXIS_LABEL_TAG: &str = "NO";

/// 无效轴号占位（图面上保留了标记块但未编号）。
const BLANK_AXIS_LABEL: &str = "-";

/// 轴网：把轴号解析为相对原点的带符号偏移。竖向轴（柱列线，通常为
/// 数字编号）沿 x 分量偏移，横向轴（字母编号）沿 y 分量偏移。
/// 一个轴号只能属于其中一个方向。
#[derive(Debug, Clone)]
pub struct AxisGrid {
    origin: Point3,
    verticals: HashMap<String, f64>,
    horizons: HashMap<String, f64>,
}

impl AxisGrid {
    pub fn new(origin: Point3) -> Self {
        Self {
            origin,
            verticals: HashMap::new(),
            horizons: HashMap::new(),
        }
    }

    #[inline]
    pub fn origin(&self) -> Point3 {
        self.origin
    }

    /// 为下一个表单框重定向原点，轴表保持不变。
    #[inline]
    pub fn set_origin(&mut self, origin: Point3) {
        self.origin = origin;
    }

    /// 登记轴号。重复登记时后写覆盖先写；若方向发生变化，
    /// 旧方向的登记被移除，保证轴号只属于一个方向。
    pub fn register_axis(&mut self, label: impl Into<String>, distance: f64, is_vertical: bool) {
        let label = label.into();
        if is_vertical {
            self.horizons.remove(&label);
            self.verticals.insert(label, distance);
        } else {
            self.verticals.remove(&label);
            self.horizons.insert(label, distance);
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.verticals.is_empty() && self.horizons.is_empty()
    }

    /// 把一对轴号合成为绝对坐标：要求两个轴号恰好一纵一横
    /// （顺序无关），否则无法解析。
    pub fn resolve(&self, label_a: &str, label_b: &str) -> Option<Point3> {
        let labels = [label_a, label_b];
        let mut vertical: Option<f64> = None;
        let mut horizon: Option<f64> = None;
        let mut vertical_hits = 0usize;
        let mut horizon_hits = 0usize;
        for label in labels {
            if let Some(distance) = self.verticals.get(label) {
                vertical = Some(*distance);
                vertical_hits += 1;
            }
            if let Some(distance) = self.horizons.get(label) {
                horizon = Some(*distance);
                horizon_hits += 1;
            }
        }
        if vertical_hits != 1 || horizon_hits != 1 {
            return None;
        }
        let origin = self.origin.as_vec3();
        Some(Point3::new(
            origin.x + vertical?,
            origin.y + horizon?,
            origin.z,
        ))
    }

    /// 从一个表单框的内容构建轴网：扫描展开后的虚拟实体中携带
    /// `NO` 属性的标记参照。旋转 90° 的标记属于横向轴，偏移取
    /// 插入点相对框原点的 y 分量；其余为竖向轴，取 x 分量。
    pub fn from_form_box(doc: &Document, form: &BlockReference) -> Self {
        let box_origin = form.insert;
        let mut grid = Self::new(box_origin);
        for entity in doc.virtual_entities(form) {
            let Entity::BlockReference(marker) = &entity else {
                continue;
            };
            let Some(label) = marker.attribute_text(AXIS_LABEL_TAG) else {
                continue;
            };
            if label == BLANK_AXIS_LABEL {
                continue;
            }
            let delta = box_origin.vector_to(marker.insert);
            if (marker.rotation - 90.0).abs() < 1e-6 {
                grid.register_axis(label, delta.y(), false);
            } else {
                grid.register_axis(label, delta.x(), true);
            }
        }
        grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formsplit_core::document::{Attribute, BlockDefinition};
    use formsplit_core::geometry::Vector3;

    #[test]
    fn resolve_maps_vertical_to_x_and_horizon_to_y() {
        let mut grid = AxisGrid::new(Point3::new(0.0, 0.0, 0.0));
        grid.register_axis("1", 3000.0, true);
        grid.register_axis("A", 3000.0, false);

        // 竖向轴 → x 分量，横向轴 → y 分量
        let point = grid.resolve("1", "A").expect("axis pair should resolve");
        assert!((point.x() - 3000.0).abs() < 1e-9);
        assert!((point.y() - 3000.0).abs() < 1e-9);
        assert!(point.z().abs() < 1e-9);

        // 顺序无关
        let swapped = grid.resolve("A", "1").unwrap();
        assert!((swapped.x() - 3000.0).abs() < 1e-9);
        assert!((swapped.y() - 3000.0).abs() < 1e-9);
    }

    #[test]
    fn resolve_respects_origin() {
        let mut grid = AxisGrid::new(Point3::new(100.0, 200.0, 5.0));
        grid.register_axis("2", 600.0, true);
        grid.register_axis("B", -400.0, false);
        let point = grid.resolve("2", "B").unwrap();
        assert!((point.x() - 700.0).abs() < 1e-9);
        assert!((point.y() + 200.0).abs() < 1e-9);
        assert!((point.z() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn two_verticals_do_not_resolve() {
        let mut grid = AxisGrid::new(Point3::new(0.0, 0.0, 0.0));
        grid.register_axis("1", 1000.0, true);
        grid.register_axis("2", 2000.0, true);
        assert!(grid.resolve("1", "2").is_none());
    }

    #[test]
    fn unregistered_label_does_not_resolve() {
        let mut grid = AxisGrid::new(Point3::new(0.0, 0.0, 0.0));
        grid.register_axis("1", 1000.0, true);
        assert!(grid.resolve("1", "A").is_none());
    }

    #[test]
    fn last_registration_wins_and_direction_flips() {
        let mut grid = AxisGrid::new(Point3::new(0.0, 0.0, 0.0));
        grid.register_axis("1", 1000.0, true);
        grid.register_axis("A", 500.0, false);
        grid.register_axis("1", 1500.0, true);
        let point = grid.resolve("1", "A").unwrap();
        assert!((point.x() - 1500.0).abs() < 1e-9);

        // 改向后旧方向的登记消失
        grid.register_axis("1", 800.0, false);
        assert!(grid.resolve("1", "A").is_none());
    }

    fn axis_marker(label: &str, insert: Point3, rotation: f64) -> Entity {
        Entity::BlockReference(BlockReference {
            name: "AXIS_NO".to_string(),
            insert,
            scale: Vector3::new(1.0, 1.0, 1.0),
            rotation,
            attributes: vec![Attribute {
                tag: AXIS_LABEL_TAG.to_string(),
                text: label.to_string(),
                insert,
                layer: "0".to_string(),
            }],
            layer: "0".to_string(),
        })
    }

    #[test]
    fn grid_from_form_box_reads_markers() {
        let mut doc = Document::new();
        doc.add_block_definition(BlockDefinition {
            name: "FORM".to_string(),
            base_point: Point3::new(0.0, 0.0, 0.0),
            entities: vec![
                axis_marker("1", Point3::new(3000.0, -500.0, 0.0), 0.0),
                axis_marker("A", Point3::new(-500.0, 2000.0, 0.0), 90.0),
                axis_marker("-", Point3::new(9000.0, 0.0, 0.0), 0.0),
            ],
        });
        let form = BlockReference {
            name: "FORM".to_string(),
            insert: Point3::new(10.0, 20.0, 0.0),
            scale: Vector3::new(1.0, 1.0, 1.0),
            rotation: 0.0,
            attributes: vec![],
            layer: "0".to_string(),
        };

        let grid = AxisGrid::from_form_box(&doc, &form);
        let point = grid.resolve("1", "A").expect("markers should register");
        // 标记插入点相对框原点的投影：竖向取 x，横向取 y
        assert!((point.x() - (10.0 + 3000.0)).abs() < 1e-9);
        assert!((point.y() - (20.0 + 2000.0)).abs() < 1e-9);
        // 占位轴号 "-" 不登记
        assert!(grid.resolve("-", "A").is_none());
    }
}
