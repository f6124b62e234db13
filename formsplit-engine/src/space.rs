use std::collections::HashMap;

use formsplit_core::geometry::{Bounds2D, Point2};
use tracing::debug;

/// 区域编号，按表单在文档中出现的顺序分配。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(usize);

impl RegionId {
    #[inline]
    pub fn new(raw: usize) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

/// 均匀网格包围盒索引：一次性批量装载，之后只读。每个包围盒登记到
/// 它覆盖的所有网格单元，点查询只触碰点所在的单元。
#[derive(Debug)]
pub struct SpatialIndex {
    cell_size: f64,
    origin: Point2,
    cells: HashMap<(i32, i32), Vec<usize>>,
    items: Vec<(RegionId, Bounds2D)>,
}

impl SpatialIndex {
    /// 批量装载。空包围盒被忽略；没有任何有效包围盒时索引为空，
    /// 一切查询返回空集。
    pub fn build(items: Vec<(RegionId, Bounds2D)>) -> Self {
        let items: Vec<(RegionId, Bounds2D)> = items
            .into_iter()
            .filter(|(_, bounds)| !bounds.is_empty())
            .collect();

        let mut world = Bounds2D::empty();
        let mut extent_sum = 0.0;
        for (_, bounds) in &items {
            world.include_bounds(bounds);
            extent_sum += bounds.width().max(bounds.height());
        }
        // 单元尺寸取盒子最大边长的平均值，退化时用 1.0 兜底
        let cell_size = if items.is_empty() {
            1.0
        } else {
            (extent_sum / items.len() as f64).max(1.0)
        };
        let origin = if world.is_empty() {
            Point2::new(0.0, 0.0)
        } else {
            world.min()
        };

        let mut index = Self {
            cell_size,
            origin,
            cells: HashMap::new(),
            items,
        };
        for slot in 0..index.items.len() {
            let bounds = index.items[slot].1;
            let (min_cx, min_cy) = index.cell_coords(bounds.min());
            let (max_cx, max_cy) = index.cell_coords(bounds.max());
            for cx in min_cx..=max_cx {
                for cy in min_cy..=max_cy {
                    index.cells.entry((cx, cy)).or_default().push(slot);
                }
            }
        }
        debug!(
            regions = index.items.len(),
            cells = index.cells.len(),
            cell_size = index.cell_size,
            "空间索引装载完成"
        );
        index
    }

    #[inline]
    fn cell_coords(&self, point: Point2) -> (i32, i32) {
        let cx = ((point.x() - self.origin.x()) / self.cell_size).floor() as i32;
        let cy = ((point.y() - self.origin.y()) / self.cell_size).floor() as i32;
        (cx, cy)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 点包含查询（退化为点的查询框）。结果按区域编号升序，
    /// 保证重复运行输出一致。
    pub fn query_point(&self, point: Point2) -> Vec<RegionId> {
        let Some(slots) = self.cells.get(&self.cell_coords(point)) else {
            return Vec::new();
        };
        let mut hits: Vec<RegionId> = slots
            .iter()
            .filter(|&&slot| self.items[slot].1.contains_point(point))
            .map(|&slot| self.items[slot].0)
            .collect();
        hits.sort();
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Bounds2D {
        Bounds2D::new(Point2::new(min_x, min_y), Point2::new(max_x, max_y))
    }

    #[test]
    fn point_inside_one_of_disjoint_boxes_hits_exactly_it() {
        let index = SpatialIndex::build(vec![
            (RegionId::new(0), boxed(0.0, 0.0, 100.0, 100.0)),
            (RegionId::new(1), boxed(200.0, 0.0, 300.0, 100.0)),
            (RegionId::new(2), boxed(0.0, 200.0, 100.0, 300.0)),
        ]);
        assert_eq!(index.len(), 3);
        assert_eq!(
            index.query_point(Point2::new(50.0, 50.0)),
            vec![RegionId::new(0)]
        );
        assert_eq!(
            index.query_point(Point2::new(250.0, 50.0)),
            vec![RegionId::new(1)]
        );
    }

    #[test]
    fn point_outside_all_boxes_returns_empty() {
        let index = SpatialIndex::build(vec![
            (RegionId::new(0), boxed(0.0, 0.0, 100.0, 100.0)),
            (RegionId::new(1), boxed(200.0, 0.0, 300.0, 100.0)),
        ]);
        assert!(index.query_point(Point2::new(150.0, 50.0)).is_empty());
        assert!(index.query_point(Point2::new(-1000.0, -1000.0)).is_empty());
    }

    #[test]
    fn overlapping_boxes_both_reported() {
        let index = SpatialIndex::build(vec![
            (RegionId::new(0), boxed(0.0, 0.0, 100.0, 100.0)),
            (RegionId::new(1), boxed(50.0, 0.0, 150.0, 100.0)),
        ]);
        let hits = index.query_point(Point2::new(75.0, 50.0));
        assert_eq!(hits, vec![RegionId::new(0), RegionId::new(1)]);
    }

    #[test]
    fn boundary_points_are_inclusive() {
        let index = SpatialIndex::build(vec![(RegionId::new(0), boxed(0.0, 0.0, 100.0, 100.0))]);
        assert_eq!(
            index.query_point(Point2::new(0.0, 0.0)),
            vec![RegionId::new(0)]
        );
        assert_eq!(
            index.query_point(Point2::new(100.0, 100.0)),
            vec![RegionId::new(0)]
        );
    }

    #[test]
    fn empty_bounds_are_dropped() {
        let index = SpatialIndex::build(vec![
            (RegionId::new(0), Bounds2D::empty()),
            (RegionId::new(1), boxed(0.0, 0.0, 10.0, 10.0)),
        ]);
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.query_point(Point2::new(5.0, 5.0)),
            vec![RegionId::new(1)]
        );
    }

    #[test]
    fn index_over_empty_input_is_empty() {
        let index = SpatialIndex::build(vec![]);
        assert!(index.is_empty());
        assert!(index.query_point(Point2::new(0.0, 0.0)).is_empty());
    }

    #[test]
    fn many_small_boxes_query_correctly() {
        // 10×10 网格，每格一个 8×8 的盒子
        let mut items = Vec::new();
        for row in 0..10 {
            for col in 0..10 {
                let x = col as f64 * 10.0;
                let y = row as f64 * 10.0;
                items.push((
                    RegionId::new(row * 10 + col),
                    boxed(x, y, x + 8.0, y + 8.0),
                ));
            }
        }
        let index = SpatialIndex::build(items);
        assert_eq!(
            index.query_point(Point2::new(34.0, 74.0)),
            vec![RegionId::new(73)]
        );
        // 盒子之间的缝隙
        assert!(index.query_point(Point2::new(9.0, 9.0)).is_empty());
    }
}
