pub mod geometry {
    use glam::{DVec2, DVec3};
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示，用于包围盒等纯平面计算。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 三维点。实体坐标统一携带 Z 分量，即使绝大多数图纸 Z 恒为 0。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn from_vec(vec: DVec3) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        #[inline]
        pub fn xy(self) -> Point2 {
            Point2::new(self.0.x, self.0.y)
        }

        #[inline]
        pub fn translate(self, offset: Vector3) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn vector_to(self, other: Point3) -> Vector3 {
            Vector3(other.0 - self.0)
        }

        /// 两点中点。
        #[inline]
        pub fn midpoint(self, other: Point3) -> Self {
            Self((self.0 + other.0) * 0.5)
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self::from_vec(value)
        }
    }

    /// 三维向量，主要承载插入点偏移与缩放分量。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector3(pub DVec3);

    impl Vector3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn zero() -> Self {
            Self(DVec3::ZERO)
        }

        #[inline]
        pub fn from_points(start: Point3, end: Point3) -> Self {
            Self(end.0 - start.0)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        #[inline]
        pub fn scale(self, factor: f64) -> Self {
            Self(self.0 * factor)
        }
    }

    impl From<DVec3> for Vector3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 轴对齐边界框，用于表单区域与空间索引。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.max.x() - self.min.x()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.max.y() - self.min.y()
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        pub fn include_bounds(&mut self, other: &Bounds2D) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        /// 闭区间判定：落在边界上的点视作包含，与退化为点的查询框一致。
        #[inline]
        pub fn contains_point(&self, point: Point2) -> bool {
            !self.is_empty()
                && point.x() >= self.min.x()
                && point.x() <= self.max.x()
                && point.y() >= self.min.y()
                && point.y() <= self.max.y()
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(!self.is_empty());
            let center = (self.min.as_vec2() + self.max.as_vec2()) * 0.5;
            Point2::from_vec(center)
        }
    }

    /// 圆弧端点：角度以度为单位（DXF 惯例），换算为弧度后求坐标。
    #[inline]
    pub fn arc_endpoint(center: Point3, radius: f64, angle_degrees: f64) -> Point3 {
        let rad = angle_degrees.to_radians();
        center.translate(Vector3::new(radius * rad.cos(), radius * rad.sin(), 0.0))
    }

    /// 一组点的算术平均，空集返回 None。
    pub fn mean_point<I>(points: I) -> Option<Point3>
    where
        I: IntoIterator<Item = Point3>,
    {
        let mut sum = DVec3::ZERO;
        let mut count = 0usize;
        for point in points {
            sum += point.as_vec3();
            count += 1;
        }
        if count == 0 {
            None
        } else {
            Some(Point3::from_vec(sum / count as f64))
        }
    }

}

pub mod document {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use crate::geometry::{Point3, Vector3};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EntityId(u64);

    impl EntityId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Layer {
        pub name: String,
        pub is_visible: bool,
    }

    impl Layer {
        #[inline]
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                is_visible: true,
            }
        }
    }

    /// 块参照携带的属性文字（轴号、区域名等通过它读取）。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Attribute {
        pub tag: String,
        pub text: String,
        pub insert: Point3,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Entity {
        Line(Line),
        Circle(Circle),
        Arc(Arc),
        LwPolyline(LwPolyline),
        Text(Text),
        Dimension(Dimension),
        Hatch(Hatch),
        BlockReference(BlockReference),
        /// 文档模型无法映射的对象。保留图层信息，后续处理一律视为
        /// 不可求心，不允许因此中断整个批次。
        Unsupported(Unsupported),
    }

    impl Entity {
        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                Entity::Line(line) => &line.layer,
                Entity::Circle(circle) => &circle.layer,
                Entity::Arc(arc) => &arc.layer,
                Entity::LwPolyline(polyline) => &polyline.layer,
                Entity::Text(text) => &text.layer,
                Entity::Dimension(dimension) => &dimension.layer,
                Entity::Hatch(hatch) => &hatch.layer,
                Entity::BlockReference(reference) => &reference.layer,
                Entity::Unsupported(other) => &other.layer,
            }
        }

        /// 调试与诊断用的简短类型名。
        pub fn kind_name(&self) -> &str {
            match self {
                Entity::Line(_) => "LINE",
                Entity::Circle(_) => "CIRCLE",
                Entity::Arc(_) => "ARC",
                Entity::LwPolyline(_) => "LWPOLYLINE",
                Entity::Text(_) => "TEXT",
                Entity::Dimension(_) => "DIMENSION",
                Entity::Hatch(_) => "HATCH",
                Entity::BlockReference(_) => "INSERT",
                Entity::Unsupported(other) => &other.kind,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point3,
        pub end: Point3,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point3,
        pub radius: f64,
        pub layer: String,
    }

    /// 圆弧实体。角度以度为单位储存，遵循 DXF 惯例与数学正方向。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Arc {
        pub center: Point3,
        pub radius: f64,
        pub start_angle: f64,
        pub end_angle: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, Copy, Serialize, Deserialize)]
    pub struct PolylineVertex {
        pub position: Point3,
        pub bulge: f64,
    }

    impl PolylineVertex {
        #[inline]
        pub fn new(position: Point3) -> Self {
            Self {
                position,
                bulge: 0.0,
            }
        }

        #[inline]
        pub fn with_bulge(position: Point3, bulge: f64) -> Self {
            Self { position, bulge }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LwPolyline {
        pub vertices: Vec<PolylineVertex>,
        pub is_closed: bool,
        pub layer: String,
    }

    impl LwPolyline {
        /// 将多段线按顶点对拆解为基础 Line / Arc（凸度段转为圆弧）。
        /// 结果坐标即世界坐标，等同于原地炸开。
        pub fn virtual_segments(&self) -> Vec<Entity> {
            let mut segments = Vec::new();
            if self.vertices.len() < 2 {
                return segments;
            }
            let count = if self.is_closed {
                self.vertices.len()
            } else {
                self.vertices.len() - 1
            };
            for i in 0..count {
                let from = self.vertices[i];
                let to = self.vertices[(i + 1) % self.vertices.len()];
                segments.push(segment_entity(from, to.position, &self.layer));
            }
            segments
        }
    }

    /// 单个顶点对展开：凸度为 0 时是线段，否则换算为圆弧。
    fn segment_entity(from: PolylineVertex, to: Point3, layer: &str) -> Entity {
        let bulge = from.bulge;
        if bulge.abs() <= 1e-9 {
            return Entity::Line(Line {
                start: from.position,
                end: to,
                layer: layer.to_string(),
            });
        }

        let start_vec = from.position.as_vec3().truncate();
        let end_vec = to.as_vec3().truncate();
        let chord = end_vec - start_vec;
        let chord_len = chord.length();
        if chord_len <= f64::EPSILON {
            return Entity::Line(Line {
                start: from.position,
                end: to,
                layer: layer.to_string(),
            });
        }

        // 凸度 = tan(θ/4)，θ 为圆心角。
        let theta = 4.0 * bulge.atan();
        let radius = (chord_len / (2.0 * (theta / 2.0).sin())).abs();
        let midpoint = (start_vec + end_vec) * 0.5;
        let perp = glam::DVec2::new(-chord.y, chord.x) / chord_len;
        // 圆心到弦中点的有向距离 = (弦长/2) / tan(θ/2)。
        let apothem = (chord_len / 2.0) / (theta / 2.0).tan();
        let center_vec = midpoint - perp * apothem;
        let center = Point3::new(center_vec.x, center_vec.y, from.position.z());

        let start_dir = start_vec - center_vec;
        let start_angle = start_dir.y.atan2(start_dir.x).to_degrees();
        let end_angle = start_angle + theta.to_degrees();
        Entity::Arc(Arc {
            center,
            radius,
            start_angle,
            end_angle,
            layer: layer.to_string(),
        })
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Text {
        pub insert: Point3,
        pub content: String,
        pub height: f64,
        pub layer: String,
    }

    /// 标注实体只保留分类所需的定义点。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Dimension {
        pub definition_point: Point3,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum HatchEdge {
        Line {
            start: Point3,
            end: Point3,
        },
        Arc {
            center: Point3,
            radius: f64,
            start_angle: f64,
            end_angle: f64,
        },
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum HatchPath {
        Polyline { vertices: Vec<Point3> },
        Edges { edges: Vec<HatchEdge> },
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Hatch {
        pub paths: Vec<HatchPath>,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockReference {
        pub name: String,
        pub insert: Point3,
        /// 分量缩放。`scale.x < 0` 即镜像（绕竖直轴翻转）。
        pub scale: Vector3,
        /// 旋转角，度。
        pub rotation: f64,
        pub attributes: Vec<Attribute>,
        pub layer: String,
    }

    impl BlockReference {
        /// 按标签读取属性文字，对应上游的 `get_attrib_text`。
        pub fn attribute_text(&self, tag: &str) -> Option<&str> {
            self.attributes
                .iter()
                .find(|attr| attr.tag == tag)
                .map(|attr| attr.text.as_str())
        }

        #[inline]
        pub fn is_mirrored(&self) -> bool {
            self.scale.x() < 0.0
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Unsupported {
        pub kind: String,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockDefinition {
        pub name: String,
        pub base_point: Point3,
        pub entities: Vec<Entity>,
    }

    /// 插入变换：先相对基点缩放（含镜像）、再旋转、最后平移到插入点。
    #[derive(Debug, Clone, Copy)]
    struct InsertTransform {
        insert: Point3,
        base: Point3,
        scale: Vector3,
        rotation: f64,
    }

    impl InsertTransform {
        fn new(reference: &BlockReference, base_point: Point3) -> Self {
            Self {
                insert: reference.insert,
                base: base_point,
                scale: reference.scale,
                rotation: reference.rotation,
            }
        }

        fn apply_point(&self, point: Point3) -> Point3 {
            let local = point.as_vec3() - self.base.as_vec3();
            let scaled = local * self.scale.as_vec3();
            let rad = self.rotation.to_radians();
            let (sin, cos) = rad.sin_cos();
            let rotated = glam::DVec3::new(
                scaled.x * cos - scaled.y * sin,
                scaled.x * sin + scaled.y * cos,
                scaled.z,
            );
            Point3::from_vec(self.insert.as_vec3() + rotated)
        }

        #[inline]
        fn apply_radius(&self, radius: f64) -> f64 {
            radius * self.scale.x().abs()
        }

        /// 圆弧角度变换：镜像时端角关于 180° 对称并交换方向，再叠加旋转。
        fn apply_angles(&self, start: f64, end: f64) -> (f64, f64) {
            if self.scale.x() < 0.0 {
                (180.0 - end + self.rotation, 180.0 - start + self.rotation)
            } else {
                (start + self.rotation, end + self.rotation)
            }
        }

        fn apply_entity(&self, entity: &Entity) -> Entity {
            match entity {
                Entity::Line(line) => Entity::Line(Line {
                    start: self.apply_point(line.start),
                    end: self.apply_point(line.end),
                    layer: line.layer.clone(),
                }),
                Entity::Circle(circle) => Entity::Circle(Circle {
                    center: self.apply_point(circle.center),
                    radius: self.apply_radius(circle.radius),
                    layer: circle.layer.clone(),
                }),
                Entity::Arc(arc) => {
                    let (start_angle, end_angle) =
                        self.apply_angles(arc.start_angle, arc.end_angle);
                    Entity::Arc(Arc {
                        center: self.apply_point(arc.center),
                        radius: self.apply_radius(arc.radius),
                        start_angle,
                        end_angle,
                        layer: arc.layer.clone(),
                    })
                }
                Entity::LwPolyline(polyline) => Entity::LwPolyline(LwPolyline {
                    vertices: polyline
                        .vertices
                        .iter()
                        .map(|vertex| PolylineVertex {
                            position: self.apply_point(vertex.position),
                            bulge: if self.scale.x() < 0.0 {
                                -vertex.bulge
                            } else {
                                vertex.bulge
                            },
                        })
                        .collect(),
                    is_closed: polyline.is_closed,
                    layer: polyline.layer.clone(),
                }),
                Entity::Text(text) => Entity::Text(Text {
                    insert: self.apply_point(text.insert),
                    content: text.content.clone(),
                    height: text.height,
                    layer: text.layer.clone(),
                }),
                Entity::Dimension(dimension) => Entity::Dimension(Dimension {
                    definition_point: self.apply_point(dimension.definition_point),
                    layer: dimension.layer.clone(),
                }),
                Entity::Hatch(hatch) => Entity::Hatch(Hatch {
                    paths: hatch
                        .paths
                        .iter()
                        .map(|path| match path {
                            HatchPath::Polyline { vertices } => HatchPath::Polyline {
                                vertices: vertices
                                    .iter()
                                    .map(|vertex| self.apply_point(*vertex))
                                    .collect(),
                            },
                            HatchPath::Edges { edges } => HatchPath::Edges {
                                edges: edges
                                    .iter()
                                    .map(|edge| match edge {
                                        HatchEdge::Line { start, end } => HatchEdge::Line {
                                            start: self.apply_point(*start),
                                            end: self.apply_point(*end),
                                        },
                                        HatchEdge::Arc {
                                            center,
                                            radius,
                                            start_angle,
                                            end_angle,
                                        } => {
                                            let (start_angle, end_angle) =
                                                self.apply_angles(*start_angle, *end_angle);
                                            HatchEdge::Arc {
                                                center: self.apply_point(*center),
                                                radius: self.apply_radius(*radius),
                                                start_angle,
                                                end_angle,
                                            }
                                        }
                                    })
                                    .collect(),
                            },
                        })
                        .collect(),
                    layer: hatch.layer.clone(),
                }),
                Entity::BlockReference(reference) => {
                    Entity::BlockReference(BlockReference {
                        name: reference.name.clone(),
                        insert: self.apply_point(reference.insert),
                        scale: Vector3::from(
                            reference.scale.as_vec3() * self.scale.as_vec3(),
                        ),
                        rotation: reference.rotation + self.rotation,
                        attributes: reference
                            .attributes
                            .iter()
                            .map(|attr| Attribute {
                                tag: attr.tag.clone(),
                                text: attr.text.clone(),
                                insert: self.apply_point(attr.insert),
                                layer: attr.layer.clone(),
                            })
                            .collect(),
                        layer: reference.layer.clone(),
                    })
                }
                Entity::Unsupported(other) => Entity::Unsupported(other.clone()),
            }
        }
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Document {
        layers: HashMap<String, Layer>,
        entities: Vec<(EntityId, Entity)>,
        next_entity_id: u64,
        blocks: HashMap<String, BlockDefinition>,
    }

    impl Document {
        pub fn new() -> Self {
            let mut doc = Self::default();
            doc.ensure_layer("0");
            doc
        }

        pub fn ensure_layer(&mut self, name: impl AsRef<str>) {
            let key = name.as_ref();
            self.layers
                .entry(key.to_string())
                .or_insert_with(|| Layer::new(key));
        }

        pub fn add_line(&mut self, start: Point3, end: Point3, layer: impl Into<String>) -> EntityId {
            self.add_entity(Entity::Line(Line {
                start,
                end,
                layer: layer.into(),
            }))
        }

        pub fn add_circle(
            &mut self,
            center: Point3,
            radius: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::Circle(Circle {
                center,
                radius,
                layer: layer.into(),
            }))
        }

        pub fn add_arc(
            &mut self,
            center: Point3,
            radius: f64,
            start_angle: f64,
            end_angle: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::Arc(Arc {
                center,
                radius,
                start_angle,
                end_angle,
                layer: layer.into(),
            }))
        }

        pub fn add_polyline<I>(
            &mut self,
            vertices: I,
            is_closed: bool,
            layer: impl Into<String>,
        ) -> EntityId
        where
            I: IntoIterator<Item = Point3>,
        {
            let collected = vertices
                .into_iter()
                .map(PolylineVertex::new)
                .collect::<Vec<_>>();
            self.add_polyline_with_vertices(collected, is_closed, layer)
        }

        pub fn add_polyline_with_vertices<I>(
            &mut self,
            vertices: I,
            is_closed: bool,
            layer: impl Into<String>,
        ) -> EntityId
        where
            I: IntoIterator<Item = PolylineVertex>,
        {
            self.add_entity(Entity::LwPolyline(LwPolyline {
                vertices: vertices.into_iter().collect(),
                is_closed,
                layer: layer.into(),
            }))
        }

        pub fn add_text(
            &mut self,
            insert: Point3,
            content: impl Into<String>,
            height: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::Text(Text {
                insert,
                content: content.into(),
                height,
                layer: layer.into(),
            }))
        }

        pub fn add_dimension(
            &mut self,
            definition_point: Point3,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::Dimension(Dimension {
                definition_point,
                layer: layer.into(),
            }))
        }

        pub fn add_hatch(&mut self, paths: Vec<HatchPath>, layer: impl Into<String>) -> EntityId {
            self.add_entity(Entity::Hatch(Hatch {
                paths,
                layer: layer.into(),
            }))
        }

        pub fn add_block_reference(
            &mut self,
            name: impl Into<String>,
            insert: Point3,
            scale: Vector3,
            rotation: f64,
            attributes: Vec<Attribute>,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::BlockReference(BlockReference {
                name: name.into(),
                insert,
                scale,
                rotation,
                attributes,
                layer: layer.into(),
            }))
        }

        pub fn add_unsupported(
            &mut self,
            kind: impl Into<String>,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::Unsupported(Unsupported {
                kind: kind.into(),
                layer: layer.into(),
            }))
        }

        pub fn add_entity(&mut self, entity: Entity) -> EntityId {
            self.ensure_layer(entity.layer_name().to_string());
            if let Entity::BlockReference(reference) = &entity {
                for attribute in &reference.attributes {
                    self.ensure_layer(attribute.layer.clone());
                }
            }
            let id = self.next_id();
            self.entities.push((id, entity));
            id
        }

        #[inline]
        pub fn layers(&self) -> impl Iterator<Item = &Layer> {
            self.layers.values()
        }

        #[inline]
        pub fn entities(&self) -> impl Iterator<Item = &(EntityId, Entity)> {
            self.entities.iter()
        }

        #[inline]
        pub fn entity_ids(&self) -> Vec<EntityId> {
            self.entities.iter().map(|(id, _)| *id).collect()
        }

        #[inline]
        pub fn entity(&self, id: EntityId) -> Option<&Entity> {
            self.entities
                .iter()
                .find_map(|(entity_id, entity)| (*entity_id == id).then_some(entity))
        }

        pub fn add_block_definition(&mut self, definition: BlockDefinition) {
            for entity in &definition.entities {
                self.ensure_layer(entity.layer_name().to_string());
            }
            self.blocks.insert(definition.name.clone(), definition);
        }

        /// 新建空块定义（区域物化时逐个填充）。
        pub fn new_block(&mut self, name: impl Into<String>, base_point: Point3) {
            let name = name.into();
            self.blocks.insert(
                name.clone(),
                BlockDefinition {
                    name,
                    base_point,
                    entities: Vec::new(),
                },
            );
        }

        #[inline]
        pub fn block(&self, name: &str) -> Option<&BlockDefinition> {
            self.blocks.get(name)
        }

        #[inline]
        pub fn block_mut(&mut self, name: &str) -> Option<&mut BlockDefinition> {
            self.blocks.get_mut(name)
        }

        #[inline]
        pub fn blocks(&self) -> impl Iterator<Item = &BlockDefinition> {
            self.blocks.values()
        }

        /// 从模型空间摘除实体并交还所有权。
        pub fn unlink_entity(&mut self, id: EntityId) -> Option<Entity> {
            let index = self
                .entities
                .iter()
                .position(|(entity_id, _)| *entity_id == id)?;
            Some(self.entities.remove(index).1)
        }

        /// 把实体挂入指定块定义。块不存在时交回实体。
        pub fn attach_to_block(
            &mut self,
            block_name: &str,
            entity: Entity,
        ) -> Result<(), Entity> {
            match self.blocks.get_mut(block_name) {
                Some(definition) => {
                    definition.entities.push(entity);
                    Ok(())
                }
                None => Err(entity),
            }
        }

        /// 展开块参照内容为世界坐标下的虚拟实体（单层展开，嵌套参照
        /// 以变换后的参照形式保留）。块缺失时返回空序列。
        pub fn virtual_entities(&self, reference: &BlockReference) -> Vec<Entity> {
            let Some(definition) = self.blocks.get(&reference.name) else {
                return Vec::new();
            };
            let transform = InsertTransform::new(reference, definition.base_point);
            definition
                .entities
                .iter()
                .map(|entity| transform.apply_entity(entity))
                .collect()
        }

        /// 将块定义内部的嵌套参照原地炸开一层，返回被炸开的参照数。
        /// 用于求心时退化块（本层没有任何可求心基元）的兜底展开。
        pub fn explode_block_references(&mut self, block_name: &str) -> usize {
            let Some(definition) = self.blocks.get(block_name) else {
                return 0;
            };
            let mut exploded = 0usize;
            let mut rebuilt = Vec::with_capacity(definition.entities.len());
            let entities = definition.entities.clone();
            for entity in entities {
                if let Entity::BlockReference(nested) = &entity {
                    let children = self.virtual_entities(nested);
                    if children.is_empty() {
                        rebuilt.push(entity);
                    } else {
                        exploded += 1;
                        rebuilt.extend(children);
                    }
                } else {
                    rebuilt.push(entity);
                }
            }
            if let Some(definition) = self.blocks.get_mut(block_name) {
                definition.entities = rebuilt;
            }
            exploded
        }

        #[inline]
        fn next_id(&mut self) -> EntityId {
            let id = self.next_entity_id;
            self.next_entity_id += 1;
            EntityId(id)
        }
    }

}
