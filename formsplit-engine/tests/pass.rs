use formsplit_core::document::{
    Attribute, BlockDefinition, BlockReference, Document, Entity, Line,
};
use formsplit_core::geometry::{Point3, Vector3};
use formsplit_engine::errors::EngineError;
use formsplit_engine::region::{PassRules, run_pass};

fn line(start: Point3, end: Point3, layer: &str) -> Entity {
    Entity::Line(Line {
        start,
        end,
        layer: layer.to_string(),
    })
}

fn axis_marker(insert: Point3, rotation: f64, label: &str) -> Entity {
    Entity::BlockReference(BlockReference {
        name: "AXIS_NO".to_string(),
        insert,
        scale: Vector3::new(1.0, 1.0, 1.0),
        rotation,
        attributes: vec![Attribute {
            tag: "NO".to_string(),
            text: label.to_string(),
            insert,
            layer: "0".to_string(),
        }],
        layer: "0".to_string(),
    })
}

/// 准备一个 100x100 的表单块定义，轴 "1" 在 x=10、轴 "A" 在 y=20。
fn install_form_block(doc: &mut Document) {
    doc.add_block_definition(BlockDefinition {
        name: "AXIS_NO".to_string(),
        base_point: Point3::new(0.0, 0.0, 0.0),
        entities: vec![line(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            "0",
        )],
    });
    doc.add_block_definition(BlockDefinition {
        name: "NEED_FORM_VER3".to_string(),
        base_point: Point3::new(0.0, 0.0, 0.0),
        entities: vec![
            line(Point3::new(0.0, 0.0, 0.0), Point3::new(100.0, 0.0, 0.0), "0"),
            line(Point3::new(100.0, 0.0, 0.0), Point3::new(100.0, 100.0, 0.0), "0"),
            line(Point3::new(100.0, 100.0, 0.0), Point3::new(0.0, 100.0, 0.0), "0"),
            line(Point3::new(0.0, 100.0, 0.0), Point3::new(0.0, 0.0, 0.0), "0"),
            axis_marker(Point3::new(10.0, -5.0, 0.0), 0.0, "1"),
            axis_marker(Point3::new(-5.0, 20.0, 0.0), 90.0, "A"),
        ],
    });
}

fn add_form(doc: &mut Document, name: &str, insert: Point3) {
    doc.add_block_reference(
        "NEED_FORM_VER3",
        insert,
        Vector3::new(1.0, 1.0, 1.0),
        0.0,
        vec![Attribute {
            tag: "NAME".to_string(),
            text: name.to_string(),
            insert,
            layer: "0".to_string(),
        }],
        "0",
    );
}

#[test]
fn pass_splits_entities_into_region_blocks() {
    let mut doc = Document::new();
    install_form_block(&mut doc);
    add_form(&mut doc, "region1", Point3::new(0.0, 0.0, 0.0));
    add_form(&mut doc, "region2", Point3::new(200.0, 0.0, 0.0));

    // 中心 (50,50) → region1
    doc.add_line(
        Point3::new(40.0, 50.0, 0.0),
        Point3::new(60.0, 50.0, 0.0),
        "A-WALL",
    );
    // 中心 (250,50) → region2
    doc.add_circle(Point3::new(250.0, 50.0, 0.0), 5.0, "A-WALL");
    // 中心 (150,50) → 两区之间，保留在模型空间
    doc.add_line(
        Point3::new(140.0, 50.0, 0.0),
        Point3::new(160.0, 50.0, 0.0),
        "A-WALL",
    );
    // 归属 region1 但图层被排除 → 丢弃
    doc.add_line(
        Point3::new(10.0, 10.0, 0.0),
        Point3::new(20.0, 10.0, 0.0),
        "A-ANNOT",
    );

    let report = run_pass(&mut doc, PassRules::default()).expect("处理失败");

    assert_eq!(report.region_names(), ["region1", "region2"]);
    let region1 = &report.regions[0];
    let region2 = &report.regions[1];
    assert_eq!(region1.moved, 1);
    // 排除图层的线 + 表单参照自身都计入丢弃
    assert_eq!(region1.dropped, 2);
    assert_eq!(region2.moved, 1);
    assert_eq!(region2.dropped, 1);
    assert_eq!(report.unassigned, 1);
    assert!(report.unresolved.is_empty());

    // 区域原点 = 表单插入点 + 轴偏移 (10, 20)
    assert!((region1.origin.x() - 10.0).abs() < 1e-9);
    assert!((region1.origin.y() - 20.0).abs() < 1e-9);
    assert!((region2.origin.x() - 210.0).abs() < 1e-9);
    assert!((region2.origin.y() - 20.0).abs() < 1e-9);

    let block1 = doc.block("region1").expect("region1 块缺失");
    assert_eq!(block1.entities.len(), 1);
    assert!(matches!(block1.entities[0], Entity::Line(_)));
    let block2 = doc.block("region2").expect("region2 块缺失");
    assert_eq!(block2.entities.len(), 1);
    assert!(matches!(block2.entities[0], Entity::Circle(_)));

    // 模型空间只剩：间隙线 + 两个区域块参照
    let mut remaining_lines = 0;
    let mut region_refs = Vec::new();
    for (_, entity) in doc.entities() {
        match entity {
            Entity::Line(_) => remaining_lines += 1,
            Entity::BlockReference(reference) => region_refs.push(reference.name.clone()),
            other => panic!("模型空间残留了意外实体: {}", other.kind_name()),
        }
    }
    assert_eq!(remaining_lines, 1);
    region_refs.sort();
    assert_eq!(region_refs, ["region1", "region2"]);
}

#[test]
fn pass_recurses_into_nested_block_instances() {
    let mut doc = Document::new();
    install_form_block(&mut doc);
    add_form(&mut doc, "region1", Point3::new(0.0, 0.0, 0.0));

    // 家具块：一条可计心的线 + 一条被排除图层的线
    doc.add_block_definition(BlockDefinition {
        name: "DESK".to_string(),
        base_point: Point3::new(0.0, 0.0, 0.0),
        entities: vec![
            line(Point3::new(-1.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), "A-FURN"),
            line(Point3::new(0.0, -1.0, 0.0), Point3::new(0.0, 1.0, 0.0), "A-ANNOT"),
        ],
    });
    doc.add_block_reference(
        "DESK",
        Point3::new(50.0, 50.0, 0.0),
        Vector3::new(1.0, 1.0, 1.0),
        0.0,
        vec![],
        "A-FURN",
    );

    let report = run_pass(&mut doc, PassRules::default()).expect("处理失败");
    assert_eq!(report.regions[0].moved, 1);

    // 迁入的是 DESK 参照；其定义已被修剪到只剩可导出内容
    let block = doc.block("region1").unwrap();
    assert!(matches!(
        &block.entities[0],
        Entity::BlockReference(reference) if reference.name == "DESK"
    ));
    let desk = doc.block("DESK").unwrap();
    assert_eq!(desk.entities.len(), 1);
    assert_eq!(desk.entities[0].layer_name(), "A-FURN");
}

#[test]
fn pass_without_forms_reports_block_name() {
    let mut doc = Document::new();
    doc.add_line(
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        "A-WALL",
    );
    let err = run_pass(&mut doc, PassRules::default()).unwrap_err();
    match err {
        EngineError::NoFormsFound { block_name } => {
            assert_eq!(block_name, "NEED_FORM_VER3");
        }
        other => panic!("意外错误: {other}"),
    }
}
