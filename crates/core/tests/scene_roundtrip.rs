//! Scene and force files through the public API
//!
//! Run tests with: cargo test --test `scene_roundtrip`

use fluid_sim_core::solver::{create_cpu_engine, GridConfig, SimulationParameters};
use fluid_sim_core::timeline::{
    load_forces, save_forces, ElementBody, ElementKind, ObstacleShape, SceneDocument, Sequencer,
};
use fluid_sim_core::{Color, Force, Property, SceneError, Vec2};
use std::fs;
use std::path::PathBuf;

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn temp_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("fluid_sim_{}_{name}", std::process::id()))
}

fn authored_scene() -> Sequencer {
    let mut s = Sequencer::new();
    s.duration = 12.0;

    let plume = s.create_element(ElementKind::Emitter);
    plume.common.name = "plume".to_string();
    plume.common.position =
        Property::with_range(0.0, Vec2::new(100.0, 50.0), 6.0, Vec2::new(300.0, 50.0));
    if let ElementBody::Emitter(emitter) = &mut plume.body {
        emitter.color = Property::new(Color::new(0.9, 0.3, 0.1));
        emitter.temperature = Property::with_range(0.0, 5.0, 12.0, 20.0);
    }

    s.create_element(ElementKind::Attractor).common.name = "well".to_string();

    let pillar = s.create_element(ElementKind::Obstacle);
    pillar.common.name = "pillar".to_string();
    if let ElementBody::Obstacle(obstacle) = &mut pillar.body {
        obstacle.shape = ObstacleShape::Disc;
    }

    s.add_event("swell", 3.0);
    s.add_event("fade", 9.0);
    s
}

#[test]
fn test_scene_survives_save_and_load() {
    let path = temp_file("scene.json");
    let original = authored_scene();
    original.save(&path).expect("save scene");

    let mut loaded = Sequencer::new();
    loaded.load(&path).expect("load scene");
    assert_eq!(loaded.to_document(), original.to_document());
    assert_eq!(loaded.events().len(), 2);

    let mut a = original.clone();
    a.step_to(4.5);
    loaded.step_to(4.5);
    assert_eq!(a.emitter_forces(), loaded.emitter_forces());
    assert_eq!(loaded.emitter_forces()[0].position, Vec2::new(250.0, 50.0));

    let _ = fs::remove_file(path);
}

#[test]
fn test_malformed_scene_keeps_current_state() {
    let path = temp_file("broken.json");
    fs::write(&path, r#"{"duration": 4.0, "elements": [{"id": 0}]}"#).expect("write");

    let mut s = authored_scene();
    let before = s.to_document();
    assert!(matches!(s.load(&path), Err(SceneError::Parse(_))));
    assert_eq!(s.to_document(), before);

    let _ = fs::remove_file(path);
}

#[test]
fn test_scene_document_tags_element_types() {
    let json = serde_json::to_string(&authored_scene().to_document()).expect("serialize");
    assert!(json.contains(r#""type":"Emitter""#));
    assert!(json.contains(r#""kind":"Disc""#));

    let parsed = SceneDocument::from_json(&json).expect("parse");
    assert_eq!(parsed.elements.len(), 3);
    assert_eq!(parsed.duration, 12.0);
}

#[test]
fn test_saved_forces_keep_their_size_at_every_scale() {
    let path = temp_file("forces.json");
    let authored_size = Vec2::new(256.0, 128.0);
    let forces = vec![
        Force::new(Vec2::new(128.0, 32.0), Vec2::new(0.0, 1.0), Color::WHITE, 16.0),
        Force::new(Vec2::new(64.0, 96.0), Vec2::new(1.0, 0.0), Color::new(0.2, 0.5, 1.0), 8.0),
    ];
    save_forces(&path, &forces, authored_size).expect("save forces");

    let contents = fs::read_to_string(&path).expect("read back");
    assert!(contents.contains("\"Position\""));
    assert!(contents.contains("\"Radius\""));

    let loaded = load_forces(&path, authored_size).expect("load forces");
    assert_eq!(loaded.len(), 2);
    assert!((loaded[0].radius - 16.0).abs() < 1e-4);
    assert_eq!(loaded[1].position, Vec2::new(64.0, 96.0));

    // The file radius is the grid radius at half scale; every grid scales it once
    for scale in [0.25_f32, 0.5, 1.0] {
        let mut engine =
            create_cpu_engine(GridConfig::new(256, 128, scale), SimulationParameters::default())
                .expect("engine");
        for force in &loaded {
            engine.add_constant_force(*force);
        }
        let queued = engine.constant_forces()[0];
        assert_eq!(queued.position, Vec2::new(128.0, 32.0) * scale);
        assert!((queued.radius - 8.0 * scale / 0.5).abs() < 1e-4);
        assert!((queued.radius / scale - 16.0).abs() < 1e-4, "world radius at scale {scale}");
    }

    let _ = fs::remove_file(path);
}
