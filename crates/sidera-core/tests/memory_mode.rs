mod common;

use common::{constant_observation, Event, FakeSet, SUB_INSTRUMENT};
use sidera_core::{GridShape, ObservationId, TemplateBuilder, TemplateConfig};
use std::sync::Arc;

fn shape() -> GridShape {
    GridShape {
        orders: 2,
        pixels: 50,
    }
}

fn populated_set() -> FakeSet {
    let mut set = FakeSet::new(shape());
    set.insert(0, constant_observation(shape(), 0.0, 0.1, 10.0, 0.3));
    set.insert(1, constant_observation(shape(), 0.0, 0.5, 20.0, 0.4));
    set.insert(2, constant_observation(shape(), 0.0, 1.0, 40.0, 0.5));
    set
}

#[test]
fn memory_save_releases_each_observation_right_after_its_barrier() {
    let source = Arc::new(populated_set());
    let config = TemplateConfig {
        workers: 2,
        memory_save: true,
        ..TemplateConfig::default()
    };

    TemplateBuilder::new(config)
        .build(Arc::clone(&source), SUB_INSTRUMENT, None)
        .expect("memory-saving build succeeds");

    // release follows the barrier and precedes the next observation's load
    assert_eq!(
        source.recorded_events(),
        vec![
            Event::Load(ObservationId(0)),
            Event::Release(ObservationId(0)),
            Event::Load(ObservationId(1)),
            Event::Release(ObservationId(1)),
            Event::Load(ObservationId(2)),
            Event::Release(ObservationId(2)),
        ]
    );
}

#[test]
fn memory_save_skips_observations_that_never_loaded() {
    let mut set = populated_set();
    set.insert(3, constant_observation(shape(), 0.0, 2.0, 30.0, 0.5));
    set.fail_load.insert(ObservationId(1));
    let source = Arc::new(set);
    let config = TemplateConfig {
        workers: 2,
        memory_save: true,
        ..TemplateConfig::default()
    };

    TemplateBuilder::new(config)
        .build(Arc::clone(&source), SUB_INSTRUMENT, None)
        .expect("build continues past the load failure");

    assert_eq!(
        source.recorded_events(),
        vec![
            Event::Load(ObservationId(0)),
            Event::Release(ObservationId(0)),
            Event::Load(ObservationId(2)),
            Event::Release(ObservationId(2)),
            Event::Load(ObservationId(3)),
            Event::Release(ObservationId(3)),
        ]
    );
}

#[test]
fn default_mode_never_releases_observations() {
    let source = Arc::new(populated_set());

    TemplateBuilder::new(TemplateConfig {
        workers: 2,
        ..TemplateConfig::default()
    })
    .build(Arc::clone(&source), SUB_INSTRUMENT, None)
    .expect("default build succeeds");

    assert!(source
        .recorded_events()
        .iter()
        .all(|event| matches!(event, Event::Load(_))));
}
