//! PyTorch checkpoint tests
//!
//! Loads the committed `.pth` state dicts in `tests/fixtures/` (torch.save
//! zip layout, int64 batch counters included) the way deployed heads are
//! loaded. `make_pth_fixtures.py` regenerates them.

use candle_core::{DType, Device, Tensor};
use std::path::PathBuf;

use stylelens_classifiers::embedder::l2_normalize;
use stylelens_classifiers::head_loader::read_tensors;
use stylelens_classifiers::{
    load_head, Detection, HeadArchitecture, HeadConfig, HeadRegistry, HeadsConfig, ModelFormat, EMBEDDING_DIM,
};
use stylelens_core::Gender;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn embedding() -> Tensor {
    let values: Vec<f32> = (0..EMBEDDING_DIM).map(|i| ((i * 5) % 11) as f32 - 5.0).collect();
    let raw = Tensor::from_vec(values, (1, EMBEDDING_DIM), &Device::Cpu).unwrap();
    l2_normalize(&raw).unwrap()
}

#[test]
fn test_fixture_is_pytorch_format() {
    assert_eq!(ModelFormat::from_path(&fixture("shallow_head.pth")), ModelFormat::PyTorch);
}

#[test]
fn test_pth_keeps_int64_batch_counters() {
    let tensors = read_tensors(&fixture("shallow_head.pth")).unwrap();

    let counter = &tensors["layers.1.num_batches_tracked"];
    assert_eq!(counter.dtype(), DType::I64);
    assert!(counter.dims().is_empty());
    assert_eq!(counter.to_scalar::<i64>().unwrap(), 1875);

    assert_eq!(tensors["layers.0.weight"].dims(), &[256, EMBEDDING_DIM]);
    assert_eq!(tensors["layers.0.weight"].dtype(), DType::F32);
}

#[test]
fn test_shallow_pth_detected_as_shallow() {
    let loaded = load_head(&fixture("shallow_head.pth"), "male", &Device::Cpu).unwrap();

    assert_eq!(loaded.detection, Detection::Probed);
    assert_eq!(loaded.head.architecture(), HeadArchitecture::Shallow);
    assert!(loaded.labels.is_none());

    let scores = loaded.head.forward(&embedding()).unwrap();
    assert_eq!(scores.dims(), &[1, 4]);
    let scores: Vec<f32> = scores.flatten_all().unwrap().to_vec1().unwrap();
    assert!(scores.iter().all(|s| s.is_finite()));
}

#[test]
fn test_deep_pth_detected_as_deep() {
    let loaded = load_head(&fixture("deep_head.pth"), "female", &Device::Cpu).unwrap();

    assert_eq!(loaded.detection, Detection::Probed);
    assert_eq!(loaded.head.architecture(), HeadArchitecture::Deep);
    assert_eq!(loaded.head.forward(&embedding()).unwrap().dims(), &[1, 4]);
}

#[test]
fn test_registry_loads_pth_heads() {
    let heads = HeadsConfig {
        male: HeadConfig {
            weights: fixture("shallow_head.pth"),
            labels: None,
        },
        female: HeadConfig {
            weights: fixture("deep_head.pth"),
            labels: None,
        },
    };

    let registry = HeadRegistry::load_from_config(&heads, &Device::Cpu);
    assert_eq!(registry.count(), 2);
    assert_eq!(
        registry.get(Gender::Male).map(|h| h.architecture()),
        Some(HeadArchitecture::Shallow)
    );
    assert_eq!(
        registry.get(Gender::Female).map(|h| h.architecture()),
        Some(HeadArchitecture::Deep)
    );
}
