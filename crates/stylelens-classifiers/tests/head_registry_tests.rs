//! Head registry integration tests
//!
//! Exercises weights files as they are deployed: a YAML models section
//! pointing at safetensors heads, some with metadata sidecars.

use candle_core::{DType, Device, Tensor};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use stylelens_classifiers::embedder::l2_normalize;
use stylelens_classifiers::scoring::{predict_from_probabilities, probabilities};
use stylelens_classifiers::{
    Detection, HeadArchitecture, HeadMetadata, HeadRegistry, ModelsConfig, EMBEDDING_DIM,
};
use stylelens_core::{Gender, StyleLabels};

fn save_head(path: &Path, architecture: HeadArchitecture) {
    let params = architecture.random_parameters(&Device::Cpu).unwrap();
    candle_core::safetensors::save(&params, path).unwrap();
}

fn models_yaml(male: &Path, female: &Path) -> String {
    format!(
        r#"
device: cpu
heads:
  male:
    weights: {}
  female:
    weights: {}
    labels: ["a", "b", "c", "d"]
"#,
        male.display(),
        female.display()
    )
}

fn embedding() -> Tensor {
    let values: Vec<f32> = (0..EMBEDDING_DIM).map(|i| ((i * 7) % 13) as f32 - 6.0).collect();
    let raw = Tensor::from_vec(values, (1, EMBEDDING_DIM), &Device::Cpu).unwrap();
    l2_normalize(&raw).unwrap()
}

#[test]
fn test_registry_from_yaml_config() {
    let dir = TempDir::new().unwrap();
    let male = dir.path().join("male_model.safetensors");
    let female = dir.path().join("female_model.safetensors");
    save_head(&male, HeadArchitecture::Shallow);
    save_head(&female, HeadArchitecture::Deep);

    let config = ModelsConfig::from_yaml(&models_yaml(&male, &female)).unwrap();
    let registry = HeadRegistry::load_from_config(&config.heads, &Device::Cpu);

    let male_head = registry.get(Gender::Male).unwrap();
    assert_eq!(male_head.architecture(), HeadArchitecture::Shallow);
    assert_eq!(male_head.detection, Detection::Probed);
    assert_eq!(male_head.labels, StyleLabels::defaults_for(Gender::Male));

    let female_head = registry.get(Gender::Female).unwrap();
    assert_eq!(female_head.architecture(), HeadArchitecture::Deep);
    assert_eq!(female_head.labels.as_slice(), ["a", "b", "c", "d"]);
}

#[test]
fn test_sidecar_labels_take_precedence() {
    let dir = TempDir::new().unwrap();
    let male = dir.path().join("male_model.safetensors");
    let female = dir.path().join("female_model.safetensors");
    save_head(&male, HeadArchitecture::Deep);
    save_head(&female, HeadArchitecture::Shallow);

    let sidecar_labels = StyleLabels::new(["Lovely", "Unique", "Casual Street", "Feminine Minimal"]).unwrap();
    HeadMetadata {
        architecture: Some(HeadArchitecture::Shallow),
        labels: Some(sidecar_labels.clone()),
    }
    .write_for(&female)
    .unwrap();

    let config = ModelsConfig::from_yaml(&models_yaml(&male, &female)).unwrap();
    let registry = HeadRegistry::load_from_config(&config.heads, &Device::Cpu);

    let female_head = registry.get(Gender::Female).unwrap();
    assert_eq!(female_head.detection, Detection::Tagged);
    assert_eq!(female_head.labels, sidecar_labels);
}

#[test]
fn test_wrong_sidecar_tag_disables_only_that_head() {
    let dir = TempDir::new().unwrap();
    let male = dir.path().join("male_model.safetensors");
    let female = dir.path().join("female_model.safetensors");
    save_head(&male, HeadArchitecture::Deep);
    save_head(&female, HeadArchitecture::Deep);

    HeadMetadata {
        architecture: Some(HeadArchitecture::Shallow),
        labels: None,
    }
    .write_for(&male)
    .unwrap();

    let config = ModelsConfig::from_yaml(&models_yaml(&male, &female)).unwrap();
    let registry = HeadRegistry::load_from_config(&config.heads, &Device::Cpu);

    assert!(registry.get(Gender::Male).is_none());
    assert!(registry.get(Gender::Female).is_some());
}

#[test]
fn test_loaded_head_scores_embedding() {
    let dir = TempDir::new().unwrap();
    let male = dir.path().join("male_model.safetensors");
    save_head(&male, HeadArchitecture::Deep);

    let config = ModelsConfig::from_yaml(&models_yaml(&male, &PathBuf::from("/nonexistent.pth"))).unwrap();
    let registry = HeadRegistry::load_from_config(&config.heads, &Device::Cpu);
    let entry = registry.get(Gender::Male).unwrap();

    let scores = entry.head.forward(&embedding()).unwrap();
    assert_eq!(scores.dims(), &[1, 4]);
    assert_eq!(scores.dtype(), DType::F32);

    let probs = probabilities(&scores).unwrap();
    let prediction = predict_from_probabilities(Gender::Male, &entry.labels, probs).unwrap();
    assert!(entry.labels.contains(&prediction.label));
    assert_eq!(prediction.label, entry.labels.label_for(prediction.class_index));
}
