//! Train, register, then serve the registered model

use keelson_ai_core::gbdt::BoosterModel;
use keelson_ai_core::KeelsonConfig;
use keelson_ai_registry::{ExperimentTracker, RegistryStorage};
use keelson_ai_service::{align, AlignError, FeatureRecord, PassengerInput, PredictionService};
use keelson_ai_trainer::{
    DataVersionRegistry, GbdtTrainer, LcgRng, TpeOptimizer, TrainingParams, TrainingPipeline,
};
use std::path::Path;
use std::sync::Arc;

fn write_dataset(dir: &Path) -> anyhow::Result<()> {
    let mut csv = String::from("Pclass,Sex,Age,Survived\n");
    let mut rng = LcgRng::new(99);
    for _ in 0..120 {
        let pclass = 1 + rng.next_range(3);
        let sex = rng.next_range(2);
        let age = 5.0 + rng.next_f64() * 60.0;
        let survived = u8::from(sex == 1 || (pclass == 1 && rng.next_f64() > 0.3));
        csv.push_str(&format!("{pclass},{sex},{age:.1},{survived}\n"));
    }
    std::fs::write(dir.join("train.csv"), csv)?;
    std::fs::write(
        dir.join("versions.yaml"),
        "data_versions:\n  \"1.2\":\n    path: train.csv\n    description: class, sex, age\n",
    )?;
    Ok(())
}

#[test]
fn test_trained_model_serves_predictions() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_dataset(dir.path())?;
    let storage = Arc::new(RegistryStorage::new(None)?);

    let config = KeelsonConfig::from_yaml_str(
        "experiment_name: titanic\nmodel_name: titanic-gbdt\ndata_version: \"1.2\"\n\
         target_column: Survived\nn_trials: 2\n",
    )?;
    let mut pipeline = TrainingPipeline::new(
        config,
        ExperimentTracker::new(storage.clone(), "titanic")?,
        DataVersionRegistry::from_yaml_file(dir.path().join("versions.yaml"))?,
        GbdtTrainer::new(TrainingParams {
            num_boost_round: 30,
            min_data_in_leaf: 5,
            ..TrainingParams::default()
        }),
        TpeOptimizer::new(7),
    );
    pipeline.run()?;

    let tracker = ExperimentTracker::new(storage, "titanic")?;
    let service = PredictionService::<BoosterModel>::from_registry(&tracker, "titanic-gbdt")?;
    assert_eq!(service.expected_columns(), ["Pclass", "Sex", "Age"]);

    let woman = PassengerInput {
        pclass: Some(1.0),
        sex: Some(1.0),
        age: Some(30.0),
        ..PassengerInput::default()
    };
    let prediction = service.predict(&FeatureRecord::from_serialize(&woman)?)?;
    assert!((0.0..=1.0).contains(&prediction.probability));
    assert_eq!(prediction.label, 1);

    let nothing = FeatureRecord::from_serialize(&PassengerInput {
        family_size: Some(3.0),
        ..PassengerInput::default()
    })?;
    assert!(service.predict(&nothing).is_err());
    Ok(())
}

#[test]
fn test_partial_passenger_aligns_to_fallback_order() -> anyhow::Result<()> {
    let expected: Vec<String> = keelson_ai_registry::FALLBACK_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .collect();
    let input = PassengerInput {
        pclass: Some(3.0),
        sex: Some(1.0),
        age: Some(22.0),
        ..PassengerInput::default()
    };
    let record = FeatureRecord::from_serialize(&input)?;
    assert_eq!(
        align(&record, &expected)?,
        vec![3.0, 1.0, 22.0, 0.0, 0.0, 0.0, 0.0, 0.0]
    );

    let unrelated = FeatureRecord::from_serialize(&PassengerInput {
        family_size: Some(2.0),
        ..PassengerInput::default()
    })?;
    assert!(matches!(
        align(&unrelated, &expected),
        Err(AlignError::NoMatchingColumns { .. })
    ));
    Ok(())
}
