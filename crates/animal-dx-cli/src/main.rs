//! Offline trainer and prediction CLI for animal-dx.
//!
//! ```text
//! animal-dx train   --data cleaned_animal_disease_prediction.csv --models models/
//! animal-dx predict --models models/ --input observation.json
//! animal-dx species --models models/
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use animal_dx_core::artifacts::ArtifactStore;
use animal_dx_core::inference::{InferenceCascade, PredictionError};
use animal_dx_core::{Dataset, Observation, PipelineConfig, SymptomFlags, Trainer};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Report file written next to the artifacts.
const REPORT_FILE: &str = "training_report.json";

#[derive(Parser)]
#[command(name = "animal-dx")]
#[command(version)]
#[command(about = "Hierarchical syndrome/disease prediction for animals", long_about = None)]
struct Cli {
    /// Verbose output
    ///
    /// When specified, sets the log level to `debug` and ignores the `RUST_LOG`
    /// environment variable. When not specified, uses `RUST_LOG` (default `info`)
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train every species in a CSV dataset and write artifacts
    Train {
        /// Training CSV
        #[arg(short, long)]
        data: PathBuf,

        /// Models root directory
        #[arg(short, long, default_value = "models")]
        models: PathBuf,

        /// TOML pipeline configuration (defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Where to write the training report (default: <models>/training_report.json)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Override the configured random seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Predict a disease for one observation
    Predict(PredictArgs),

    /// List species with trained artifacts
    Species {
        /// Models root directory
        #[arg(short, long, default_value = "models")]
        models: PathBuf,
    },
}

#[derive(Args)]
struct PredictArgs {
    /// Models root directory
    #[arg(short, long, default_value = "models")]
    models: PathBuf,

    /// Observation as a JSON file; the flags below are ignored when given
    #[arg(short, long)]
    input: Option<PathBuf>,

    #[arg(short, long)]
    species: Option<String>,

    #[arg(long)]
    breed: Option<String>,

    #[arg(long)]
    sex: Option<String>,

    #[arg(long)]
    age: Option<f64>,

    #[arg(long)]
    weight: Option<f64>,

    /// Free-text symptoms, comma separated (up to four are used)
    #[arg(long, value_delimiter = ',')]
    symptoms: Vec<String>,

    /// e.g. "5 days", "2 weeks"
    #[arg(long)]
    duration: Option<String>,

    /// e.g. "39.8°C"
    #[arg(long)]
    temperature: Option<String>,

    #[arg(long)]
    heart_rate: Option<String>,

    /// Symptom flags that are present, comma separated
    /// (appetite_loss, vomiting, diarrhea, coughing, labored_breathing,
    /// lameness, skin_lesions, nasal_discharge, eye_discharge)
    #[arg(long, value_delimiter = ',')]
    flags: Vec<String>,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Train {
            data,
            models,
            config,
            report,
            seed,
        } => train(&data, &models, config.as_deref(), report, seed),
        Command::Predict(args) => predict(args),
        Command::Species { models } => {
            for species in ArtifactStore::new(models).available_species()? {
                println!("{}", species);
            }
            Ok(())
        }
    }
}

fn train(
    data: &Path,
    models: &Path,
    config: Option<&Path>,
    report: Option<PathBuf>,
    seed: Option<u64>,
) -> Result<()> {
    let mut config = match config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(seed) = seed {
        config.training.seed = seed;
    }

    let dataset =
        Dataset::from_path(data).with_context(|| format!("reading dataset {}", data.display()))?;
    let output = Trainer::new(config)?.train(&dataset).context("training failed")?;

    let store = ArtifactStore::new(models);
    for artifacts in output.artifacts.values() {
        store
            .save(artifacts)
            .with_context(|| format!("saving artifacts for {}", artifacts.species))?;
    }

    let report_path = report.unwrap_or_else(|| models.join(REPORT_FILE));
    fs::write(&report_path, output.report.to_json()?)
        .with_context(|| format!("writing report {}", report_path.display()))?;

    info!(
        trained = output.artifacts.len(),
        skipped = output.report.skipped.len(),
        rejected_rows = output.report.rejected_rows.len(),
        report = %report_path.display(),
        "Done"
    );
    for species in &output.report.species {
        let top1 = species.syndrome_evaluation.as_ref().map(|e| e.top1_accuracy);
        println!(
            "{:<12} samples={:<6} groups={:<3} syndrome_top1={}",
            species.species,
            species.consolidation.samples,
            species.groups.len(),
            top1.map(|a| format!("{:.3}", a)).unwrap_or_else(|| "n/a".into())
        );
    }
    for skipped in &output.report.skipped {
        println!("{:<12} skipped: {}", skipped.species, skipped.reason);
    }
    Ok(())
}

fn predict(args: PredictArgs) -> Result<()> {
    let observation = match &args.input {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<Observation>(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => observation_from_args(&args)?,
    };

    let models = ArtifactStore::new(&args.models)
        .load_all()
        .with_context(|| format!("loading models from {}", args.models.display()))?;
    let cascade = InferenceCascade::new(Arc::new(models));

    match cascade.predict(&observation) {
        Ok(prediction) => {
            println!("{}", serde_json::to_string_pretty(&prediction)?);
            Ok(())
        }
        Err(PredictionError::UnknownSpecies {
            species,
            available,
            suggestion,
        }) => {
            let hint = suggestion.map(|s| format!(" Did you mean {}?", s)).unwrap_or_default();
            bail!(
                "no trained models for {:?} (available: {}).{}",
                species,
                available.join(", "),
                hint
            )
        }
        Err(e) => Err(e.into()),
    }
}

fn observation_from_args(args: &PredictArgs) -> Result<Observation> {
    let Some(species) = &args.species else {
        bail!("--species is required without --input");
    };
    Ok(Observation {
        species: species.clone(),
        breed: args.breed.clone(),
        sex: args.sex.clone(),
        age: args.age,
        weight: args.weight,
        symptoms: args.symptoms.clone(),
        duration: args.duration.clone(),
        temperature: args.temperature.clone(),
        heart_rate: args.heart_rate.clone(),
        flags: parse_flags(&args.flags)?,
    })
}

fn parse_flags(names: &[String]) -> Result<SymptomFlags> {
    let mut flags = SymptomFlags::default();
    for name in names {
        let slot = match name.trim().to_lowercase().replace('-', "_").as_str() {
            "appetite_loss" => &mut flags.appetite_loss,
            "vomiting" => &mut flags.vomiting,
            "diarrhea" => &mut flags.diarrhea,
            "coughing" => &mut flags.coughing,
            "labored_breathing" => &mut flags.labored_breathing,
            "lameness" => &mut flags.lameness,
            "skin_lesions" => &mut flags.skin_lesions,
            "nasal_discharge" => &mut flags.nasal_discharge,
            "eye_discharge" => &mut flags.eye_discharge,
            "" => continue,
            other => bail!("unknown symptom flag: {}", other),
        };
        *slot = true;
    }
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let flags = parse_flags(&["coughing".into(), "Nasal-Discharge".into()]).unwrap();
        assert!(flags.coughing);
        assert!(flags.nasal_discharge);
        assert_eq!(flags.count(), 2);
        assert!(parse_flags(&["sneezing".into()]).is_err());
    }

    #[test]
    fn test_cli_parses_predict_flags() {
        let cli = Cli::try_parse_from([
            "animal-dx",
            "predict",
            "--species",
            "Dog",
            "--symptoms",
            "Cough,Fever",
            "--flags",
            "coughing",
            "--temperature",
            "39.8°C",
        ])
        .unwrap();
        let Command::Predict(args) = cli.command else {
            panic!("expected predict");
        };
        let obs = observation_from_args(&args).unwrap();
        assert_eq!(obs.species, "Dog");
        assert_eq!(obs.symptoms, vec!["Cough", "Fever"]);
        assert!(obs.flags.coughing);
    }

    const HEADER: &str = "Animal_Type,Breed,Age,Gender,Weight,Symptom_1,Symptom_2,Symptom_3,\
Symptom_4,Duration,Body_Temperature,Heart_Rate,Appetite_Loss,Vomiting,Diarrhea,Coughing,\
Labored_Breathing,Lameness,Skin_Lesions,Nasal_Discharge,Eye_Discharge,Disease_Prediction";

    fn write_dataset(path: &Path) {
        let mut rows = vec![HEADER.to_string()];
        let row = |symptom: &str, flags: &str, disease: &str| {
            format!("Dog,Beagle,4,Male,12,{},,,,2 days,38.6,95,{},{}", symptom, flags, disease)
        };
        for _ in 0..10 {
            rows.push(row("Cough", "No,No,No,Yes,No,No,No,No,No", "Kennel Cough"));
            rows.push(row("Vomiting", "No,Yes,No,No,No,No,No,No,No", "Parvovirus"));
        }
        fs::write(path, rows.join("\n")).unwrap();
    }

    fn predict_args(models: &Path, species: &str) -> PredictArgs {
        let models = models.to_string_lossy().into_owned();
        let cli = Cli::try_parse_from([
            "animal-dx",
            "predict",
            "--models",
            models.as_str(),
            "--species",
            species,
            "--symptoms",
            "Vomiting",
            "--flags",
            "vomiting",
        ])
        .unwrap();
        let Command::Predict(args) = cli.command else {
            panic!("expected predict");
        };
        args
    }

    #[test]
    fn test_train_then_predict() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("animals.csv");
        let config = dir.path().join("pipeline.toml");
        let models = dir.path().join("models");
        write_dataset(&data);
        let toml = "[forest]\nn_estimators = 10\n\n[boosting]\nn_estimators = 5\n";
        fs::write(&config, toml).unwrap();

        train(&data, &models, Some(&config), None, Some(7)).unwrap();
        assert!(models.join(REPORT_FILE).is_file());
        assert_eq!(ArtifactStore::new(&models).available_species().unwrap(), vec!["Dog"]);

        predict(predict_args(&models, "dog")).unwrap();

        let err = predict(predict_args(&models, "Dogg")).unwrap_err().to_string();
        assert!(err.contains("available: Dog"), "{}", err);
        assert!(err.contains("Did you mean Dog?"), "{}", err);
    }

    #[test]
    fn test_predict_requires_species_or_input() {
        let cli = Cli::try_parse_from(["animal-dx", "predict"]).unwrap();
        let Command::Predict(args) = cli.command else {
            panic!("expected predict");
        };
        assert!(observation_from_args(&args).is_err());
    }
}
