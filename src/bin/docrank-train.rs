//! Developer utility to train, export and evaluate the availability classifier.

use std::path::PathBuf;

use docrank::config::{DatasetSettings, ModelSettings};
use docrank::dataset::{Dataset, TimeCategory, load_dataset};
use docrank::logging;
use docrank::ml::metrics::{ConfusionMatrix, accuracy, precision_recall_by_class};
use docrank::training::{TrainedModel, train_model};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    let config = docrank::config::load_or_default().map_err(|err| err.to_string())?;
    if let Err(err) = logging::init(&config.logging) {
        eprintln!("Logging disabled: {err}");
    }

    let settings = DatasetSettings {
        path: options.dataset.clone(),
        sheet: options.sheet.clone(),
    };
    let dataset = load_dataset(&settings).map_err(|err| err.to_string())?;
    println!(
        "dataset: {} complete rows, {} providers",
        dataset.len(),
        dataset.provider_count()
    );
    let model_settings = ModelSettings {
        rounds: options.rounds.unwrap_or(config.model.rounds),
        max_depth: options.max_depth.unwrap_or(config.model.max_depth),
        learning_rate: options.learning_rate.unwrap_or(config.model.learning_rate),
        split_seed: options.seed.unwrap_or(config.model.split_seed),
        ..config.model
    };
    let trained = train_model(&dataset, &model_settings).map_err(|err| err.to_string())?;
    trained
        .model
        .save_json(&options.model_out)
        .map_err(|err| format!("Failed to write {}: {err}", options.model_out.display()))?;
    println!("model written to {}", options.model_out.display());

    let cm = evaluate(&trained, &dataset);
    println!(
        "holdout accuracy: {:.4} ({} rows)",
        accuracy(&cm),
        cm.total()
    );
    for (idx, stats) in precision_recall_by_class(&cm).iter().enumerate() {
        let name = TimeCategory::from_index(idx).map_or("?", TimeCategory::as_str);
        println!(
            "class {:>2} {:<10}  precision={:.3}  recall={:.3}  support={}",
            idx, name, stats.precision, stats.recall, stats.support
        );
    }
    println!("confusion matrix (rows=true, cols=pred):");
    for truth in 0..cm.n_classes {
        let mut row = String::new();
        for pred in 0..cm.n_classes {
            row.push_str(&format!("{:6}", cm.get(truth, pred)));
        }
        println!("{row}");
    }
    Ok(())
}

fn evaluate(trained: &TrainedModel, dataset: &Dataset) -> ConfusionMatrix {
    let mut cm = ConfusionMatrix::new(trained.model.n_classes());
    for &idx in &trained.holdout {
        let Some(record) = dataset.records().get(idx) else {
            continue;
        };
        let predicted = trained.model.predict_class_index(&record.features());
        cm.add(record.time_category.index(), predicted);
    }
    cm
}

#[derive(Debug, Clone)]
struct CliOptions {
    dataset: PathBuf,
    sheet: Option<String>,
    model_out: PathBuf,
    rounds: Option<usize>,
    max_depth: Option<usize>,
    learning_rate: Option<f32>,
    seed: Option<u64>,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut dataset: Option<PathBuf> = None;
    let mut sheet = None;
    let mut model_out = PathBuf::from("model.json");
    let mut rounds = None;
    let mut max_depth = None;
    let mut learning_rate = None;
    let mut seed = None;

    let mut idx = 0usize;
    while idx < args.len() {
        let flag = args[idx].as_str();
        if matches!(flag, "-h" | "--help") {
            return Err(help_text());
        }
        idx += 1;
        let value = args
            .get(idx)
            .ok_or_else(|| format!("{flag} requires a value"))?;
        match flag {
            "--dataset" => dataset = Some(PathBuf::from(value)),
            "--sheet" => sheet = Some(value.clone()),
            "--out" => model_out = PathBuf::from(value),
            "--rounds" => rounds = Some(parse_value(flag, value)?),
            "--max-depth" => max_depth = Some(parse_value(flag, value)?),
            "--learning-rate" => learning_rate = Some(parse_value(flag, value)?),
            "--seed" => seed = Some(parse_value(flag, value)?),
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    let dataset = dataset.ok_or_else(help_text)?;
    Ok(CliOptions {
        dataset,
        sheet,
        model_out,
        rounds,
        max_depth,
        learning_rate,
        seed,
    })
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .parse::<T>()
        .map_err(|_| format!("Invalid {flag} value: {value}"))
}

fn help_text() -> String {
    [
        "docrank-train",
        "",
        "Trains the time-category classifier from a provider session table.",
        "",
        "Usage:",
        "  docrank-train --dataset <file> [--out model.json] [options]",
        "",
        "Options:",
        "  --dataset <file>       CSV or Excel workbook (required).",
        "  --sheet <name>         Worksheet name (default: first sheet).",
        "  --out <file>           Output model path (default: model.json).",
        "  --rounds <n>           Boosting rounds (default: 100).",
        "  --max-depth <n>        Maximum tree depth (default: 5).",
        "  --learning-rate <f32>  Learning rate (default: 0.1).",
        "  --seed <n>             Train/holdout split seed (default: 42).",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn parses_flags_and_keeps_defaults() {
        let options =
            parse_args(args(&["--dataset", "data.csv", "--rounds", "20", "--seed", "7"])).unwrap();
        assert_eq!(options.dataset, PathBuf::from("data.csv"));
        assert_eq!(options.rounds, Some(20));
        assert_eq!(options.seed, Some(7));
        assert_eq!(options.max_depth, None);
        assert_eq!(options.model_out, PathBuf::from("model.json"));
    }

    #[test]
    fn rejects_missing_values_and_unknown_flags() {
        let missing = parse_args(args(&["--dataset"])).unwrap_err();
        assert!(missing.contains("requires a value"));
        let unknown = parse_args(args(&["--bogus", "1"])).unwrap_err();
        assert!(unknown.starts_with("Unknown argument"));
        let invalid = parse_args(args(&["--rounds", "x", "--dataset", "d.csv"])).unwrap_err();
        assert!(invalid.contains("--rounds"));
        assert!(parse_args(Vec::new()).unwrap_err().contains("Usage"));
    }
}
