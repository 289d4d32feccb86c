use std::{error::Error, fs::File, sync::Arc, time::Instant};

use polars::{
    frame::DataFrame,
    io::SerWriter,
    prelude::{Column, CsvWriter, NamedFrom},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tradegym::{
    BreakoutPolicy, EnvError, MinMaxScaler, Policy, SeriesFeeder, SimulationConfig, price_bounds,
};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tradegym=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Usage: `tradegym [data.csv] [config.toml]`
fn main() -> Result<(), Box<dyn Error>> {
    init_logging();

    let mut args = std::env::args().skip(1);
    let data_path = args.next().unwrap_or_else(|| "data/data.csv".to_string());
    let config = match args.next() {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };

    let start = Instant::now();
    let feeder = SeriesFeeder::load_csv(&data_path)?;
    info!(
        path = %data_path,
        bars = feeder.states().len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "loaded data"
    );

    let (min, max) = price_bounds(feeder.states()).ok_or(EnvError::InsufficientData {
        required: 1,
        actual: 0,
    })?;
    let scaler = MinMaxScaler::new(min, max)?;
    let mut env = config.build(Arc::new(feeder), Box::new(scaler))?;
    let mut policy = BreakoutPolicy::new();

    let mut steps_log: Vec<u64> = Vec::new();
    let mut price_log: Vec<f64> = Vec::new();
    let mut allocation_log: Vec<f64> = Vec::new();
    let mut account_value_log: Vec<f64> = Vec::new();
    let mut reward_log: Vec<f64> = Vec::new();

    let (mut observation, mut info) = env.reset()?;
    policy.reset();
    let mut total_reward = 0.0;

    loop {
        let action = policy.act(&observation, &info)?;
        let result = env.step(action)?;
        total_reward += result.reward;

        let newest = result.info.window.get(-1)?;
        steps_log.push(env.step_count() as u64);
        price_log.push(newest.close);
        allocation_log.push(newest.allocation_percentage());
        account_value_log.push(newest.account_value());
        reward_log.push(result.reward);

        if result.done() {
            info!(total_reward, "episode finished");
            for (name, value) in result.info.metrics.iter() {
                info!(metric = name, value, "final metric");
            }
            break;
        }
        observation = result.observation;
        info = result.info;
    }

    let mut df = DataFrame::new(vec![
        Column::new("step".into(), steps_log),
        Column::new("price".into(), price_log),
        Column::new("allocation".into(), allocation_log),
        Column::new("account_value".into(), account_value_log),
        Column::new("reward".into(), reward_log),
    ])?;

    std::fs::create_dir_all("output")?;
    let mut file = File::create("output/run_output.csv")?;
    CsvWriter::new(&mut file).finish(&mut df)?;
    info!(rows = df.height(), "wrote output/run_output.csv");

    Ok(())
}
