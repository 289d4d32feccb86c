use std::{fs::File, path::Path};

use chrono::{NaiveDate, NaiveDateTime};
use polars::{
    frame::DataFrame,
    io::SerReader,
    prelude::{col, lit, CsvReader, DataType, IntoLazy},
};
use tracing::{debug, warn};

use crate::error::{EnvError, Result};
use crate::indicators;
use crate::state::State;

/// Raw OHLCV bar as read from the data source.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Ordered, indexable source of bars in ascending timestamp order.
///
/// Shared read-only between environments, so implementations hand out
/// fresh copies of each state.
pub trait DataFeeder {
    fn len(&self) -> usize;

    fn get(&self, index: usize) -> Option<State>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory feeder over fully computed states.
#[derive(Debug, Clone, Default)]
pub struct SeriesFeeder {
    states: Vec<State>,
}

impl SeriesFeeder {
    pub fn new(states: Vec<State>) -> Self {
        Self { states }
    }

    /// Computes indicators over `candles`, dropping the warm-up rows.
    pub fn from_candles(candles: &[Candle]) -> Result<Self> {
        let states = indicators::enrich(candles)?;
        debug!(
            candles = candles.len(),
            states = states.len(),
            "computed indicator columns"
        );
        Ok(Self::new(states))
    }

    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let candles = load_candles(path)?;
        Self::from_candles(&candles)
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }
}

impl DataFeeder for SeriesFeeder {
    fn len(&self) -> usize {
        self.states.len()
    }

    fn get(&self, index: usize) -> Option<State> {
        self.states.get(index).cloned()
    }
}

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| EnvError::Timestamp(format!("unrecognized timestamp: {raw:?}")))
}

/// Reads `date, open, high, low, close[, volume]` from a CSV file.
pub fn load_candles(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let file = File::open(path.as_ref())?;
    let df = CsvReader::new(file).finish()?;
    let df = sanitize(df)?;
    get_candle_data(&df)
}

/// Replaces NaN in every numeric column with 0.
fn sanitize(mut df: DataFrame) -> Result<DataFrame> {
    let column_names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    for name in column_names {
        if df.column(&name)?.dtype().is_float() {
            df = df
                .lazy()
                .with_column(col(name.as_str()).fill_nan(lit(0.0)))
                .collect()?;
        }
    }
    Ok(df)
}

fn float_column(frame: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = frame.column(name)?.cast(&DataType::Float64)?;
    let values = column.f64()?.to_vec();
    let nulls = values.iter().filter(|v| v.is_none()).count();
    if nulls > 0 {
        warn!(column = name, nulls, "null values replaced with 0");
    }
    Ok(values.into_iter().map(|opt| opt.unwrap_or(0.0)).collect())
}

pub fn get_candle_data(frame: &DataFrame) -> Result<Vec<Candle>> {
    let timestamps = frame
        .column("date")?
        .cast(&DataType::String)?
        .str()?
        .into_iter()
        .map(|raw| raw.ok_or(EnvError::MissingField("date")).and_then(parse_timestamp))
        .collect::<Result<Vec<_>>>()?;
    let open = float_column(frame, "open")?;
    let high = float_column(frame, "high")?;
    let low = float_column(frame, "low")?;
    let close = float_column(frame, "close")?;
    let volume = if frame.column("volume").is_ok() {
        float_column(frame, "volume")?
    } else {
        vec![0.0; frame.height()]
    };

    let data: Vec<Candle> = timestamps
        .into_iter()
        .enumerate()
        .map(|(i, timestamp)| Candle {
            timestamp,
            open: open[i],
            high: high[i],
            low: low[i],
            close: close[i],
            volume: volume[i],
        })
        .collect();

    Ok(data)
}
