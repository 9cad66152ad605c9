//! Long time-series frames: one row per station and timestamp, one column per variable.

use crate::variables::catalog::ResolvedVariable;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use geo::Point;
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap};

pub const STATION_COL: &str = "station";
pub const TIME_COL: &str = "time";
pub const X_COL: &str = "x";
pub const Y_COL: &str = "y";

const DATETIME_FORMATS: [&str; 7] = [
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%MZ",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parses the timestamp formats the weather APIs use, as naive UTC.
pub(crate) fn parse_time(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text.trim_end_matches('Z'), "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Distinct codes of `variables` in first-seen order, each with the columns it
/// fills. A code asked for twice, by id and by name say, fills both columns.
pub(crate) fn columns_by_code(variables: &[ResolvedVariable]) -> Vec<(String, Vec<usize>)> {
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (i, variable) in variables.iter().enumerate() {
        let code = variable.code.to_string();
        match groups.iter_mut().find(|(c, _)| *c == code) {
            Some((_, columns)) => columns.push(i),
            None => groups.push((code, vec![i])),
        }
    }
    groups
}

/// Collects observations and lays them out sorted by station, then time.
#[derive(Debug)]
pub(crate) struct SeriesBuilder {
    labels: Vec<String>,
    rows: BTreeMap<(String, NaiveDateTime), Vec<Option<f64>>>,
}

impl SeriesBuilder {
    pub(crate) fn new(labels: Vec<String>) -> Self {
        Self {
            labels,
            rows: BTreeMap::new(),
        }
    }

    /// Records `value` of the `column`-th label. Later values for the same
    /// cell only replace missing ones.
    pub(crate) fn insert(
        &mut self,
        station: &str,
        time: NaiveDateTime,
        column: usize,
        value: Option<f64>,
    ) {
        let width = self.labels.len();
        let row = self
            .rows
            .entry((station.to_string(), time))
            .or_insert_with(|| vec![None; width]);
        if let Some(cell) = row.get_mut(column) {
            if cell.is_none() {
                *cell = value;
            }
        }
    }

    pub(crate) fn finish(self) -> PolarsResult<DataFrame> {
        let mut stations = Vec::with_capacity(self.rows.len());
        let mut times = Vec::with_capacity(self.rows.len());
        let mut values: Vec<Vec<Option<f64>>> =
            vec![Vec::with_capacity(self.rows.len()); self.labels.len()];
        for ((station, time), row) in self.rows {
            stations.push(station);
            times.push(time);
            for (column, value) in values.iter_mut().zip(row) {
                column.push(value);
            }
        }

        let times =
            DatetimeChunked::from_naive_datetime(TIME_COL.into(), times, TimeUnit::Milliseconds);
        let mut columns = vec![
            Column::new(STATION_COL.into(), stations),
            Column::from(times.into_series()),
        ];
        columns.extend(
            self.labels
                .iter()
                .zip(values)
                .map(|(label, column)| Column::new(label.as_str().into(), column)),
        );
        DataFrame::new(columns)
    }
}

/// Adds [`X_COL`] and [`Y_COL`] with the location of each row's station.
/// Stations without a location get nulls.
pub(crate) fn attach_points(
    mut df: DataFrame,
    points: &HashMap<String, Point<f64>>,
) -> PolarsResult<DataFrame> {
    let (xs, ys): (Vec<Option<f64>>, Vec<Option<f64>>) = df
        .column(STATION_COL)?
        .str()?
        .into_iter()
        .map(|station| {
            let point = station.and_then(|s| points.get(s));
            (point.map(|p| p.x()), point.map(|p| p.y()))
        })
        .unzip();
    df.with_column(Column::new(X_COL.into(), xs))?;
    df.with_column(Column::new(Y_COL.into(), ys))?;
    Ok(df)
}
