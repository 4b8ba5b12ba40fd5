//! Held-out predictions as CSV
use std::fs;
use std::path::Path;

use bmf_cc::ResultItem;
use polars::prelude::{
    CsvReader, CsvWriter, DataFrame, DataType, NamedFrom, SerReader,
    SerWriter, Series,
};

use crate::Error;

const VAL: &str = "y";
const PRED_1SAMPLE: &str = "pred_1sample";
const PRED_AVG: &str = "pred_avg";
const VAR: &str = "var";
const PRED_STD: &str = "pred_std";

fn coord_column(mode: usize) -> String {
    format!("c{mode}")
}

fn f64_series<F>(name: &str, items: &[ResultItem], f: F) -> Series
where
    F: Fn(&ResultItem) -> f64,
{
    Series::new(name, items.iter().map(f).collect::<Vec<f64>>())
}

/// Write one row per item: the coordinates `c0..c<n>`, the observed value,
/// and the prediction statistics after `nsamples` samples.
pub fn write_predictions<P: AsRef<Path>>(
    path: P,
    items: &[ResultItem],
    nsamples: usize,
) -> Result<(), Error> {
    let nmodes = items.first().map_or(0, |item| item.coords.len());
    let mut columns: Vec<Series> = (0..nmodes)
        .map(|mode| {
            let coords: Vec<i64> =
                items.iter().map(|item| item.coords[mode] as i64).collect();
            Series::new(&coord_column(mode), coords)
        })
        .collect();

    columns.push(f64_series(VAL, items, |item| item.val));
    columns.push(f64_series(PRED_1SAMPLE, items, |item| item.pred_1sample));
    columns.push(f64_series(PRED_AVG, items, |item| item.pred_avg));
    columns.push(f64_series(VAR, items, |item| item.var));
    columns.push(f64_series(PRED_STD, items, |item| item.pred_std(nsamples)));

    let mut df = DataFrame::new(columns)?;
    let mut file = fs::File::create(path)?;
    CsvWriter::new(&mut file).finish(&mut df)?;
    Ok(())
}

fn f64_column(df: &DataFrame, name: &str) -> Result<Vec<f64>, Error> {
    let srs = df.column(name)?.cast(&DataType::Float64)?;
    srs.f64()?
        .into_iter()
        .map(|x| {
            x.ok_or_else(|| Error::Predictions(format!("null in column {name}")))
        })
        .collect()
}

fn usize_column(df: &DataFrame, name: &str) -> Result<Vec<usize>, Error> {
    let srs = df.column(name)?.cast(&DataType::Int64)?;
    srs.i64()?
        .into_iter()
        .map(|x| match x {
            Some(ix) if ix >= 0 => Ok(ix as usize),
            _ => Err(Error::Predictions(format!(
                "invalid coordinate in column {name}"
            ))),
        })
        .collect()
}

/// Read items written by [`write_predictions`]
pub fn read_predictions<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<ResultItem>, Error> {
    let df = CsvReader::from_path(path.as_ref())?
        .has_header(true)
        .finish()?;

    let nmodes = (0..)
        .take_while(|&mode| df.column(&coord_column(mode)).is_ok())
        .count();
    if nmodes == 0 {
        return Err(Error::Predictions(String::from("no coordinate columns")));
    }

    let coords = (0..nmodes)
        .map(|mode| usize_column(&df, &coord_column(mode)))
        .collect::<Result<Vec<_>, _>>()?;
    let vals = f64_column(&df, VAL)?;
    let pred_1sample = f64_column(&df, PRED_1SAMPLE)?;
    let pred_avg = f64_column(&df, PRED_AVG)?;
    let var = f64_column(&df, VAR)?;

    let items = (0..df.height())
        .map(|ix| ResultItem {
            coords: coords.iter().map(|col| col[ix]).collect(),
            val: vals[ix],
            pred_1sample: pred_1sample[ix],
            pred_avg: pred_avg[ix],
            var: var[ix],
        })
        .collect();
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::*;

    fn items() -> Vec<ResultItem> {
        vec![
            ResultItem {
                coords: vec![0, 3],
                val: 1.5,
                pred_1sample: 1.25,
                pred_avg: 1.375,
                var: 0.5,
            },
            ResultItem {
                coords: vec![2, 1],
                val: -2.0,
                pred_1sample: -1.5,
                pred_avg: -1.75,
                var: 0.125,
            },
        ]
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.csv");
        write_predictions(&path, &items(), 3).unwrap();

        let read = read_predictions(&path).unwrap();
        assert_eq!(read.len(), 2);
        for (a, b) in read.iter().zip(items().iter()) {
            assert_eq!(a.coords, b.coords);
            assert_relative_eq!(a.val, b.val);
            assert_relative_eq!(a.pred_1sample, b.pred_1sample);
            assert_relative_eq!(a.pred_avg, b.pred_avg);
            assert_relative_eq!(a.var, b.var);
        }
    }

    #[test]
    fn header_names_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.csv");
        write_predictions(&path, &items(), 3).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(header, "c0,c1,y,pred_1sample,pred_avg,var,pred_std");
    }
}
