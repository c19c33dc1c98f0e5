//! Type casting, derived columns and row filters

use super::merge::text_values;
use crate::error::Result;
use crate::utils::frame::series;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::{debug, info, warn};

/// Days between 0001-01-01 and 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

const NUMERIC_COLUMNS: [&str; 2] = ["ecMaxContribution", "totalCost"];
const DATE_COLUMNS: [&str; 2] = ["startDate", "endDate"];

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d.%m.%Y", "%d-%m-%Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse a number that may use a decimal comma. Non-finite or unparseable
/// values are missing.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let normalized = raw.trim().replace(',', ".");
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a calendar date from the formats seen in the raw exports
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Parse a yes/no flag
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "1.0" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "0.0" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn to_epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
}

/// Read a date column as epoch days whatever its physical representation
fn epoch_days(s: &Series) -> Result<Vec<Option<i32>>> {
    match s.dtype() {
        DataType::Date => Ok(s.cast(&DataType::Int32)?.i32()?.into_iter().collect()),
        DataType::Datetime(_, _) => {
            let as_date = s.cast(&DataType::Date)?;
            Ok(as_date.cast(&DataType::Int32)?.i32()?.into_iter().collect())
        }
        _ => Ok(text_values(s)?
            .into_iter()
            .map(|v| v.and_then(|t| parse_date(&t)).map(to_epoch_days))
            .collect()),
    }
}

fn date_series(name: &str, days: Vec<Option<i32>>) -> Result<Series> {
    Ok(Series::new(name.into(), days).cast(&DataType::Date)?)
}

/// Coerce raw fields into typed columns.
///
/// - `ecMaxContribution`, `totalCost`: decimal-comma text to `f64`
/// - `startDate`, `endDate`: text to `Date`
/// - `startmonth`: month of `startDate`
/// - `SME` (when present): text to boolean flag
///
/// Anything that does not parse becomes missing.
pub fn cast_types(df: &DataFrame) -> Result<DataFrame> {
    let mut out = df.clone();

    for name in NUMERIC_COLUMNS {
        let values: Vec<Option<f64>> = text_values(series(df, name)?)?
            .into_iter()
            .map(|v| v.and_then(|t| parse_decimal(&t)))
            .collect();
        out.with_column(Series::new(name.into(), values))?;
    }

    let mut start_days = Vec::new();
    for name in DATE_COLUMNS {
        let days = epoch_days(series(df, name)?)?;
        if name == "startDate" {
            start_days = days.clone();
        }
        out.with_column(date_series(name, days)?)?;
    }

    let start_month: Vec<Option<i32>> = start_days
        .into_iter()
        .map(|d| d.and_then(from_epoch_days).map(|date| date.month() as i32))
        .collect();
    out.with_column(Series::new("startmonth".into(), start_month))?;

    if let Ok(sme) = df.column("SME") {
        let sme = sme.as_materialized_series();
        if sme.dtype() != &DataType::Boolean {
            let flags: Vec<Option<bool>> = text_values(sme)?
                .into_iter()
                .map(|v| v.and_then(|t| parse_flag(&t)))
                .collect();
            out.with_column(Series::new("SME".into(), flags))?;
        }
    }

    debug!(rows = out.height(), cols = out.width(), "Cast column types");
    Ok(out)
}

/// Replace the date pair with `duration_days` (end minus start, in days)
pub fn add_duration(df: &DataFrame) -> Result<DataFrame> {
    let start = epoch_days(series(df, "startDate")?)?;
    let end = epoch_days(series(df, "endDate")?)?;

    let duration: Vec<Option<i64>> = start
        .iter()
        .zip(end.iter())
        .map(|(s, e)| match (s, e) {
            (Some(s), Some(e)) => Some(*e as i64 - *s as i64),
            _ => None,
        })
        .collect();

    let mut out = df.drop("startDate")?.drop("endDate")?;
    out.with_column(Series::new("duration_days".into(), duration))?;
    Ok(out)
}

/// Drop rows whose `totalCost` is exactly zero; missing costs pass through.
///
/// Rows are re-indexed positionally afterwards, so the project identifier
/// column is dropped here.
pub fn drop_zero_total_cost(df: &DataFrame) -> Result<DataFrame> {
    let costs = series(df, "totalCost")?.cast(&DataType::Float64)?;
    let mask: BooleanChunked = costs
        .f64()?
        .into_iter()
        .map(|v| Some(v.map_or(true, |c| c != 0.0)))
        .collect();

    let mut out = df.filter(&mask)?;
    if out.column("id").is_ok() {
        out = out.drop("id")?;
    }

    info!(
        before = df.height(),
        after = out.height(),
        "Dropped zero total-cost rows"
    );
    Ok(out)
}

/// Drop every row holding a missing value (null, or NaN in float columns)
pub fn drop_na(df: &DataFrame) -> Result<DataFrame> {
    let mut keep = vec![true; df.height()];

    for column in df.get_columns() {
        let s = column.as_materialized_series();
        match s.dtype() {
            DataType::Float32 | DataType::Float64 => {
                let values = s.cast(&DataType::Float64)?;
                for (i, v) in values.f64()?.into_iter().enumerate() {
                    if v.map_or(true, |x| x.is_nan()) {
                        keep[i] = false;
                    }
                }
            }
            _ => {
                if s.null_count() > 0 {
                    for (i, is_null) in s.is_null().into_iter().enumerate() {
                        if is_null.unwrap_or(false) {
                            keep[i] = false;
                        }
                    }
                }
            }
        }
    }

    let mask = BooleanChunked::from_slice("keep".into(), &keep);
    let out = df.filter(&mask)?;

    info!(before = df.height(), after = out.height(), "Dropped rows with missing values");
    if out.height() == 0 && df.height() > 0 {
        warn!("Every row held a missing value");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> DataFrame {
        df!(
            "id" => &[1i64, 2, 3, 4],
            "ecMaxContribution" => &[Some("1000000,5"), Some("abc"), Some("3000000"), None],
            "totalCost" => &[Some("2000000"), Some("0"), Some("0,0"), Some("150,25")],
            "startDate" => &[Some("2020-01-15"), Some("2021-02-01"), Some("not a date"), Some("01/03/2022")],
            "endDate" => &[Some("2020-02-14"), Some("2022-02-01"), Some("2023-01-01"), None],
            "SME" => &[Some("true"), Some("False"), Some("maybe"), None]
        )
        .unwrap()
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("1234,5"), Some(1234.5));
        assert_eq!(parse_decimal(" 42 "), Some(42.0));
        assert_eq!(parse_decimal("n/a"), None);
        assert_eq!(parse_decimal("NaN"), None);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2022, 3, 1).unwrap();
        assert_eq!(parse_date("2022-03-01"), Some(expected));
        assert_eq!(parse_date("01/03/2022"), Some(expected));
        assert_eq!(parse_date("2022-03-01 00:00:00"), Some(expected));
        assert_eq!(parse_date("garbage"), None);
    }

    #[test]
    fn test_cast_types() {
        let typed = cast_types(&raw()).unwrap();

        let ec = typed.column("ecMaxContribution").unwrap();
        assert_eq!(ec.dtype(), &DataType::Float64);
        let ec: Vec<Option<f64>> = ec.f64().unwrap().into_iter().collect();
        assert_eq!(ec, vec![Some(1_000_000.5), None, Some(3_000_000.0), None]);

        assert_eq!(typed.column("startDate").unwrap().dtype(), &DataType::Date);
        assert_eq!(typed.column("startDate").unwrap().null_count(), 1);

        let month: Vec<Option<i32>> = typed.column("startmonth").unwrap().i32().unwrap().into_iter().collect();
        assert_eq!(month, vec![Some(1), Some(2), None, Some(3)]);

        let sme: Vec<Option<bool>> = typed.column("SME").unwrap().bool().unwrap().into_iter().collect();
        assert_eq!(sme, vec![Some(true), Some(false), None, None]);
    }

    #[test]
    fn test_add_duration_exact_days() {
        let typed = cast_types(&raw()).unwrap();
        let durated = add_duration(&typed).unwrap();

        assert!(durated.column("startDate").is_err());
        assert!(durated.column("endDate").is_err());

        let d: Vec<Option<i64>> = durated.column("duration_days").unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(d, vec![Some(30), Some(365), None, None]);
    }

    #[test]
    fn test_drop_zero_total_cost_keeps_missing() {
        let df = df!(
            "id" => &[1i64, 2, 3, 4],
            "totalCost" => &[Some(10.0), Some(0.0), None, Some(f64::NAN)]
        )
        .unwrap();

        let filtered = drop_zero_total_cost(&df).unwrap();
        assert_eq!(filtered.height(), 3);
        assert!(filtered.column("id").is_err());
    }

    #[test]
    fn test_drop_na_removes_nulls_and_nan() {
        let df = df!(
            "a" => &[Some(1.0), Some(f64::NAN), Some(3.0), Some(4.0)],
            "b" => &[Some("x"), Some("y"), None, Some("z")]
        )
        .unwrap();

        let cleaned = drop_na(&df).unwrap();
        assert_eq!(cleaned.height(), 2);
        for column in cleaned.get_columns() {
            assert_eq!(column.null_count(), 0);
        }
    }

    #[test]
    fn test_drop_na_empty_result_allowed() {
        let df = df!("a" => &[None::<f64>, None]).unwrap();
        let cleaned = drop_na(&df).unwrap();
        assert_eq!(cleaned.height(), 0);
    }
}
