//! Time-bucket granularity and physical storage naming.
//!
//! A time bucket is a decimal timestamp truncated to its reporting granularity:
//! `yyyyMMddHHmm` for minutes, `yyyyMMddHH` for hours and `yyyyMMdd` for days.
//! Physical names carry the granularity tag and a day partition suffix:
//!
//! ```text
//! service_resp_time_minute-20240101
//! ```
//!
//! With a `day_step` greater than one, consecutive days share a partition whose
//! suffix is the first day of the group (counted from 1970-01-01).

use crate::error::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

const DAY_FORMAT: &str = "%Y%m%d";

/// Granularity at which a time bucket is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Downsampling {
    Minute,
    Hour,
    Day,
}

impl Downsampling {
    /// Tag used in physical names.
    pub fn name(&self) -> &'static str {
        match self {
            Downsampling::Minute => "minute",
            Downsampling::Hour => "hour",
            Downsampling::Day => "day",
        }
    }

    /// Number of minutes covered by one bucket.
    pub fn minutes(&self) -> i64 {
        match self {
            Downsampling::Minute => 1,
            Downsampling::Hour => 60,
            Downsampling::Day => 24 * 60,
        }
    }
}

impl fmt::Display for Downsampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn digits(mut value: i64) -> u32 {
    let mut count = 1;
    while value >= 10 {
        value /= 10;
        count += 1;
    }
    count
}

/// Infers the granularity from the width of the bucket value.
pub fn infer_downsampling(time_bucket: i64) -> Result<Downsampling> {
    if time_bucket <= 0 {
        return Err(Error::InvalidTimeBucket(time_bucket));
    }
    match digits(time_bucket) {
        12 => Ok(Downsampling::Minute),
        10 => Ok(Downsampling::Hour),
        8 => Ok(Downsampling::Day),
        _ => Err(Error::InvalidTimeBucket(time_bucket)),
    }
}

/// The `yyyyMMdd` day containing the bucket.
pub fn day_of(time_bucket: i64, downsampling: Downsampling) -> i64 {
    match downsampling {
        Downsampling::Minute => time_bucket / 10_000,
        Downsampling::Hour => time_bucket / 100,
        Downsampling::Day => time_bucket,
    }
}

/// Coarsens a minute or hour bucket to its hour (minute input) or leaves an
/// hour bucket untouched.
pub fn to_hour_bucket(time_bucket: i64) -> Result<i64> {
    match infer_downsampling(time_bucket)? {
        Downsampling::Minute => Ok(time_bucket / 100),
        Downsampling::Hour => Ok(time_bucket),
        Downsampling::Day => Err(Error::InvalidTimeBucket(time_bucket)),
    }
}

/// Coarsens any bucket to its day.
pub fn to_day_bucket(time_bucket: i64) -> Result<i64> {
    let downsampling = infer_downsampling(time_bucket)?;
    Ok(day_of(time_bucket, downsampling))
}

fn compress_day(day: i64, day_step: u32) -> Result<i64> {
    let date = NaiveDate::parse_from_str(&day.to_string(), DAY_FORMAT)
        .map_err(|_| Error::InvalidTimeBucket(day))?;
    if day_step <= 1 {
        return Ok(day);
    }

    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).ok_or(Error::InvalidTimeBucket(day))?;
    let days = (date - epoch).num_days();
    let offset = days.rem_euclid(i64::from(day_step));
    let first = date - chrono::Duration::days(offset);
    first
        .format(DAY_FORMAT)
        .to_string()
        .parse()
        .map_err(|_| Error::InvalidTimeBucket(day))
}

/// Physical index/table/measurement name of `metric_name` for a bucket.
pub fn physical_name(
    metric_name: &str,
    downsampling: Downsampling,
    time_bucket: i64,
    day_step: u32,
) -> Result<String> {
    let partition = compress_day(day_of(time_bucket, downsampling), day_step)?;
    Ok(format!("{}_{}-{}", metric_name, downsampling.name(), partition))
}

/// Derives the physical names of several metrics at one time bucket and the
/// reverse mapping needed to label query hits.
#[derive(Debug, Clone)]
pub struct IndexNameMaker {
    downsampling: Downsampling,
    time_bucket: i64,
    /// (logical, physical) in request order
    names: Vec<(String, String)>,
}

impl IndexNameMaker {
    pub fn new(metric_names: &[String], time_bucket: i64, day_step: u32) -> Result<Self> {
        let downsampling = infer_downsampling(time_bucket)?;
        let names = metric_names
            .iter()
            .map(|name| {
                physical_name(name, downsampling, time_bucket, day_step)
                    .map(|physical| (name.clone(), physical))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            downsampling,
            time_bucket,
            names,
        })
    }

    pub fn downsampling(&self) -> Downsampling {
        self.downsampling
    }

    pub fn time_bucket(&self) -> i64 {
        self.time_bucket
    }

    /// Physical names in request order.
    pub fn make(&self) -> Vec<String> {
        self.names.iter().map(|(_, physical)| physical.clone()).collect()
    }

    /// Maps each formatted physical name back to its logical metric name.
    pub fn make_map<F>(&self, formatter: F) -> HashMap<String, String>
    where
        F: Fn(&str) -> String,
    {
        self.names
            .iter()
            .map(|(logical, physical)| (formatter(physical), logical.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_downsampling() {
        assert_eq!(infer_downsampling(202401011200).unwrap(), Downsampling::Minute);
        assert_eq!(infer_downsampling(2024010112).unwrap(), Downsampling::Hour);
        assert_eq!(infer_downsampling(20240101).unwrap(), Downsampling::Day);
        assert!(matches!(
            infer_downsampling(20240101120000),
            Err(Error::InvalidTimeBucket(_))
        ));
        assert!(infer_downsampling(0).is_err());
        assert!(infer_downsampling(-202401011200).is_err());
    }

    #[test]
    fn test_physical_name_per_granularity() {
        let minute = physical_name("service_cpm", Downsampling::Minute, 202401011200, 1).unwrap();
        let hour = physical_name("service_cpm", Downsampling::Hour, 2024010112, 1).unwrap();
        let day = physical_name("service_cpm", Downsampling::Day, 20240101, 1).unwrap();
        assert_eq!(minute, "service_cpm_minute-20240101");
        assert_eq!(hour, "service_cpm_hour-20240101");
        assert_eq!(day, "service_cpm_day-20240101");
    }

    #[test]
    fn test_physical_name_day_step() {
        // 2024-01-01 is day 19723 since the epoch; 19723 % 3 == 1
        let name = physical_name("endpoint_sla", Downsampling::Minute, 202401011200, 3).unwrap();
        assert_eq!(name, "endpoint_sla_minute-20231231");
        let next = physical_name("endpoint_sla", Downsampling::Minute, 202401021200, 3).unwrap();
        assert_eq!(next, "endpoint_sla_minute-20231231");
        let third = physical_name("endpoint_sla", Downsampling::Minute, 202401031200, 3).unwrap();
        assert_eq!(third, "endpoint_sla_minute-20240103");
    }

    #[test]
    fn test_physical_name_rejects_invalid_date() {
        assert!(physical_name("x", Downsampling::Day, 20241301, 1).is_err());
    }

    #[test]
    fn test_coarsening() {
        assert_eq!(to_hour_bucket(202401011259).unwrap(), 2024010112);
        assert_eq!(to_day_bucket(202401011259).unwrap(), 20240101);
        assert_eq!(to_day_bucket(2024010112).unwrap(), 20240101);
        assert!(to_hour_bucket(20240101).is_err());
    }

    #[test]
    fn test_index_name_maker_reverse_map() {
        let names = vec!["service_resp_time".to_string(), "service_sla".to_string()];
        let maker = IndexNameMaker::new(&names, 2024010112, 1).unwrap();
        assert_eq!(maker.downsampling(), Downsampling::Hour);
        assert_eq!(
            maker.make(),
            vec!["service_resp_time_hour-20240101", "service_sla_hour-20240101"]
        );

        let map = maker.make_map(|name| format!("ns_{}", name));
        assert_eq!(map["ns_service_resp_time_hour-20240101"], "service_resp_time");
        assert_eq!(map["ns_service_sla_hour-20240101"], "service_sla");
    }
}
