//! Per-run state: dates, output layout and the produced-file list
//!
//! A run covers the window `yesterday..today`. Everything it writes lives under
//! `{output_dir}/{yesterday}-{today}/`.

use chrono::{Days, Local, NaiveDate, Utc};
use chrono_tz::Tz;
use std::path::{Path, PathBuf};

/// The date window a run exports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunDates {
    pub yesterday: NaiveDate,
    pub today: NaiveDate,
}

impl RunDates {
    pub fn ending(today: NaiveDate) -> Self {
        let yesterday = today.checked_sub_days(Days::new(1)).unwrap_or(today);
        Self { yesterday, today }
    }

    /// Window ending on the current date in `tz` (local zone when `None`)
    pub fn current(tz: Option<Tz>) -> Self {
        let today = match tz {
            Some(tz) => Utc::now().with_timezone(&tz).date_naive(),
            None => Local::now().date_naive(),
        };
        Self::ending(today)
    }

    /// `ddmmYYYY_ddmmYYYY`, used by range datasets
    pub fn range_suffix(&self) -> String {
        format!("{}_{}", self.yesterday.format("%d%m%Y"), self.today.format("%d%m%Y"))
    }

    /// `ddmmYYYY` of yesterday, used by daily datasets
    pub fn day_suffix(&self) -> String {
        self.yesterday.format("%d%m%Y").to_string()
    }

    /// `YYYY-MM-DD-YYYY-MM-DD`, the run directory and archive stem
    pub fn dir_name(&self) -> String {
        format!("{}-{}", self.yesterday.format("%Y-%m-%d"), self.today.format("%Y-%m-%d"))
    }

    pub fn yesterday_iso(&self) -> String {
        self.yesterday.format("%Y-%m-%d").to_string()
    }

    pub fn today_iso(&self) -> String {
        self.today.format("%Y-%m-%d").to_string()
    }
}

/// State of one execution. Only the produced-file list changes after creation.
#[derive(Debug)]
pub struct RunContext {
    dates: RunDates,
    run_dir: PathBuf,
    archive_path: PathBuf,
    produced: Vec<PathBuf>,
}

impl RunContext {
    pub fn new<P: AsRef<Path>>(output_dir: P, dates: RunDates) -> Self {
        let run_dir = output_dir.as_ref().join(dates.dir_name());
        let archive_path = run_dir.join(format!("{}.zip", dates.dir_name()));
        Self {
            dates,
            run_dir,
            archive_path,
            produced: Vec::new(),
        }
    }

    pub fn dates(&self) -> &RunDates {
        &self.dates
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Name of the raw public-sales download kept next to the CSVs
    pub fn raw_download_name(&self) -> String {
        format!("[ori]Public_Transaction_{}.csv.gz", self.dates.range_suffix())
    }

    pub fn raw_download_path(&self) -> PathBuf {
        self.run_dir.join(self.raw_download_name())
    }

    pub fn record_produced(&mut self, path: PathBuf) {
        self.produced.push(path);
    }

    pub fn produced(&self) -> &[PathBuf] {
        &self.produced
    }
}
